use crate::*;

use meshhub_services::{ConfigDelivery, ConfigSetting};

/// The idempotency counter is shared by every outbound frame and wraps
/// from 255 to 0.
#[tokio::test(start_paused = true)]
async fn test_idempotency_key_wraps_after_256_sends() {
    let mut hub = Hub::start(single_node_allow_list());
    let (ack, polls) = hub.wake(&DEPLOYED_A).await;

    let mut keys = vec![ack.idempotency_key()];
    keys.extend(polls.iter().map(|p| p.idempotency_key()));
    assert_eq!(keys, vec![0, 1, 2, 3, 4]);

    for value in 0..257 {
        let delivery = hub
            .mesh
            .update_node_config("98:F4:AB:97:86", ConfigSetting::SensorHighVoltage, value)
            .await
            .unwrap();
        assert_eq!(delivery, ConfigDelivery::Sent);
    }
    let updates = hub.sent().await;
    assert_eq!(updates.len(), 257);
    keys.extend(updates.iter().map(|p| p.idempotency_key()));

    for pair in keys.windows(2) {
        assert_eq!(pair[1], pair[0].wrapping_add(1));
    }
    assert_eq!(keys[255], 255);
    assert_eq!(keys[256], 0);

    // Repeated updates of one setting overwrite a single tracker entry.
    let snapshot = hub.settle().await;
    assert_eq!(snapshot.outstanding.len(), 5);
    assert_eq!(snapshot.next_idempotency_key, keys.last().unwrap().wrapping_add(1));
}
