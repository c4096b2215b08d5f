use crate::*;

use meshhub_services::{ConfigDelivery, ConfigSetting, MeshState};

/// Announcement while sleeping: wake, admit, acknowledge, poll.
#[tokio::test(start_paused = true)]
async fn test_announcement_wakes_and_polls_node() {
    let mut hub = Hub::start(single_node_allow_list());
    assert_eq!(hub.settle().await.state, MeshState::Sleeping);

    let (ack, polls) = hub.wake(&DEPLOYED_A).await;

    let snapshot = hub.settle().await;
    assert_eq!(snapshot.state, MeshState::Awake);
    assert_eq!(snapshot.nodes.len(), 1);
    let node = &snapshot.nodes[0];
    assert_eq!(node.address, "98:F4:AB:97:86");
    assert_eq!(node.status, NodeStatus::Deployed);
    assert!(node.awake);

    assert_eq!(ack.dest(), PROVISIONING_NODE_ID);
    let mut expected = DEPLOYED_A.to_vec();
    expected.push(node.node_id);
    assert_eq!(ack.data().as_ref(), expected.as_slice());

    assert_eq!(polls.len(), 4);
    assert!(polls.iter().all(|p| p.dest() == node.node_id));
    assert!(polls.iter().all(|p| p.packet_type().is_request()));
    assert_eq!(snapshot.outstanding.len(), 4);
}

/// The mesh sleeps exactly when every deployed node is awake and nothing is
/// outstanding, and not a moment before.
#[tokio::test(start_paused = true)]
async fn test_sleep_waits_for_every_deployed_node() {
    let mut hub = Hub::start(two_node_allow_list());

    let (_, polls_a) = hub.wake(&DEPLOYED_A).await;
    for (i, poll) in polls_a.iter().enumerate() {
        hub.answer(poll, i as u8, 1);
    }
    let snapshot = hub.settle().await;
    assert!(snapshot.outstanding.is_empty());
    assert_eq!(snapshot.state, MeshState::Awake, "slept with a deployed node asleep");
    assert!(hub.sent().await.is_empty());

    let (_, polls_b) = hub.wake(&DEPLOYED_B).await;
    let (last, rest) = polls_b.split_last().unwrap();
    for (i, poll) in rest.iter().enumerate() {
        hub.answer(poll, 10 + i as u8, 1);
    }
    assert_eq!(hub.settle().await.state, MeshState::Awake);

    hub.answer(last, 20, 1);
    let snapshot = hub.settle().await;
    assert_eq!(snapshot.state, MeshState::Sleeping);
    assert!(snapshot.nodes.iter().all(|n| !n.awake));

    // Newest node is told first.
    let sleeps = hub.sent().await;
    let order: Vec<_> = sleeps.iter().map(|p| (p.packet_type(), p.dest())).collect();
    assert_eq!(
        order,
        vec![(PacketType::GoToSleep, 3), (PacketType::GoToSleep, 2)]
    );
}

/// A node that never answers cannot keep the mesh awake past the ceiling.
#[tokio::test(start_paused = true)]
async fn test_force_sleep_bounds_awake_time() {
    let mut hub = Hub::start(single_node_allow_list());
    hub.wake(&DEPLOYED_A).await;

    tokio::time::sleep(Duration::from_secs(44)).await;
    assert_eq!(hub.settle().await.state, MeshState::Awake);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = hub.settle().await;
    assert_eq!(snapshot.state, MeshState::Sleeping);
    assert!(snapshot.outstanding.is_empty());

    let sent = hub.sent().await;
    assert_eq!(sent.last().map(|p| p.packet_type()), Some(PacketType::GoToSleep));
}

/// Non-allow-listed nodes are admitted and polled but do not hold up sleep.
#[tokio::test(start_paused = true)]
async fn test_stranger_is_admitted_as_unknown() {
    let mut hub = Hub::start(single_node_allow_list());
    let (ack, polls) = hub.wake(&STRANGER).await;
    assert_eq!(polls.len(), 4);
    assert_eq!(*ack.data().last().unwrap(), 2);

    let snapshot = hub.settle().await;
    assert_eq!(snapshot.nodes[0].status, NodeStatus::Unknown);
    assert_eq!(snapshot.nodes[0].address, "06:05:04:03:02:01");
}

/// Re-announcing keeps the node's id and does not poll it twice.
#[tokio::test(start_paused = true)]
async fn test_reannouncement_keeps_identity() {
    let mut hub = Hub::start(two_node_allow_list());
    let (first, _) = hub.wake(&DEPLOYED_A).await;
    let (second, polls) = hub.wake(&DEPLOYED_A).await;
    assert_eq!(first.data(), second.data());
    assert!(polls.is_empty());
    assert_eq!(hub.settle().await.nodes.len(), 1);
}

/// Config updates for a sleeping node ride along with its next wake.
#[tokio::test(start_paused = true)]
async fn test_config_update_delivered_on_next_wake() {
    let mut hub = Hub::start(single_node_allow_list());
    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    for (i, poll) in polls.iter().enumerate() {
        hub.answer(poll, i as u8, 1);
    }
    assert_eq!(hub.settle().await.state, MeshState::Sleeping);
    hub.sent().await;

    let delivery = hub
        .mesh
        .update_node_config("98:F4:AB:97:86", ConfigSetting::SleepDuration, 600)
        .await
        .unwrap();
    assert_eq!(delivery, ConfigDelivery::Queued);
    assert!(hub.sent().await.is_empty());

    let (_, sent) = hub.wake(&DEPLOYED_A).await;
    assert_eq!(sent.len(), 5);
    let update = &sent[4];
    assert_eq!(update.packet_type(), PacketType::SleepDurationUpdate);
    assert_eq!(update.data().as_ref(), &600i32.to_le_bytes());

    // The mesh cannot sleep until the update is acknowledged too.
    for (i, poll) in sent[..4].iter().enumerate() {
        hub.answer(poll, 100 + i as u8, 1);
    }
    assert_eq!(hub.settle().await.state, MeshState::Awake);
    hub.answer(update, 110, 0);
    assert_eq!(hub.settle().await.state, MeshState::Sleeping);
}
