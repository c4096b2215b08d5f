use crate::*;

use meshhub_services::MeshState;

/// A pending battery-percent request answered with 50 reports 50, once.
#[tokio::test(start_paused = true)]
async fn test_battery_response_reported_once() {
    let mut hub = Hub::start(single_node_allow_list());
    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    let battery = polls
        .iter()
        .find(|p| p.packet_type() == PacketType::BatteryPctReq)
        .unwrap();

    let frame = answer_frame(battery, 7, 50);
    assert_eq!(&frame[4..], &[11, 4, 50, 0, 0, 0]);
    hub.inject(frame.clone());
    let snapshot = hub.settle().await;
    assert_eq!(snapshot.outstanding.len(), 3);
    assert!(snapshot
        .outstanding
        .iter()
        .all(|r| r.awaiting != "BatteryPctResp"));

    let reports = hub.reports_after(1).await;
    assert_eq!(
        reports,
        vec![(THING_A.to_string(), "batteryPercent".to_string(), 50)]
    );

    // Exact redelivery, then a late answer under a fresh key.
    hub.inject(frame);
    hub.answer(battery, 8, 51);
    hub.settle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hub.sink.reports().len(), 1);
}

/// Every telemetry kind reaches the sink under its metric name.
#[tokio::test(start_paused = true)]
async fn test_full_poll_round_reports_all_metrics() {
    let mut hub = Hub::start(single_node_allow_list());
    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    for (i, poll) in polls.iter().enumerate() {
        hub.answer(poll, i as u8, 1000 + i as i32);
    }
    assert_eq!(hub.settle().await.state, MeshState::Sleeping);

    let mut reports = hub.reports_after(4).await;
    reports.sort();
    let metrics: Vec<_> = reports.iter().map(|(_, m, v)| (m.as_str(), *v)).collect();
    assert_eq!(
        metrics,
        vec![
            ("batteryPercent", 1000),
            ("batteryVoltage", 1001),
            ("moisturePercent", 1002),
            ("moistureVoltage", 1003),
        ]
    );
}

/// Unanswered requests are retransmitted every period with identical
/// content and a new key.
#[tokio::test(start_paused = true)]
async fn test_unanswered_requests_are_resent() {
    let mut hub = Hub::start(single_node_allow_list());
    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    let (answered, unanswered) = polls.split_first().unwrap();
    hub.answer(answered, 0, 1);
    hub.settle().await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    let resent = hub.sent().await;
    assert_eq!(resent.len(), unanswered.len());

    for (original, again) in unanswered.iter().zip(&resent) {
        assert_eq!(again.dest(), original.dest());
        assert_eq!(again.packet_type(), original.packet_type());
        assert_eq!(again.data(), original.data());
        assert_ne!(again.idempotency_key(), original.idempotency_key());
    }

    // An answer to the resend clears the request like any other.
    hub.answer(&resent[0], 42, 5);
    assert_eq!(hub.settle().await.outstanding.len(), unanswered.len() - 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(hub.sent().await.len(), unanswered.len() - 1);
}

/// A wake that lands right after a completed cycle, before the resender
/// has noticed it is idle, still gets its requests resent.
#[tokio::test(start_paused = true)]
async fn test_resender_survives_back_to_back_cycles() {
    let mut hub = Hub::start(single_node_allow_list());
    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    for (i, poll) in polls.iter().enumerate() {
        hub.answer(poll, i as u8, 1);
    }
    assert_eq!(hub.settle().await.state, MeshState::Sleeping);
    hub.sent().await;

    let (_, polls) = hub.wake(&DEPLOYED_A).await;
    assert_eq!(polls.len(), 4);

    tokio::time::sleep(Duration::from_secs(11)).await;
    let resent = hub.sent().await;
    assert_eq!(resent.len(), 4);
}

/// Corrupt frames and packets from unknown nodes leave state untouched.
#[tokio::test(start_paused = true)]
async fn test_garbage_is_dropped() {
    let mut hub = Hub::start(single_node_allow_list());
    hub.wake(&DEPLOYED_A).await;
    let before = hub.settle().await;

    hub.inject(vec![2, 0, 5, 9, 0x63, 0]);
    hub.inject(vec![2, 0, 5, 9, 11, 4, 50]);
    hub.inject(vec![]);
    let stray = Packet::new(
        77,
        HUB_NODE_ID,
        PACKET_TTL,
        1,
        PacketType::BatteryPctResp,
        vec![50, 0, 0, 0],
    )
    .unwrap();
    hub.inject(stray.encode());

    let after = hub.settle().await;
    assert_eq!(after.state, before.state);
    assert_eq!(after.outstanding.len(), before.outstanding.len());
    assert_eq!(after.nodes.len(), 1);
    assert!(hub.sent().await.is_empty());
    assert!(hub.sink.reports().is_empty());
}
