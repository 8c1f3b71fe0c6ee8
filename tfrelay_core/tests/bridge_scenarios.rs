//! End-to-end relay scenarios over real buses

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tfrelay_core::communication::{LocalSegment, TransformBus, UdpBus};
use tfrelay_core::relay::{BridgeConfig, BridgeController, BridgeState, InterruptReason};
use tfrelay_core::{TransformKind, TransformSample};

type Inbox = Arc<Mutex<Vec<TransformSample>>>;

fn collect(bus: &dyn TransformBus) -> Inbox {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&inbox);
    bus.subscribe(Arc::new(move |sample: TransformSample| sink.lock().push(sample)))
        .unwrap();
    inbox
}

fn wait_for(inbox: &Inbox, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if inbox.lock().len() >= count {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn config() -> BridgeConfig {
    BridgeConfig::default()
        .with_tags("busA", "busB")
        .with_tick_interval(Duration::from_millis(5))
}

fn odom(authority: &str, kind: TransformKind, t: u64) -> TransformSample {
    TransformSample::new("odom", "base", authority, kind)
        .unwrap()
        .with_translation([1.0, 0.0, 0.0])
        .with_timestamp_us(t)
}

#[test]
fn test_local_segments_relay_and_retag() {
    let seg_a = LocalSegment::isolated("scenario-a");
    let seg_b = LocalSegment::isolated("scenario-b");
    let robot = seg_a.attach("robotA").unwrap();
    let viewer = seg_b.attach("viewer").unwrap();
    let viewer_inbox = collect(&viewer);
    let robot_inbox = collect(&robot);

    let mut bridge = BridgeController::new(
        Arc::new(seg_a.attach("busA").unwrap()),
        Arc::new(seg_b.attach("busB").unwrap()),
        config(),
    )
    .unwrap();
    bridge.start().unwrap();

    robot
        .publish(vec![odom("robotA", TransformKind::Dynamic, 1_000_000)], TransformKind::Dynamic)
        .unwrap();
    assert!(wait_for(&viewer_inbox, 1));

    let received = viewer_inbox.lock()[0].clone();
    assert_eq!(received.authority(), "busA:robotA");
    assert_eq!(received.kind(), TransformKind::Dynamic);
    assert_eq!(received.timestamp_us(), 1_000_000);
    assert_eq!(received.translation(), [1.0, 0.0, 0.0]);

    viewer
        .publish(
            vec![TransformSample::new("map", "odom", "viewer", TransformKind::Static).unwrap()],
            TransformKind::Static,
        )
        .unwrap();
    assert!(wait_for(&robot_inbox, 1));
    assert_eq!(robot_inbox.lock()[0].authority(), "busB:viewer");

    // Let a few more ticks pass to make sure nothing echoes back
    thread::sleep(Duration::from_millis(50));
    assert_eq!(viewer_inbox.lock().len(), 1);
    assert_eq!(robot_inbox.lock().len(), 1);

    bridge.interrupt().unwrap();
    let outcome = bridge.join().unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(bridge.state(), BridgeState::ShutDown);
}

#[test]
fn test_target_authority_is_never_forwarded() {
    let seg_a = LocalSegment::isolated("loop-a");
    let seg_b = LocalSegment::isolated("loop-b");
    let robot = seg_a.attach("robotA").unwrap();
    let viewer = seg_b.attach("viewer").unwrap();
    let viewer_inbox = collect(&viewer);

    let mut bridge = BridgeController::new(
        Arc::new(seg_a.attach("busA").unwrap()),
        Arc::new(seg_b.attach("busB").unwrap()),
        config(),
    )
    .unwrap();
    bridge.start().unwrap();

    robot
        .publish(
            vec![
                odom("busB", TransformKind::Dynamic, 1),
                odom("robotA", TransformKind::Dynamic, 2),
            ],
            TransformKind::Dynamic,
        )
        .unwrap();
    assert!(wait_for(&viewer_inbox, 1));
    thread::sleep(Duration::from_millis(30));

    let inbox = viewer_inbox.lock();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].timestamp_us(), 2);
    drop(inbox);

    bridge.interrupt().unwrap();
    let outcome = bridge.join().unwrap();
    assert_eq!(outcome.a_to_b.looped, 1);
}

#[test]
fn test_segment_host_shutdown_stops_bridge_with_exit_code_1() {
    let seg_a = LocalSegment::isolated("external-a");
    let seg_b = LocalSegment::isolated("external-b");

    let mut bridge = BridgeController::new(
        Arc::new(seg_a.attach("busA").unwrap()),
        Arc::new(seg_b.attach("busB").unwrap()),
        config(),
    )
    .unwrap();
    bridge.start().unwrap();

    seg_a.request_host_shutdown();
    let outcome = bridge.wait().unwrap();
    assert_eq!(outcome.reason, InterruptReason::External("busA".to_string()));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(seg_a.member_count(), 0);
    assert_eq!(seg_b.member_count(), 0);
}

#[test]
fn test_relay_onto_udp_bus() {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let remote = UdpBus::bind("remote-viewer", loopback, Vec::new()).unwrap();
    let remote_inbox = collect(&remote);
    let remote_addr = remote.local_addr().unwrap();

    let seg_a = LocalSegment::isolated("udp-a");
    let robot = seg_a.attach("robotA").unwrap();
    let bus_b = UdpBus::bind("busB", loopback, vec![remote_addr]).unwrap();

    let mut bridge =
        BridgeController::new(Arc::new(seg_a.attach("busA").unwrap()), Arc::new(bus_b), config())
            .unwrap();
    bridge.start().unwrap();

    robot
        .publish(
            vec![
                odom("robotA", TransformKind::Dynamic, 10),
                odom("robotA", TransformKind::Static, 11),
            ],
            TransformKind::Dynamic,
        )
        .unwrap();
    assert!(wait_for(&remote_inbox, 2));

    let inbox = remote_inbox.lock();
    assert!(inbox.iter().all(|s| s.authority() == "busA:robotA"));
    assert!(inbox.iter().any(|s| s.kind() == TransformKind::Static));
    drop(inbox);

    bridge.interrupt().unwrap();
    bridge.join().unwrap();
    remote.shutdown().unwrap();
}
