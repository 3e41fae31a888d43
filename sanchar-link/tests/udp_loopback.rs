//! End-to-end test over a loopback UDP socket
//!
//! Runs the full daemon (listener thread, heartbeat thread, dispatch loop)
//! on an ephemeral port and talks to it like the base station does.
//!
//! Run with: `cargo test --test udp_loopback`

use sanchar_link::config::AppConfig;
use sanchar_link::core::types::{ChannelState, MotorId};
use sanchar_link::motor::RecordingDriver;
use sanchar_link::SancharApp;
use serde_json::{Value, json};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.network.bind_address = "127.0.0.1:0".to_string();
    config.network.read_timeout_ms = 20;
    config.heartbeat.period_ms = 100;
    config
}

/// Receive JSON messages until one matches `pred` or the timeout expires
fn recv_until(
    socket: &UdpSocket,
    timeout: Duration,
    pred: impl Fn(&Value) -> bool,
) -> Option<Value> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 2048];
    while Instant::now() < deadline {
        if let Ok((n, _)) = socket.recv_from(&mut buf) {
            let value: Value = serde_json::from_slice(&buf[..n]).unwrap();
            if pred(&value) {
                return Some(value);
            }
        }
    }
    None
}

#[test]
fn test_command_feedback_and_heartbeat() {
    let driver = RecordingDriver::new();
    let app = SancharApp::new(test_config(), driver.clone()).unwrap();
    let robot = app.local_addr().unwrap();
    let shutdown = app.shutdown_handle();
    let link_stats = app.link_stats();
    let handle = thread::spawn(move || app.run());

    let station = UdpSocket::bind("127.0.0.1:0").unwrap();
    station
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();

    let command = json!({
        "protocol": "robot-net/1.0",
        "message_type": 0,
        "request_id": "2a",
        "mode": 0,
        "payload": {
            "command": 2,
            "motor_id": [1, 2, -1],
            "direction": 0,
            "speed": 100,
            "angle": 0,
            "duration_ms": 150,
        },
    });
    station
        .send_to(command.to_string().as_bytes(), robot)
        .unwrap();

    let feedback = recv_until(&station, Duration::from_secs(3), |v| v["message_type"] == "feedback")
        .expect("feedback reply");
    assert_eq!(feedback["request_id"], 0x2a);
    assert_eq!(feedback["payload"]["status"], "success");
    assert_eq!(feedback["protocol"], "robot-net/1.0");

    let heartbeat = recv_until(&station, Duration::from_secs(3), |v| {
        v["message_type"] == "heartbeat"
    })
    .expect("heartbeat after backend bound");
    assert!(heartbeat["payload"]["rssi"].is_i64());

    // Timed command expires on its own
    let deadline = Instant::now() + Duration::from_secs(3);
    while driver.state(MotorId::LEFT) != ChannelState::Disabled && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(driver.state(MotorId::LEFT), ChannelState::Disabled);

    shutdown.shutdown();
    handle.join().unwrap().unwrap();
    assert!(link_stats.snapshot().sent >= 2);
}

#[test]
fn test_no_heartbeat_before_contact() {
    let app = SancharApp::new(test_config(), RecordingDriver::new()).unwrap();
    let shutdown = app.shutdown_handle();
    let link_stats = app.link_stats();
    let handle = thread::spawn(move || app.run());

    thread::sleep(Duration::from_millis(350));
    shutdown.shutdown();
    handle.join().unwrap().unwrap();

    let stats = link_stats.snapshot();
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.unaddressed, 0);
}
