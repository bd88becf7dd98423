mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use blu_engine::Player;
use blu_proto::protocol::{PlayerState, RepeatMode};
use common::mock_device::MockDevice;
use tokio::sync::broadcast;

#[tokio::test]
async fn transport_commands_hit_device_endpoints() {
    let mock = MockDevice::start().await;
    for path in ["/Pause", "/Stop", "/Skip", "/Back", "/Add"] {
        mock.set(path, "<state>ok</state>");
    }
    let (tx, _rx) = broadcast::channel(4);
    let player = Player::new(Arc::new(mock.device()), tx);

    player.play_pause().await.unwrap();
    player.stop().await.unwrap();
    player.next().await.unwrap();
    player.previous().await.unwrap();
    player.play("/Add?playnow=1&file=Forever").await.unwrap();

    assert_eq!(
        mock.requests(),
        vec![
            "/Pause?toggle=1",
            "/Stop",
            "/Skip",
            "/Back",
            "/Add?playnow=1&file=Forever"
        ]
    );
}

#[tokio::test]
async fn repeat_cycles_from_current_device_mode() {
    let mock = MockDevice::start().await;
    mock.set("/Status", "<status etag=\"1\"><repeat>2</repeat></status>");
    mock.set("/Repeat", "<playlist/>");
    let (tx, _rx) = broadcast::channel(4);
    let player = Player::new(Arc::new(mock.device()), tx);

    assert_eq!(player.cycle_repeat().await.unwrap(), RepeatMode::All);
    assert_eq!(mock.requests().last().unwrap(), "/Repeat?state=0");

    mock.set("/Status", "<status etag=\"2\"><repeat>1</repeat></status>");
    assert_eq!(player.cycle_repeat().await.unwrap(), RepeatMode::None);
    assert_eq!(mock.requests().last().unwrap(), "/Repeat?state=2");
}

#[tokio::test]
async fn mute_toggles_current_flag() {
    let mock = MockDevice::start().await;
    mock.set("/Volume", "<volume mute=\"1\">27</volume>");
    let (tx, _rx) = broadcast::channel(4);
    let player = Player::new(Arc::new(mock.device()), tx);

    player.toggle_mute().await.unwrap();
    assert_eq!(mock.requests(), vec!["/Volume", "/Volume?mute=0"]);
}

#[tokio::test]
async fn failed_control_publishes_ctrlerr() {
    let mock = MockDevice::start().await;
    mock.set_status("/Skip", StatusCode::SERVICE_UNAVAILABLE, "");
    let (tx, mut rx) = broadcast::channel(4);
    let player = Player::new(Arc::new(mock.device()), tx);

    assert!(player.next().await.is_err());
    assert_eq!(rx.recv().await.unwrap().state, PlayerState::ControlError);
}
