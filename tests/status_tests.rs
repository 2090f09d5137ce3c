// ABOUTME: Tests for the presence rotator: cycling order and ready-state gating.

use std::time::Duration;

use chirp::gateway::ClientFrame;
use chirp::session::ConnectionState;
use chirp::status::StatusRotator;
use tokio::sync::{mpsc, watch};

fn rotator(
    entries: &[&str],
    state: ConnectionState,
) -> (
    StatusRotator,
    mpsc::Receiver<ClientFrame>,
    watch::Sender<ConnectionState>,
    watch::Sender<bool>,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(state);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rotator = StatusRotator::new(
        entries.iter().map(|s| s.to_string()).collect(),
        Duration::from_millis(20),
        outbound_tx,
        state_rx,
        shutdown_rx,
    );
    (rotator, outbound_rx, state_tx, shutdown_tx)
}

async fn next_presence(rx: &mut mpsc::Receiver<ClientFrame>) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("presence expected")
        .expect("channel open");
    match frame {
        ClientFrame::Presence { text } => text,
        other => panic!("expected presence frame, got {other:?}"),
    }
}

#[tokio::test]
async fn statuses_cycle_in_order_and_wrap() {
    let (rotator, mut rx, _state_tx, _shutdown_tx) =
        rotator(&["one", "two"], ConnectionState::Ready);
    tokio::spawn(rotator.run());

    assert_eq!(next_presence(&mut rx).await, "one");
    assert_eq!(next_presence(&mut rx).await, "two");
    assert_eq!(next_presence(&mut rx).await, "one");
}

#[tokio::test]
async fn nothing_is_sent_until_the_session_is_ready() {
    let (rotator, mut rx, state_tx, _shutdown_tx) =
        rotator(&["one"], ConnectionState::Connecting);
    tokio::spawn(rotator.run());

    let nothing = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
    assert!(nothing.is_err());

    state_tx.send(ConnectionState::Ready).unwrap();
    assert_eq!(next_presence(&mut rx).await, "one");
}

#[tokio::test]
async fn empty_status_list_stays_silent() {
    let (rotator, mut rx, _state_tx, _shutdown_tx) = rotator(&[], ConnectionState::Ready);
    tokio::spawn(rotator.run());

    let nothing = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
    assert!(nothing.is_err());
}
