// ABOUTME: Presence rotator: cycles through configured status lines while the
// ABOUTME: session is ready, pausing across disconnects.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::gateway::ClientFrame;
use crate::session::ConnectionState;

/// Rotates the advertised presence text on a fixed cadence.
///
/// Presence updates are cosmetic, so every send is best effort and a
/// disconnect simply pauses the rotation until the session is ready again.
pub struct StatusRotator {
    entries: Vec<String>,
    interval: Duration,
    outbound: mpsc::Sender<ClientFrame>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl StatusRotator {
    pub fn new(
        entries: Vec<String>,
        interval: Duration,
        outbound: mpsc::Sender<ClientFrame>,
        state: watch::Receiver<ConnectionState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            entries,
            interval,
            outbound,
            state,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if self.entries.is_empty() {
            tracing::debug!("no status entries configured, rotator idle");
            return;
        }
        tracing::info!(entries = self.entries.len(), "status rotator started");

        let mut index = 0usize;
        loop {
            if self.wait_until_ready().await {
                return;
            }

            let text = self.entries[index % self.entries.len()].clone();
            index = index.wrapping_add(1);
            if self
                .outbound
                .send(ClientFrame::Presence { text: text.clone() })
                .await
                .is_err()
            {
                tracing::debug!("outbound channel closed, rotator stopping");
                return;
            }
            tracing::debug!(status = %text, "presence updated");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Block until the session reports Ready. Returns true on shutdown.
    async fn wait_until_ready(&mut self) -> bool {
        loop {
            if *self.shutdown.borrow() {
                return true;
            }
            match *self.state.borrow() {
                ConnectionState::Ready => return false,
                ConnectionState::Closed | ConnectionState::Failed => return true,
                _ => {}
            }
            tokio::select! {
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
                _ = self.shutdown.changed() => {}
            }
        }
    }
}
