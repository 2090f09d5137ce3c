// ABOUTME: Session controller: owns the gateway connection state machine with
// ABOUTME: identify/resume, heartbeats, sequence tracking, and jittered reconnect.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::backoff::{Backoff, BackoffConfig};
use crate::gateway::{
    ClientFrame, CloseReason, GatewayConnection, GatewayEvent, GatewayFrame, GatewayTransport,
};
use crate::metrics;

const EVENT_CHANNEL_DEPTH: usize = 256;
const OUTBOUND_CHANNEL_DEPTH: usize = 256;

/// Connection lifecycle states. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Identifying,
    Resuming,
    Ready,
    Closed,
    Failed,
}

/// Non-retryable session failures. Surfacing one of these ends the process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication rejected by gateway: {0}")]
    AuthRejected(String),

    #[error("gateway protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway credential sent in the identify payload
    pub token: String,
    pub backoff: BackoffConfig,
    /// Consecutive failed connection attempts before giving up; 0 = retry forever
    pub max_reconnect_attempts: u32,
    /// How long to wait for handshake frames before retrying the connection
    pub hello_timeout: Duration,
}

/// One logical gateway session. Owned and mutated only by the controller.
#[derive(Debug)]
struct Session {
    resume_token: Option<String>,
    /// Highest accepted event sequence; reset only on a fresh identify
    seq: u64,
    /// Whether the last disconnect left the session resumable
    resumable: bool,
    heartbeat_interval: Duration,
}

impl Session {
    fn fresh() -> Self {
        Self {
            resume_token: None,
            seq: 0,
            resumable: false,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Channels the rest of the process uses to talk to the session.
pub struct SessionChannels {
    /// Decoded events, in gateway order
    pub events: mpsc::Receiver<GatewayEvent>,
    /// Replies and presence updates toward the gateway
    pub outbound: mpsc::Sender<ClientFrame>,
    /// Observable connection state
    pub state: watch::Receiver<ConnectionState>,
}

enum ReadyExit {
    Disconnected { resumable: bool },
    Shutdown,
    Fatal(SessionError),
}

enum Establish {
    Ready,
    Retry,
    Fatal(SessionError),
}

/// Owns the gateway connection for the life of the process.
pub struct SessionController {
    transport: Arc<dyn GatewayTransport>,
    config: SessionConfig,
    session: Session,
    events_tx: mpsc::Sender<GatewayEvent>,
    outbound_rx: mpsc::Receiver<ClientFrame>,
    // Keeps outbound_rx from ever yielding None mid-session
    _outbound_keepalive: mpsc::Sender<ClientFrame>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        config: SessionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, SessionChannels) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_DEPTH);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let controller = Self {
            transport,
            config,
            session: Session::fresh(),
            events_tx,
            outbound_rx,
            _outbound_keepalive: outbound_tx.clone(),
            state_tx,
            shutdown,
        };
        let channels = SessionChannels {
            events: events_rx,
            outbound: outbound_tx,
            state: state_rx,
        };
        (controller, channels)
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!(?state, "session state");
        self.state_tx.send_replace(state);
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drive the connect/ready/reconnect loop until shutdown (`Ok`) or a
    /// fatal error (`Err`). The caller is expected to terminate on `Err`.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            if self.shutting_down() {
                self.set_state(ConnectionState::Closed);
                return Ok(());
            }

            if backoff.attempt() > 0 {
                metrics::record_reconnect();
                let max = self.config.max_reconnect_attempts;
                if max > 0 && backoff.attempt() >= max {
                    self.set_state(ConnectionState::Failed);
                    return Err(SessionError::RetriesExhausted(backoff.attempt()));
                }
            }

            self.set_state(ConnectionState::Connecting);
            let mut conn = match self.transport.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "gateway connect failed, backing off"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    if self.sleep_or_shutdown(delay).await {
                        self.set_state(ConnectionState::Closed);
                        return Ok(());
                    }
                    continue;
                }
            };

            match self.establish(&mut conn).await {
                Establish::Ready => {}
                Establish::Retry => {
                    let delay = backoff.next_delay();
                    self.set_state(ConnectionState::Disconnected);
                    if self.sleep_or_shutdown(delay).await {
                        self.set_state(ConnectionState::Closed);
                        return Ok(());
                    }
                    continue;
                }
                Establish::Fatal(e) => {
                    self.set_state(ConnectionState::Failed);
                    return Err(e);
                }
            }

            self.set_state(ConnectionState::Ready);
            backoff.reset();
            tracing::info!(seq = self.session.seq, "gateway session ready");

            match self.run_ready(&mut conn).await {
                ReadyExit::Shutdown => {
                    let _ = conn.sink.send(ClientFrame::Close).await;
                    self.set_state(ConnectionState::Closed);
                    tracing::info!("session closed");
                    return Ok(());
                }
                ReadyExit::Fatal(e) => {
                    self.set_state(ConnectionState::Failed);
                    return Err(e);
                }
                ReadyExit::Disconnected { resumable } => {
                    metrics::record_reconnect();
                    self.session.resumable = resumable;
                    if !resumable {
                        self.session.resume_token = None;
                    }
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!(resumable, "gateway disconnected");
                }
            }
        }
    }

    /// Sleep for `delay`, returning true if shutdown was requested meanwhile.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.changed() => self.shutting_down(),
        }
    }

    /// Handshake on a fresh connection: wait for Hello, then resume if the
    /// session allows it, otherwise identify from scratch.
    async fn establish(&mut self, conn: &mut GatewayConnection) -> Establish {
        let hello = tokio::time::timeout(self.config.hello_timeout, conn.frames.recv()).await;
        match hello {
            Ok(Some(GatewayFrame::Hello {
                heartbeat_interval_ms,
            })) => {
                self.session.heartbeat_interval = Duration::from_millis(heartbeat_interval_ms);
            }
            Ok(Some(GatewayFrame::Close { reason })) => return self.on_close(reason),
            Ok(Some(other)) => {
                tracing::warn!(frame = ?other, "expected Hello, got another frame");
                return Establish::Retry;
            }
            Ok(None) | Err(_) => return Establish::Retry,
        }

        if self.session.resumable {
            if let Some(token) = self.session.resume_token.clone() {
                match self.try_resume(conn, token).await {
                    // InvalidSession falls through to a fresh identify below
                    Establish::Retry if self.session.resume_token.is_none() => {}
                    outcome => return outcome,
                }
            }
        }

        self.identify(conn).await
    }

    /// Attempt to resume. On success the stored sequence is kept, so replayed
    /// events at or below it are discarded in the ready loop.
    async fn try_resume(&mut self, conn: &mut GatewayConnection, token: String) -> Establish {
        self.set_state(ConnectionState::Resuming);
        tracing::info!(seq = self.session.seq, "resuming gateway session");
        if conn
            .sink
            .send(ClientFrame::Resume {
                token,
                seq: self.session.seq,
            })
            .await
            .is_err()
        {
            return Establish::Retry;
        }

        loop {
            let frame = tokio::time::timeout(self.config.hello_timeout, conn.frames.recv()).await;
            match frame {
                Ok(Some(GatewayFrame::Resumed)) => {
                    tracing::info!(seq = self.session.seq, "session resumed");
                    return Establish::Ready;
                }
                Ok(Some(GatewayFrame::Event(frame))) => {
                    // Replay may start before the Resumed marker arrives
                    self.accept_event(frame).await;
                }
                Ok(Some(GatewayFrame::InvalidSession { resumable })) => {
                    tracing::warn!(resumable, "resume rejected");
                    if !resumable {
                        self.session.resume_token = None;
                    }
                    return Establish::Retry;
                }
                Ok(Some(GatewayFrame::Close { reason })) => return self.on_close(reason),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Establish::Retry,
            }
        }
    }

    /// Fresh identify: resets the sequence and stores the new resume token.
    async fn identify(&mut self, conn: &mut GatewayConnection) -> Establish {
        self.set_state(ConnectionState::Identifying);
        if conn
            .sink
            .send(ClientFrame::Identify {
                token: self.config.token.clone(),
            })
            .await
            .is_err()
        {
            return Establish::Retry;
        }

        loop {
            let frame = tokio::time::timeout(self.config.hello_timeout, conn.frames.recv()).await;
            match frame {
                Ok(Some(GatewayFrame::Ready { resume_token, seq })) => {
                    self.session.resume_token = Some(resume_token);
                    self.session.seq = seq;
                    self.session.resumable = true;
                    return Establish::Ready;
                }
                Ok(Some(GatewayFrame::InvalidSession { .. })) => return Establish::Retry,
                Ok(Some(GatewayFrame::Close { reason })) => return self.on_close(reason),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Establish::Retry,
            }
        }
    }

    fn on_close(&mut self, reason: CloseReason) -> Establish {
        match reason {
            CloseReason::AuthFailed { detail } => {
                Establish::Fatal(SessionError::AuthRejected(detail))
            }
            CloseReason::ProtocolMismatch { detail } => {
                Establish::Fatal(SessionError::ProtocolMismatch(detail))
            }
            reason => {
                if !reason.is_resumable() {
                    self.session.resume_token = None;
                    self.session.resumable = false;
                }
                tracing::warn!(%reason, "gateway closed during handshake");
                Establish::Retry
            }
        }
    }

    /// Accept an event frame if its sequence advances the session; duplicates
    /// from resume replay are dropped here, not by handlers.
    async fn accept_event(&mut self, frame: crate::gateway::EventFrame) {
        if frame.seq <= self.session.seq {
            tracing::debug!(
                seq = frame.seq,
                current = self.session.seq,
                "discarding replayed event"
            );
            return;
        }
        self.session.seq = frame.seq;
        if self.events_tx.send(frame.event).await.is_err() {
            tracing::warn!("event channel closed, dropping event");
        }
    }

    /// The Ready-state loop: pump frames, heartbeat on the server's cadence,
    /// forward outbound traffic. A missed heartbeat ack (two intervals
    /// without a response) forces a resumable disconnect.
    async fn run_ready(&mut self, conn: &mut GatewayConnection) -> ReadyExit {
        let interval = self.session.heartbeat_interval;
        let mut heartbeat = tokio::time::interval(interval);
        let mut last_ack = Instant::now();
        let sink = conn.sink.clone();
        let frames = &mut conn.frames;
        let outbound_rx = &mut self.outbound_rx;
        let mut shutdown = self.shutdown.clone();
        let events_tx = self.events_tx.clone();
        let session = &mut self.session;

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        None => return ReadyExit::Disconnected { resumable: true },
                        Some(GatewayFrame::Event(frame)) => {
                            if frame.seq <= session.seq {
                                tracing::debug!(seq = frame.seq, "discarding replayed event");
                                continue;
                            }
                            session.seq = frame.seq;
                            if events_tx.send(frame.event).await.is_err() {
                                tracing::warn!("event channel closed, dropping event");
                            }
                        }
                        Some(GatewayFrame::HeartbeatAck) => {
                            last_ack = Instant::now();
                        }
                        Some(GatewayFrame::InvalidSession { resumable }) => {
                            return ReadyExit::Disconnected { resumable };
                        }
                        Some(GatewayFrame::Close { reason }) => {
                            return match reason {
                                CloseReason::AuthFailed { detail } => {
                                    ReadyExit::Fatal(SessionError::AuthRejected(detail))
                                }
                                CloseReason::ProtocolMismatch { detail } => {
                                    ReadyExit::Fatal(SessionError::ProtocolMismatch(detail))
                                }
                                reason => ReadyExit::Disconnected {
                                    resumable: reason.is_resumable(),
                                },
                            };
                        }
                        Some(other) => {
                            tracing::debug!(frame = ?other, "unexpected frame while ready");
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if sink.send(ClientFrame::Heartbeat { seq: session.seq }).await.is_err() {
                        return ReadyExit::Disconnected { resumable: true };
                    }
                }
                _ = tokio::time::sleep_until(last_ack + interval * 2) => {
                    tracing::warn!(
                        since_ack_ms = last_ack.elapsed().as_millis() as u64,
                        "heartbeat ack missed, dropping connection"
                    );
                    return ReadyExit::Disconnected { resumable: true };
                }
                frame = outbound_rx.recv() => {
                    // Keepalive sender means None is unreachable in practice
                    if let Some(frame) = frame {
                        if sink.send(frame).await.is_err() {
                            return ReadyExit::Disconnected { resumable: true };
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return ReadyExit::Shutdown;
                    }
                }
            }
        }
    }
}
