// ABOUTME: Per-invocation context and reply channel handed to every handler.
// ABOUTME: Dependencies are injected explicitly; no handler touches global state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::commands::Command;
use crate::gateway::{ChatUser, ClientFrame, GatewayEvent, ReplyContent};
use crate::permissions::PermissionLevel;
use crate::registry::Registry;
use crate::store::StoreManager;

/// A command or listener body. Implementations live in modules.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()>;
}

/// Outbound reply handle bound to the originating channel.
///
/// Cloned senders share a mute flag: once the executor gives up on an
/// invocation (timeout), late output from the abandoned handler is dropped
/// instead of reaching the user.
#[derive(Clone)]
pub struct ReplySender {
    channel_id: String,
    tx: mpsc::Sender<ClientFrame>,
    muted: Arc<AtomicBool>,
}

impl ReplySender {
    pub fn new(channel_id: impl Into<String>, tx: mpsc::Sender<ClientFrame>) -> Self {
        Self {
            channel_id: channel_id.into(),
            tx,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Stop forwarding further output from this invocation.
    pub fn mute(&self) {
        self.muted.store(true, Ordering::Release);
    }

    pub async fn say(&self, text: impl Into<String>) -> Result<()> {
        self.send(ReplyContent::Text(text.into())).await
    }

    pub async fn notice(&self, text: impl Into<String>) -> Result<()> {
        self.send(ReplyContent::Notice(text.into())).await
    }

    pub async fn error(&self, text: impl Into<String>) -> Result<()> {
        self.send(ReplyContent::Error(text.into())).await
    }

    async fn send(&self, content: ReplyContent) -> Result<()> {
        if self.muted.load(Ordering::Acquire) {
            tracing::debug!(channel_id = %self.channel_id, "dropping reply from abandoned invocation");
            return Ok(());
        }
        self.send_direct(content).await
    }

    /// Bypass the mute flag. The executor uses this for its own verdict after
    /// muting an abandoned handler, so exactly one timeout notice gets out.
    pub(crate) async fn send_direct(&self, content: ReplyContent) -> Result<()> {
        self.tx
            .send(ClientFrame::Reply {
                channel_id: self.channel_id.clone(),
                content,
            })
            .await
            .map_err(|_| anyhow::anyhow!("outbound channel closed"))
    }
}

/// Everything one dispatch needs. Created per event, never shared across
/// invocations, dropped when the handler finishes.
pub struct InvocationContext {
    /// Unique invocation id for operator logs
    pub id: String,
    pub event: GatewayEvent,
    pub invoker: ChatUser,
    pub level: PermissionLevel,
    /// Parsed command, present only for command invocations
    pub command: Option<Command>,
    pub stores: Arc<StoreManager>,
    pub registry: Arc<Registry>,
    pub reply: ReplySender,
    pub invoked_at: DateTime<Utc>,
}

impl InvocationContext {
    pub fn new(
        event: GatewayEvent,
        level: PermissionLevel,
        command: Option<Command>,
        stores: Arc<StoreManager>,
        registry: Arc<Registry>,
        reply: ReplySender,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invoker: event.sender.clone(),
            event,
            level,
            command,
            stores,
            registry,
            reply,
            invoked_at: Utc::now(),
        }
    }
}
