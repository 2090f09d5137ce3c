// ABOUTME: Command executor: runs one resolved handler per invocation with cooldown
// ABOUTME: bookkeeping, a bounded time budget, and structured error capture.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::context::InvocationContext;
use crate::cooldown::{CooldownDecision, CooldownTracker};
use crate::metrics;
use crate::registry::{CommandEntry, ListenerEntry};

/// Dispatch failures, wrapped with invocation metadata for operator logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command '{trigger}' from {invoker} timed out after {budget:?}")]
    Timeout {
        trigger: String,
        invoker: String,
        budget: Duration,
    },

    #[error("command '{trigger}' from {invoker} failed: {source}")]
    HandlerFailed {
        trigger: String,
        invoker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler for '{trigger}' panicked")]
    HandlerPanicked { trigger: String },
}

/// Runs resolved handlers in isolation. Shared by all dispatches.
pub struct Executor {
    cooldowns: CooldownTracker,
    /// Per-invocation time budget
    budget: Duration,
    /// Cooldown window applied when a command declares none
    default_cooldown: Duration,
}

impl Executor {
    pub fn new(cooldowns: CooldownTracker, budget: Duration, default_cooldown: Duration) -> Self {
        Self {
            cooldowns,
            budget,
            default_cooldown,
        }
    }

    /// Run one command invocation end to end. Never returns an error to the
    /// caller: every failure mode is reported through the reply channel and
    /// the operator log, keeping the dispatcher alive.
    pub async fn execute(&self, entry: CommandEntry, ctx: InvocationContext) {
        let trigger = entry.spec.trigger.clone();
        let invoker = ctx.invoker.id.clone();
        let invocation_id = ctx.id.clone();
        let reply = ctx.reply.clone();

        // Cooldown is recorded before execution so a slow handler cannot be
        // re-entered under the same rate key.
        let window = entry
            .spec
            .cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_cooldown);
        if let CooldownDecision::Active { remaining } =
            self.cooldowns.try_acquire(&invoker, &trigger, window).await
        {
            let secs = remaining.as_secs_f64().max(0.1);
            let _ = reply
                .error(format!(
                    "'{trigger}' is on cooldown, try again in {secs:.1}s"
                ))
                .await;
            return;
        }

        metrics::record_command(&trigger);
        self.log_usage(&ctx).await;

        // The handler runs in its own task so a panic is contained and a
        // timed-out handler keeps running in the background; in-flight store
        // writes it started are allowed to settle.
        let handler = Arc::clone(&entry.spec.handler);
        let mut task = tokio::spawn(async move {
            let mut ctx = ctx;
            handler.run(&mut ctx).await
        });

        let outcome = tokio::time::timeout(self.budget, &mut task).await;
        let error = match outcome {
            Ok(Ok(Ok(()))) => return,
            Ok(Ok(Err(source))) => DispatchError::HandlerFailed {
                trigger: trigger.clone(),
                invoker: invoker.clone(),
                source,
            },
            Ok(Err(join_err)) => {
                // JoinError from anything but a panic means shutdown; stay quiet.
                if !join_err.is_panic() {
                    return;
                }
                DispatchError::HandlerPanicked {
                    trigger: trigger.clone(),
                }
            }
            Err(_) => {
                reply.mute();
                DispatchError::Timeout {
                    trigger: trigger.clone(),
                    invoker: invoker.clone(),
                    budget: self.budget,
                }
            }
        };

        let reason = match &error {
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::HandlerFailed { .. } => "error",
            DispatchError::HandlerPanicked { .. } => "panic",
        };
        metrics::record_handler_error(&trigger, reason);
        tracing::error!(
            invocation_id = %invocation_id,
            module = %entry.module,
            trigger = %trigger,
            invoker = %invoker,
            error = %error,
            "command invocation failed"
        );

        let user_message = match &error {
            DispatchError::Timeout { .. } => {
                format!("'{trigger}' took too long and was abandoned.")
            }
            _ => "Something went wrong while running that command.".to_string(),
        };
        // send_direct bypasses the mute set on timeout, so the one verdict
        // still reaches the user while the abandoned handler stays silent.
        let _ = reply
            .send_direct(crate::gateway::ReplyContent::Error(user_message))
            .await;
    }

    /// Run one listener invocation with the same isolation boundary but no
    /// time budget and no user-facing error reporting.
    pub async fn execute_listener(&self, entry: ListenerEntry, ctx: InvocationContext) {
        let kind = ctx.event.kind.clone();
        let invocation_id = ctx.id.clone();
        let handler = Arc::clone(&entry.handler);
        let task = tokio::spawn(async move {
            let mut ctx = ctx;
            handler.run(&mut ctx).await
        });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::record_handler_error(&kind.to_string(), "error");
                tracing::error!(
                    invocation_id = %invocation_id,
                    module = %entry.module,
                    kind = %kind,
                    error = %e,
                    "listener failed"
                );
            }
            Err(join_err) if join_err.is_panic() => {
                metrics::record_handler_error(&kind.to_string(), "panic");
                tracing::error!(
                    invocation_id = %invocation_id,
                    module = %entry.module,
                    kind = %kind,
                    "listener panicked"
                );
            }
            Err(_) => {}
        }
    }

    /// Best-effort usage accounting to the document store.
    async fn log_usage(&self, ctx: &InvocationContext) {
        let Ok(documents) = ctx.stores.document() else {
            return;
        };
        let record = serde_json::json!({
            "type": "command_used",
            "trigger": ctx.command.as_ref().map(|c| c.trigger.clone()),
            "user_id": ctx.invoker.id,
            "channel_id": ctx.event.channel_id,
            "timestamp": ctx.invoked_at.to_rfc3339(),
        });
        if let Err(e) = documents.append("events", record).await {
            tracing::debug!(error = %e, "usage event not recorded");
        }
        if let Ok(cache) = ctx.stores.cache() {
            if let Some(cmd) = &ctx.command {
                let _ = cache.incr(&format!("usage:{}", cmd.trigger), 1).await;
            }
        }
    }
}
