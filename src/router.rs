// ABOUTME: Event router: classifies inbound gateway events and dispatches them to
// ABOUTME: registered handlers with per-invocation isolation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::commands::{parse_message, ParseResult};
use crate::context::{InvocationContext, ReplySender};
use crate::executor::Executor;
use crate::gateway::{ClientFrame, EventKind, GatewayEvent};
use crate::metrics;
use crate::permissions::PermissionResolver;
use crate::registry::Registry;
use crate::store::StoreManager;

const LISTENER_LANE_DEPTH: usize = 64;

/// Fans the session controller's event stream out to handlers.
///
/// Commands get one spawned task each and run fully concurrently. Listener
/// delivery goes through one lane per event kind, so listeners observe events
/// of a kind in the order the session controller emitted them while distinct
/// kinds and commands proceed in parallel.
pub struct Router {
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    permissions: Arc<PermissionResolver>,
    stores: Arc<StoreManager>,
    outbound: mpsc::Sender<ClientFrame>,
    prefix: String,
    listener_lanes: HashMap<EventKind, mpsc::Sender<GatewayEvent>>,
}

impl Router {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<Executor>,
        permissions: Arc<PermissionResolver>,
        stores: Arc<StoreManager>,
        outbound: mpsc::Sender<ClientFrame>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            permissions,
            stores,
            outbound,
            prefix: prefix.into(),
            listener_lanes: HashMap::new(),
        }
    }

    /// Consume the event stream until the session controller drops it.
    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) {
        tracing::info!(prefix = %self.prefix, "router started");
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        tracing::info!("event stream closed, router stopping");
    }

    async fn dispatch(&mut self, event: GatewayEvent) {
        metrics::record_event(&event.kind.to_string());

        if event.kind == EventKind::Message {
            match parse_message(&event.body, &self.prefix) {
                ParseResult::Command(cmd) => {
                    self.dispatch_command(event, cmd).await;
                    return;
                }
                ParseResult::Ignore => return,
                ParseResult::Message(_) => {}
            }
        }

        self.dispatch_listeners(event).await;
    }

    async fn dispatch_command(&self, event: GatewayEvent, cmd: crate::commands::Command) {
        let snapshot = self.registry.snapshot();
        let Some(entry) = snapshot.lookup_command(&cmd.trigger) else {
            // Unknown triggers are not an error by chat-bot convention.
            tracing::debug!(trigger = %cmd.trigger, "no handler for trigger, ignoring");
            return;
        };
        let entry = entry.clone();

        let reply = ReplySender::new(event.channel_id.clone(), self.outbound.clone());
        let level = self.permissions.resolve(&event.sender.id);
        if level < entry.spec.required_level {
            tracing::debug!(
                trigger = %cmd.trigger,
                invoker = %event.sender.id,
                held = %level,
                required = %entry.spec.required_level,
                "permission denied"
            );
            let _ = reply
                .error(format!(
                    "You need {} permission to use '{}'.",
                    entry.spec.required_level, cmd.trigger
                ))
                .await;
            return;
        }

        let ctx = InvocationContext::new(
            event,
            level,
            Some(cmd),
            Arc::clone(&self.stores),
            Arc::clone(&self.registry),
            reply,
        );

        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            executor.execute(entry, ctx).await;
        });
    }

    async fn dispatch_listeners(&mut self, event: GatewayEvent) {
        // Lane lookup must not consult the registry: a lane is per kind for
        // the process lifetime, and each delivery takes its own snapshot.
        let kind = event.kind.clone();
        let lane = self
            .listener_lanes
            .entry(kind.clone())
            .or_insert_with(|| {
                Self::spawn_listener_lane(
                    kind,
                    Arc::clone(&self.registry),
                    Arc::clone(&self.executor),
                    Arc::clone(&self.permissions),
                    Arc::clone(&self.stores),
                    self.outbound.clone(),
                )
            });
        if lane.send(event).await.is_err() {
            tracing::warn!("listener lane closed, event dropped");
        }
    }

    fn spawn_listener_lane(
        kind: EventKind,
        registry: Arc<Registry>,
        executor: Arc<Executor>,
        permissions: Arc<PermissionResolver>,
        stores: Arc<StoreManager>,
        outbound: mpsc::Sender<ClientFrame>,
    ) -> mpsc::Sender<GatewayEvent> {
        let (tx, mut rx) = mpsc::channel::<GatewayEvent>(LISTENER_LANE_DEPTH);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let snapshot = registry.snapshot();
                for entry in snapshot.lookup_listeners(&kind) {
                    let reply = ReplySender::new(event.channel_id.clone(), outbound.clone());
                    let level = permissions.resolve(&event.sender.id);
                    let ctx = InvocationContext::new(
                        event.clone(),
                        level,
                        None,
                        Arc::clone(&stores),
                        Arc::clone(&registry),
                        reply,
                    );
                    // Sequential within the lane keeps registration order per
                    // event and emission order per kind.
                    executor.execute_listener(entry.clone(), ctx).await;
                }
            }
        });
        tx
    }
}
