// ABOUTME: Tests for the event router: command dispatch, permission gating,
// ABOUTME: listener fan-out, and per-kind ordering guarantees.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chirp::backoff::BackoffConfig;
use chirp::context::{Handler, InvocationContext};
use chirp::cooldown::CooldownTracker;
use chirp::executor::Executor;
use chirp::gateway::{ChatUser, ClientFrame, EventKind, GatewayEvent, ReplyContent};
use chirp::permissions::{PermissionLevel, PermissionResolver};
use chirp::registry::{CommandSpec, ModuleDef, Registry};
use chirp::router::Router;
use chirp::store::StoreManager;
use chrono::Utc;
use tokio::sync::mpsc;

struct EchoArgs;

#[async_trait]
impl Handler for EchoArgs {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let args = ctx
            .command
            .as_ref()
            .map(|c| c.raw_args.clone())
            .unwrap_or_default();
        ctx.reply.say(args).await
    }
}

struct Recorder(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Handler for Recorder {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        self.0.lock().unwrap().push(ctx.event.id.clone());
        Ok(())
    }
}

struct Harness {
    events: mpsc::Sender<GatewayEvent>,
    outbound: mpsc::Receiver<ClientFrame>,
    seen: Arc<Mutex<Vec<String>>>,
}

fn harness(owners: &[&str]) -> Harness {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();

    let registry = Arc::new(Registry::new());
    registry
        .load(
            ModuleDef::new("test", "1.0.0")
                .with_command(CommandSpec::new("echo", "echo args", Arc::new(EchoArgs)))
                .with_command(
                    CommandSpec::new("promote", "admin only", Arc::new(EchoArgs))
                        .required(PermissionLevel::Admin),
                )
                .with_listener(EventKind::MemberJoin, Arc::new(Recorder(Arc::clone(&seen))))
                .with_listener(EventKind::Message, Arc::new(Recorder(Arc::clone(&seen)))),
        )
        .unwrap();

    let stores = StoreManager::with_stores(
        None,
        None,
        Duration::from_secs(60),
        BackoffConfig::default(),
    );
    let executor = Arc::new(Executor::new(
        CooldownTracker::new(Arc::clone(&stores)),
        Duration::from_secs(5),
        Duration::ZERO,
    ));
    let owners: Vec<String> = owners.iter().map(|s| s.to_string()).collect();
    let permissions = Arc::new(PermissionResolver::new(&owners, &[], &[]));

    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(64);
    let router = Router::new(registry, executor, permissions, stores, outbound_tx, "!");
    tokio::spawn(router.run(events_rx));

    Harness {
        events: events_tx,
        outbound: outbound_rx,
        seen,
    }
}

fn message(id: &str, sender: &str, body: &str) -> GatewayEvent {
    GatewayEvent {
        id: id.to_string(),
        kind: EventKind::Message,
        channel_id: "c1".to_string(),
        sender: ChatUser::new(sender),
        body: body.to_string(),
        payload: serde_json::Value::Null,
        timestamp: Utc::now(),
    }
}

fn member_join(id: &str, sender: &str) -> GatewayEvent {
    GatewayEvent {
        id: id.to_string(),
        kind: EventKind::MemberJoin,
        channel_id: "c1".to_string(),
        sender: ChatUser::new(sender),
        body: String::new(),
        payload: serde_json::Value::Null,
        timestamp: Utc::now(),
    }
}

async fn next_reply(rx: &mut mpsc::Receiver<ClientFrame>) -> ReplyContent {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("reply expected")
        .expect("channel open");
    match frame {
        ClientFrame::Reply { content, .. } => content,
        other => panic!("expected reply frame, got {other:?}"),
    }
}

#[tokio::test]
async fn prefixed_message_dispatches_the_command() {
    let mut h = harness(&[]);
    h.events
        .send(message("e1", "alice", "!echo hello world"))
        .await
        .unwrap();

    assert_eq!(
        next_reply(&mut h.outbound).await,
        ReplyContent::Text("hello world".into())
    );
}

#[tokio::test]
async fn unknown_trigger_is_silently_ignored() {
    let mut h = harness(&[]);
    h.events
        .send(message("e1", "alice", "!nosuchcommand"))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(100), h.outbound.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn command_messages_do_not_reach_listeners() {
    let h = harness(&[]);
    h.events
        .send(message("cmd", "alice", "!echo hi"))
        .await
        .unwrap();
    h.events
        .send(message("chat", "alice", "just chatting"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = h.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["chat"]);
}

#[tokio::test]
async fn insufficient_permission_yields_an_error_reply() {
    let mut h = harness(&[]);
    h.events
        .send(message("e1", "alice", "!promote bob"))
        .await
        .unwrap();

    let ReplyContent::Error(text) = next_reply(&mut h.outbound).await else {
        panic!("expected permission error");
    };
    assert!(text.contains("permission"));
}

#[tokio::test]
async fn owners_clear_the_permission_gate() {
    let mut h = harness(&["alice"]);
    h.events
        .send(message("e1", "alice", "!promote bob"))
        .await
        .unwrap();

    assert_eq!(
        next_reply(&mut h.outbound).await,
        ReplyContent::Text("bob".into())
    );
}

#[tokio::test]
async fn listeners_observe_same_kind_events_in_emission_order() {
    let h = harness(&[]);
    for n in 1..=5 {
        h.events
            .send(member_join(&format!("j{n}"), "newcomer"))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    let seen = h.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["j1", "j2", "j3", "j4", "j5"]);
}

#[tokio::test]
async fn non_message_kinds_never_parse_as_commands() {
    let mut h = harness(&[]);
    let mut join = member_join("j1", "alice");
    join.body = "!echo should not run".to_string();
    h.events.send(join).await.unwrap();

    // Delivered to the MemberJoin listener, not the command path.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.seen.lock().unwrap().clone(), vec!["j1"]);
    assert!(h.outbound.try_recv().is_err());
}
