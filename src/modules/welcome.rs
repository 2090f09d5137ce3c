// ABOUTME: Welcome module: greets joining members with a per-channel template
// ABOUTME: stored in the document store, configurable via the setwelcome command.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::{Handler, InvocationContext};
use crate::gateway::EventKind;
use crate::permissions::PermissionLevel;
use crate::registry::{CommandSpec, ModuleDef};

const COLLECTION: &str = "welcome";
const DEFAULT_TEMPLATE: &str = "Welcome, {user}!";

pub fn module() -> ModuleDef {
    ModuleDef::new("welcome", env!("CARGO_PKG_VERSION"))
        .with_listener(EventKind::MemberJoin, Arc::new(Greet))
        .with_command(
            CommandSpec::new(
                "setwelcome",
                "Set this channel's welcome message ({user} expands to the member), or 'off' to disable",
                Arc::new(SetWelcome),
            )
            .required(PermissionLevel::Admin),
        )
}

struct Greet;

#[async_trait]
impl Handler for Greet {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        // Greeting is best effort: a degraded store falls back to the default.
        let template = match ctx.stores.document() {
            Ok(documents) => {
                match documents.get(COLLECTION, &ctx.event.channel_id).await {
                    Ok(Some(doc)) => match doc.get("template").and_then(|v| v.as_str()) {
                        Some(t) => t.to_string(),
                        None => DEFAULT_TEMPLATE.to_string(),
                    },
                    Ok(None) => DEFAULT_TEMPLATE.to_string(),
                    Err(e) => {
                        tracing::debug!(error = %e, "welcome template lookup failed");
                        DEFAULT_TEMPLATE.to_string()
                    }
                }
            }
            Err(_) => DEFAULT_TEMPLATE.to_string(),
        };
        if template.is_empty() {
            return Ok(());
        }

        let name = ctx
            .event
            .sender
            .display_name
            .clone()
            .unwrap_or_else(|| ctx.event.sender.id.clone());
        ctx.reply.say(template.replace("{user}", &name)).await
    }
}

struct SetWelcome;

#[async_trait]
impl Handler for SetWelcome {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let raw = ctx
            .command
            .as_ref()
            .map(|c| c.raw_args.trim().to_string())
            .unwrap_or_default();
        if raw.is_empty() {
            return ctx
                .reply
                .error("Usage: setwelcome <template with {user}> | off")
                .await;
        }

        let documents = ctx.stores.document()?;
        let channel_id = ctx.event.channel_id.clone();

        if raw.eq_ignore_ascii_case("off") {
            documents
                .put(
                    COLLECTION,
                    &channel_id,
                    serde_json::json!({ "template": "" }),
                )
                .await?;
            return ctx.reply.notice("Welcome messages disabled here.").await;
        }

        documents
            .put(
                COLLECTION,
                &channel_id,
                serde_json::json!({ "template": raw }),
            )
            .await?;
        ctx.reply.notice("Welcome message updated.").await
    }
}
