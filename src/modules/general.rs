// ABOUTME: General-purpose commands every deployment wants: ping, help, uptime.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::{Handler, InvocationContext};
use crate::registry::{CommandSpec, ModuleDef};

pub fn module(started_at: DateTime<Utc>) -> ModuleDef {
    ModuleDef::new("general", env!("CARGO_PKG_VERSION"))
        .with_command(CommandSpec::new("ping", "Check that the bot is alive", Arc::new(Ping)).cooldown(3))
        .with_command(CommandSpec::new(
            "help",
            "List available commands",
            Arc::new(Help),
        ))
        .with_command(CommandSpec::new(
            "uptime",
            "How long the bot has been running",
            Arc::new(Uptime { started_at }),
        ))
}

struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        ctx.reply.say("Pong!").await
    }
}

struct Help;

#[async_trait]
impl Handler for Help {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let snapshot = ctx.registry.snapshot();
        let mut lines = vec!["Available commands:".to_string()];
        for entry in snapshot.commands() {
            // Only show what the invoker can actually run.
            if entry.spec.required_level > ctx.level {
                continue;
            }
            lines.push(format!("  {} - {}", entry.spec.trigger, entry.spec.description));
        }
        ctx.reply.notice(lines.join("\n")).await
    }
}

struct Uptime {
    started_at: DateTime<Utc>,
}

#[async_trait]
impl Handler for Uptime {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let elapsed = Utc::now() - self.started_at;
        let days = elapsed.num_days();
        let hours = elapsed.num_hours() % 24;
        let minutes = elapsed.num_minutes() % 60;
        let text = if days > 0 {
            format!("Up for {days}d {hours}h {minutes}m")
        } else if hours > 0 {
            format!("Up for {hours}h {minutes}m")
        } else {
            format!("Up for {minutes}m")
        };
        ctx.reply.say(text).await
    }
}
