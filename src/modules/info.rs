// ABOUTME: Operator-facing introspection commands: loaded modules and usage stats.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::{Handler, InvocationContext};
use crate::permissions::PermissionLevel;
use crate::registry::{CommandSpec, ModuleDef};

const STATS_SAMPLE: usize = 200;

pub fn module() -> ModuleDef {
    ModuleDef::new("info", env!("CARGO_PKG_VERSION"))
        .with_command(
            CommandSpec::new("modules", "List loaded modules", Arc::new(Modules))
                .required(PermissionLevel::Moderator),
        )
        .with_command(
            CommandSpec::new("stats", "Recent command usage", Arc::new(Stats))
                .required(PermissionLevel::Moderator)
                .cooldown(10),
        )
}

struct Modules;

#[async_trait]
impl Handler for Modules {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let snapshot = ctx.registry.snapshot();
        let mut lines = vec!["Loaded modules:".to_string()];
        for (name, version) in snapshot.modules() {
            lines.push(format!("  {name} v{version}"));
        }
        ctx.reply.notice(lines.join("\n")).await
    }
}

struct Stats;

#[async_trait]
impl Handler for Stats {
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let documents = match ctx.stores.document() {
            Ok(d) => d,
            Err(_) => {
                return ctx
                    .reply
                    .error("Usage stats are unavailable right now.")
                    .await;
            }
        };

        let recent = documents.recent("events", STATS_SAMPLE).await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (_, doc) in &recent {
            if doc.get("type").and_then(|v| v.as_str()) != Some("command_used") {
                continue;
            }
            if let Some(trigger) = doc.get("trigger").and_then(|v| v.as_str()) {
                *counts.entry(trigger.to_string()).or_default() += 1;
            }
        }

        if counts.is_empty() {
            return ctx.reply.notice("No recorded command usage yet.").await;
        }

        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut lines = vec![format!("Command usage (last {} events):", recent.len())];
        for (trigger, count) in ranked.into_iter().take(10) {
            lines.push(format!("  {trigger}: {count}"));
        }
        ctx.reply.notice(lines.join("\n")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_gated_to_moderators() {
        let def = module();
        for spec in &def.commands {
            assert_eq!(spec.required_level, PermissionLevel::Moderator);
        }
    }
}
