// ABOUTME: Module registry: atomic load/unload/reload of command modules and the
// ABOUTME: immutable handler-table snapshots the router dispatches against.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::context::Handler;
use crate::gateway::EventKind;
use crate::permissions::PermissionLevel;

/// A command a module contributes: trigger, metadata, and the handler itself.
#[derive(Clone)]
pub struct CommandSpec {
    pub trigger: String,
    pub description: String,
    pub required_level: PermissionLevel,
    /// Per-command cooldown window in seconds; None uses the configured default
    pub cooldown_secs: Option<u64>,
    pub handler: Arc<dyn Handler>,
}

impl CommandSpec {
    pub fn new(
        trigger: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            description: description.into(),
            required_level: PermissionLevel::Everyone,
            cooldown_secs: None,
            handler,
        }
    }

    pub fn required(mut self, level: PermissionLevel) -> Self {
        self.required_level = level;
        self
    }

    pub fn cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }
}

/// An event listener a module contributes.
#[derive(Clone)]
pub struct ListenerSpec {
    pub kind: EventKind,
    pub handler: Arc<dyn Handler>,
}

/// A named, versioned bundle of listeners and commands. The sole extension
/// point: external code builds one of these and hands it to the registry.
#[derive(Clone)]
pub struct ModuleDef {
    pub name: String,
    pub version: String,
    pub listeners: Vec<ListenerSpec>,
    pub commands: Vec<CommandSpec>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            listeners: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn with_listener(mut self, kind: EventKind, handler: Arc<dyn Handler>) -> Self {
        self.listeners.push(ListenerSpec { kind, handler });
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module '{module}' collides on trigger(s): {}", .triggers.join(", "))]
    Collision {
        module: String,
        triggers: Vec<String>,
    },

    #[error("module not loaded: {0}")]
    NotLoaded(String),
}

/// A command entry in the active table, tagged with its contributing module.
#[derive(Clone)]
pub struct CommandEntry {
    pub module: String,
    pub spec: CommandSpec,
}

/// A listener entry in the active table.
#[derive(Clone)]
pub struct ListenerEntry {
    pub module: String,
    pub handler: Arc<dyn Handler>,
}

/// Immutable handler table. Lookups against one snapshot are always mutually
/// consistent; mutations build a fresh table and swap it in whole.
pub struct RegistryTable {
    modules: Vec<Arc<ModuleDef>>,
    commands: HashMap<String, CommandEntry>,
    listeners: HashMap<EventKind, Vec<ListenerEntry>>,
}

impl RegistryTable {
    fn empty() -> Self {
        Self {
            modules: Vec::new(),
            commands: HashMap::new(),
            listeners: HashMap::new(),
        }
    }

    /// Derive the lookup tables from the module list. Module order is load
    /// order, which fixes listener registration order.
    fn build(modules: Vec<Arc<ModuleDef>>) -> Self {
        let mut commands = HashMap::new();
        let mut listeners: HashMap<EventKind, Vec<ListenerEntry>> = HashMap::new();
        for module in &modules {
            for spec in &module.commands {
                commands.insert(
                    spec.trigger.clone(),
                    CommandEntry {
                        module: module.name.clone(),
                        spec: spec.clone(),
                    },
                );
            }
            for listener in &module.listeners {
                listeners
                    .entry(listener.kind.clone())
                    .or_default()
                    .push(ListenerEntry {
                        module: module.name.clone(),
                        handler: Arc::clone(&listener.handler),
                    });
            }
        }
        Self {
            modules,
            commands,
            listeners,
        }
    }

    pub fn lookup_command(&self, trigger: &str) -> Option<&CommandEntry> {
        self.commands.get(trigger)
    }

    /// All listeners for an event kind, in registration order.
    pub fn lookup_listeners(&self, kind: &EventKind) -> &[ListenerEntry] {
        self.listeners.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Loaded (name, version) pairs in load order.
    pub fn modules(&self) -> Vec<(String, String)> {
        self.modules
            .iter()
            .map(|m| (m.name.clone(), m.version.clone()))
            .collect()
    }

    /// All command entries, sorted by trigger (for help output).
    pub fn commands(&self) -> Vec<&CommandEntry> {
        let mut entries: Vec<_> = self.commands.values().collect();
        entries.sort_by(|a, b| a.spec.trigger.cmp(&b.spec.trigger));
        entries
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    /// Triggers of `module` that collide with another loaded module or repeat
    /// within `module` itself.
    fn collisions(&self, module: &ModuleDef, ignore: Option<&str>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut collisions = Vec::new();
        for spec in &module.commands {
            let taken = match self.commands.get(&spec.trigger) {
                Some(entry) => Some(entry.module.as_str()) != ignore,
                None => false,
            };
            if taken || !seen.insert(spec.trigger.clone()) {
                collisions.push(spec.trigger.clone());
            }
        }
        collisions
    }
}

/// The registry proper: a snapshot behind a lock. Readers clone the `Arc` and
/// never block writers; writers rebuild and swap atomically.
pub struct Registry {
    table: RwLock<Arc<RegistryTable>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(RegistryTable::empty())),
        }
    }

    /// Consistent point-in-time view for lookups.
    pub fn snapshot(&self) -> Arc<RegistryTable> {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Load a module. All of its listeners and commands become visible in one
    /// swap, or none do: a trigger collision fails the whole load.
    pub fn load(&self, module: ModuleDef) -> Result<(), RegistryError> {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        let collisions = guard.collisions(&module, None);
        if !collisions.is_empty() {
            return Err(RegistryError::Collision {
                module: module.name,
                triggers: collisions,
            });
        }
        let name = module.name.clone();
        let version = module.version.clone();
        let mut modules = guard.modules.clone();
        modules.push(Arc::new(module));
        *guard = Arc::new(RegistryTable::build(modules));
        tracing::info!(module = %name, version = %version, "module loaded");
        Ok(())
    }

    /// Unload a module, removing all of its contributions atomically.
    pub fn unload(&self, name: &str) -> Result<(), RegistryError> {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        let Some(index) = guard.position(name) else {
            return Err(RegistryError::NotLoaded(name.to_string()));
        };
        let mut modules = guard.modules.clone();
        modules.remove(index);
        *guard = Arc::new(RegistryTable::build(modules));
        tracing::info!(module = %name, "module unloaded");
        Ok(())
    }

    /// Replace a loaded module with a fresh instance, keeping its position in
    /// registration order. If the replacement fails validation the old module
    /// stays loaded untouched.
    pub fn reload(&self, module: ModuleDef) -> Result<(), RegistryError> {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        let Some(index) = guard.position(&module.name) else {
            return Err(RegistryError::NotLoaded(module.name));
        };
        let collisions = guard.collisions(&module, Some(module.name.as_str()));
        if !collisions.is_empty() {
            return Err(RegistryError::Collision {
                module: module.name,
                triggers: collisions,
            });
        }
        let name = module.name.clone();
        let version = module.version.clone();
        let mut modules = guard.modules.clone();
        modules[index] = Arc::new(module);
        *guard = Arc::new(RegistryTable::build(modules));
        tracing::info!(module = %name, version = %version, "module reloaded");
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.snapshot().position(name).is_some()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
