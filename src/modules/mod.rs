// ABOUTME: Builtin modules shipped with the binary. Each submodule exposes a
// ABOUTME: `module()` constructor returning a ModuleDef for the registry.

pub mod general;
pub mod info;
pub mod welcome;

use chrono::{DateTime, Utc};

use crate::registry::ModuleDef;

/// The default module set, in load order.
pub fn builtin(started_at: DateTime<Utc>) -> Vec<ModuleDef> {
    vec![
        general::module(started_at),
        info::module(),
        welcome::module(),
    ]
}
