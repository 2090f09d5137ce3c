// ABOUTME: Permission levels for command gating and their resolution from config.
// ABOUTME: Ordered Everyone < Moderator < Admin < Owner; commands declare a required level.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered permission level. Comparison follows declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    #[default]
    Everyone,
    Moderator,
    Admin,
    Owner,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Everyone => write!(f, "everyone"),
            Self::Moderator => write!(f, "moderator"),
            Self::Admin => write!(f, "admin"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

/// Maps invoker ids to permission levels from the configured role lists.
#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    owners: HashSet<String>,
    admins: HashSet<String>,
    moderators: HashSet<String>,
}

impl PermissionResolver {
    pub fn new(owners: &[String], admins: &[String], moderators: &[String]) -> Self {
        Self {
            owners: owners.iter().cloned().collect(),
            admins: admins.iter().cloned().collect(),
            moderators: moderators.iter().cloned().collect(),
        }
    }

    /// Highest level the user qualifies for; unknown users are Everyone.
    pub fn resolve(&self, user_id: &str) -> PermissionLevel {
        if self.owners.contains(user_id) {
            PermissionLevel::Owner
        } else if self.admins.contains(user_id) {
            PermissionLevel::Admin
        } else if self.moderators.contains(user_id) {
            PermissionLevel::Moderator
        } else {
            PermissionLevel::Everyone
        }
    }
}
