// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Permission lattice and per-anchor access descriptors.
//!
//! Levels are totally ordered: `NoAccess < Read < Connect < Write`. Every
//! operation on an anchor names the minimum level it needs and the
//! [`crate::application::AccessEvaluator`] compares the principal's effective
//! level against it.

use crate::domain::anchor::PrincipalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Access level. Ordering follows the numeric level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i8)]
pub enum Permission {
    #[default]
    NoAccess = -1,
    Read = 0,
    Connect = 1,
    Write = 2,
}

impl Permission {
    pub fn level(self) -> i8 {
        self as i8
    }

    pub fn from_level(level: i8) -> Option<Self> {
        match level {
            -1 => Some(Permission::NoAccess),
            0 => Some(Permission::Read),
            1 => Some(Permission::Connect),
            2 => Some(Permission::Write),
            _ => None,
        }
    }

    /// True when this level satisfies `required`.
    pub fn allows(self, required: Permission) -> bool {
        self >= required
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::NoAccess => "NO_ACCESS",
            Permission::Read => "READ",
            Permission::Connect => "CONNECT",
            Permission::Write => "WRITE",
        };
        write!(f, "{}", name)
    }
}

/// Default level plus explicit per-principal overrides.
///
/// Effective access is the highest applicable level, so an override can
/// raise access for its principal but never lower it below `default`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Access {
    pub default: Permission,
    #[serde(default)]
    pub overrides: BTreeMap<PrincipalId, Permission>,
}

impl Access {
    pub fn with_default(default: Permission) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn grant(&mut self, principal: PrincipalId, level: Permission) {
        self.overrides.insert(principal, level);
    }

    pub fn revoke(&mut self, principal: &PrincipalId) -> Option<Permission> {
        self.overrides.remove(principal)
    }

    pub fn override_for(&self, principal: &PrincipalId) -> Option<Permission> {
        self.overrides.get(principal).copied()
    }
}
