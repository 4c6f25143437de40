// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime error taxonomy.
//!
//! Every failure surfaced to callers is a [`RuntimeError`]. Tier-level
//! failures arrive as [`crate::domain::repository::StoreError`] and are lifted
//! with the tier they came from.

use crate::domain::anchor::{AnchorId, PrincipalId};
use crate::domain::permission::Permission;
use crate::domain::repository::Tier;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Dangling reference: anchor {0} does not exist")]
    DanglingReference(AnchorId),

    #[error("Stale anchor: {0} has been deleted")]
    StaleAnchor(AnchorId),

    #[error("Permission denied: {principal} has {actual} on {anchor}, needs {required}")]
    PermissionDenied {
        principal: PrincipalId,
        anchor: AnchorId,
        required: Permission,
        actual: Permission,
    },

    #[error("Tier {tier} unavailable: {reason}")]
    TierUnavailable { tier: Tier, reason: String },

    #[error("Ability '{ability}' failed: {message}")]
    Ability { ability: String, message: String },

    #[error("Walker exceeded the visit limit of {0}")]
    VisitLimitExceeded(usize),

    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Lift an error raised inside an ability body.
    ///
    /// Runtime errors raised by graph operations inside the body keep their
    /// original variant; anything else becomes [`RuntimeError::Ability`].
    pub fn from_ability(ability: &str, err: anyhow::Error) -> Self {
        match err.downcast::<RuntimeError>() {
            Ok(runtime) => runtime,
            Err(other) => RuntimeError::Ability {
                ability: ability.to_string(),
                message: format!("{:#}", other),
            },
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RuntimeError::PermissionDenied { .. })
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}
