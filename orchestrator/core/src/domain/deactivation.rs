// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Deactivation Actions
//!
//! A deactivation action is one independent teardown step against one
//! external control plane (compute lifecycle, realtime sessions, operator
//! notification). Actions never see each other's outcome; the executor turns
//! every outcome, including timeouts and panics, into an [`ActionResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::control_plane::ControlPlaneError;
use crate::domain::node::Node;

/// Well-known action names used by the default registry.
pub const COMPUTE_TEARDOWN: &str = "compute_teardown";
pub const SESSION_REVOCATION: &str = "session_revocation";
pub const OPERATOR_NOTIFICATION: &str = "operator_notification";

/// One deprovisioning step. Implementations must be idempotent: invoking an
/// action twice for the same node is accepted by the target system.
#[async_trait]
pub trait DeactivationAction: Send + Sync {
    /// Stable snake_case name, used in audit detail and metrics labels
    fn name(&self) -> &str;

    /// Failures of best-effort actions are recorded but never degrade a run
    fn is_best_effort(&self) -> bool {
        false
    }

    async fn execute(&self, node: &Node) -> Result<ActionOutcome, ActionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The external mutation was issued and accepted
    Completed,
    /// Nothing to do; no external call was made
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("partially applied: {0}")]
    PartiallyApplied(String),
}

impl From<ControlPlaneError> for ActionError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::Transport(msg) => ActionError::Transport(msg),
            ControlPlaneError::Rejected { status, body } => ActionError::Rejected { status, body },
            ControlPlaneError::Unauthorized(body) => ActionError::Rejected { status: 401, body },
            ControlPlaneError::Malformed(msg) => ActionError::Malformed(msg),
            ControlPlaneError::NotConfigured(msg) => ActionError::NotConfigured(msg),
            partial @ ControlPlaneError::PartialFailure { .. } => ActionError::PartiallyApplied(partial.to_string()),
        }
    }
}

/// Outcome of one action within one run. Not persisted on its own; embedded
/// in the audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_name: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Succeeded without issuing an external call
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ActionResult {
    pub fn from_outcome(
        action_name: impl Into<String>,
        best_effort: bool,
        outcome: Result<ActionOutcome, ActionError>,
        elapsed_ms: u64,
    ) -> Self {
        let action_name = action_name.into();
        match outcome {
            Ok(ActionOutcome::Completed) => Self {
                action_name,
                succeeded: true,
                error: None,
                skipped: false,
                skip_reason: None,
                best_effort,
                elapsed_ms,
            },
            Ok(ActionOutcome::Skipped(reason)) => Self {
                action_name,
                succeeded: true,
                error: None,
                skipped: true,
                skip_reason: Some(reason),
                best_effort,
                elapsed_ms,
            },
            Err(e) => Self {
                action_name,
                succeeded: false,
                error: Some(e.to_string()),
                skipped: false,
                skip_reason: None,
                best_effort,
                elapsed_ms,
            },
        }
    }

    /// `"<name>: succeeded"`, `"<name>: succeeded (skipped: ...)"` or
    /// `"<name>: failed (<error>)"`.
    pub fn summary(&self) -> String {
        match (self.succeeded, &self.skip_reason, &self.error) {
            (true, Some(reason), _) => format!("{}: succeeded (skipped: {})", self.action_name, reason),
            (true, None, _) => format!("{}: succeeded", self.action_name),
            (false, _, Some(error)) => format!("{}: failed ({})", self.action_name, error),
            (false, _, None) => format!("{}: failed", self.action_name),
        }
    }

    /// A failure that counts against the run (best-effort failures do not)
    pub fn is_blocking_failure(&self) -> bool {
        !self.succeeded && !self.best_effort
    }
}

/// Logical per-node deactivation state. `Suspending` only exists in memory
/// while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationState {
    Active,
    Suspending,
    Suspended,
}
