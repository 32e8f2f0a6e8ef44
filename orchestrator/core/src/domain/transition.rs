// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Suspension Transition Detector
//!
//! Pure decision function run on the node write path: given one
//! [`NodeChange`], decide whether it is a transition into the suspended state
//! that warrants a kill switch run.
//!
//! Two policies are supported:
//!
//! - [`DetectionPolicy::Edge`] fires only on a `false -> true` flip of
//!   `suspended`. When the store could not supply the pre-write state, the
//!   node's own suspension marker (`suspended_at_revision == revision`) is
//!   used to recognise the edge.
//! - [`DetectionPolicy::Level`] fires on every non-create write that leaves
//!   the node suspended. Re-saves re-fire; the orchestrator's audit dedup
//!   keeps one entry per logical transition.
//!
//! Newly created records never fire: a node born suspended holds no
//! resources to tear down. Since it carries no suspension marker, later
//! re-saves do not fire under either policy until the node is reactivated
//! and suspended again.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::node::NodeChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPolicy {
    #[default]
    Edge,
    Level,
}

impl FromStr for DetectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "edge" => Ok(DetectionPolicy::Edge),
            "level" => Ok(DetectionPolicy::Level),
            other => Err(format!("unknown detection policy '{}', expected edge or level", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Run the kill switch for the suspension that began at `transition_revision`
    Orchestrate {
        transition_revision: u64,
        /// Level policy re-fire on an already-suspended node
        refire: bool,
    },
    Ignore(IgnoreReason),
}

impl TransitionDecision {
    pub fn should_orchestrate(&self) -> bool {
        matches!(self, TransitionDecision::Orchestrate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NewlyCreated,
    NotSuspended,
    AlreadySuspended,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionDetector {
    policy: DetectionPolicy,
}

impl TransitionDetector {
    pub fn new(policy: DetectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    pub fn evaluate(&self, change: &NodeChange) -> TransitionDecision {
        if change.created {
            return TransitionDecision::Ignore(IgnoreReason::NewlyCreated);
        }

        let after = &change.after;
        if !after.suspended {
            return TransitionDecision::Ignore(IgnoreReason::NotSuspended);
        }

        let marker = after.suspended_at_revision;
        let is_edge = match &change.before {
            Some(before) => !before.suspended,
            None => marker == Some(after.revision),
        };

        match (self.policy, is_edge, marker) {
            (_, true, _) => TransitionDecision::Orchestrate {
                transition_revision: marker.unwrap_or(after.revision),
                refire: false,
            },
            (DetectionPolicy::Level, false, Some(transition_revision)) => {
                TransitionDecision::Orchestrate { transition_revision, refire: true }
            }
            _ => TransitionDecision::Ignore(IgnoreReason::AlreadySuspended),
        }
    }
}
