// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::audit::AuditEntryId;
use crate::domain::deactivation::ActionResult;
use crate::domain::node::{NodeId, OperatorId};
use crate::domain::transition::IgnoreReason;

/// Lifecycle of a single kill switch run, published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KillSwitchEvent {
    RunStarted {
        node_id: NodeId,
        operator_id: OperatorId,
        transition_revision: u64,
        started_at: DateTime<Utc>,
    },
    ActionCompleted {
        node_id: NodeId,
        result: ActionResult,
        completed_at: DateTime<Utc>,
    },
    RunCompleted {
        node_id: NodeId,
        audit_entry_id: AuditEntryId,
        failed_actions: usize,
        completed_at: DateTime<Utc>,
    },
    /// The compliance record could not be written
    AuditPersistFailed {
        node_id: NodeId,
        transition_revision: u64,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    TransitionIgnored {
        node_id: NodeId,
        reason: IgnoredBecause,
        observed_at: DateTime<Utc>,
    },
}

impl KillSwitchEvent {
    pub fn node_id(&self) -> NodeId {
        match self {
            KillSwitchEvent::RunStarted { node_id, .. }
            | KillSwitchEvent::ActionCompleted { node_id, .. }
            | KillSwitchEvent::RunCompleted { node_id, .. }
            | KillSwitchEvent::AuditPersistFailed { node_id, .. }
            | KillSwitchEvent::TransitionIgnored { node_id, .. } => *node_id,
        }
    }
}

/// Why a suspension was observed but no run started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredBecause {
    NewlyCreated,
    AlreadySuspended,
    AlreadyAudited,
    RunInFlight,
}

impl IgnoredBecause {
    /// Detector reasons worth reporting; plain non-suspended writes are not
    pub fn from_reason(reason: IgnoreReason) -> Option<Self> {
        match reason {
            IgnoreReason::NewlyCreated => Some(IgnoredBecause::NewlyCreated),
            IgnoreReason::AlreadySuspended => Some(IgnoredBecause::AlreadySuspended),
            IgnoreReason::NotSuspended => None,
        }
    }
}
