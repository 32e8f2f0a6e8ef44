// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Kill Switch Audit Entry
//!
//! Immutable compliance record proving a human-issued suspension was acted
//! on. Exactly one entry exists per logical suspension transition, keyed by
//! `(target_node_id, transition_revision)`, whether or not the teardown
//! actions succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::deactivation::ActionResult;
use crate::domain::node::{Node, NodeId, OperatorId};

/// Action label carried by every entry the orchestrator writes.
pub const KILL_SWITCH_ACTION: &str = "kill_switch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub action: String,
    pub target_node_id: NodeId,
    pub operator_id: OperatorId,
    /// Node revision at which the audited suspension began
    pub transition_revision: u64,
    pub timestamp: DateTime<Utc>,
    /// Human-readable reconstruction of the run
    pub detail: String,
    #[serde(default)]
    pub results: Vec<ActionResult>,
}

impl AuditEntry {
    pub fn kill_switch(node: &Node, transition_revision: u64, results: Vec<ActionResult>) -> Self {
        let detail = Self::render_detail(node, transition_revision, &results);
        Self {
            id: AuditEntryId::new(),
            action: KILL_SWITCH_ACTION.to_string(),
            target_node_id: node.id,
            operator_id: node.owner_id.clone(),
            transition_revision,
            timestamp: Utc::now(),
            detail,
            results,
        }
    }

    fn render_detail(node: &Node, transition_revision: u64, results: &[ActionResult]) -> String {
        let compute = node.compute_reference().unwrap_or("none");
        let mut detail = format!(
            "Operator {} suspended node {} '{}' (revision {}, compute reference {}).",
            node.owner_id, node.id, node.name, transition_revision, compute
        );

        if results.is_empty() {
            detail.push_str(" No deactivation actions registered.");
            return detail;
        }

        let summaries: Vec<String> = results.iter().map(ActionResult::summary).collect();
        detail.push(' ');
        detail.push_str(&summaries.join("; "));
        detail
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }
}
