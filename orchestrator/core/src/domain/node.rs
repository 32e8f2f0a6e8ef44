// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Managed Node Aggregate
//!
//! A node is one managed compute + identity unit owned by an operator. The
//! `suspended` flag is the authoritative kill switch; every other field is
//! either identity or the bookkeeping the store needs to tell a genuine
//! suspension edge apart from a re-save.
//!
//! Revision bookkeeping is owned by the node store: `revision` increases on
//! every write and `suspended_at_revision` remembers the write that began the
//! current suspension. Nodes created already suspended carry no marker until
//! they are reactivated and suspended again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the human operator owning a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub String);

impl OperatorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub owner_id: OperatorId,
    pub name: String,
    pub suspended: bool,
    /// Opaque handle of the compute deployment backing this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_reference: Option<String>,
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at_revision: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build an unsaved node. The store assigns the first revision on insert.
    pub fn new(owner_id: OperatorId, name: impl Into<String>, compute_reference: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            owner_id,
            name: name.into(),
            suspended: false,
            compute_reference,
            revision: 0,
            suspended_at_revision: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compute reference with empty strings normalised to `None`.
    pub fn compute_reference(&self) -> Option<&str> {
        self.compute_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Flip the kill switch flag. Returns `true` when the flag actually changed.
    pub fn set_suspended(&mut self, suspended: bool) -> bool {
        let changed = self.suspended != suspended;
        self.suspended = suspended;
        changed
    }

    /// Advance the revision for a write, keeping the suspension marker in step
    /// with the flag. `previous` is the stored state before this write.
    pub fn stamp_write(&mut self, previous: Option<&Node>) {
        let was_suspended = previous.map(|p| p.suspended).unwrap_or(false);
        self.revision = previous.map(|p| p.revision).unwrap_or(0) + 1;
        self.updated_at = Utc::now();
        if let Some(p) = previous {
            self.created_at = p.created_at;
        }

        // A record born suspended never went through a transition
        self.suspended_at_revision = match (previous.is_some(), was_suspended, self.suspended) {
            (true, false, true) => Some(self.revision),
            (true, true, true) => previous.and_then(|p| p.suspended_at_revision),
            _ => None,
        };
    }
}

/// One write observed by the node store, as delivered to change listeners.
#[derive(Debug, Clone)]
pub struct NodeChange {
    /// Stored state before the write, when the store could read it
    pub before: Option<Node>,
    pub after: Node,
    /// The write inserted a brand-new record
    pub created: bool,
}

impl NodeChange {
    pub fn created(after: Node) -> Self {
        Self { before: None, after, created: true }
    }

    pub fn updated(before: Option<Node>, after: Node) -> Self {
        Self { before, after, created: false }
    }
}
