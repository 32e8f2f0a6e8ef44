// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresNodeRepository** - `nodes` table
//! - **PostgresAuditRepository** - append-only `kill_switch_audit` table
//!
//! ## In-Memory Repositories
//!
//! Thread-safe HashMap-backed storage for development and tests:
//! - **InMemoryNodeRepository**
//! - **InMemoryAuditRepository** - enforces the same one-entry-per-transition
//!   uniqueness as the PostgreSQL unique index

pub mod postgres_audit;
pub mod postgres_node;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::audit::AuditEntry;
use crate::domain::node::{Node, NodeId};
use crate::domain::repository::{AuditRepository, NodeRepository, RepositoryError};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, RepositoryError> {
    lock.read()
        .map_err(|_| RepositoryError::Unknown("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, RepositoryError> {
    lock.write()
        .map_err(|_| RepositoryError::Unknown("in-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct InMemoryNodeRepository {
    nodes: Arc<RwLock<HashMap<NodeId, Node>>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn save(&self, node: &Node) -> Result<(), RepositoryError> {
        write(&self.nodes)?.insert(node.id, node.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        Ok(read(&self.nodes)?.get(&id).cloned())
    }

    async fn find_suspended(&self) -> Result<Vec<Node>, RepositoryError> {
        Ok(read(&self.nodes)?.values().filter(|n| n.suspended).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        let mut nodes: Vec<Node> = read(&self.nodes)?.values().cloned().collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(nodes)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditRepository {
    // Append order is kept; lookups scan
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let mut entries = write(&self.entries)?;
        let duplicate = entries.iter().any(|e| {
            e.target_node_id == entry.target_node_id && e.transition_revision == entry.transition_revision
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "audit entry for node {} revision {} already exists",
                entry.target_node_id, entry.transition_revision
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn find_by_transition(
        &self,
        node_id: NodeId,
        transition_revision: u64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        Ok(read(&self.entries)?
            .iter()
            .find(|e| e.target_node_id == node_id && e.transition_revision == transition_revision)
            .cloned())
    }

    async fn find_by_node(&self, node_id: NodeId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(read(&self.entries)?
            .iter()
            .rev()
            .filter(|e| e.target_node_id == node_id)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(read(&self.entries)?.iter().rev().take(limit).cloned().collect())
    }
}
