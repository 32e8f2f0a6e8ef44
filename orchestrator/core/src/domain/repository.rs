// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the two aggregates this service touches,
//! following the DDD Repository pattern: interface defined in the domain
//! layer, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `NodeRepository` | `Node` | `InMemoryNodeRepository`, `PostgresNodeRepository` |
//! | `AuditRepository` | `AuditEntry` | `InMemoryAuditRepository`, `PostgresAuditRepository` |
//!
//! Concrete implementations are selected at startup from `storage.backend`
//! in `overwatch-config.yaml`.

use async_trait::async_trait;

use crate::domain::audit::AuditEntry;
use crate::domain::node::{Node, NodeId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for Node aggregates
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Save node (create or update), as already stamped by the caller
    async fn save(&self, node: &Node) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError>;

    /// All nodes currently flagged suspended (used by reconciliation)
    async fn find_suspended(&self) -> Result<Vec<Node>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError>;
}

/// Append-only store of compliance records
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one entry. Fails with `Conflict` when an entry already exists
    /// for the same node and transition revision.
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;

    async fn find_by_transition(
        &self,
        node_id: NodeId,
        transition_revision: u64,
    ) -> Result<Option<AuditEntry>, RepositoryError>;

    /// Entries for one node, newest first
    async fn find_by_node(&self, node_id: NodeId) -> Result<Vec<AuditEntry>, RepositoryError>;

    /// Most recent entries across all nodes, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
