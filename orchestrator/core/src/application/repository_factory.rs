// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.

use std::sync::Arc;
use sqlx::PgPool;

use crate::domain::repository::{AuditRepository, NodeRepository, StorageBackend};
use crate::infrastructure::repositories::postgres_audit::PostgresAuditRepository;
use crate::infrastructure::repositories::postgres_node::PostgresNodeRepository;
use crate::infrastructure::repositories::{InMemoryAuditRepository, InMemoryNodeRepository};

/// Creates a NodeRepository implementation based on the configured backend
pub fn create_node_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn NodeRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresNodeRepository::new(pool)),
        _ => Arc::new(InMemoryNodeRepository::new()),
    }
}

/// Creates an AuditRepository implementation based on the configured backend
pub fn create_audit_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn AuditRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresAuditRepository::new(pool)),
        _ => Arc::new(InMemoryAuditRepository::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{Node, OperatorId};

    #[tokio::test]
    async fn test_in_memory_backend_without_pool() {
        let nodes = create_node_repository(&StorageBackend::InMemory, None);
        let mut node = Node::new(OperatorId::new("op"), "n", None);
        node.stamp_write(None);
        nodes.save(&node).await.unwrap();
        assert!(nodes.find_by_id(node.id).await.unwrap().is_some());

        let audit = create_audit_repository(&StorageBackend::InMemory, None);
        assert!(audit.list_recent(10).await.unwrap().is_empty());
    }
}
