// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node Service
//!
//! Write path of the node record store. Every write stamps the node's
//! revision bookkeeping, persists it, and then hands a [`NodeChange`]
//! (before, after, created) to the registered change listeners.
//!
//! Listeners run synchronously after the write has been persisted and can
//! never fail it: a panicking listener is logged and swallowed, so a
//! suspension flag change always succeeds once the store accepted it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::domain::node::{Node, NodeChange, NodeId, OperatorId};
use crate::domain::repository::{NodeRepository, RepositoryError};

/// Change-notification hook of the node store
pub trait NodeChangeListener: Send + Sync {
    /// Called once per persisted write. Must return quickly.
    fn on_node_written(&self, change: &NodeChange);
}

pub struct NodeService {
    repository: Arc<dyn NodeRepository>,
    listeners: Vec<Arc<dyn NodeChangeListener>>,
    // Serialises read-stamp-save so revisions stay monotonic
    write_lock: Mutex<()>,
}

impl NodeService {
    pub fn new(repository: Arc<dyn NodeRepository>) -> Self {
        Self {
            repository,
            listeners: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn NodeChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub async fn create_node(
        &self,
        owner_id: OperatorId,
        name: impl Into<String>,
        compute_reference: Option<String>,
        suspended: bool,
    ) -> Result<Node, RepositoryError> {
        let mut node = Node::new(owner_id, name, compute_reference);
        node.set_suspended(suspended);
        let change = self.save(node).await?;
        Ok(change.after)
    }

    /// Persist `node` (insert or update) and notify listeners
    pub async fn save(&self, mut node: Node) -> Result<NodeChange, RepositoryError> {
        let change = {
            let _guard = self.write_lock.lock().await;
            let before = self.repository.find_by_id(node.id).await?;
            node.stamp_write(before.as_ref());
            self.repository.save(&node).await?;

            match before {
                Some(before) => NodeChange::updated(Some(before), node),
                None => NodeChange::created(node),
            }
        };

        self.notify(&change);
        Ok(change)
    }

    /// Operator kill switch: set the suspension flag on a stored node
    pub async fn suspend(&self, id: NodeId) -> Result<NodeChange, RepositoryError> {
        let mut node = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Node {} not found", id)))?;

        if node.set_suspended(true) {
            info!(node_id = %id, operator_id = %node.owner_id, "Kill switch engaged for node");
        }
        self.save(node).await
    }

    pub async fn get(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        self.repository.find_by_id(id).await
    }

    pub async fn list(&self) -> Result<Vec<Node>, RepositoryError> {
        self.repository.list_all().await
    }

    fn notify(&self, change: &NodeChange) {
        for listener in &self.listeners {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_node_written(change)));
            if delivered.is_err() {
                error!(
                    node_id = %change.after.id,
                    revision = change.after.revision,
                    "Node change listener panicked; write was kept"
                );
            }
        }
    }
}
