// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit Recorder
//!
//! Turns the complete set of action results of one run into a single
//! [`AuditEntry`] and appends it to the audit store.
//!
//! Building the entry cannot fail. Persisting it can, and that is the one
//! failure a kill switch run treats as fatal: the entry is then written in
//! full to the `overwatch::audit_fallback` tracing target at `ERROR` so the
//! record survives out of band, and the caller gets
//! [`KillSwitchError::AuditPersistFailure`].

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::kill_switch::KillSwitchError;
use crate::domain::audit::AuditEntry;
use crate::domain::deactivation::ActionResult;
use crate::domain::node::Node;
use crate::domain::repository::{AuditRepository, RepositoryError};

pub const AUDIT_FALLBACK_TARGET: &str = "overwatch::audit_fallback";

pub struct AuditRecorder {
    repository: Arc<dyn AuditRepository>,
}

impl AuditRecorder {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(
        &self,
        node: &Node,
        transition_revision: u64,
        results: Vec<ActionResult>,
    ) -> Result<AuditEntry, KillSwitchError> {
        let entry = AuditEntry::kill_switch(node, transition_revision, results);

        match self.repository.append(&entry).await {
            Ok(()) => {
                info!(
                    audit_entry_id = %entry.id,
                    node_id = %entry.target_node_id,
                    transition_revision,
                    failed_actions = entry.failed_actions().count(),
                    "Kill switch audit entry recorded"
                );
                Ok(entry)
            }
            Err(RepositoryError::Conflict(reason)) => {
                // Another run already audited this transition
                warn!(
                    node_id = %entry.target_node_id,
                    transition_revision,
                    reason = %reason,
                    "Audit entry already exists for transition, keeping the first record"
                );
                match self.repository.find_by_transition(node.id, transition_revision).await {
                    Ok(Some(existing)) => Ok(existing),
                    Ok(None) => Err(self.persist_failure(entry, reason)),
                    Err(e) => Err(self.persist_failure(entry, e.to_string())),
                }
            }
            Err(e) => Err(self.persist_failure(entry, e.to_string())),
        }
    }

    fn persist_failure(&self, entry: AuditEntry, reason: String) -> KillSwitchError {
        metrics::counter!("overwatch_audit_persist_failures_total").increment(1);

        let serialized = serde_json::to_string(&entry)
            .unwrap_or_else(|e| format!("{{\"serialization_error\":\"{}\",\"detail\":{:?}}}", e, entry.detail));
        error!(
            target: AUDIT_FALLBACK_TARGET,
            node_id = %entry.target_node_id,
            transition_revision = entry.transition_revision,
            reason = %reason,
            audit_entry = %serialized,
            "COMPLIANCE: audit store write failed, fallback record follows"
        );

        KillSwitchError::AuditPersistFailure {
            node_id: entry.target_node_id,
            transition_revision: entry.transition_revision,
            reason,
            entry: Box::new(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deactivation::{ActionError, ActionOutcome};
    use crate::domain::node::{NodeId, OperatorId};
    use crate::infrastructure::repositories::InMemoryAuditRepository;
    use async_trait::async_trait;

    struct BrokenAuditRepository;

    #[async_trait]
    impl AuditRepository for BrokenAuditRepository {
        async fn append(&self, _entry: &AuditEntry) -> Result<(), RepositoryError> {
            Err(RepositoryError::Database("connection reset".to_string()))
        }
        async fn find_by_transition(&self, _: NodeId, _: u64) -> Result<Option<AuditEntry>, RepositoryError> {
            Ok(None)
        }
        async fn find_by_node(&self, _: NodeId) -> Result<Vec<AuditEntry>, RepositoryError> {
            Ok(vec![])
        }
        async fn list_recent(&self, _: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
            Ok(vec![])
        }
    }

    fn node() -> Node {
        let mut n = Node::new(OperatorId::new("op-1"), "primary", Some("dep-42".to_string()));
        n.stamp_write(None);
        n
    }

    #[tokio::test]
    async fn test_record_persists_entry_even_when_all_actions_failed() {
        let repo = Arc::new(InMemoryAuditRepository::new());
        let recorder = AuditRecorder::new(repo.clone());
        let results = vec![
            ActionResult::from_outcome("compute_teardown", false, Err(ActionError::Timeout), 1),
            ActionResult::from_outcome("session_revocation", false, Err(ActionError::Transport("dns".into())), 1),
        ];

        let n = node();
        let entry = recorder.record(&n, 2, results).await.unwrap();
        assert_eq!(entry.failed_actions().count(), 2);
        let stored = repo.find_by_transition(n.id, 2).await.unwrap().unwrap();
        assert_eq!(stored.id, entry.id);
    }

    #[tokio::test]
    async fn test_duplicate_transition_returns_first_entry() {
        let repo = Arc::new(InMemoryAuditRepository::new());
        let recorder = AuditRecorder::new(repo.clone());
        let n = node();

        let ok = vec![ActionResult::from_outcome("compute_teardown", false, Ok(ActionOutcome::Completed), 1)];
        let first = recorder.record(&n, 2, ok.clone()).await.unwrap();
        let second = recorder.record(&n, 2, ok).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(repo.find_by_node(n.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let recorder = AuditRecorder::new(Arc::new(BrokenAuditRepository));
        let n = node();
        let err = recorder.record(&n, 2, vec![]).await.unwrap_err();
        match err {
            KillSwitchError::AuditPersistFailure { node_id, transition_revision, reason, entry } => {
                assert_eq!(node_id, n.id);
                assert_eq!(transition_revision, 2);
                assert!(reason.contains("connection reset"));
                assert_eq!(entry.action, "kill_switch");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
