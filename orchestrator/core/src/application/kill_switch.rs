// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kill Switch Orchestrator
//!
//! Reacts to node writes that suspend a node and drives one deactivation run
//! per logical suspension:
//!
//! 1. [`TransitionDetector`] decides synchronously on the write path.
//! 2. A run is spawned on the tokio runtime so the write returns at once.
//! 3. [`ActionExecutor`] fans out every registered action and waits for all.
//! 4. [`AuditRecorder`] appends exactly one audit entry for the transition.
//!
//! Runs are deduplicated twice: an in-memory in-flight set (the `Suspending`
//! state) keyed by `(node, transition_revision)` drops concurrent triggers
//! for the same transition while letting a newer suspension of the same node
//! start its own run, and the audit store is
//! consulted for `(node, transition_revision)` before any action runs, which
//! keeps level-triggered re-fires and restarts from producing a second
//! record. [`KillSwitchOrchestrator::reconcile`] re-drives suspended nodes
//! whose transition has no audit entry yet. Nodes created already suspended
//! have no transition and are never re-driven.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::action_executor::ActionExecutor;
use crate::application::audit_recorder::AuditRecorder;
use crate::application::node_service::NodeChangeListener;
use crate::domain::audit::AuditEntry;
use crate::domain::deactivation::{ActionResult, DeactivationState};
use crate::domain::events::{IgnoredBecause, KillSwitchEvent};
use crate::domain::node::{Node, NodeChange, NodeId};
use crate::domain::repository::{AuditRepository, NodeRepository, RepositoryError};
use crate::domain::transition::{TransitionDecision, TransitionDetector};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum KillSwitchError {
    /// The compliance record could not be persisted. Fatal for the run.
    #[error("Audit entry for node {node_id} (revision {transition_revision}) could not be persisted: {reason}")]
    AuditPersistFailure {
        node_id: NodeId,
        transition_revision: u64,
        reason: String,
        entry: Box<AuditEntry>,
    },

    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Node {0} is not suspended")]
    NodeNotSuspended(NodeId),

    #[error("Node {0} was created suspended; there is no suspension transition to act on")]
    NoSuspensionTransition(NodeId),

    #[error("Node store error: {0}")]
    NodeStore(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every non-best-effort action succeeded and the audit entry is stored
    Completed,
    /// At least one required action failed; the audit entry is stored
    CompletedWithFailures,
    /// The audit entry could not be stored
    AuditFailed,
    /// No run was needed
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub node_id: NodeId,
    pub transition_revision: u64,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_because: Option<IgnoredBecause>,
    #[serde(default)]
    pub results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_entry: Option<AuditEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    fn skipped(node_id: NodeId, transition_revision: u64, because: IgnoredBecause) -> Self {
        Self {
            node_id,
            transition_revision,
            status: RunStatus::Skipped,
            skipped_because: Some(because),
            results: Vec::new(),
            audit_entry: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub redriven: usize,
    pub reports: Vec<RunReport>,
}

pub struct KillSwitchOrchestrator {
    me: Weak<KillSwitchOrchestrator>,
    detector: TransitionDetector,
    executor: ActionExecutor,
    recorder: AuditRecorder,
    nodes: Arc<dyn NodeRepository>,
    audit: Arc<dyn AuditRepository>,
    event_bus: Arc<EventBus>,
    // (node, transition revision) pairs in the Suspending state
    in_flight: DashMap<(NodeId, u64), ()>,
}

impl KillSwitchOrchestrator {
    pub fn new(
        detector: TransitionDetector,
        executor: ActionExecutor,
        nodes: Arc<dyn NodeRepository>,
        audit: Arc<dyn AuditRepository>,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            detector,
            executor,
            recorder: AuditRecorder::new(audit.clone()),
            nodes,
            audit,
            event_bus,
            in_flight: DashMap::new(),
        })
    }

    pub fn detector(&self) -> &TransitionDetector {
        &self.detector
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Evaluate one node write and, on a suspension transition, start a run
    /// in the background. Returns the run handle when one was spawned.
    pub fn handle_change(&self, change: &NodeChange) -> Option<JoinHandle<RunReport>> {
        let node = &change.after;
        let transition_revision = match self.detector.evaluate(change) {
            TransitionDecision::Orchestrate { transition_revision, refire } => {
                if refire {
                    info!(
                        node_id = %node.id,
                        revision = node.revision,
                        transition_revision,
                        "Level-triggered re-fire on already suspended node; actions are idempotent"
                    );
                }
                transition_revision
            }
            TransitionDecision::Ignore(reason) => {
                // Only suspended writes are worth an event
                let reported = IgnoredBecause::from_reason(reason).filter(|_| node.suspended);
                if let Some(because) = reported {
                    debug!(node_id = %node.id, reason = ?because, "Suspension write ignored");
                    self.event_bus.publish(KillSwitchEvent::TransitionIgnored {
                        node_id: node.id,
                        reason: because,
                        observed_at: Utc::now(),
                    });
                }
                return None;
            }
        };

        let this = self.me.upgrade()?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!(
                    node_id = %node.id,
                    "No async runtime on the write path; kill switch run deferred to reconciliation"
                );
                return None;
            }
        };

        let node = node.clone();
        Some(runtime.spawn(async move { this.run(node, transition_revision).await }))
    }

    /// Drive one deactivation run for `node` and the suspension that began at
    /// `transition_revision`.
    pub async fn run(&self, node: Node, transition_revision: u64) -> RunReport {
        let key = (node.id, transition_revision);
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => {
                debug!(node_id = %node.id, transition_revision, "Kill switch run already in flight");
                self.publish_ignored(node.id, IgnoredBecause::RunInFlight);
                return RunReport::skipped(node.id, transition_revision, IgnoredBecause::RunInFlight);
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        let _in_flight = InFlightGuard { map: &self.in_flight, key };

        match self.audit.find_by_transition(node.id, transition_revision).await {
            Ok(Some(existing)) => {
                info!(
                    node_id = %node.id,
                    transition_revision,
                    audit_entry_id = %existing.id,
                    "Transition already audited, skipping run"
                );
                self.publish_ignored(node.id, IgnoredBecause::AlreadyAudited);
                return RunReport::skipped(node.id, transition_revision, IgnoredBecause::AlreadyAudited);
            }
            Ok(None) => {}
            Err(e) => {
                // Idempotent actions make a duplicate run harmless; a missed one is not
                warn!(node_id = %node.id, error = %e, "Audit lookup failed, running kill switch anyway");
            }
        }

        info!(
            node_id = %node.id,
            operator_id = %node.owner_id,
            transition_revision,
            actions = ?self.executor.registry().names(),
            "PROTOCOL: kill switch triggered"
        );
        metrics::counter!("overwatch_kill_switch_runs_total").increment(1);
        self.event_bus.publish(KillSwitchEvent::RunStarted {
            node_id: node.id,
            operator_id: node.owner_id.clone(),
            transition_revision,
            started_at: Utc::now(),
        });

        let results = self.executor.execute(&node).await;
        for result in &results {
            self.event_bus.publish(KillSwitchEvent::ActionCompleted {
                node_id: node.id,
                result: result.clone(),
                completed_at: Utc::now(),
            });
        }

        let blocking_failures = results.iter().filter(|r| r.is_blocking_failure()).count();
        let failed_actions = results.iter().filter(|r| !r.succeeded).count();

        match self.recorder.record(&node, transition_revision, results.clone()).await {
            Ok(entry) => {
                let status = if blocking_failures == 0 {
                    RunStatus::Completed
                } else {
                    RunStatus::CompletedWithFailures
                };
                info!(
                    node_id = %node.id,
                    transition_revision,
                    status = ?status,
                    failed_actions,
                    "Kill switch run finished"
                );
                self.event_bus.publish(KillSwitchEvent::RunCompleted {
                    node_id: node.id,
                    audit_entry_id: entry.id,
                    failed_actions,
                    completed_at: Utc::now(),
                });
                RunReport {
                    node_id: node.id,
                    transition_revision,
                    status,
                    skipped_because: None,
                    results,
                    audit_entry: Some(entry),
                    error: None,
                }
            }
            Err(e) => {
                error!(
                    node_id = %node.id,
                    transition_revision,
                    error = %e,
                    "COMPLIANCE FAILURE: kill switch run has no stored audit entry"
                );
                self.event_bus.publish(KillSwitchEvent::AuditPersistFailed {
                    node_id: node.id,
                    transition_revision,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
                RunReport {
                    node_id: node.id,
                    transition_revision,
                    status: RunStatus::AuditFailed,
                    skipped_because: None,
                    results,
                    audit_entry: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Re-drive the current suspension of a stored node (no-op when already audited)
    pub async fn trigger(&self, node_id: NodeId) -> Result<RunReport, KillSwitchError> {
        let node = self
            .nodes
            .find_by_id(node_id)
            .await?
            .ok_or(KillSwitchError::NodeNotFound(node_id))?;
        if !node.suspended {
            return Err(KillSwitchError::NodeNotSuspended(node_id));
        }
        let transition_revision = node
            .suspended_at_revision
            .ok_or(KillSwitchError::NoSuspensionTransition(node_id))?;
        Ok(self.run(node, transition_revision).await)
    }

    /// Find suspended nodes whose current suspension has no audit entry and
    /// run the kill switch for each of them.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, KillSwitchError> {
        let suspended = self.nodes.find_suspended().await?;
        let scanned = suspended.len();

        let mut pending = Vec::new();
        for node in suspended {
            let transition_revision = match node.suspended_at_revision {
                Some(rev) => rev,
                None => {
                    debug!(node_id = %node.id, "Node was created suspended, nothing to re-drive");
                    continue;
                }
            };
            if self.audit.find_by_transition(node.id, transition_revision).await?.is_none() {
                pending.push((node, transition_revision));
            }
        }

        if pending.is_empty() {
            debug!(scanned, "Reconciliation found no unaudited suspensions");
            return Ok(ReconcileSummary { scanned, redriven: 0, reports: Vec::new() });
        }

        info!(scanned, pending = pending.len(), "Re-driving unaudited suspensions");
        let reports = join_all(pending.into_iter().map(|(node, rev)| self.run(node, rev))).await;
        let redriven = reports.iter().filter(|r| r.status != RunStatus::Skipped).count();

        Ok(ReconcileSummary { scanned, redriven, reports })
    }

    /// Logical deactivation state of a node as seen by this orchestrator
    pub fn state_of(&self, node: &Node) -> DeactivationState {
        if !node.suspended {
            DeactivationState::Active
        } else if self.in_flight.iter().any(|e| e.key().0 == node.id) {
            DeactivationState::Suspending
        } else {
            DeactivationState::Suspended
        }
    }

    fn publish_ignored(&self, node_id: NodeId, reason: IgnoredBecause) {
        self.event_bus.publish(KillSwitchEvent::TransitionIgnored {
            node_id,
            reason,
            observed_at: Utc::now(),
        });
    }
}

impl NodeChangeListener for KillSwitchOrchestrator {
    fn on_node_written(&self, change: &NodeChange) {
        // The run reports through logs, events and the audit store
        let _ = self.handle_change(change);
    }
}

struct InFlightGuard<'a> {
    map: &'a DashMap<(NodeId, u64), ()>,
    key: (NodeId, u64),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
