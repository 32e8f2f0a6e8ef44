// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use overwatch_core::application::action_executor::{ActionExecutor, ExecutionBudget};
use overwatch_core::application::actions::build_registry;
use overwatch_core::application::kill_switch::{KillSwitchError, KillSwitchOrchestrator, RunStatus};
use overwatch_core::application::node_service::NodeService;
use overwatch_core::domain::audit::AuditEntry;
use overwatch_core::domain::control_plane::{
    ComputeControlPlane, ControlPlaneError, NotificationChannel, SessionControlPlane,
};
use overwatch_core::domain::deactivation::DeactivationState;
use overwatch_core::domain::events::{IgnoredBecause, KillSwitchEvent};
use overwatch_core::domain::node::{Node, NodeId, OperatorId};
use overwatch_core::domain::repository::{AuditRepository, NodeRepository, RepositoryError};
use overwatch_core::domain::transition::{DetectionPolicy, TransitionDetector};
use overwatch_core::infrastructure::control_plane::ControlPlanes;
use overwatch_core::infrastructure::event_bus::{EventBus, EventReceiver};
use overwatch_core::infrastructure::repositories::{InMemoryAuditRepository, InMemoryNodeRepository};

#[derive(Default)]
struct FakeCompute {
    calls: Mutex<Vec<String>>,
    fail: bool,
    delay: Duration,
}

#[async_trait]
impl ComputeControlPlane for FakeCompute {
    async fn stop_deployment(&self, reference: &str) -> Result<(), ControlPlaneError> {
        self.calls.lock().unwrap().push(reference.to_string());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(ControlPlaneError::Rejected { status: 500, body: "deployment stop failed".into() });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default, PartialEq)]
enum SessionBehaviour {
    #[default]
    Succeed,
    Fail,
    Hang,
}

#[derive(Default)]
struct FakeSessions {
    calls: Mutex<Vec<String>>,
    behaviour: SessionBehaviour,
}

#[async_trait]
impl SessionControlPlane for FakeSessions {
    async fn revoke_all_access(&self, identity: &OperatorId) -> Result<(), ControlPlaneError> {
        self.calls.lock().unwrap().push(identity.to_string());
        match self.behaviour {
            SessionBehaviour::Succeed => Ok(()),
            SessionBehaviour::Fail => Err(ControlPlaneError::Transport("connection refused".into())),
            SessionBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct FakeNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl NotificationChannel for FakeNotifier {
    async fn send_termination_notice(
        &self,
        _node: &Node,
        operator: &OperatorId,
        _message: &str,
    ) -> Result<(), ControlPlaneError> {
        self.sent.lock().unwrap().push(operator.to_string());
        if self.fail {
            return Err(ControlPlaneError::Rejected { status: 502, body: "bad gateway".into() });
        }
        Ok(())
    }
}

struct BrokenAuditRepository;

#[async_trait]
impl AuditRepository for BrokenAuditRepository {
    async fn append(&self, _entry: &AuditEntry) -> Result<(), RepositoryError> {
        Err(RepositoryError::Database("audit table unavailable".into()))
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

struct Harness {
    compute: Arc<FakeCompute>,
    sessions: Arc<FakeSessions>,
    notifier: Option<Arc<FakeNotifier>>,
    nodes: Arc<InMemoryNodeRepository>,
    audit: Arc<dyn AuditRepository>,
    orchestrator: Arc<KillSwitchOrchestrator>,
    service: NodeService,
    events: EventReceiver,
}

struct HarnessBuilder {
    policy: DetectionPolicy,
    compute: FakeCompute,
    sessions: FakeSessions,
    notifier: Option<FakeNotifier>,
    audit: Arc<dyn AuditRepository>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            policy: DetectionPolicy::Edge,
            compute: FakeCompute::default(),
            sessions: FakeSessions::default(),
            notifier: None,
            audit: Arc::new(InMemoryAuditRepository::new()),
        }
    }

    fn policy(mut self, policy: DetectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn compute(mut self, compute: FakeCompute) -> Self {
        self.compute = compute;
        self
    }

    fn sessions(mut self, behaviour: SessionBehaviour) -> Self {
        self.sessions.behaviour = behaviour;
        self
    }

    fn notifier(mut self, fail: bool) -> Self {
        self.notifier = Some(FakeNotifier { fail, ..Default::default() });
        self
    }

    fn audit(mut self, audit: Arc<dyn AuditRepository>) -> Self {
        self.audit = audit;
        self
    }

    fn build(self) -> Harness {
        let compute = Arc::new(self.compute);
        let sessions = Arc::new(self.sessions);
        let notifier = self.notifier.map(Arc::new);

        let planes = ControlPlanes {
            compute: compute.clone(),
            sessions: sessions.clone(),
            notification: notifier.clone().map(|n| n as Arc<dyn NotificationChannel>),
        };
        let registry = build_registry(&planes, "NODE SUSPENDED").unwrap();

        let nodes = Arc::new(InMemoryNodeRepository::new());
        let event_bus = Arc::new(EventBus::new(256));
        let events = event_bus.subscribe();
        let orchestrator = KillSwitchOrchestrator::new(
            TransitionDetector::new(self.policy),
            ActionExecutor::new(registry, ExecutionBudget::default()),
            nodes.clone(),
            self.audit.clone(),
            event_bus,
        );
        let service = NodeService::new(nodes.clone()).with_listener(orchestrator.clone());

        Harness {
            compute,
            sessions,
            notifier,
            nodes,
            audit: self.audit,
            orchestrator,
            service,
            events,
        }
    }
}

impl Harness {
    async fn create(&self, owner: &str, reference: Option<&str>, suspended: bool) -> Node {
        self.service
            .create_node(OperatorId::new(owner), "teammate", reference.map(str::to_string), suspended)
            .await
            .unwrap()
    }

    /// Next event for `node_id` matching `pred`
    async fn wait_for(&mut self, node_id: NodeId, pred: impl Fn(&KillSwitchEvent) -> bool) -> KillSwitchEvent {
        timeout(Duration::from_secs(120), async {
            loop {
                let event = self.events.recv().await.unwrap();
                if event.node_id() == node_id && pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected kill switch event was not published")
    }

    async fn wait_for_run_end(&mut self, node_id: NodeId) -> KillSwitchEvent {
        self.wait_for(node_id, |e| {
            matches!(e, KillSwitchEvent::RunCompleted { .. } | KillSwitchEvent::AuditPersistFailed { .. })
        })
        .await
    }

    async fn audit_for(&self, node_id: NodeId) -> Vec<AuditEntry> {
        self.audit.find_by_node(node_id).await.unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn n1_suspension_stops_deployment_and_revokes_session() {
    let mut h = HarnessBuilder::new().build();
    let node = h.create("operator-n1", Some("dep-42"), false).await;

    h.service.suspend(node.id).await.unwrap();
    match h.wait_for_run_end(node.id).await {
        KillSwitchEvent::RunCompleted { failed_actions, .. } => assert_eq!(failed_actions, 0),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(*h.compute.calls.lock().unwrap(), vec!["dep-42".to_string()]);
    assert_eq!(*h.sessions.calls.lock().unwrap(), vec!["operator-n1".to_string()]);

    let entries = h.audit_for(node.id).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.action, "kill_switch");
    assert_eq!(entry.operator_id, OperatorId::new("operator-n1"));
    assert_eq!(entry.transition_revision, 2);
    assert!(entry.detail.contains("compute_teardown: succeeded"));
    assert!(entry.detail.contains("session_revocation: succeeded"));
    assert!(entry.results.iter().all(|r| r.succeeded));

    let stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    assert_eq!(h.orchestrator.state_of(&stored), DeactivationState::Suspended);
}

#[tokio::test(start_paused = true)]
async fn n2_empty_compute_reference_is_skipped_without_a_call() {
    let mut h = HarnessBuilder::new().build();
    let node = h.create("operator-n2", Some(""), false).await;

    h.service.suspend(node.id).await.unwrap();
    h.wait_for_run_end(node.id).await;

    assert!(h.compute.calls.lock().unwrap().is_empty());
    assert_eq!(h.sessions.calls.lock().unwrap().len(), 1);

    let entries = h.audit_for(node.id).await;
    assert_eq!(entries.len(), 1);
    let compute = &entries[0].results[0];
    assert_eq!(compute.action_name, "compute_teardown");
    assert!(compute.succeeded);
    assert!(compute.skipped);
    assert!(entries[0].detail.contains("compute_teardown: succeeded (skipped: no compute reference)"));
}

#[tokio::test(start_paused = true)]
async fn session_revocation_timeout_is_recorded_and_compute_still_stops() {
    let mut h = HarnessBuilder::new().sessions(SessionBehaviour::Hang).build();
    let node = h.create("operator-n3", Some("dep-7"), false).await;

    h.service.suspend(node.id).await.unwrap();
    match h.wait_for_run_end(node.id).await {
        KillSwitchEvent::RunCompleted { failed_actions, .. } => assert_eq!(failed_actions, 1),
        other => panic!("unexpected event: {:?}", other),
    }

    let entries = h.audit_for(node.id).await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].detail.contains("compute_teardown: succeeded"));
    assert!(entries[0].detail.contains("session_revocation: failed (timeout)"));
    assert_eq!(*h.compute.calls.lock().unwrap(), vec!["dep-7".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn node_created_already_suspended_triggers_nothing() {
    let mut h = HarnessBuilder::new().build();
    let node = h.create("operator-n4", Some("dep-9"), true).await;

    match h.wait_for(node.id, |_| true).await {
        KillSwitchEvent::TransitionIgnored { reason, .. } => assert_eq!(reason, IgnoredBecause::NewlyCreated),
        other => panic!("unexpected event: {:?}", other),
    }

    tokio::task::yield_now().await;
    assert!(h.compute.calls.lock().unwrap().is_empty());
    assert!(h.sessions.calls.lock().unwrap().is_empty());
    assert!(h.audit_for(node.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn resaving_a_suspended_node_does_not_run_again() {
    let mut h = HarnessBuilder::new().build();
    let node = h.create("operator-n5", Some("dep-5"), false).await;

    h.service.suspend(node.id).await.unwrap();
    h.wait_for_run_end(node.id).await;

    let mut stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    stored.name = "renamed".to_string();
    let change = h.service.save(stored).await.unwrap();
    assert_eq!(change.after.suspended_at_revision, Some(2));

    match h.wait_for(node.id, |e| matches!(e, KillSwitchEvent::TransitionIgnored { .. })).await {
        KillSwitchEvent::TransitionIgnored { reason, .. } => assert_eq!(reason, IgnoredBecause::AlreadySuspended),
        other => panic!("unexpected event: {:?}", other),
    }

    // Suspending again is also a no-op
    h.service.suspend(node.id).await.unwrap();

    assert_eq!(h.audit_for(node.id).await.len(), 1);
    assert_eq!(h.compute.calls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn audit_entry_exists_for_any_number_of_failed_actions() {
    for failures in 0..=3usize {
        let mut builder = HarnessBuilder::new();
        if failures >= 1 {
            builder = builder.compute(FakeCompute { fail: true, ..Default::default() });
        }
        if failures >= 2 {
            builder = builder.sessions(SessionBehaviour::Fail);
        }
        let mut h = builder.notifier(failures >= 3).build();
        let node = h.create("operator-n6", Some("dep-6"), false).await;

        h.service.suspend(node.id).await.unwrap();
        h.wait_for_run_end(node.id).await;

        let entries = h.audit_for(node.id).await;
        assert_eq!(entries.len(), 1, "failures = {}", failures);
        assert_eq!(entries[0].results.len(), 3);
        assert_eq!(entries[0].failed_actions().count(), failures);
        assert_eq!(h.notifier.as_ref().unwrap().sent.lock().unwrap().len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn audit_store_failure_is_reported_separately_from_action_failures() {
    let mut h = HarnessBuilder::new().audit(Arc::new(BrokenAuditRepository)).build();
    let node = h.create("operator-n7", Some("dep-11"), false).await;

    h.service.suspend(node.id).await.unwrap();
    match h.wait_for_run_end(node.id).await {
        KillSwitchEvent::AuditPersistFailed { transition_revision, reason, .. } => {
            assert_eq!(transition_revision, 2);
            assert!(reason.contains("audit table unavailable"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Actions themselves all succeeded
    assert_eq!(h.compute.calls.lock().unwrap().len(), 1);

    let stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    let report = h.orchestrator.trigger(stored.id).await.unwrap();
    assert_eq!(report.status, RunStatus::AuditFailed);
    assert!(report.results.iter().all(|r| r.succeeded));
    assert!(report.error.unwrap().contains("audit table unavailable"));
}

#[tokio::test(start_paused = true)]
async fn reconcile_redrives_suspension_without_audit_entry() {
    let h = HarnessBuilder::new().build();

    // Suspension persisted while no orchestrator was listening
    let mut node = Node::new(OperatorId::new("operator-n8"), "teammate", Some("dep-8".into()));
    node.stamp_write(None);
    h.nodes.save(&node).await.unwrap();
    let before = node.clone();
    node.set_suspended(true);
    node.stamp_write(Some(&before));
    h.nodes.save(&node).await.unwrap();

    let summary = h.orchestrator.reconcile().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.redriven, 1);
    assert_eq!(summary.reports[0].status, RunStatus::Completed);
    assert_eq!(h.audit_for(node.id).await[0].transition_revision, 2);

    let again = h.orchestrator.reconcile().await.unwrap();
    assert_eq!(again.scanned, 1);
    assert_eq!(again.redriven, 0);
    assert_eq!(h.audit_for(node.id).await.len(), 1);
    assert_eq!(h.compute.calls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn node_created_suspended_is_never_redriven() {
    let mut h = HarnessBuilder::new().policy(DetectionPolicy::Level).build();
    let node = h.create("operator-n11", Some("dep-new"), true).await;
    assert_eq!(node.suspended_at_revision, None);

    let summary = h.orchestrator.reconcile().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.redriven, 0);
    assert!(summary.reports.is_empty());

    let err = h.orchestrator.trigger(node.id).await.unwrap_err();
    assert!(matches!(err, KillSwitchError::NoSuspensionTransition(id) if id == node.id));

    // A plain re-save under the level policy is not a transition either
    let mut stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    stored.name = "renamed".to_string();
    h.service.save(stored).await.unwrap();
    tokio::task::yield_now().await;

    assert!(h.compute.calls.lock().unwrap().is_empty());
    assert!(h.sessions.calls.lock().unwrap().is_empty());
    assert!(h.audit_for(node.id).await.is_empty());

    // Reactivating and suspending again is a real transition
    let mut stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    stored.set_suspended(false);
    h.service.save(stored).await.unwrap();
    h.service.suspend(node.id).await.unwrap();
    h.wait_for_run_end(node.id).await;

    let entries = h.audit_for(node.id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].transition_revision, 4);
    assert_eq!(*h.compute.calls.lock().unwrap(), vec!["dep-new".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn resuspension_during_a_run_gets_its_own_run() {
    let mut h = HarnessBuilder::new()
        .compute(FakeCompute { delay: Duration::from_secs(2), ..Default::default() })
        .build();
    let node = h.create("operator-n12", Some("dep-12"), false).await;

    h.service.suspend(node.id).await.unwrap();

    let mut stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    stored.set_suspended(false);
    h.service.save(stored).await.unwrap();
    let change = h.service.suspend(node.id).await.unwrap();
    assert_eq!(change.after.suspended_at_revision, Some(4));

    h.wait_for_run_end(node.id).await;
    h.wait_for_run_end(node.id).await;

    let mut revisions: Vec<u64> = h.audit_for(node.id).await.iter().map(|e| e.transition_revision).collect();
    revisions.sort_unstable();
    assert_eq!(revisions, vec![2, 4]);
    assert_eq!(h.compute.calls.lock().unwrap().len(), 2);
    assert_eq!(h.sessions.calls.lock().unwrap().len(), 2);

    let stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    assert_eq!(h.orchestrator.state_of(&stored), DeactivationState::Suspended);
}

#[tokio::test(start_paused = true)]
async fn level_policy_refire_is_deduplicated_by_the_audit_store() {
    let mut h = HarnessBuilder::new().policy(DetectionPolicy::Level).build();
    let node = h.create("operator-n9", Some("dep-9"), false).await;

    h.service.suspend(node.id).await.unwrap();
    h.wait_for_run_end(node.id).await;

    let stored = h.nodes.find_by_id(node.id).await.unwrap().unwrap();
    h.service.save(stored).await.unwrap();
    match h.wait_for(node.id, |e| matches!(e, KillSwitchEvent::TransitionIgnored { .. })).await {
        KillSwitchEvent::TransitionIgnored { reason, .. } => assert_eq!(reason, IgnoredBecause::AlreadyAudited),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(h.audit_for(node.id).await.len(), 1);
    assert_eq!(h.compute.calls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_trigger_for_in_flight_node_is_dropped() {
    let h = HarnessBuilder::new()
        .compute(FakeCompute { delay: Duration::from_secs(2), ..Default::default() })
        .build();

    let mut node = Node::new(OperatorId::new("operator-n10"), "teammate", Some("dep-10".into()));
    node.set_suspended(true);
    node.stamp_write(None);
    h.nodes.save(&node).await.unwrap();

    let (first, second) = tokio::join!(
        h.orchestrator.run(node.clone(), 1),
        h.orchestrator.run(node.clone(), 1)
    );

    let statuses = [first.status, second.status];
    assert!(statuses.contains(&RunStatus::Completed));
    assert!(statuses.contains(&RunStatus::Skipped));
    let skipped = if first.status == RunStatus::Skipped { first } else { second };
    assert_eq!(skipped.skipped_because, Some(IgnoredBecause::RunInFlight));

    assert_eq!(h.audit_for(node.id).await.len(), 1);
    assert_eq!(h.compute.calls.lock().unwrap().len(), 1);
    assert_eq!(h.orchestrator.state_of(&node), DeactivationState::Suspended);
}
