// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Action Registry & Executor
//!
//! The registry is the ordered list of deactivation actions injected at
//! startup. The executor fans every registered action out onto its own tokio
//! task, bounds each one by the per-action timeout and the shared run
//! deadline, and fans the results back in once every action has finished or
//! timed out.
//!
//! Failure isolation is per task: an error, timeout or panic in one action
//! becomes a failed [`ActionResult`] and never cancels its siblings. Results
//! come back in registry order regardless of completion order.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::deactivation::{ActionError, ActionResult, DeactivationAction};
use crate::domain::node::Node;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Deactivation action '{0}' is already registered")]
    DuplicateAction(String),
}

/// Ordered set of independent deactivation actions
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: Vec<Arc<dyn DeactivationAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; names must be unique within a registry
    pub fn register(&mut self, action: Arc<dyn DeactivationAction>) -> Result<(), RegistryError> {
        if self.actions.iter().any(|a| a.name() == action.name()) {
            return Err(RegistryError::DuplicateAction(action.name().to_string()));
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn with_action(mut self, action: Arc<dyn DeactivationAction>) -> Result<Self, RegistryError> {
        self.register(action)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DeactivationAction>> {
        self.actions.iter()
    }
}

/// Time budget of one run
#[derive(Debug, Clone, Copy)]
pub struct ExecutionBudget {
    pub action_timeout: Duration,
    pub run_deadline: Duration,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(8),
            run_deadline: Duration::from_secs(15),
        }
    }
}

pub struct ActionExecutor {
    registry: ActionRegistry,
    budget: ExecutionBudget,
}

impl ActionExecutor {
    pub fn new(registry: ActionRegistry, budget: ExecutionBudget) -> Self {
        Self { registry, budget }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run every registered action against `node` and collect all outcomes.
    pub async fn execute(&self, node: &Node) -> Vec<ActionResult> {
        let started = Instant::now();
        let run_deadline = started + self.budget.run_deadline;
        let action_deadline = (started + self.budget.action_timeout).min(run_deadline);
        let node = Arc::new(node.clone());

        let handles: Vec<_> = self
            .registry
            .iter()
            .map(|action| {
                let action = Arc::clone(action);
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    let began = Instant::now();
                    let outcome = match tokio::time::timeout_at(action_deadline, action.execute(&node)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ActionError::Timeout),
                    };
                    (outcome, began.elapsed())
                })
            })
            .collect();

        let joined = join_all(handles).await;

        self.registry
            .iter()
            .zip(joined)
            .map(|(action, joined)| {
                let (outcome, elapsed) = match joined {
                    Ok(done) => done,
                    Err(join_error) => (
                        Err(ActionError::Panicked(panic_message(join_error))),
                        started.elapsed(),
                    ),
                };

                let result = ActionResult::from_outcome(
                    action.name(),
                    action.is_best_effort(),
                    outcome,
                    elapsed.as_millis() as u64,
                );
                observe(&node, &result, elapsed);
                result
            })
            .collect()
    }
}

fn observe(node: &Node, result: &ActionResult, elapsed: Duration) {
    let outcome = match (result.succeeded, result.skipped) {
        (true, true) => "skipped",
        (true, false) => "succeeded",
        (false, _) => "failed",
    };

    metrics::counter!(
        "overwatch_kill_switch_actions_total",
        "action" => result.action_name.clone(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "overwatch_kill_switch_action_duration_seconds",
        "action" => result.action_name.clone()
    )
    .record(elapsed.as_secs_f64());

    if result.succeeded {
        debug!(
            node_id = %node.id,
            action = %result.action_name,
            skipped = result.skipped,
            elapsed_ms = result.elapsed_ms,
            "Deactivation action succeeded"
        );
    } else {
        warn!(
            node_id = %node.id,
            action = %result.action_name,
            best_effort = result.best_effort,
            error = result.error.as_deref().unwrap_or("unknown"),
            elapsed_ms = result.elapsed_ms,
            "Deactivation action failed"
        );
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action task panicked".to_string()
    }
}
