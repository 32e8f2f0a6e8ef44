// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deactivation Actions
//!
//! The three actions of a kill switch run, each wrapping exactly one control
//! plane port:
//!
//! | Action | Port | Notes |
//! |--------|------|-------|
//! | `compute_teardown` | `ComputeControlPlane` | skipped when the node has no compute reference |
//! | `session_revocation` | `SessionControlPlane` | revokes the owning operator's identity |
//! | `operator_notification` | `NotificationChannel` | best-effort |

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::control_plane::{ComputeControlPlane, NotificationChannel, SessionControlPlane};
use crate::domain::deactivation::{
    ActionError, ActionOutcome, DeactivationAction, COMPUTE_TEARDOWN, OPERATOR_NOTIFICATION,
    SESSION_REVOCATION,
};
use crate::application::action_executor::{ActionRegistry, RegistryError};
use crate::domain::node::Node;
use crate::infrastructure::control_plane::ControlPlanes;

pub struct ComputeTeardownAction {
    compute: Arc<dyn ComputeControlPlane>,
}

impl ComputeTeardownAction {
    pub fn new(compute: Arc<dyn ComputeControlPlane>) -> Self {
        Self { compute }
    }
}

#[async_trait]
impl DeactivationAction for ComputeTeardownAction {
    fn name(&self) -> &str {
        COMPUTE_TEARDOWN
    }

    async fn execute(&self, node: &Node) -> Result<ActionOutcome, ActionError> {
        let Some(reference) = node.compute_reference() else {
            return Ok(ActionOutcome::Skipped("no compute reference".to_string()));
        };

        self.compute.stop_deployment(reference).await?;
        Ok(ActionOutcome::Completed)
    }
}

pub struct SessionRevocationAction {
    sessions: Arc<dyn SessionControlPlane>,
}

impl SessionRevocationAction {
    pub fn new(sessions: Arc<dyn SessionControlPlane>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl DeactivationAction for SessionRevocationAction {
    fn name(&self) -> &str {
        SESSION_REVOCATION
    }

    async fn execute(&self, node: &Node) -> Result<ActionOutcome, ActionError> {
        self.sessions.revoke_all_access(&node.owner_id).await?;
        Ok(ActionOutcome::Completed)
    }
}

pub struct OperatorNotificationAction {
    channel: Arc<dyn NotificationChannel>,
    message: String,
}

impl OperatorNotificationAction {
    pub fn new(channel: Arc<dyn NotificationChannel>, message: impl Into<String>) -> Self {
        Self { channel, message: message.into() }
    }
}

#[async_trait]
impl DeactivationAction for OperatorNotificationAction {
    fn name(&self) -> &str {
        OPERATOR_NOTIFICATION
    }

    fn is_best_effort(&self) -> bool {
        true
    }

    async fn execute(&self, node: &Node) -> Result<ActionOutcome, ActionError> {
        self.channel
            .send_termination_notice(node, &node.owner_id, &self.message)
            .await?;
        Ok(ActionOutcome::Completed)
    }
}

/// Standard registry: compute teardown, session revocation and, when a
/// channel is configured, operator notification.
pub fn build_registry(
    planes: &ControlPlanes,
    termination_message: &str,
) -> Result<ActionRegistry, RegistryError> {
    let mut registry = ActionRegistry::new()
        .with_action(Arc::new(ComputeTeardownAction::new(planes.compute.clone())))?
        .with_action(Arc::new(SessionRevocationAction::new(planes.sessions.clone())))?;

    if let Some(channel) = &planes.notification {
        registry.register(Arc::new(OperatorNotificationAction::new(
            channel.clone(),
            termination_message,
        )))?;
    }
    Ok(registry)
}
