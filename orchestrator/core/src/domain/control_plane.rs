// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control Plane Ports
//!
//! Domain interfaces for the external systems a kill switch run mutates.
//! Adapters live in `crate::infrastructure::control_plane`. Each port exposes
//! exactly one operation, and adapters report "already done" responses from
//! the remote side (stopped deployment, missing participant) as success.

use async_trait::async_trait;

use crate::domain::node::{Node, OperatorId};

/// Compute lifecycle control plane (deployment hosting)
#[async_trait]
pub trait ComputeControlPlane: Send + Sync {
    /// Stop the deployment identified by `reference`
    async fn stop_deployment(&self, reference: &str) -> Result<(), ControlPlaneError>;
}

/// Realtime session control plane (voice/video rooms)
#[async_trait]
pub trait SessionControlPlane: Send + Sync {
    /// Remove every live session and token held by `identity`
    async fn revoke_all_access(&self, identity: &OperatorId) -> Result<(), ControlPlaneError>;
}

/// Operator-facing channel that receives the termination notice
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_termination_notice(
        &self,
        node: &Node,
        operator: &OperatorId,
        message: &str,
    ) -> Result<(), ControlPlaneError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Some targets of a fan-out call failed after all of them were attempted
    #[error("Failed for {failed} of {total} targets: {detail}")]
    PartialFailure { failed: usize, total: usize, detail: String },
}

impl ControlPlaneError {
    /// Classify a non-success HTTP status the way every adapter does
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 401 || status == 403 {
            ControlPlaneError::Unauthorized(body)
        } else {
            ControlPlaneError::Rejected { status, body }
        }
    }
}
