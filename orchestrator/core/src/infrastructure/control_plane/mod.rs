// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control Plane Adapters
//!
//! Concrete implementations of the ports in `crate::domain::control_plane`:
//!
//! - [`railway::RailwayComputeClient`] - compute teardown
//! - [`livekit::LiveKitSessionClient`] - realtime session revocation
//! - [`webhook::WebhookNotificationChannel`] - termination notice
//!
//! [`ControlPlanes::from_config`] builds them from the `compute`, `session`
//! and `notification` sections of `overwatch-config.yaml`. A compute or
//! session section that is missing or disabled yields an
//! [`UnconfiguredControlPlane`], so the action still runs and its failure
//! shows up in the audit trail.

pub mod livekit;
pub mod railway;
pub mod webhook;

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::control_plane::{
    ComputeControlPlane, ControlPlaneError, NotificationChannel, SessionControlPlane,
};
use crate::domain::node::OperatorId;
use crate::domain::overwatch_config::{resolve_secret, OverwatchConfigSpec};

pub use livekit::LiveKitSessionClient;
pub use railway::RailwayComputeClient;
pub use webhook::WebhookNotificationChannel;

/// Stand-in for a control plane with no credentials
pub struct UnconfiguredControlPlane {
    what: &'static str,
}

impl UnconfiguredControlPlane {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }
}

#[async_trait]
impl ComputeControlPlane for UnconfiguredControlPlane {
    async fn stop_deployment(&self, _reference: &str) -> Result<(), ControlPlaneError> {
        Err(ControlPlaneError::NotConfigured(self.what.to_string()))
    }
}

#[async_trait]
impl SessionControlPlane for UnconfiguredControlPlane {
    async fn revoke_all_access(&self, _identity: &OperatorId) -> Result<(), ControlPlaneError> {
        Err(ControlPlaneError::NotConfigured(self.what.to_string()))
    }
}

/// The adapters a kill switch run talks to
#[derive(Clone)]
pub struct ControlPlanes {
    pub compute: Arc<dyn ComputeControlPlane>,
    pub sessions: Arc<dyn SessionControlPlane>,
    /// Notification is optional; `None` means the action is not registered
    pub notification: Option<Arc<dyn NotificationChannel>>,
}

impl ControlPlanes {
    pub fn from_config(spec: &OverwatchConfigSpec) -> anyhow::Result<Self> {
        let compute: Arc<dyn ComputeControlPlane> = match spec.compute.as_ref().filter(|c| c.enabled) {
            Some(compute) => {
                match resolve_secret(&compute.api_token).context("compute.api_token")? {
                    Some(token) => {
                        info!(endpoint = %compute.endpoint, "Compute control plane configured");
                        Arc::new(RailwayComputeClient::new(compute.endpoint.clone(), token))
                    }
                    None => {
                        warn!("compute.api_token missing; compute teardown will fail as not configured");
                        Arc::new(UnconfiguredControlPlane::new("compute api token missing"))
                    }
                }
            }
            None => {
                warn!("No compute control plane configured; compute teardown will fail as not configured");
                Arc::new(UnconfiguredControlPlane::new("compute control plane"))
            }
        };

        let sessions: Arc<dyn SessionControlPlane> = match spec.session.as_ref().filter(|s| s.enabled) {
            Some(session) => {
                let api_key = resolve_secret(&session.api_key).context("session.api_key")?;
                let api_secret = resolve_secret(&session.api_secret).context("session.api_secret")?;
                match (api_key, api_secret) {
                    (Some(key), Some(secret)) => {
                        info!(endpoint = %session.endpoint, "Session control plane configured");
                        Arc::new(LiveKitSessionClient::new(
                            session.endpoint.clone(),
                            key,
                            secret,
                            session.identity_prefix.clone(),
                            session.token_ttl,
                        ))
                    }
                    _ => {
                        warn!("session api key/secret missing; session revocation will fail as not configured");
                        Arc::new(UnconfiguredControlPlane::new("session api credentials missing"))
                    }
                }
            }
            None => {
                warn!("No session control plane configured; session revocation will fail as not configured");
                Arc::new(UnconfiguredControlPlane::new("session control plane"))
            }
        };

        let notification = match spec.notification.as_ref().filter(|n| n.enabled) {
            Some(notification) => {
                let token = resolve_secret(&notification.auth_token).context("notification.auth_token")?;
                info!(endpoint = %notification.endpoint, "Operator notification configured");
                Some(Arc::new(WebhookNotificationChannel::new(notification.endpoint.clone(), token))
                    as Arc<dyn NotificationChannel>)
            }
            None => None,
        };

        Ok(Self { compute, sessions, notification })
    }
}
