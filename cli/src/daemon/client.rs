// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use overwatch_core::application::kill_switch::ReconcileSummary;
use overwatch_core::domain::audit::AuditEntry;
use overwatch_core::domain::node::Node;
use overwatch_core::presentation::api::NodeView;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuspendResponse {
    pub node_id: Uuid,
    pub suspended: bool,
    pub revision: u64,
    pub transition_revision: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    Allowed,
    Refused(String),
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host.trim_end_matches('/'), port)
        } else {
            format!("http://{}:{}", host, port)
        };

        Ok(Self { client, base_url })
    }

    /// Client for an already complete base URL (e.g. a mock server)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build().context("Failed to create HTTP client")?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("Failed to reach daemon")?;
        parse(response, "health check").await
    }

    pub async fn create_node(
        &self,
        owner_id: &str,
        name: &str,
        compute_reference: Option<&str>,
        suspended: bool,
    ) -> Result<Node> {
        let response = self
            .client
            .post(format!("{}/api/nodes", self.base_url))
            .json(&json!({
                "owner_id": owner_id,
                "name": name,
                "compute_reference": compute_reference,
                "suspended": suspended,
            }))
            .send()
            .await
            .context("Failed to create node")?;
        parse(response, "create node").await
    }

    pub async fn get_node(&self, id: Uuid) -> Result<NodeView> {
        let response = self
            .client
            .get(format!("{}/api/nodes/{}", self.base_url, id))
            .send()
            .await
            .context("Failed to get node")?;
        parse(response, "get node").await
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeView>> {
        let response = self
            .client
            .get(format!("{}/api/nodes", self.base_url))
            .send()
            .await
            .context("Failed to list nodes")?;
        parse(response, "list nodes").await
    }

    /// Suspend a node. With `operator` set, the daemon refuses nodes owned by
    /// anyone else.
    pub async fn suspend_node(&self, id: Uuid, operator: Option<&str>) -> Result<SuspendResponse> {
        let mut request = self.client.post(format!("{}/api/nodes/{}/suspend", self.base_url, id));
        if let Some(operator) = operator {
            request = request.query(&[("operator_id", operator)]);
        }
        let response = request
            .send()
            .await
            .context("Failed to suspend node")?;
        parse(response, "suspend node").await
    }

    pub async fn check_dispatch(&self, id: Uuid) -> Result<DispatchDecision> {
        let response = self
            .client
            .get(format!("{}/api/nodes/{}/dispatch", self.base_url, id))
            .send()
            .await
            .context("Failed to check dispatch guard")?;

        if response.status() == StatusCode::FORBIDDEN {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let reason = body["error"].as_str().unwrap_or("node suspended").to_string();
            return Ok(DispatchDecision::Refused(reason));
        }
        let _: serde_json::Value = parse(response, "check dispatch").await?;
        Ok(DispatchDecision::Allowed)
    }

    pub async fn list_audit(&self, node_id: Option<Uuid>, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(id) = node_id {
            query.push(("node_id", id.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/audit", self.base_url))
            .query(&query)
            .send()
            .await
            .context("Failed to list audit entries")?;
        parse(response, "list audit entries").await
    }

    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let response = self
            .client
            .post(format!("{}/api/reconcile", self.base_url))
            .send()
            .await
            .context("Failed to trigger reconciliation")?;
        parse(response, "reconcile").await
    }
}

async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(error_text);
        anyhow::bail!("Failed to {} (HTTP {}): {}", what, status, message);
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", what))
}
