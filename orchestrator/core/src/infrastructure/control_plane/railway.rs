// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Railway Compute Adapter
//
// Anti-Corruption Layer for the Railway GraphQL API. Stops a deployment via
// the `deploymentStop` mutation. A deployment that is already stopped or no
// longer exists counts as stopped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::domain::control_plane::{ComputeControlPlane, ControlPlaneError};

const STOP_DEPLOYMENT_MUTATION: &str = r#"
mutation deploymentStop($id: String!) {
  deploymentStop(id: $id)
}
"#;

pub struct RailwayComputeClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQLResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
}

impl RailwayComputeClient {
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_token: api_token.into(),
        }
    }
}

fn is_already_stopped(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already") || message.contains("not found")
}

#[async_trait]
impl ComputeControlPlane for RailwayComputeClient {
    async fn stop_deployment(&self, reference: &str) -> Result<(), ControlPlaneError> {
        let request = GraphQLRequest {
            query: STOP_DEPLOYMENT_MUTATION,
            variables: json!({ "id": reference }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(deployment = reference, "Deployment not found, treating as stopped");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::from_status(status.as_u16(), body));
        }

        let body: GraphQLResponse = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::Malformed(format!("Failed to parse response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            if messages.iter().all(|m| is_already_stopped(m)) {
                debug!(deployment = reference, "Deployment already stopped");
                return Ok(());
            }
            return Err(ControlPlaneError::Rejected {
                status: status.as_u16(),
                body: messages.join("; "),
            });
        }

        match body.data.as_ref().and_then(|d| d.get("deploymentStop")) {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            Some(other) => Err(ControlPlaneError::Malformed(format!(
                "deploymentStop returned {}",
                other
            ))),
            None => Err(ControlPlaneError::Malformed("missing data.deploymentStop".to_string())),
        }
    }
}
