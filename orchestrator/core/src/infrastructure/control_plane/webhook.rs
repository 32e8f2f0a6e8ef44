// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Webhook Notification Adapter
//
// Posts the termination notice as JSON to an operator-facing webhook
// (chat bridge, incident tool).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::control_plane::{ControlPlaneError, NotificationChannel};
use crate::domain::node::{Node, NodeId, OperatorId};

pub struct WebhookNotificationChannel {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct TerminationNotice<'a> {
    event: &'static str,
    node_id: NodeId,
    node_name: &'a str,
    operator_id: &'a OperatorId,
    revision: u64,
    message: &'a str,
    sent_at: DateTime<Utc>,
}

impl WebhookNotificationChannel {
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            auth_token,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotificationChannel {
    async fn send_termination_notice(
        &self,
        node: &Node,
        operator: &OperatorId,
        message: &str,
    ) -> Result<(), ControlPlaneError> {
        let notice = TerminationNotice {
            event: "node_terminated",
            node_id: node.id,
            node_name: &node.name,
            operator_id: operator,
            revision: node.revision,
            message,
            sent_at: Utc::now(),
        };

        let mut request = self.client.post(&self.endpoint).json(&notice);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::from_status(status.as_u16(), body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_notice_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/overwatch")
            .match_header("authorization", "Bearer hook-token")
            .match_body(Matcher::PartialJson(json!({
                "event": "node_terminated",
                "node_name": "primary",
                "operator_id": "op-1",
                "message": "NODE SUSPENDED"
            })))
            .with_status(204)
            .create_async()
            .await;

        let channel = WebhookNotificationChannel::new(
            format!("{}/hooks/overwatch", server.url()),
            Some("hook-token".to_string()),
        );
        let node = Node::new(OperatorId::new("op-1"), "primary", None);
        channel
            .send_termination_notice(&node, &node.owner_id, "NODE SUSPENDED")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/").with_status(502).with_body("bad gateway").create_async().await;

        let channel = WebhookNotificationChannel::new(server.url(), None);
        let node = Node::new(OperatorId::new("op-1"), "primary", None);
        let err = channel
            .send_termination_notice(&node, &node.owner_id, "bye")
            .await
            .unwrap_err();
        assert_eq!(err, ControlPlaneError::Rejected { status: 502, body: "bad gateway".to_string() });
    }
}
