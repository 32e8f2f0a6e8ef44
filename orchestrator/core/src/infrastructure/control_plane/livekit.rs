// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LiveKit Session Adapter
//
// Anti-Corruption Layer for the LiveKit RoomService Twirp API. Revoking an
// operator's access removes its participant identity from every room the
// server currently hosts. Rooms the identity is not in answer `not_found`,
// which counts as revoked. A failing room does not stop the sweep: every room
// is attempted and the failures are reported together.
//
// Every request carries a short-lived admin token (HS256) signed with the
// API secret.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::control_plane::{ControlPlaneError, SessionControlPlane};
use crate::domain::node::OperatorId;

const ROOM_SERVICE: &str = "twirp/livekit.RoomService";

pub struct LiveKitSessionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_secret: String,
    identity_prefix: String,
    token_ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    room_list: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    room_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    iss: String,
    sub: String,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

#[derive(Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<Room>,
}

#[derive(Deserialize)]
struct Room {
    name: String,
}

#[derive(Deserialize)]
struct TwirpError {
    code: String,
    #[serde(default)]
    msg: String,
}

impl LiveKitSessionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        identity_prefix: impl Into<String>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            identity_prefix: identity_prefix.into(),
            token_ttl,
        }
    }

    pub fn participant_identity(&self, operator: &OperatorId) -> String {
        format!("{}{}", self.identity_prefix, operator)
    }

    fn admin_token(&self, grant: VideoGrant) -> Result<String, ControlPlaneError> {
        let now = Utc::now().timestamp();
        let claims = AdminClaims {
            iss: self.api_key.clone(),
            sub: self.api_key.clone(),
            nbf: now,
            exp: now + self.token_ttl.as_secs() as i64,
            video: grant,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
        .map_err(|e| ControlPlaneError::NotConfigured(format!("cannot sign admin token: {}", e)))
    }

    async fn call(
        &self,
        method: &str,
        token: String,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ControlPlaneError> {
        let url = format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), ROOM_SERVICE, method);
        self.client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))
    }

    async fn list_rooms(&self) -> Result<Vec<String>, ControlPlaneError> {
        let token = self.admin_token(VideoGrant { room_list: true, room_admin: false, room: None })?;
        let response = self.call("ListRooms", token, json!({})).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::from_status(status.as_u16(), body));
        }

        let rooms: ListRoomsResponse = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::Malformed(format!("Failed to parse ListRooms response: {}", e)))?;
        Ok(rooms.rooms.into_iter().map(|r| r.name).collect())
    }

    /// Returns whether the participant was present in `room`
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<bool, ControlPlaneError> {
        let token = self.admin_token(VideoGrant {
            room_list: false,
            room_admin: true,
            room: Some(room.to_string()),
        })?;
        let response = self
            .call("RemoveParticipant", token, json!({ "room": room, "identity": identity }))
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        let not_found = status == reqwest::StatusCode::NOT_FOUND
            || serde_json::from_str::<TwirpError>(&body)
                .map(|e| e.code == "not_found")
                .unwrap_or(false);
        if not_found {
            return Ok(false);
        }
        if let Ok(twirp) = serde_json::from_str::<TwirpError>(&body) {
            if twirp.code == "unauthenticated" || twirp.code == "permission_denied" {
                return Err(ControlPlaneError::Unauthorized(twirp.msg));
            }
        }
        Err(ControlPlaneError::from_status(status.as_u16(), body))
    }
}

#[async_trait]
impl SessionControlPlane for LiveKitSessionClient {
    async fn revoke_all_access(&self, operator: &OperatorId) -> Result<(), ControlPlaneError> {
        let identity = self.participant_identity(operator);
        let rooms = self.list_rooms().await?;

        let mut removed = 0usize;
        let mut failures = Vec::new();
        for room in &rooms {
            match self.remove_participant(room, &identity).await {
                Ok(true) => {
                    debug!(room = %room, identity = %identity, "Participant removed");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(room = %room, identity = %identity, error = %e, "Participant removal failed");
                    failures.push(format!("room '{}': {}", room, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(ControlPlaneError::PartialFailure {
                failed: failures.len(),
                total: rooms.len(),
                detail: failures.join("; "),
            });
        }

        info!(identity = %identity, rooms = rooms.len(), removed, "Realtime sessions revoked");
        Ok(())
    }
}
