// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Serving the kill switch HTTP API (`overwatch serve`)
//! - HTTP health checks used by the client commands

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::DaemonClient;
pub use server::{start_daemon, ServeOverrides};

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { uptime: Option<u64> },
    Stopped,
    Unhealthy { error: String },
}

/// Check if the daemon answers its health endpoint
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    let base_url = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    };

    match client.get(format!("{}/health", base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            let uptime = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["uptime_seconds"].as_u64());
            Ok(DaemonStatus::Running { uptime })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(_) => Ok(DaemonStatus::Stopped),
    }
}

/// Client for a daemon that is known to be up, or a helpful error
pub async fn connect(host: &str, port: u16) -> Result<DaemonClient> {
    match check_daemon_running(host, port).await? {
        DaemonStatus::Running { .. } => DaemonClient::new(host, port),
        DaemonStatus::Unhealthy { error } => {
            anyhow::bail!("Overwatch daemon at {}:{} is unhealthy: {}", host, port, error)
        }
        DaemonStatus::Stopped => anyhow::bail!(
            "Overwatch daemon is not running at {}:{}. Start it with `overwatch serve`.",
            host,
            port
        ),
    }
}
