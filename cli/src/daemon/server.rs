// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation
//!
//! Wires configuration, storage, control plane adapters and the kill switch
//! orchestrator together, then serves the HTTP API until ctrl-c or SIGTERM.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use overwatch_core::{
    application::{
        action_executor::{ActionExecutor, ExecutionBudget},
        actions::build_registry,
        kill_switch::KillSwitchOrchestrator,
        node_service::NodeService,
        repository_factory::{create_audit_repository, create_node_repository},
    },
    domain::{
        overwatch_config::{resolve_secret, OverwatchConfigManifest, StorageBackendKind},
        repository::{PostgresConfig, StorageBackend},
        transition::TransitionDetector,
    },
    infrastructure::{
        control_plane::ControlPlanes,
        db::Database,
        event_bus::EventBus,
    },
    presentation::api::{self, AppState},
};

/// Command-line overrides for the listener
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn start_daemon(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let pid = std::process::id();
    info!("Overwatch daemon starting (PID: {})", pid);

    let config = OverwatchConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    info!("Configuration loaded: {}", config.metadata.name);

    start_metrics_exporter(&config)?;

    let state = build_state(&config).await?;

    if config.spec.kill_switch.reconcile_on_startup {
        let kill_switch = state.kill_switch.clone();
        tokio::spawn(async move {
            match kill_switch.reconcile().await {
                Ok(summary) => info!(
                    scanned = summary.scanned,
                    redriven = summary.redriven,
                    "Startup reconciliation finished"
                ),
                Err(e) => error!(error = %e, "Startup reconciliation failed"),
            }
        });
    }

    let app = api::app(state);

    let host = overrides.host.unwrap_or_else(|| config.spec.network.bind_address.clone());
    let port = overrides.port.unwrap_or(config.spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down");
    Ok(())
}

/// Build every service the HTTP API needs from a validated configuration
pub async fn build_state(config: &OverwatchConfigManifest) -> Result<AppState> {
    let spec = &config.spec;

    let (backend, pool) = match spec.storage.backend {
        StorageBackendKind::InMemory => {
            warn!("Using in-memory storage; nodes and audit entries are lost on restart");
            (StorageBackend::InMemory, None)
        }
        StorageBackendKind::Postgres => {
            let url = resolve_secret(&spec.storage.database_url)
                .context("storage.database_url")?
                .context("storage.database_url is required for the postgres backend")?;
            let db = Database::connect_and_bootstrap(&url)
                .await
                .context("Failed to initialize PostgreSQL storage")?;
            (
                StorageBackend::PostgreSQL(PostgresConfig { connection_string: url }),
                Some(db.get_pool().clone()),
            )
        }
    };
    let node_repo = create_node_repository(&backend, pool.clone());
    let audit_repo = create_audit_repository(&backend, pool);

    let planes = ControlPlanes::from_config(spec).context("Failed to initialize control plane adapters")?;
    let registry = build_registry(&planes, &spec.kill_switch.termination_message)
        .context("Failed to register deactivation actions")?;
    info!(actions = ?registry.names(), "Deactivation actions registered");

    let budget = ExecutionBudget {
        action_timeout: spec.kill_switch.action_timeout,
        run_deadline: spec.kill_switch.run_deadline,
    };
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let kill_switch = KillSwitchOrchestrator::new(
        TransitionDetector::new(spec.kill_switch.detection_policy),
        ActionExecutor::new(registry, budget),
        node_repo.clone(),
        audit_repo.clone(),
        event_bus,
    );
    info!(policy = ?spec.kill_switch.detection_policy, "Kill switch orchestrator ready");

    let nodes = NodeService::new(node_repo).with_listener(kill_switch.clone());

    Ok(AppState {
        nodes: Arc::new(nodes),
        kill_switch,
        audit: audit_repo,
        start_time: Instant::now(),
    })
}

fn start_metrics_exporter(config: &OverwatchConfigManifest) -> Result<()> {
    let metrics = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled);

    if let Some(metrics) = metrics {
        let addr: SocketAddr = format!("{}:{}", config.spec.network.bind_address, metrics.port)
            .parse()
            .context("Invalid metrics listen address")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", addr);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
