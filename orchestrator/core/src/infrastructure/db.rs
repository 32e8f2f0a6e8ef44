// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into the PostgreSQL repository implementations. Only used when
//! `storage.backend: postgres` is set in `overwatch-config.yaml`.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Tables owned by this service. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id UUID PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        suspended BOOLEAN NOT NULL DEFAULT FALSE,
        compute_reference TEXT,
        revision BIGINT NOT NULL,
        suspended_at_revision BIGINT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_nodes_suspended ON nodes (suspended) WHERE suspended",
    r#"
    CREATE TABLE IF NOT EXISTS kill_switch_audit (
        id UUID PRIMARY KEY,
        action TEXT NOT NULL,
        target_node_id UUID NOT NULL,
        operator_id TEXT NOT NULL,
        transition_revision BIGINT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        detail TEXT NOT NULL,
        results JSONB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_kill_switch_audit_transition
        ON kill_switch_audit (target_node_id, transition_revision)
    "#,
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    /// Connect and make sure the schema exists
    pub async fn connect_and_bootstrap(connection_string: &str) -> Result<Self> {
        let db = Self::new(connection_string).await?;
        db.ensure_schema().await?;
        Ok(db)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to bootstrap database schema")?;
        }
        info!(tables = "nodes, kill_switch_audit", "Database schema ready");
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
