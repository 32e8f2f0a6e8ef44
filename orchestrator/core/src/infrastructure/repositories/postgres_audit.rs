// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Audit Repository
//!
//! Append-only `AuditRepository` backed by `kill_switch_audit`. Rows are
//! never updated. The unique index on `(target_node_id, transition_revision)`
//! turns a second record for the same suspension into
//! `RepositoryError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::audit::{AuditEntry, AuditEntryId};
use crate::domain::deactivation::ActionResult;
use crate::domain::node::{NodeId, OperatorId};
use crate::domain::repository::{AuditRepository, RepositoryError};

const AUDIT_COLUMNS: &str =
    "id, action, target_node_id, operator_id, transition_revision, timestamp, detail, results";

pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, RepositoryError> {
    let id: uuid::Uuid = row.try_get("id")?;
    let target: uuid::Uuid = row.try_get("target_node_id")?;
    let operator_id: String = row.try_get("operator_id")?;
    let transition_revision: i64 = row.try_get("transition_revision")?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
    let results: serde_json::Value = row.try_get("results")?;
    let results: Vec<ActionResult> = serde_json::from_value(results)?;

    Ok(AuditEntry {
        id: AuditEntryId(id),
        action: row.try_get("action")?,
        target_node_id: NodeId(target),
        operator_id: OperatorId(operator_id),
        transition_revision: u64::try_from(transition_revision).map_err(|_| {
            RepositoryError::Serialization(format!("negative transition revision {}", transition_revision))
        })?,
        timestamp,
        detail: row.try_get("detail")?,
        results,
    })
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let results = serde_json::to_value(&entry.results)?;

        sqlx::query(
            r#"
            INSERT INTO kill_switch_audit (
                id, action, target_node_id, operator_id,
                transition_revision, timestamp, detail, results
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.0)
        .bind(&entry.action)
        .bind(entry.target_node_id.0)
        .bind(entry.operator_id.as_str())
        .bind(entry.transition_revision as i64)
        .bind(entry.timestamp)
        .bind(&entry.detail)
        .bind(results)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_transition(
        &self,
        node_id: NodeId,
        transition_revision: u64,
    ) -> Result<Option<AuditEntry>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM kill_switch_audit WHERE target_node_id = $1 AND transition_revision = $2",
            AUDIT_COLUMNS
        ))
        .bind(node_id.0)
        .bind(transition_revision as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn find_by_node(&self, node_id: NodeId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM kill_switch_audit WHERE target_node_id = $1 ORDER BY timestamp DESC",
            AUDIT_COLUMNS
        ))
        .bind(node_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM kill_switch_audit ORDER BY timestamp DESC LIMIT $1",
            AUDIT_COLUMNS
        ))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}
