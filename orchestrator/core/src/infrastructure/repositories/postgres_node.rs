// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Node Repository
//!
//! `NodeRepository` backed by the `nodes` table. Revisions are stored as
//! `BIGINT`; the stamping itself happens in `NodeService` before `save`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::node::{Node, NodeId, OperatorId};
use crate::domain::repository::{NodeRepository, RepositoryError};

const NODE_COLUMNS: &str = "id, owner_id, name, suspended, compute_reference, revision, \
                            suspended_at_revision, created_at, updated_at";

pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_revision(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Serialization(format!("negative revision {}", value)))
}

fn node_from_row(row: &PgRow) -> Result<Node, RepositoryError> {
    let id: uuid::Uuid = row.try_get("id")?;
    let owner_id: String = row.try_get("owner_id")?;
    let revision: i64 = row.try_get("revision")?;
    let suspended_at_revision: Option<i64> = row.try_get("suspended_at_revision")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Node {
        id: NodeId(id),
        owner_id: OperatorId(owner_id),
        name: row.try_get("name")?,
        suspended: row.try_get("suspended")?,
        compute_reference: row.try_get("compute_reference")?,
        revision: to_revision(revision)?,
        suspended_at_revision: suspended_at_revision.map(to_revision).transpose()?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn save(&self, node: &Node) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO nodes (
                id, owner_id, name, suspended, compute_reference,
                revision, suspended_at_revision, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                name = EXCLUDED.name,
                suspended = EXCLUDED.suspended,
                compute_reference = EXCLUDED.compute_reference,
                revision = EXCLUDED.revision,
                suspended_at_revision = EXCLUDED.suspended_at_revision,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(node.id.0)
        .bind(node.owner_id.as_str())
        .bind(&node.name)
        .bind(node.suspended)
        .bind(node.compute_reference.as_deref())
        .bind(node.revision as i64)
        .bind(node.suspended_at_revision.map(|r| r as i64))
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save node: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM nodes WHERE id = $1", NODE_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(node_from_row).transpose()
    }

    async fn find_suspended(&self) -> Result<Vec<Node>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM nodes WHERE suspended ORDER BY updated_at ASC",
            NODE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {} FROM nodes ORDER BY created_at ASC", NODE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(node_from_row).collect()
    }
}
