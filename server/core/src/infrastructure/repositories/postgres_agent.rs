// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Agent Repository
//!
//! Production `AgentRepository` implementation backed by the `agents` table
//! via `sqlx`. Soft-deleted rows (`deleted_at IS NOT NULL`) are invisible
//! to every lookup, including the hostname upsert path.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::{Agent, AgentId, AgentStatus};
use crate::domain::repository::{AgentRepository, RepositoryError};

pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn agent_from_row(row: &sqlx::postgres::PgRow) -> Agent {
    let status: String = row.get("status");
    Agent {
        id: AgentId(row.get("id")),
        hostname: row.get("hostname"),
        version: row.get("version"),
        os: row.get("os"),
        arch: row.get("arch"),
        status: AgentStatus::from_str(&status),
        last_seen_at: row.get("last_seen_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

const AGENT_COLUMNS: &str =
    "id, hostname, version, os, arch, status, last_seen_at, created_at, updated_at, deleted_at";

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, hostname, version, os, arch, status,
                last_seen_at, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                version = EXCLUDED.version,
                os = EXCLUDED.os,
                arch = EXCLUDED.arch,
                status = EXCLUDED.status,
                last_seen_at = EXCLUDED.last_seen_at,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(agent.id.0)
        .bind(&agent.hostname)
        .bind(&agent.version)
        .bind(&agent.os)
        .bind(&agent.arch)
        .bind(agent.status.as_str())
        .bind(agent.last_seen_at)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .bind(agent.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save agent: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.as_ref().map(agent_from_row))
    }

    async fn find_by_hostname(&self, hostname: &str) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE hostname = $1 AND deleted_at IS NULL"
        ))
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.as_ref().map(agent_from_row))
    }

    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE agents SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn touch_last_seen(
        &self,
        id: AgentId,
        at: chrono::DateTime<chrono::Utc>,
        status: AgentStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE agents SET last_seen_at = $2, status = $3, updated_at = $2 WHERE id = $1",
        )
        .bind(id.0)
        .bind(at)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE deleted_at IS NULL ORDER BY hostname ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(rows.iter().map(agent_from_row).collect())
    }
}
