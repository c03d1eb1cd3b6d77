// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Job Repository
//!
//! Job status transitions and bulk log writes. Scheduling and job creation
//! live outside the core; this repository only records what agents report.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::AgentId;
use crate::domain::job::{JobId, JobLogEntry, JobStatus};
use crate::domain::repository::{JobRepository, RepositoryError};

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn record_status(
        &self,
        job_id: JobId,
        agent_id: AgentId,
        status: JobStatus,
        message: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3, status_message = $4, updated_at = NOW()
            WHERE id = $1 AND agent_id = $2
            "#,
        )
        .bind(job_id.0)
        .bind(agent_id.0)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to record job status: {}", e)))?;
        Ok(())
    }

    async fn has_pending(&self, agent_id: AgentId) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending FROM jobs WHERE agent_id = $1 AND status = 'pending'",
        )
        .bind(agent_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let pending: i64 = row.get("pending");
        Ok(pending > 0)
    }

    async fn find_policy_name(&self, job_id: JobId) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT p.name AS policy_name
            FROM jobs j
            JOIN policies p ON p.id = j.policy_id
            WHERE j.id = $1
            "#,
        )
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("policy_name")))
    }

    async fn append_logs(
        &self,
        job_id: Option<JobId>,
        entries: &[JobLogEntry],
    ) -> Result<(), RepositoryError> {
        if entries.is_empty() {
            return Ok(());
        }

        // One multi-row insert per completed stream, not one write per line.
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO job_logs (job_id, logged_at, level, text) ",
        );
        builder.push_values(entries, |mut row, entry| {
            row.push_bind(job_id.map(|j| j.0))
                .push_bind(entry.timestamp)
                .push_bind(&entry.level)
                .push_bind(&entry.text);
        });

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to append job logs: {}", e)))?;
        Ok(())
    }
}
