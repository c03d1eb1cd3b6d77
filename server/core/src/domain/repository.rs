// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate the core touches, following the
//! Repository pattern: interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentRepository` | `Agent` | `InMemoryAgentRepository`, `PostgresAgentRepository` |
//! | `SettingsRepository` | settings key/value | `InMemorySettingsRepository`, `PostgresSettingsRepository` |
//! | `NotificationRepository` | `Notification` | `InMemoryNotificationRepository`, `PostgresNotificationRepository` |
//! | `UserRepository` | `User` | `InMemoryUserRepository`, `PostgresUserRepository` |
//! | `JobRepository` | job status + logs | `InMemoryJobRepository`, `PostgresJobRepository` |
//!
//! The relational schema itself is owned by the persistence layer; the core
//! depends only on these contracts. Soft-deleted rows are excluded from
//! every lookup defined here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentId, AgentStatus};
use crate::domain::job::{JobId, JobLogEntry, JobStatus};
use crate::domain::notification::Notification;
use crate::domain::user::User;

/// Repository interface for Agent aggregates.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save agent (create or update).
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;

    /// Find agent by ID.
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;

    /// Find agent by hostname, excluding soft-deleted rows. Used by the
    /// upsert-by-hostname registration path.
    async fn find_by_hostname(&self, hostname: &str) -> Result<Option<Agent>, RepositoryError>;

    /// Update connectivity status only.
    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), RepositoryError>;

    /// Refresh last-seen and status in one write (heartbeat bookkeeping).
    async fn touch_last_seen(
        &self,
        id: AgentId,
        at: DateTime<Utc>,
        status: AgentStatus,
    ) -> Result<(), RepositoryError>;

    /// List all non-deleted agents.
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;
}

/// Repository interface for the dotted-key settings store.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;

    /// All keys under a dotted prefix (e.g. `smtp.`), returned as a map of
    /// full key to value.
    async fn get_namespace(&self, prefix: &str)
        -> Result<HashMap<String, String>, RepositoryError>;
}

/// Repository interface for persisted in-app notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError>;

    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>, RepositoryError>;

    async fn mark_read(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Repository interface for user accounts, as far as the core needs them:
/// recipient resolution for notification dispatch.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError>;
}

/// Job persistence collaborator: status transitions, pending-work lookups
/// and bulk log writes. Job scheduling itself lives outside the core.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn record_status(
        &self,
        job_id: JobId,
        agent_id: AgentId,
        status: JobStatus,
        message: &str,
    ) -> Result<(), RepositoryError>;

    /// Whether queued work exists for the agent (heartbeat response flag).
    async fn has_pending(&self, agent_id: AgentId) -> Result<bool, RepositoryError>;

    /// Human-readable policy name behind a job, for notification context.
    async fn find_policy_name(&self, job_id: JobId) -> Result<Option<String>, RepositoryError>;

    /// Single bulk write performed when a log ingestion stream completes.
    async fn append_logs(
        &self,
        job_id: Option<JobId>,
        entries: &[JobLogEntry],
    ) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
