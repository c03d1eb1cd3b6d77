// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository contracts defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Production implementations backed by PostgreSQL via `sqlx`:
//! - **PostgresAgentRepository** - agents table
//! - **PostgresSettingsRepository** - dotted-key settings store
//! - **PostgresNotificationRepository** - per-recipient notification rows
//! - **PostgresUserRepository** - user accounts (recipient resolution)
//! - **PostgresJobRepository** - job status transitions and bulk log writes
//!
//! ## In-Memory Repositories
//!
//! Lightweight implementations for testing and development, HashMap-backed
//! and thread-safe.

pub mod postgres_agent;
pub mod postgres_settings;
pub mod postgres_notification;
pub mod postgres_user;
pub mod postgres_job;

pub use postgres_agent::PostgresAgentRepository;
pub use postgres_settings::PostgresSettingsRepository;
pub use postgres_notification::PostgresNotificationRepository;
pub use postgres_user::PostgresUserRepository;
pub use postgres_job::PostgresJobRepository;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentId, AgentStatus};
use crate::domain::job::{JobId, JobLogEntry, JobStatus};
use crate::domain::notification::Notification;
use crate::domain::repository::{
    AgentRepository, JobRepository, NotificationRepository, RepositoryError, SettingsRepository,
    UserRepository,
};
use crate::domain::user::User;

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.agents.write().insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn find_by_hostname(&self, hostname: &str) -> Result<Option<Agent>, RepositoryError> {
        Ok(self
            .agents
            .read()
            .values()
            .find(|a| a.hostname == hostname && !a.is_deleted())
            .cloned())
    }

    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("agent {id}")))?;
        agent.status = status;
        agent.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_last_seen(
        &self,
        id: AgentId,
        at: DateTime<Utc>,
        status: AgentStatus,
    ) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("agent {id}")))?;
        agent.last_seen_at = Some(at);
        agent.status = status;
        agent.updated_at = at;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self
            .agents
            .read()
            .values()
            .filter(|a| !a.is_deleted())
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.entries.write();
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        }
        repo
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_namespace(
        &self,
        prefix: &str,
    ) -> Result<HashMap<String, String>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    rows: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError> {
        self.rows.write().push(notification.clone());
        Ok(())
    }

    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("notification {id}")))?;
        row.read = true;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<Vec<User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .iter()
            .filter(|u| u.is_notifiable_admin())
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedStatus {
    pub job_id: JobId,
    pub agent_id: AgentId,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    statuses: Arc<RwLock<Vec<RecordedStatus>>>,
    pending: Arc<RwLock<HashMap<AgentId, bool>>>,
    policies: Arc<RwLock<HashMap<JobId, String>>>,
    logs: Arc<RwLock<Vec<(Option<JobId>, JobLogEntry)>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&self, agent_id: AgentId, pending: bool) {
        self.pending.write().insert(agent_id, pending);
    }

    pub fn set_policy_name(&self, job_id: JobId, name: &str) {
        self.policies.write().insert(job_id, name.to_string());
    }

    pub fn recorded_statuses(&self) -> Vec<RecordedStatus> {
        self.statuses.read().clone()
    }

    pub fn log_count(&self) -> usize {
        self.logs.read().len()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn record_status(
        &self,
        job_id: JobId,
        agent_id: AgentId,
        status: JobStatus,
        message: &str,
    ) -> Result<(), RepositoryError> {
        self.statuses.write().push(RecordedStatus {
            job_id,
            agent_id,
            status,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn has_pending(&self, agent_id: AgentId) -> Result<bool, RepositoryError> {
        Ok(self.pending.read().get(&agent_id).copied().unwrap_or(false))
    }

    async fn find_policy_name(&self, job_id: JobId) -> Result<Option<String>, RepositoryError> {
        Ok(self.policies.read().get(&job_id).cloned())
    }

    async fn append_logs(
        &self,
        job_id: Option<JobId>,
        entries: &[JobLogEntry],
    ) -> Result<(), RepositoryError> {
        let mut logs = self.logs.write();
        for entry in entries {
            logs.push((job_id, entry.clone()));
        }
        Ok(())
    }
}
