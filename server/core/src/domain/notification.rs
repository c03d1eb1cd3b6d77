// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::job::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobSucceeded,
    JobFailed,
    AgentOffline,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::JobSucceeded => "job_succeeded",
            NotificationKind::JobFailed => "job_failed",
            NotificationKind::AgentOffline => "agent_offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "job_succeeded" => Some(NotificationKind::JobSucceeded),
            "job_failed" => Some(NotificationKind::JobFailed),
            "agent_offline" => Some(NotificationKind::AgentOffline),
            _ => None,
        }
    }
}

/// Ephemeral domain event constructed per dispatch. Expanded into one
/// persisted notification row per eligible recipient, one hub publication
/// per recipient, and at most one email batch and one webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
}

impl NotificationEvent {
    pub fn job_succeeded(job_id: JobId, agent_id: AgentId, policy_name: &str) -> Self {
        Self {
            kind: NotificationKind::JobSucceeded,
            title: format!("Backup succeeded: {}", policy_name),
            body: format!("Job {} completed successfully.", job_id),
            payload: serde_json::json!({
                "job_id": job_id,
                "agent_id": agent_id,
                "policy": policy_name,
            }),
        }
    }

    pub fn job_failed(job_id: JobId, agent_id: AgentId, policy_name: &str, error: &str) -> Self {
        Self {
            kind: NotificationKind::JobFailed,
            title: format!("Backup failed: {}", policy_name),
            body: format!("Job {} failed: {}", job_id, error),
            payload: serde_json::json!({
                "job_id": job_id,
                "agent_id": agent_id,
                "policy": policy_name,
                "error": error,
            }),
        }
    }

    pub fn agent_offline(agent_id: AgentId, hostname: &str) -> Self {
        Self {
            kind: NotificationKind::AgentOffline,
            title: format!("Agent offline: {}", hostname),
            body: format!("Agent {} ({}) stopped responding.", hostname, agent_id),
            payload: serde_json::json!({
                "agent_id": agent_id,
                "hostname": hostname,
            }),
        }
    }
}

/// Persisted in-app notification, one row per recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_recipient(event: &NotificationEvent, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: event.kind,
            title: event.title.clone(),
            body: event.body.clone(),
            payload: event.payload.clone(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_event_carries_error_text() {
        let job = JobId::new();
        let agent = AgentId::new();
        let event = NotificationEvent::job_failed(job, agent, "nightly-docs", "repository locked");

        assert_eq!(event.kind, NotificationKind::JobFailed);
        assert!(event.body.contains("repository locked"));
        assert_eq!(event.payload["policy"], "nightly-docs");
    }

    #[test]
    fn recipient_rows_start_unread() {
        let event = NotificationEvent::agent_offline(AgentId::new(), "backup-02");
        let row = Notification::for_recipient(&event, Uuid::new_v4());
        assert!(!row.read);
        assert_eq!(row.kind, NotificationKind::AgentOffline);
    }
}
