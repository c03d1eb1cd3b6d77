// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable opaque identity of one backup agent, assigned at first
/// registration and kept across reconnects. The persistence layer owns it;
/// the connection registry only uses it as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Connectivity status as persisted in the agents table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "online" => AgentStatus::Online,
            "error" => AgentStatus::Error,
            _ => AgentStatus::Offline,
        }
    }
}

/// Agent aggregate as persisted.
///
/// `deleted_at` is the soft-delete marker; deleted rows are excluded from
/// every lookup the core performs, including hostname upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub hostname: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub status: AgentStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// New registration: agents start offline and transition to online only
    /// once their push stream opens.
    pub fn register(hostname: String, version: String, os: String, arch: String) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            hostname,
            version,
            os,
            arch,
            status: AgentStatus::Offline,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Refresh version/os/arch metadata on re-registration of a known
    /// hostname.
    pub fn refresh_metadata(&mut self, version: String, os: String, arch: String) {
        self.version = version;
        self.os = os;
        self.arch = arch;
        self.updated_at = Utc::now();
    }

    /// Human-readable label used in logs and the UI.
    pub fn display_name(&self) -> &str {
        &self.hostname
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registration_starts_offline() {
        let agent = Agent::register(
            "backup-01".to_string(),
            "1.4.2".to_string(),
            "linux".to_string(),
            "x86_64".to_string(),
        );
        assert_eq!(agent.status, AgentStatus::Offline);
        assert!(agent.last_seen_at.is_none());
        assert!(!agent.is_deleted());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [AgentStatus::Online, AgentStatus::Offline, AgentStatus::Error] {
            assert_eq!(AgentStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_string_maps_to_offline() {
        assert_eq!(AgentStatus::from_str("degraded"), AgentStatus::Offline);
    }
}
