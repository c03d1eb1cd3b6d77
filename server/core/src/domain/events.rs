// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Event envelopes pushed to WebSocket subscribers.
//!
//! Topics are plain `<kind>:<id>` strings; subscribers opt into a fixed set
//! at connect time and the hub fans every publication out to the matching
//! outboxes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::job::JobId;

/// Named pub/sub channel on the event hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn job(id: JobId) -> Self {
        Self(format!("job:{}", id.0))
    }

    pub fn agent(id: AgentId) -> Self {
        Self(format!("agent:{}", id.0))
    }

    pub fn notifications(user_id: Uuid) -> Self {
        Self(format!("notifications:{}", user_id))
    }

    /// Topic as supplied by a subscriber at connect time. No validation
    /// beyond non-emptiness: a topic nobody publishes to simply never
    /// receives anything.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    JobStatus,
    JobLog,
    AgentStatus,
    AgentMetrics,
    Notification,
    KeepalivePing,
}

/// JSON envelope delivered over the WebSocket: `{ type, topic, payload }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(event_type: EventType, topic: &Topic, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            topic: topic.as_str().to_string(),
            payload,
        }
    }

    /// Liveness probe sent by the write loop; carries no topic.
    pub fn keepalive() -> Self {
        Self {
            event_type: EventType::KeepalivePing,
            topic: String::new(),
            payload: serde_json::Value::Null,
        }
    }
}
