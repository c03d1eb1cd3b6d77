// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Connection Registry
//!
//! In-memory map from agent identity to its live push-stream handle. The
//! registry never owns the transport: it depends only on the one-method
//! [`PushSender`] capability, so the dispatch path and its tests never need
//! a network stack.
//!
//! Concurrency discipline: one lock around the map, held only long enough
//! to mutate or to clone a sender out. [`ConnectionRegistry::dispatch`]
//! performs the potentially blocking send *outside* the lock, so a stuck
//! agent cannot stall registration of unrelated agents.
//!
//! Duplicate registrations for the same identity are resolved
//! last-writer-wins: the old entry is replaced (logged at warn, not an
//! error) and its push handle abandoned; closing the displaced transport
//! remains the transport layer's job. Deregistration is fenced by a
//! [`SessionToken`], so the late disconnect of a displaced session never
//! removes its successor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::agent::AgentId;

/// Interval at which [`ConnectionRegistry::wait_for_connection`] re-checks
/// the map.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One unit of work delivered to a connected agent. The payload is opaque
/// to the registry; the scheduler and the agent agree on its contents.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub payload: Vec<u8>,
}

impl WorkItem {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushSendError {
    #[error("push stream closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// The single capability the registry needs from a transport: deliver one
/// work item or fail.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn deliver(&self, item: WorkItem) -> Result<(), PushSendError>;
}

/// Fencing token minted per registration. A deregister only takes effect
/// while its token still names the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(Uuid);

/// In-memory record of one connected agent. Never persisted; destroyed on
/// stream end or replacement.
#[derive(Clone)]
pub struct ConnectedAgentSession {
    pub id: AgentId,
    pub token: SessionToken,
    pub display_label: String,
    pub connected_at: DateTime<Utc>,
    sender: Arc<dyn PushSender>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("agent {0} is not connected")]
    AgentNotConnected(AgentId),

    #[error("dispatch to agent {id} failed: {source}")]
    DispatchFailed {
        id: AgentId,
        #[source]
        source: PushSendError,
    },

    #[error("timed out waiting for agent {0} to connect")]
    Timeout(AgentId),
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<AgentId, ConnectedAgentSession>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `identity`. Replacement abandons
    /// the old push handle; the invariant is at most one session per
    /// identity at any instant.
    pub fn register(
        &self,
        id: AgentId,
        display_label: impl Into<String>,
        sender: Arc<dyn PushSender>,
    ) -> SessionToken {
        let token = SessionToken(Uuid::new_v4());
        let session = ConnectedAgentSession {
            id,
            token,
            display_label: display_label.into(),
            connected_at: Utc::now(),
            sender,
        };

        let count = {
            let mut sessions = self.sessions.write();
            if let Some(old) = sessions.insert(id, session) {
                tracing::warn!(
                    agent = %id,
                    label = %old.display_label,
                    "replacing live session for already-connected agent"
                );
            }
            sessions.len()
        };
        metrics::gauge!("warden_connected_agents").set(count as f64);
        token
    }

    /// Remove the session if `token` still names it. A stale token (the
    /// session was already replaced) is a no-op, not an error; expected
    /// when disconnect detection fires after a newer registration.
    pub fn deregister(&self, id: AgentId, token: SessionToken) -> bool {
        let (removed, count) = {
            let mut sessions = self.sessions.write();
            let removed = match sessions.get(&id) {
                Some(current) if current.token == token => {
                    sessions.remove(&id);
                    true
                }
                _ => false,
            };
            (removed, sessions.len())
        };
        if removed {
            metrics::gauge!("warden_connected_agents").set(count as f64);
        }
        removed
    }

    pub fn is_connected(&self, id: AgentId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Point-in-time copy of all sessions; mutating the result never
    /// affects the registry.
    pub fn snapshot(&self) -> Vec<ConnectedAgentSession> {
        self.sessions.read().values().cloned().collect()
    }

    /// Forward a work item to the agent's push handle. No retry here;
    /// retry policy belongs to the scheduling caller.
    pub async fn dispatch(&self, id: AgentId, item: WorkItem) -> Result<(), DispatchError> {
        let sender = {
            let sessions = self.sessions.read();
            match sessions.get(&id) {
                Some(session) => session.sender.clone(),
                None => return Err(DispatchError::AgentNotConnected(id)),
            }
        };

        // Send outside the lock: a slow agent must not block the map.
        sender
            .deliver(item)
            .await
            .map_err(|source| DispatchError::DispatchFailed { id, source })
    }

    /// Block until `id` is connected, polling at a fixed interval, or until
    /// the deadline passes / the caller's context is cancelled.
    pub async fn wait_for_connection(
        &self,
        id: AgentId,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let poll = async {
            loop {
                if self.is_connected(id) {
                    return;
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        };

        tokio::select! {
            outcome = tokio::time::timeout(deadline, poll) => match outcome {
                Ok(()) => Ok(()),
                Err(_) => Err(DispatchError::Timeout(id)),
            },
            _ = cancel.cancelled() => Err(DispatchError::Timeout(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Channel-backed sender; enough transport for the registry.
    struct ChannelSender(mpsc::Sender<WorkItem>);

    #[async_trait]
    impl PushSender for ChannelSender {
        async fn deliver(&self, item: WorkItem) -> Result<(), PushSendError> {
            self.0.send(item).await.map_err(|_| PushSendError::Closed)
        }
    }

    fn channel_sender() -> (Arc<dyn PushSender>, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ChannelSender(tx)), rx)
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_agent() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (sender, mut rx) = channel_sender();
        registry.register(id, "backup-01", sender);

        registry
            .dispatch(id, WorkItem::new(b"snapshot".to_vec()))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload, b"snapshot");
    }

    #[tokio::test]
    async fn dispatch_to_absent_agent_fails_without_side_effects() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();

        let result = registry.dispatch(id, WorkItem::new(vec![])).await;
        assert!(matches!(result, Err(DispatchError::AgentNotConnected(_))));
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_failure_wraps_transport_error() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (sender, rx) = channel_sender();
        drop(rx); // transport gone
        registry.register(id, "backup-01", sender);

        let result = registry.dispatch(id, WorkItem::new(vec![])).await;
        assert!(matches!(result, Err(DispatchError::DispatchFailed { .. })));
    }

    #[tokio::test]
    async fn second_register_replaces_never_duplicates() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (first, mut first_rx) = channel_sender();
        let (second, mut second_rx) = channel_sender();

        registry.register(id, "backup-01", first);
        registry.register(id, "backup-01", second);
        assert_eq!(registry.connected_count(), 1);

        registry
            .dispatch(id, WorkItem::new(b"work".to_vec()))
            .await
            .unwrap();
        assert_eq!(second_rx.recv().await.unwrap().payload, b"work");
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_deregister_after_replacement_is_a_noop() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (first, _first_rx) = channel_sender();
        let (second, mut second_rx) = channel_sender();

        // Session A connects, a duplicate registration replaces it, then
        // A's disconnect detection finally fires.
        let stale = registry.register(id, "backup-01", first);
        registry.register(id, "backup-01", second);
        assert!(!registry.deregister(id, stale));

        // The successor is untouched and still dispatchable.
        assert!(registry.is_connected(id));
        registry
            .dispatch(id, WorkItem::new(b"still here".to_vec()))
            .await
            .unwrap();
        assert_eq!(second_rx.recv().await.unwrap().payload, b"still here");
    }

    #[tokio::test]
    async fn deregister_with_current_token_removes() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (sender, _rx) = channel_sender();

        let token = registry.register(id, "backup-01", sender);
        assert!(registry.deregister(id, token));
        assert!(!registry.is_connected(id));
        // Double deregister is also a no-op.
        assert!(!registry.deregister(id, token));
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_the_registry() {
        let registry = ConnectionRegistry::new();
        let id = AgentId::new();
        let (sender, _rx) = channel_sender();
        registry.register(id, "backup-01", sender);

        let mut snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        snapshot.clear();
        assert_eq!(registry.connected_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_connection_times_out() {
        let registry = ConnectionRegistry::new();
        let cancel = CancellationToken::new();

        let result = registry
            .wait_for_connection(AgentId::new(), Duration::from_secs(2), &cancel)
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }

    #[tokio::test]
    async fn wait_for_connection_sees_registration() {
        let registry = Arc::new(ConnectionRegistry::new());
        let id = AgentId::new();
        let cancel = CancellationToken::new();

        let waiter = {
            let registry = registry.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                registry
                    .wait_for_connection(id, Duration::from_secs(5), &cancel)
                    .await
            })
        };

        let (sender, _rx) = channel_sender();
        registry.register(id, "backup-01", sender);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_wait_returns_timeout() {
        let registry = ConnectionRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = registry
            .wait_for_connection(AgentId::new(), Duration::from_secs(60), &cancel)
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }
}
