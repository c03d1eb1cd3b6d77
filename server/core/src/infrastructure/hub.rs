// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Hub: topic pub/sub for push-style clients
//!
//! Multiplexes server-side events to many WebSocket subscribers by topic.
//! Ownership of the subscriber/topic index is message-passing style: the
//! [`HubRunner`] task is the only writer, and all register/unregister
//! requests arrive as commands on a channel. The index sits behind a lock
//! solely so [`Hub::publish`] can read a consistent snapshot of a topic's
//! subscriber set; the actual enqueue happens outside the lock.
//!
//! Backpressure policy: delivery into a subscriber's outbox is a
//! non-blocking `try_send`. A full outbox forcibly disconnects that
//! subscriber, so one slow reader never throttles the rest of the topic.
//!
//! Per-subscriber state machine: `Connecting -> Active -> Draining -> Closed`,
//! realized by channel lifecycle: registered means active, dropping the
//! outbox sender starts the drain, and the transport closing finishes it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::events::{Envelope, Topic};

/// Bounded pending-message queue per subscriber; overflow disconnects.
pub const OUTBOX_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("event hub is not running")]
    NotRunning,
}

enum HubCommand {
    Subscribe {
        id: SubscriberId,
        topics: HashSet<Topic>,
        outbox: mpsc::Sender<Envelope>,
    },
    Unsubscribe(SubscriberId),
}

struct SubscriberEntry {
    topics: HashSet<Topic>,
    outbox: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct HubIndex {
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    topics: HashMap<Topic, HashSet<SubscriberId>>,
}

/// Registration handed back to the transport on subscribe: the subscriber's
/// identity plus the receive half of its outbox.
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub outbox: mpsc::Receiver<Envelope>,
}

/// Shared hub front end. Cheap to clone via `Arc`; a process runs exactly
/// one [`HubRunner`] behind it.
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    index: Arc<RwLock<HubIndex>>,
}

impl Hub {
    /// Build the hub front end and its runner. [`HubRunner::run`] must be
    /// spawned exactly once before subscriptions mean anything.
    pub fn new() -> (Arc<Self>, HubRunner) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let index = Arc::new(RwLock::new(HubIndex::default()));
        let hub = Arc::new(Self {
            commands,
            index: index.clone(),
        });
        (hub, HubRunner { index, command_rx })
    }

    /// Register a subscriber with a fixed topic set. Returns the outbox
    /// receive half the transport's write loop drains.
    pub fn subscribe(&self, topics: HashSet<Topic>) -> Result<SubscriberHandle, HubError> {
        let id = SubscriberId::new();
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.commands
            .send(HubCommand::Subscribe {
                id,
                topics,
                outbox: outbox_tx,
            })
            .map_err(|_| HubError::NotRunning)?;
        Ok(SubscriberHandle { id, outbox: outbox_rx })
    }

    /// Trigger the unregister path for a subscriber. Safe to call more than
    /// once; unknown ids are ignored by the runner.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.commands.send(HubCommand::Unsubscribe(id));
    }

    /// Fan a message out to every current subscriber of `topic` with a
    /// non-blocking enqueue. Full or closed outboxes get their subscriber
    /// forcibly disconnected. Returns the number of outboxes reached.
    pub fn publish(&self, topic: &Topic, envelope: Envelope) -> usize {
        let targets: Vec<(SubscriberId, mpsc::Sender<Envelope>)> = {
            let index = self.index.read();
            match index.topics.get(topic) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| {
                        index
                            .subscribers
                            .get(id)
                            .map(|entry| (*id, entry.outbox.clone()))
                    })
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, outbox) in targets {
            match outbox.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = %id, topic = %topic, "subscriber outbox full, disconnecting slow consumer");
                    self.unsubscribe(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "subscriber outbox already closed, unregistering");
                    self.unsubscribe(id);
                }
            }
        }
        delivered
    }

    /// Snapshot of the current subscriber count, for metrics/health.
    pub fn connected_count(&self) -> usize {
        self.index.read().subscribers.len()
    }
}

/// Owns the mutable subscriber/topic index. All mutation goes through this
/// loop; `Publish` callers only ever take a read lock.
pub struct HubRunner {
    index: Arc<RwLock<HubIndex>>,
    command_rx: mpsc::UnboundedReceiver<HubCommand>,
}

impl HubRunner {
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }

        // Shutdown: force-disconnect every subscriber. Dropping the outbox
        // senders closes the channels so write loops exit promptly.
        let mut index = self.index.write();
        let count = index.subscribers.len();
        index.subscribers.clear();
        index.topics.clear();
        metrics::gauge!("warden_hub_subscribers").set(0.0);
        info!(disconnected = count, "event hub stopped");
    }

    fn apply(&self, command: HubCommand) {
        let mut index = self.index.write();
        match command {
            HubCommand::Subscribe { id, topics, outbox } => {
                for topic in &topics {
                    index.topics.entry(topic.clone()).or_default().insert(id);
                }
                index.subscribers.insert(id, SubscriberEntry { topics, outbox });
                debug!(subscriber = %id, total = index.subscribers.len(), "subscriber registered");
            }
            HubCommand::Unsubscribe(id) => {
                if let Some(entry) = index.subscribers.remove(&id) {
                    for topic in &entry.topics {
                        if let Some(ids) = index.topics.get_mut(topic) {
                            ids.remove(&id);
                            if ids.is_empty() {
                                index.topics.remove(topic);
                            }
                        }
                    }
                    debug!(subscriber = %id, total = index.subscribers.len(), "subscriber unregistered");
                }
            }
        }
        metrics::gauge!("warden_hub_subscribers").set(index.subscribers.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventType;
    use std::time::Duration;

    fn envelope(topic: &Topic, n: u64) -> Envelope {
        Envelope::new(EventType::JobStatus, topic, serde_json::json!({ "n": n }))
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within deadline");
    }

    fn topics(raw: &[&str]) -> HashSet<Topic> {
        raw.iter().map(|t| Topic::parse(t).unwrap()).collect()
    }

    #[tokio::test]
    async fn publish_reaches_topic_subscribers_only() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let mut on_a = hub.subscribe(topics(&["job:a"])).unwrap();
        let mut on_b = hub.subscribe(topics(&["job:b"])).unwrap();
        wait_until(|| hub.connected_count() == 2).await;

        let topic_a = Topic::parse("job:a").unwrap();
        assert_eq!(hub.publish(&topic_a, envelope(&topic_a, 1)), 1);

        let received = on_a.outbox.recv().await.unwrap();
        assert_eq!(received.payload["n"], 1);
        assert!(on_b.outbox.try_recv().is_err());

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn multi_topic_subscriber_receives_from_each() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let mut sub = hub.subscribe(topics(&["job:a", "agent:x"])).unwrap();
        wait_until(|| hub.connected_count() == 1).await;

        let job = Topic::parse("job:a").unwrap();
        let agent = Topic::parse("agent:x").unwrap();
        hub.publish(&job, envelope(&job, 1));
        hub.publish(&agent, envelope(&agent, 2));

        assert_eq!(sub.outbox.recv().await.unwrap().payload["n"], 1);
        assert_eq!(sub.outbox.recv().await.unwrap().payload["n"], 2);

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_without_stalling_others() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let slow = hub.subscribe(topics(&["job:a"])).unwrap();
        let mut healthy = hub.subscribe(topics(&["job:a"])).unwrap();
        wait_until(|| hub.connected_count() == 2).await;

        let topic = Topic::parse("job:a").unwrap();
        // Fill both outboxes to capacity, then drain only the healthy one.
        for n in 0..OUTBOX_CAPACITY as u64 {
            assert_eq!(hub.publish(&topic, envelope(&topic, n)), 2);
        }
        for n in 0..OUTBOX_CAPACITY as u64 {
            assert_eq!(healthy.outbox.recv().await.unwrap().payload["n"], n);
        }

        // The next publish overflows the saturated subscriber: it is
        // disconnected, while delivery to the healthy one still happens.
        assert_eq!(hub.publish(&topic, envelope(&topic, 99)), 1);
        assert_eq!(healthy.outbox.recv().await.unwrap().payload["n"], 99);
        wait_until(|| hub.connected_count() == 1).await;
        drop(slow);

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_reaches_nobody() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let topic = Topic::parse("job:nobody").unwrap();
        assert_eq!(hub.publish(&topic, envelope(&topic, 1)), 0);

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_force_closes_every_outbox() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let mut sub = hub.subscribe(topics(&["job:a"])).unwrap();
        wait_until(|| hub.connected_count() == 1).await;

        cancel.cancel();
        run.await.unwrap();

        assert_eq!(hub.connected_count(), 0);
        // Outbox sender was dropped by the runner; the receive half drains
        // to channel-closed.
        assert!(sub.outbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (hub, runner) = Hub::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(runner.run(cancel.clone()));

        let sub = hub.subscribe(topics(&["job:a"])).unwrap();
        wait_until(|| hub.connected_count() == 1).await;

        hub.unsubscribe(sub.id);
        hub.unsubscribe(sub.id);
        wait_until(|| hub.connected_count() == 0).await;

        cancel.cancel();
        run.await.unwrap();
    }
}
