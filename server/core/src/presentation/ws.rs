// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! WebSocket transport for event hub subscribers.
//!
//! `GET /ws?topics=a,b&user_id=<uuid>` upgrades the connection, registers a
//! subscriber with the topic set fixed at connect time, and runs one reader
//! and one writer task for the socket's lifetime.
//!
//! Liveness: the writer sends a keepalive envelope every
//! [`KEEPALIVE_PERIOD`] (90 % of the read-timeout window); the reader arms a
//! [`READ_TIMEOUT`] deadline that any inbound frame resets. A silent peer is
//! treated as dead and unregistered. Clients send only protocol-level
//! keepalive acknowledgments, never application messages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::{Envelope, Topic};
use crate::infrastructure::hub::Hub;
use crate::presentation::api::AppState;

pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(54);

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Comma-separated topic list, fixed for the connection's lifetime.
    #[serde(default)]
    pub topics: String,
    /// Identity credential naming the `notifications:<user-id>` audience.
    pub user_id: Option<Uuid>,
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let topics = parse_topics(&query.topics, query.user_id);
    if topics.is_empty() {
        return (StatusCode::BAD_REQUEST, "no topics requested").into_response();
    }

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(hub, socket, topics))
        .into_response()
}

fn parse_topics(raw: &str, user_id: Option<Uuid>) -> HashSet<Topic> {
    let mut topics: HashSet<Topic> = raw.split(',').filter_map(Topic::parse).collect();
    if let Some(user_id) = user_id {
        topics.insert(Topic::notifications(user_id));
    }
    topics
}

async fn handle_socket(hub: Arc<Hub>, socket: WebSocket, topics: HashSet<Topic>) {
    let handle = match hub.subscribe(topics) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "rejecting websocket: hub unavailable");
            return;
        }
    };
    let id = handle.id;
    let mut outbox = handle.outbox;
    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the outbox, interleaved with keepalive probes.
    let mut send_task = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
        loop {
            tokio::select! {
                envelope = outbox.recv() => match envelope {
                    Some(envelope) => {
                        let text = match serde_json::to_string(&envelope) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "dropping unserializable envelope");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Outbox closed: the hub disconnected us (backpressure
                    // or shutdown). Flush is done, exit.
                    None => break,
                },
                _ = keepalive.tick() => {
                    let probe = serde_json::to_string(&Envelope::keepalive())
                        .unwrap_or_default();
                    if sender.send(Message::Text(probe.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // Reader: any inbound frame re-arms the deadline; silence kills the
    // connection.
    let mut recv_task = tokio::spawn(async move {
        loop {
            match tokio::time::timeout(READ_TIMEOUT, receiver.next()).await {
                Ok(Some(Ok(Message::Close(_)))) => break,
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    debug!(subscriber = %id, "websocket read timeout, dropping dead connection");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unsubscribe(id);
    debug!(subscriber = %id, "websocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topics_splits_and_trims() {
        let topics = parse_topics("job:a, agent:b,,  ", None);
        assert_eq!(topics.len(), 2);
        assert!(topics.contains(&Topic::parse("job:a").unwrap()));
        assert!(topics.contains(&Topic::parse("agent:b").unwrap()));
    }

    #[test]
    fn user_identity_adds_notification_topic() {
        let user = Uuid::new_v4();
        let topics = parse_topics("job:a", Some(user));
        assert!(topics.contains(&Topic::notifications(user)));
    }

    #[test]
    fn empty_request_yields_no_topics() {
        assert!(parse_topics("", None).is_empty());
        assert!(parse_topics(" , ,", None).is_empty());
    }

    #[test]
    fn keepalive_period_is_within_read_timeout() {
        assert!(KEEPALIVE_PERIOD < READ_TIMEOUT);
    }
}
