// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end agent gateway test over a real TCP transport: shared-secret
//! auth, registration upsert, heartbeat, and client-streaming log ingestion
//! with its single bulk write.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::Request;

use warden_core::application::connections::ConnectionRegistry;
use warden_core::application::notifier::Notifier;
use warden_core::infrastructure::email::SmtpMailer;
use warden_core::infrastructure::hub::Hub;
use warden_core::infrastructure::repositories::{
    InMemoryAgentRepository, InMemoryJobRepository, InMemoryNotificationRepository,
    InMemorySettingsRepository, InMemoryUserRepository,
};
use warden_core::infrastructure::webhook::WebhookClient;
use warden_core::presentation::grpc::server::warden_agent::agent_gateway_client::AgentGatewayClient;
use warden_core::presentation::grpc::server::warden_agent::{
    HeartbeatRequest, LogEntry, RegisterRequest,
};
use warden_core::presentation::grpc::{AgentGatewayService, AUTH_METADATA_KEY};

const SECRET: &str = "e2e-shared-secret";

struct Server {
    address: String,
    jobs: InMemoryJobRepository,
    shutdown: CancellationToken,
    hub_cancel: CancellationToken,
}

async fn start_server() -> Server {
    let (hub, runner) = Hub::new();
    let hub_cancel = CancellationToken::new();
    tokio::spawn(runner.run(hub_cancel.clone()));

    let jobs = InMemoryJobRepository::new();
    let shutdown = CancellationToken::new();

    let notifier = Arc::new(Notifier::new(
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryNotificationRepository::new()),
        Arc::new(InMemorySettingsRepository::new()),
        hub.clone(),
        Arc::new(SmtpMailer),
        Arc::new(WebhookClient::new()),
        None,
    ));

    let service = AgentGatewayService::new(
        Arc::new(InMemoryAgentRepository::new()),
        Arc::new(jobs.clone()),
        Arc::new(ConnectionRegistry::new()),
        hub,
        notifier,
        Some(SECRET.to_string()),
        shutdown.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());

    let drain = shutdown.clone();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), drain.cancelled_owned())
            .await
            .unwrap();
    });

    Server {
        address,
        jobs,
        shutdown,
        hub_cancel,
    }
}

async fn connect(address: &str) -> AgentGatewayClient<tonic::transport::Channel> {
    for _ in 0..50 {
        if let Ok(client) = AgentGatewayClient::connect(address.to_string()).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("gateway did not come up at {address}");
}

fn authed<T>(message: T) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(AUTH_METADATA_KEY, MetadataValue::from_static(SECRET));
    request
}

fn register_request() -> RegisterRequest {
    RegisterRequest {
        hostname: "backup-e2e".to_string(),
        version: "1.4.2".to_string(),
        os: "linux".to_string(),
        arch: "x86_64".to_string(),
    }
}

#[tokio::test]
async fn gateway_round_trip_over_tcp() {
    let server = start_server().await;
    let mut client = connect(&server.address).await;

    // Missing credential is rejected before any handler logic runs.
    let status = client
        .register(Request::new(register_request()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    // Registration with the shared secret yields a stable identity.
    let first = client
        .register(authed(register_request()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(first.display_name, "backup-e2e");

    let second = client
        .register(authed(register_request()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(first.agent_id, second.agent_id);

    // Heartbeat keeps the liveness loop alive.
    let heartbeat = client
        .heartbeat(authed(HeartbeatRequest {
            agent_id: first.agent_id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!heartbeat.has_pending_work);

    // Client-streaming ingestion: three entries, one bulk write, count back.
    let job_id = uuid::Uuid::new_v4().to_string();
    let entries: Vec<LogEntry> = (0..3)
        .map(|n| LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: "info".to_string(),
            text: format!("restic pass {n}"),
            job_id: job_id.clone(),
        })
        .collect();

    let response = client
        .ingest_logs(authed(tokio_stream::iter(entries)))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.entries_received, 3);
    assert_eq!(server.jobs.log_count(), 3);

    server.shutdown.cancel();
    server.hub_cancel.cancel();
}
