// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! gRPC Server Implementation for the Warden agent gateway
//! Exposes Register, Heartbeat, OpenPushStream, ReportStatus, IngestLogs
//!
//! Every call is gated by a shared-secret check against call metadata; an
//! absent configured secret disables auth (development only). One long-lived
//! task per push stream monitors transport end and performs cleanup with a
//! context independent of the then-cancelled stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::application::connections::{
    ConnectionRegistry, PushSendError, PushSender, WorkItem,
};
use crate::application::notifier::Notifier;
use crate::domain::agent::{Agent, AgentId, AgentStatus};
use crate::domain::events::{Envelope, EventType, Topic};
use crate::domain::job::{JobId, JobLogEntry, JobStatus};
use crate::domain::repository::{AgentRepository, JobRepository};
use crate::infrastructure::hub::Hub;

// Generated protobuf code
pub mod warden_agent {
    tonic::include_proto!("warden.agent.v1");
}

use warden_agent::agent_gateway_server::{AgentGateway, AgentGatewayServer};
use warden_agent::*;

/// Metadata key agents present their shared-secret credential under.
pub const AUTH_METADATA_KEY: &str = "x-warden-token";

const PUSH_CHANNEL_CAPACITY: usize = 16;

/// Implementation of the AgentGateway gRPC service
pub struct AgentGatewayService {
    agents: Arc<dyn AgentRepository>,
    jobs: Arc<dyn JobRepository>,
    registry: Arc<ConnectionRegistry>,
    hub: Arc<Hub>,
    notifier: Arc<Notifier>,
    shared_secret: Option<String>,
    shutdown: CancellationToken,
}

impl AgentGatewayService {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        jobs: Arc<dyn JobRepository>,
        registry: Arc<ConnectionRegistry>,
        hub: Arc<Hub>,
        notifier: Arc<Notifier>,
        shared_secret: Option<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            agents,
            jobs,
            registry,
            hub,
            notifier,
            shared_secret,
            shutdown,
        }
    }

    /// Create a gRPC server instance
    pub fn into_server(self) -> AgentGatewayServer<Self> {
        AgentGatewayServer::new(self)
    }

    /// Constant-time shared-secret check against call metadata. No
    /// configured secret means auth is disabled.
    fn authorize<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let expected = match &self.shared_secret {
            Some(secret) => secret,
            None => return Ok(()),
        };

        let provided = request
            .metadata()
            .get(AUTH_METADATA_KEY)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Status::unauthenticated("missing agent token"))?;

        if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(Status::unauthenticated("invalid agent token"))
        }
    }

    fn parse_agent_id(raw: &str) -> Result<AgentId, Status> {
        AgentId::from_string(raw)
            .map_err(|e| Status::invalid_argument(format!("Invalid agent_id: {}", e)))
    }

    fn publish_agent_status(&self, id: AgentId, hostname: &str, status: AgentStatus) {
        let topic = Topic::agent(id);
        self.hub.publish(
            &topic,
            Envelope::new(
                EventType::AgentStatus,
                &topic,
                serde_json::json!({
                    "agent_id": id,
                    "hostname": hostname,
                    "status": status,
                }),
            ),
        );
    }
}

/// Push handle registered with the connection registry: delivery into the
/// per-stream channel that backs the agent's server-streaming response.
struct GrpcPushSender {
    tx: mpsc::Sender<Result<WorkAssignment, Status>>,
}

#[async_trait::async_trait]
impl PushSender for GrpcPushSender {
    async fn deliver(&self, item: WorkItem) -> Result<(), PushSendError> {
        let assignment = WorkAssignment {
            id: item.id.to_string(),
            payload: item.payload,
        };
        self.tx
            .send(Ok(assignment))
            .await
            .map_err(|_| PushSendError::Closed)
    }
}

#[tonic::async_trait]
impl AgentGateway for AgentGatewayService {
    type OpenPushStreamStream = ReceiverStream<Result<WorkAssignment, Status>>;

    /// Upsert-by-hostname registration. Registration is client-visible
    /// correctness, so persistence failures surface as internal errors.
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();

        if req.hostname.trim().is_empty() {
            return Err(Status::invalid_argument("hostname must not be empty"));
        }

        let existing = self
            .agents
            .find_by_hostname(&req.hostname)
            .await
            .map_err(|e| Status::internal(format!("Failed to look up agent: {}", e)))?;

        let agent = match existing {
            Some(mut agent) => {
                agent.refresh_metadata(req.version, req.os, req.arch);
                self.agents
                    .save(&agent)
                    .await
                    .map_err(|e| Status::internal(format!("Failed to save agent: {}", e)))?;
                debug!(agent = %agent.id, hostname = %agent.hostname, "agent re-registered");
                agent
            }
            None => {
                let agent = Agent::register(req.hostname, req.version, req.os, req.arch);
                self.agents
                    .save(&agent)
                    .await
                    .map_err(|e| Status::internal(format!("Failed to save agent: {}", e)))?;
                info!(agent = %agent.id, hostname = %agent.hostname, "new agent registered");
                agent
            }
        };

        Ok(Response::new(RegisterResponse {
            agent_id: agent.id.to_string(),
            display_name: agent.display_name().to_string(),
        }))
    }

    /// Liveness ping. Bookkeeping failures are logged and swallowed:
    /// a missed last-seen update must not break the liveness loop.
    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();
        let id = Self::parse_agent_id(&req.agent_id)?;

        if let Err(e) = self
            .agents
            .touch_last_seen(id, Utc::now(), AgentStatus::Online)
            .await
        {
            warn!(agent = %id, error = %e, "heartbeat bookkeeping failed");
        }

        let has_pending_work = match self.jobs.has_pending(id).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(agent = %id, error = %e, "pending-work lookup failed");
                false
            }
        };

        Ok(Response::new(HeartbeatResponse { has_pending_work }))
    }

    /// Open the long-lived work delivery stream for a known agent.
    async fn open_push_stream(
        &self,
        request: Request<OpenPushStreamRequest>,
    ) -> Result<Response<Self::OpenPushStreamStream>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();
        let id = Self::parse_agent_id(&req.agent_id)?;

        let agent = self
            .agents
            .find_by_id(id)
            .await
            .map_err(|e| Status::internal(format!("Failed to look up agent: {}", e)))?
            .ok_or_else(|| Status::not_found(format!("unknown agent {}", id)))?;

        if let Err(e) = self.agents.update_status(id, AgentStatus::Online).await {
            warn!(agent = %id, error = %e, "failed to mark agent online on stream open");
        }

        let (tx, rx) = mpsc::channel::<Result<WorkAssignment, Status>>(PUSH_CHANNEL_CAPACITY);
        let sender: Arc<dyn PushSender> = Arc::new(GrpcPushSender { tx: tx.clone() });
        let token = self.registry.register(id, agent.display_name(), sender);

        info!(agent = %id, hostname = %agent.hostname, "push stream opened");
        self.publish_agent_status(id, &agent.hostname, AgentStatus::Online);

        // Monitor the stream for its whole lifetime. Cleanup persistence
        // runs on its own context: the stream's is already gone by then.
        let registry = self.registry.clone();
        let agents = self.agents.clone();
        let hub = self.hub.clone();
        let shutdown = self.shutdown.clone();
        let hostname = agent.hostname.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {
                    debug!(agent = %id, "push stream transport ended");
                }
                _ = shutdown.cancelled() => {
                    debug!(agent = %id, "push stream closing for server shutdown");
                }
            }

            // A stale token means a newer session replaced this one while
            // its disconnect was still in flight: leave the successor (and
            // the agent's online status) untouched.
            if !registry.deregister(id, token) {
                debug!(agent = %id, "skipping offline transition, session was already replaced");
                return;
            }

            if let Err(e) = agents.update_status(id, AgentStatus::Offline).await {
                warn!(agent = %id, error = %e, "failed to mark agent offline during cleanup");
            }
            let topic = Topic::agent(id);
            hub.publish(
                &topic,
                Envelope::new(
                    EventType::AgentStatus,
                    &topic,
                    serde_json::json!({
                        "agent_id": id,
                        "hostname": hostname,
                        "status": AgentStatus::Offline,
                    }),
                ),
            );
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// Record a job status transition; terminal states additionally fan out
    /// through notification dispatch.
    async fn report_status(
        &self,
        request: Request<ReportStatusRequest>,
    ) -> Result<Response<ReportStatusResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();

        let job_id = JobId::from_string(&req.job_id)
            .map_err(|e| Status::invalid_argument(format!("Invalid job_id: {}", e)))?;
        let agent_id = Self::parse_agent_id(&req.agent_id)?;
        let status = JobStatus::parse(&req.status)
            .ok_or_else(|| Status::invalid_argument(format!("unknown job status {:?}", req.status)))?;

        self.jobs
            .record_status(job_id, agent_id, status, &req.message)
            .await
            .map_err(|e| Status::internal(format!("Failed to record job status: {}", e)))?;

        let topic = Topic::job(job_id);
        self.hub.publish(
            &topic,
            Envelope::new(
                EventType::JobStatus,
                &topic,
                serde_json::json!({
                    "job_id": job_id,
                    "agent_id": agent_id,
                    "status": status,
                    "message": req.message,
                }),
            ),
        );

        if status.is_terminal() {
            let policy_name = self
                .jobs
                .find_policy_name(job_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| format!("job {}", job_id));

            let dispatched = match status {
                JobStatus::Succeeded => {
                    self.notifier
                        .job_succeeded(job_id, agent_id, &policy_name)
                        .await
                }
                JobStatus::Failed => {
                    self.notifier
                        .job_failed(job_id, agent_id, &policy_name, &req.message)
                        .await
                }
                _ => Ok(()),
            };
            if let Err(e) = dispatched {
                warn!(job = %job_id, error = %e, "notification dispatch failed");
            }
        }

        Ok(Response::new(ReportStatusResponse { acknowledged: true }))
    }

    /// Client-streaming log ingestion: entries are buffered for the stream's
    /// lifetime and written in one bulk insert on completion.
    async fn ingest_logs(
        &self,
        request: Request<Streaming<LogEntry>>,
    ) -> Result<Response<IngestLogsResponse>, Status> {
        self.authorize(&request)?;
        let mut stream = request.into_inner();

        let mut buffered: HashMap<Option<JobId>, Vec<JobLogEntry>> = HashMap::new();
        let mut entries_received: u32 = 0;

        while let Some(entry) = stream.message().await? {
            let job_id = if entry.job_id.is_empty() {
                None
            } else {
                Some(
                    JobId::from_string(&entry.job_id)
                        .map_err(|e| Status::invalid_argument(format!("Invalid job_id: {}", e)))?,
                )
            };

            let timestamp = DateTime::parse_from_rfc3339(&entry.timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            let log_entry = JobLogEntry {
                timestamp,
                level: entry.level,
                text: entry.text,
            };

            // Live tail for UI subscribers; persistence stays batched.
            if let Some(job_id) = job_id {
                let topic = Topic::job(job_id);
                self.hub.publish(
                    &topic,
                    Envelope::new(
                        EventType::JobLog,
                        &topic,
                        serde_json::json!({
                            "job_id": job_id,
                            "timestamp": log_entry.timestamp,
                            "level": log_entry.level,
                            "text": log_entry.text,
                        }),
                    ),
                );
            }

            buffered.entry(job_id).or_default().push(log_entry);
            entries_received += 1;
        }

        for (job_id, entries) in &buffered {
            self.jobs
                .append_logs(*job_id, entries)
                .await
                .map_err(|e| Status::internal(format!("Failed to persist logs: {}", e)))?;
        }

        debug!(entries = entries_received, "log ingestion stream completed");
        Ok(Response::new(IngestLogsResponse { entries_received }))
    }
}

/// Start the agent gateway gRPC server with graceful drain on shutdown.
pub async fn start_grpc_server(
    addr: std::net::SocketAddr,
    service: AgentGatewayService,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Warden agent gateway on {}", addr);

    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, shutdown.cancelled_owned())
        .await?;

    Ok(())
}
