// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Notification Dispatch
//!
//! Turns domain events (job succeeded/failed, agent offline) into persisted
//! notification rows, hub publications, and best-effort external deliveries.
//!
//! The persisted row plus the `notifications:<user-id>` hub publication are
//! the authoritative channel and must succeed; email and webhook delivery
//! run afterwards and their failures are logged, never raised. SMTP and
//! webhook configuration is re-read from the settings store on every send
//! so operators see changes take effect without a restart. Missing
//! configuration means a silent skip; present-but-invalid configuration is
//! logged as a misconfiguration warning.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::agent::AgentId;
use crate::domain::events::{Envelope, EventType, Topic};
use crate::domain::job::JobId;
use crate::domain::notification::{Notification, NotificationEvent};
use crate::domain::repository::{
    NotificationRepository, RepositoryError, SettingsRepository, UserRepository,
};
use crate::domain::settings::{SmtpSettings, WebhookSettings};
use crate::infrastructure::email::{Mailer, SmtpConfig};
use crate::infrastructure::hub::Hub;
use crate::infrastructure::secret_codec::{require_codec, SecretCodec, SecretCodecError};
use crate::infrastructure::webhook::{WebhookClient, WebhookConfig};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct Notifier {
    users: Arc<dyn UserRepository>,
    notifications: Arc<dyn NotificationRepository>,
    settings: Arc<dyn SettingsRepository>,
    hub: Arc<Hub>,
    mailer: Arc<dyn Mailer>,
    webhooks: Arc<WebhookClient>,
    codec: Option<Arc<SecretCodec>>,
}

impl Notifier {
    pub fn new(
        users: Arc<dyn UserRepository>,
        notifications: Arc<dyn NotificationRepository>,
        settings: Arc<dyn SettingsRepository>,
        hub: Arc<Hub>,
        mailer: Arc<dyn Mailer>,
        webhooks: Arc<WebhookClient>,
        codec: Option<Arc<SecretCodec>>,
    ) -> Self {
        Self {
            users,
            notifications,
            settings,
            hub,
            mailer,
            webhooks,
            codec,
        }
    }

    pub async fn job_succeeded(
        &self,
        job_id: JobId,
        agent_id: AgentId,
        policy_name: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(NotificationEvent::job_succeeded(job_id, agent_id, policy_name))
            .await
    }

    pub async fn job_failed(
        &self,
        job_id: JobId,
        agent_id: AgentId,
        policy_name: &str,
        error: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(NotificationEvent::job_failed(job_id, agent_id, policy_name, error))
            .await
    }

    pub async fn agent_offline(
        &self,
        agent_id: AgentId,
        hostname: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(NotificationEvent::agent_offline(agent_id, hostname))
            .await
    }

    /// Single funnel for every event kind: persist + publish per recipient,
    /// then attempt the supplementary channels.
    async fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let recipients = self.users.list_active_admins().await?;

        let mut addresses = Vec::with_capacity(recipients.len());
        for user in &recipients {
            let row = Notification::for_recipient(&event, user.id);
            self.notifications.insert(&row).await?;

            let topic = Topic::notifications(user.id);
            self.hub.publish(
                &topic,
                Envelope::new(EventType::Notification, &topic, serde_json::to_value(&row)?),
            );
            addresses.push(user.email.clone());
        }

        self.send_email(&event, &addresses).await;
        self.send_webhook(&event).await;
        Ok(())
    }

    async fn send_email(&self, event: &NotificationEvent, recipients: &[String]) {
        if recipients.is_empty() {
            return;
        }

        let map = match self.settings.get_namespace("smtp.").await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "failed to load smtp settings, skipping email delivery");
                return;
            }
        };

        let parsed = match SmtpSettings::from_map(&map) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                debug!("smtp not configured, skipping email delivery");
                return;
            }
            Err(e) => {
                warn!(error = %e, "smtp settings are misconfigured, skipping email delivery");
                return;
            }
        };

        let password = match &parsed.password {
            Some(sealed) => match self.open_secret(sealed) {
                Ok(password) => Some(password),
                Err(e) => {
                    error!(error = %e, "cannot open smtp password");
                    return;
                }
            },
            None => None,
        };

        let config = SmtpConfig {
            host: parsed.host,
            port: parsed.port,
            username: parsed.username,
            password,
            from: parsed.from,
        };

        if let Err(e) = self
            .mailer
            .send_batch(&config, recipients, &event.title, &event.body)
            .await
        {
            warn!(error = %e, recipients = recipients.len(), "email delivery failed");
        }
    }

    async fn send_webhook(&self, event: &NotificationEvent) {
        let map = match self.settings.get_namespace("webhook.").await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "failed to load webhook settings, skipping webhook delivery");
                return;
            }
        };

        let parsed = match WebhookSettings::from_map(&map) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                debug!("webhook not configured, skipping webhook delivery");
                return;
            }
            Err(e) => {
                warn!(error = %e, "webhook settings are misconfigured, skipping webhook delivery");
                return;
            }
        };

        if !parsed.enabled {
            debug!("webhook disabled, skipping webhook delivery");
            return;
        }

        let secret = match &parsed.secret {
            Some(sealed) => match self.open_secret(sealed) {
                Ok(secret) => Some(secret),
                Err(e) => {
                    error!(error = %e, "cannot open webhook secret");
                    return;
                }
            },
            None => None,
        };

        let config = WebhookConfig {
            url: parsed.url,
            secret,
        };

        if let Err(e) = self.webhooks.send(&config, event).await {
            warn!(error = %e, url = %config.url, "webhook delivery failed");
        }
    }

    fn open_secret(&self, sealed: &str) -> Result<String, SecretCodecError> {
        require_codec(self.codec.as_deref()).and_then(|codec| codec.open(sealed))
    }
}
