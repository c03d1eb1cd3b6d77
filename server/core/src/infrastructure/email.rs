// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Best-effort SMTP delivery for notification batches.
//!
//! The [`Mailer`] seam exists so notification dispatch can be tested
//! without a mail server; [`SmtpMailer`] is the production implementation
//! over `lettre`'s tokio transport.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Fully resolved SMTP parameters; secrets already opened by the codec.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message to every recipient in the batch.
    async fn send_batch(
        &self,
        config: &SmtpConfig,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()>;
}

pub struct SmtpMailer;

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_batch(
        &self,
        config: &SmtpConfig,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }

        let from: Mailbox = config.from.parse()?;
        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in recipients {
            builder = builder.to(recipient.parse()?);
        }
        let message = builder.body(body.to_string())?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let Some(username) = &config.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        let transport: AsyncSmtpTransport<Tokio1Executor> = builder.build();
        transport.send(message).await?;
        Ok(())
    }
}
