// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Typed views over the dotted-key settings store.
//!
//! Values are plaintext except designated secret keys, which always hold the
//! output of the secret codec. Parsing distinguishes "not configured"
//! (required keys absent, callers skip silently) from "misconfigured"
//! (keys present but invalid, callers log a warning).

use std::collections::HashMap;

use thiserror::Error;

pub mod keys {
    pub const SMTP_HOST: &str = "smtp.host";
    pub const SMTP_PORT: &str = "smtp.port";
    pub const SMTP_USERNAME: &str = "smtp.username";
    pub const SMTP_PASSWORD: &str = "smtp.password";
    pub const SMTP_FROM: &str = "smtp.from";

    pub const WEBHOOK_URL: &str = "webhook.url";
    pub const WEBHOOK_ENABLED: &str = "webhook.enabled";
    pub const WEBHOOK_SECRET: &str = "webhook.secret";
}

/// Keys whose stored value is always sealed by the secret codec.
pub const SECRET_KEYS: &[&str] = &[keys::SMTP_PASSWORD, keys::WEBHOOK_SECRET];

pub fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// SMTP delivery configuration. `password` still carries the sealed form;
/// the caller opens it with the injected codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl SmtpSettings {
    /// `Ok(None)` when SMTP is not configured (host or sender absent).
    pub fn from_map(map: &HashMap<String, String>) -> Result<Option<Self>, SettingsError> {
        let host = match non_empty(map, keys::SMTP_HOST) {
            Some(h) => h,
            None => return Ok(None),
        };
        let from = match non_empty(map, keys::SMTP_FROM) {
            Some(f) => f,
            None => return Ok(None),
        };

        let port = match map.get(keys::SMTP_PORT).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<u16>().map_err(|_| SettingsError::Invalid {
                key: keys::SMTP_PORT.to_string(),
                reason: format!("not a valid port number: {raw:?}"),
            })?,
            None => 587,
        };

        Ok(Some(Self {
            host,
            port,
            username: non_empty(map, keys::SMTP_USERNAME),
            password: non_empty(map, keys::SMTP_PASSWORD),
            from,
        }))
    }
}

/// Webhook delivery configuration. `secret` still carries the sealed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    pub url: String,
    pub enabled: bool,
    pub secret: Option<String>,
}

impl WebhookSettings {
    /// `Ok(None)` when no webhook URL is configured.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Option<Self>, SettingsError> {
        let url = match non_empty(map, keys::WEBHOOK_URL) {
            Some(u) => u,
            None => return Ok(None),
        };

        let enabled = match map.get(keys::WEBHOOK_ENABLED).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            None => true,
            Some(other) => {
                return Err(SettingsError::Invalid {
                    key: keys::WEBHOOK_ENABLED.to_string(),
                    reason: format!("expected true/false, got {other:?}"),
                })
            }
        };

        Ok(Some(Self {
            url,
            enabled,
            secret: non_empty(map, keys::WEBHOOK_SECRET),
        }))
    }
}

fn non_empty(map: &HashMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
