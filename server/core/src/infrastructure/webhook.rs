// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Signed webhook delivery for notification events.
//!
//! When a shared signing secret is configured, every request carries an
//! HMAC-SHA256 signature of the raw JSON body in the
//! [`SIGNATURE_HEADER`] header so receivers can verify authenticity.

use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use sha2::Sha256;

use crate::domain::notification::NotificationEvent;

pub const SIGNATURE_HEADER: &str = "x-warden-signature";

type HmacSha256 = Hmac<Sha256>;

/// `"sha256=" + hex(HMAC-SHA256(secret, body))` over the raw request body.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Fully resolved webhook parameters; secret already opened by the codec.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
}

pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// POST the event as JSON. Non-2xx responses are errors so the caller
    /// can log them; retries are not this layer's business.
    pub async fn send(
        &self,
        config: &WebhookConfig,
        event: &NotificationEvent,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;

        let mut request = self
            .http
            .post(&config.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(secret) = &config.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_sha256_prefix_and_hex_digest() {
        let signature = sign_payload("abc", b"{\"kind\":\"job_failed\"}");
        let digest = signature.strip_prefix("sha256=").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_secret_and_body() {
        let body = b"payload";
        assert_ne!(sign_payload("abc", body), sign_payload("abd", body));
        assert_ne!(sign_payload("abc", body), sign_payload("abc", b"payload2"));
    }

    #[test]
    fn signature_is_deterministic_for_fixed_inputs() {
        let body = br#"{"title":"Backup failed"}"#;
        assert_eq!(sign_payload("abc", body), sign_payload("abc", body));
    }

    #[test]
    fn signature_matches_published_hmac_sha256_vector() {
        // RFC-style known-answer vector for HMAC-SHA256.
        let signature = sign_payload("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            signature,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
