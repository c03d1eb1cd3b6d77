// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Settings access with mandatory secret sealing.
//!
//! Call sites read and write settings through this service so a designated
//! secret key can never be persisted in plaintext: writes seal through the
//! injected codec, reads open. Non-secret keys pass through untouched.

use std::sync::Arc;

use crate::domain::repository::{RepositoryError, SettingsRepository};
use crate::domain::settings::is_secret_key;
use crate::infrastructure::secret_codec::{require_codec, SecretCodec, SecretCodecError};

#[derive(Debug, thiserror::Error)]
pub enum SettingsAccessError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Codec(#[from] SecretCodecError),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    codec: Option<Arc<SecretCodec>>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, codec: Option<Arc<SecretCodec>>) -> Self {
        Self { repo, codec }
    }

    /// Store a value. Secret keys are sealed before persistence; touching
    /// one before key initialization fails hard.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsAccessError> {
        if is_secret_key(key) {
            let sealed = require_codec(self.codec.as_deref())?.seal(value)?;
            self.repo.set(key, &sealed).await?;
        } else {
            self.repo.set(key, value).await?;
        }
        Ok(())
    }

    /// Read a value. Secret keys are opened after load.
    pub async fn get(&self, key: &str) -> Result<Option<String>, SettingsAccessError> {
        match self.repo.get(key).await? {
            Some(stored) if is_secret_key(key) => {
                Ok(Some(require_codec(self.codec.as_deref())?.open(&stored)?))
            }
            other => Ok(other),
        }
    }
}
