// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::env;
use std::time::Duration;

use crate::auth::AccountCredentials;
use crate::constants::{
    DEFAULT_LEVEL, DEFAULT_MAX_BLOCK_COUNT, DEFAULT_REQUEST_TIMEOUT, LEVELS, MAX_APPEND_SIZE, MB,
    SIZE_POLL_INTERVAL,
};
use crate::errors::ConfigError;

/// Settings for a [`BlobTransport`](crate::transport::BlobTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub account: AccountCredentials,
    pub container_name: String,
    /// Stable part of every blob name; rotated blobs get a timestamp suffix.
    pub blob_name: String,
    /// Size ceiling in MB. Setting it turns on timestamped blob names and
    /// the size watcher.
    pub max_blob_size_mb: Option<u64>,
    pub max_block_count: u64,
    /// Minimum severity the host should forward. Carried, not enforced.
    pub level: String,
    /// Overrides `https://<account>.blob.core.windows.net`.
    pub endpoint: Option<String>,
    pub size_poll_interval: Duration,
    pub max_append_size: usize,
    pub request_timeout: Duration,
}

impl TransportConfig {
    /// Config with every optional setting at its default.
    pub fn new(
        account: AccountCredentials,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
    ) -> Self {
        Self {
            account,
            container_name: container_name.into(),
            blob_name: blob_name.into(),
            max_blob_size_mb: None,
            max_block_count: DEFAULT_MAX_BLOCK_COUNT,
            level: DEFAULT_LEVEL.to_string(),
            endpoint: None,
            size_poll_interval: SIZE_POLL_INTERVAL,
            max_append_size: MAX_APPEND_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let account = AccountCredentials::new(
            required("AZURE_STORAGE_ACCOUNT")?,
            required("AZURE_STORAGE_KEY")?,
        );
        let mut config = Self::new(
            account,
            required("BLOB_LOGS_CONTAINER")?,
            required("BLOB_LOGS_BLOB_NAME")?,
        );

        config.max_blob_size_mb = parsed("BLOB_LOGS_MAX_BLOB_SIZE_MB")?;
        if let Some(count) = parsed("BLOB_LOGS_MAX_BLOCK_COUNT")? {
            config.max_block_count = count;
        }
        if let Ok(level) = env::var("BLOB_LOGS_LEVEL") {
            config.level = level.trim().to_lowercase();
        }
        config.endpoint = env::var("BLOB_LOGS_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());
        if let Some(secs) = parsed("BLOB_LOGS_SIZE_POLL_INTERVAL_SECS")? {
            config.size_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("BLOB_LOGS_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Ceiling in bytes, when rotation is enabled.
    #[must_use]
    pub fn max_blob_size_bytes(&self) -> Option<u64> {
        self.max_blob_size_mb.map(|mb| mb.saturating_mul(MB))
    }

    #[must_use]
    pub fn rotation_enabled(&self) -> bool {
        self.max_blob_size_mb.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.name.trim().is_empty() {
            return Err(ConfigError::Missing("account name"));
        }
        if STANDARD.decode(self.account.key.trim()).is_err() {
            return Err(ConfigError::Invalid {
                name: "account key",
                reason: "must be base64".to_string(),
            });
        }
        if self.container_name.trim().is_empty() {
            return Err(ConfigError::Missing("container name"));
        }
        if self.blob_name.trim().is_empty() {
            return Err(ConfigError::Missing("blob name"));
        }
        if self.max_blob_size_mb == Some(0) {
            return Err(ConfigError::Invalid {
                name: "max blob size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_block_count == 0 {
            return Err(ConfigError::Invalid {
                name: "max block count",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_append_size == 0 {
            return Err(ConfigError::Invalid {
                name: "max append size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.size_poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "size poll interval",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::Invalid {
                name: "level",
                reason: format!("'{}' is not one of {}", self.level, LEVELS.join(", ")),
            });
        }
        Ok(())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
