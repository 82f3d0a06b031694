// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Failure reported by a [`RemoteAppendStore`](crate::store::RemoteAppendStore) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The target container or blob does not exist.
    #[error("not found: {code}")]
    NotFound { code: String },

    #[error("store responded {status}: {code}")]
    Status { status: StatusCode, code: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("could not sign request: {0}")]
    Auth(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors surfaced to the host application. Steady-state delivery problems
/// never show up here; they are logged and the chunk is dropped.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to provision container {container}: {source}")]
    ContainerProvisioning {
        container: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to build store client: {0}")]
    Client(StoreError),

    #[error("batch worker is not running")]
    WorkerUnavailable,
}
