// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::StoreError;
use crate::store::RemoteAppendStore;

/// Decides what happens to a chunk whose append failed.
///
/// A missing blob is created with the chunk as its content, once. Every
/// other failure drops the chunk; there is no backoff and no second attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    store: Arc<dyn RemoteAppendStore>,
    container: String,
}

impl RetryPolicy {
    pub fn new(store: Arc<dyn RemoteAppendStore>, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
        }
    }

    /// Returns `true` when the chunk ended up stored.
    pub async fn recover(&self, err: &StoreError, chunk: &str, object_name: &str) -> bool {
        if !err.is_not_found() {
            error!(
                "BLOB | Failed to append {} bytes to {}, chunk dropped: {}",
                chunk.len(),
                object_name,
                err
            );
            return false;
        }

        debug!("BLOB | {} does not exist, creating it", object_name);
        match self
            .store
            .create_with_content(&self.container, object_name, chunk)
            .await
        {
            Ok(()) => true,
            Err(create_err) => {
                error!(
                    "BLOB | Failed to create {} with {} bytes, chunk dropped: {}",
                    object_name,
                    chunk.len(),
                    create_err
                );
                false
            }
        }
    }
}
