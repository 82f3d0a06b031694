// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

use crate::azure::AzureBlobClient;
use crate::batch_worker::{BatchWorker, BatchWorkerConfig, BatchWorkerHandle, LogReceipt};
use crate::blob_identity::BlobIdentity;
use crate::config::TransportConfig;
use crate::errors::TransportError;
use crate::formatter::{LineFormatter, Metadata};
use crate::size_watcher::SizeWatcher;
use crate::store::{PublicAccess, RemoteAppendStore};

/// Entry point for the host application: formats records and hands them to
/// the batch worker.
///
/// Must be created inside a tokio runtime; the worker and the size watcher
/// run as spawned tasks until [`BlobTransport::shutdown`].
pub struct BlobTransport {
    store: Arc<dyn RemoteAppendStore>,
    identity: Arc<BlobIdentity>,
    handle: BatchWorkerHandle,
    formatter: LineFormatter,
    container: String,
    level: String,
    cancel: CancellationToken,
    _watcher_guard: DropGuard,
    worker_task: JoinHandle<()>,
}

impl BlobTransport {
    pub fn new(
        config: TransportConfig,
        store: Arc<dyn RemoteAppendStore>,
    ) -> Result<Self, TransportError> {
        config.validate()?;

        let identity = Arc::new(BlobIdentity::new(
            config.blob_name.clone(),
            config.rotation_enabled(),
        ));
        let (worker, handle) = BatchWorker::new(BatchWorkerConfig {
            store: Arc::clone(&store),
            identity: Arc::clone(&identity),
            container: config.container_name.clone(),
            max_append_size: config.max_append_size,
            max_block_count: config.max_block_count,
        });
        let worker_task = tokio::spawn(worker.run());

        let cancel = CancellationToken::new();
        if let Some(max_size) = config.max_blob_size_bytes() {
            let watcher = SizeWatcher::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                config.container_name.clone(),
                max_size,
                config.size_poll_interval,
            );
            tokio::spawn(watcher.run(cancel.clone()));
        }

        debug!(
            "BLOB | Transport ready, writing to {}/{}",
            config.container_name,
            identity.current()
        );
        Ok(Self {
            store,
            identity,
            handle,
            formatter: LineFormatter,
            container: config.container_name,
            level: config.level,
            _watcher_guard: cancel.clone().drop_guard(),
            cancel,
            worker_task,
        })
    }

    /// Builds the transport on top of an [`AzureBlobClient`].
    pub fn from_config(config: TransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let client = AzureBlobClient::new(
            &config.account,
            config.endpoint.as_deref(),
            config.request_timeout,
        )
        .map_err(TransportError::Client)?;
        Self::new(config, Arc::new(client))
    }

    /// Creates the container with public blob access if it is missing.
    /// Returns `true` when it was created.
    pub async fn initialize(&self) -> Result<bool, TransportError> {
        let created = self
            .store
            .create_container_if_missing(&self.container, PublicAccess::Blob)
            .await
            .map_err(|source| TransportError::ContainerProvisioning {
                container: self.container.clone(),
                source,
            })?;
        debug!(
            "BLOB | Container {} {}",
            self.container,
            if created { "created" } else { "already existed" }
        );
        Ok(created)
    }

    /// Queues one record. The receipt resolves when its batch is done.
    pub fn log(&self, level: &str, message: &str, metadata: &Metadata) -> LogReceipt {
        let line = self.formatter.format(level, message, metadata);
        self.handle.enqueue(line)
    }

    /// Waits until everything logged so far has been processed.
    pub async fn flush(&self) -> Result<(), TransportError> {
        self.handle.flush().await.map_err(|e| {
            error!("BLOB | {}", e);
            TransportError::WorkerUnavailable
        })
    }

    /// Stops the size watcher, drains the queue and waits for the worker.
    pub async fn shutdown(self) -> Result<(), TransportError> {
        self.cancel.cancel();
        if self.handle.shutdown().is_err() {
            return Err(TransportError::WorkerUnavailable);
        }
        self.worker_task.await.map_err(|e| {
            error!("BLOB | Batch worker task failed: {}", e);
            TransportError::WorkerUnavailable
        })
    }

    #[must_use]
    pub fn current_blob_name(&self) -> String {
        self.identity.current()
    }

    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    #[must_use]
    pub fn handle(&self) -> BatchWorkerHandle {
        self.handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountCredentials;
    use crate::errors::StoreError;
    use crate::store::BlobEntry;
    use crate::test_support::{Call, MockStore};
    use regex::Regex;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> TransportConfig {
        TransportConfig::new(
            AccountCredentials::new("myaccount", "c2VjcmV0LWtleQ=="),
            "logs",
            "app.log",
        )
    }

    #[tokio::test]
    async fn test_three_lines_become_one_append() {
        let store = MockStore::new();
        let transport = BlobTransport::new(config(), store.clone()).unwrap();

        let _ = transport.log("info", "a", &Metadata::None);
        let _ = transport.log("info", "b", &Metadata::None);
        transport.log("info", "c", &Metadata::None).await;

        let appends = store.appends();
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].0, "app.log");

        let ts = r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z";
        let pattern = format!(
            r"^\[info\] - {ts} - a \n\[info\] - {ts} - b \n\[info\] - {ts} - c \n$"
        );
        assert!(
            Regex::new(&pattern).unwrap().is_match(&appends[0].1),
            "unexpected payload {:?}",
            appends[0].1
        );

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_is_rendered_into_the_line() {
        let store = MockStore::new();
        let transport = BlobTransport::new(config(), store.clone()).unwrap();

        transport
            .log("warn", "slow request", &Metadata::from(json!({"ms": 1200})))
            .await;

        let appends = store.appends();
        let (_, payload) = &appends[0];
        assert!(payload.starts_with("[warn] - "));
        assert!(payload.ends_with(" - slow request - {\"ms\":1200} \n"));

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_creates_public_container() {
        let store = MockStore::new();
        let transport = BlobTransport::new(config(), store.clone()).unwrap();

        assert!(transport.initialize().await.unwrap());
        assert_eq!(
            store.calls(),
            vec![Call::CreateContainer {
                container: "logs".to_string(),
                access: PublicAccess::Blob,
            }]
        );

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_error_propagates() {
        let store = MockStore::new();
        store.set_container_result(Err(StoreError::Transport("refused".to_string())));
        let transport = BlobTransport::new(config(), store.clone()).unwrap();

        let err = transport.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ContainerProvisioning { ref container, .. } if container == "logs"
        ));

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store = MockStore::new();
        let bad = TransportConfig {
            max_block_count: 0,
            ..config()
        };
        assert!(matches!(
            BlobTransport::new(bad, store),
            Err(TransportError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_name_is_stable_without_max_size() {
        let store = MockStore::new();
        let transport = BlobTransport::new(config(), store.clone()).unwrap();
        assert_eq!(transport.current_blob_name(), "app.log");
        assert_eq!(transport.level(), "info");
        transport.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_watcher_tick_redirects_next_append() {
        let store = MockStore::new();
        let config = TransportConfig {
            max_blob_size_mb: Some(1),
            size_poll_interval: Duration::from_secs(60),
            ..config()
        };
        let transport = BlobTransport::new(config, store.clone()).unwrap();
        let first_name = transport.current_blob_name();
        assert!(first_name.starts_with("app.log-"));

        transport.log("info", "before", &Metadata::None).await;
        store.set_listing(Ok(vec![BlobEntry {
            name: first_name.clone(),
            content_length: 1024 * 1024 + 1,
        }]));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let second_name = transport.current_blob_name();
        assert_ne!(second_name, first_name);

        transport.log("info", "after", &Metadata::None).await;
        let appends = store.appends();
        assert_eq!(appends[0].0, first_name);
        assert_eq!(appends[1].0, second_name);

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_and_shutdown_drain_pending_lines() {
        let store = MockStore::new();
        let transport = BlobTransport::new(config(), store.clone()).unwrap();

        for i in 0..10 {
            let _ = transport.log("info", &format!("line {i}"), &Metadata::None);
        }
        transport.flush().await.unwrap();
        assert_eq!(store.appends().len(), 1);

        let handle = transport.handle();
        let _ = handle.enqueue("late\n".to_string());
        transport.shutdown().await.unwrap();
        assert_eq!(store.appends().len(), 2);
    }
}
