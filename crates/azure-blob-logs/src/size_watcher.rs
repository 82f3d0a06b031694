// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::blob_identity::BlobIdentity;
use crate::store::RemoteAppendStore;

/// Periodically rolls the blob once it grows past `max_size` bytes.
pub struct SizeWatcher {
    store: Arc<dyn RemoteAppendStore>,
    identity: Arc<BlobIdentity>,
    container: String,
    max_size: u64,
    poll_interval: Duration,
}

impl SizeWatcher {
    pub fn new(
        store: Arc<dyn RemoteAppendStore>,
        identity: Arc<BlobIdentity>,
        container: impl Into<String>,
        max_size: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            container: container.into(),
            max_size,
            poll_interval,
        }
    }

    /// Polls every `poll_interval` until `cancel` fires. The first check
    /// happens one interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        debug!("BLOB | Size watcher started, ceiling {} bytes", self.max_size);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }
        debug!("BLOB | Size watcher stopped");
    }

    /// Runs one poll. Returns `true` when the blob was rolled.
    pub async fn check(&self) -> bool {
        let current = self.identity.current();
        let entries = match self
            .store
            .list_by_prefix(&self.container, self.identity.base_name())
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!("BLOB | Failed to list blobs, skipping size check: {}", err);
                return false;
            }
        };

        let Some(entry) = entries.iter().find(|entry| entry.name == current) else {
            debug!("BLOB | {} not written yet", current);
            return false;
        };

        if entry.content_length < self.max_size {
            return false;
        }

        // an append may have rolled the name while we were listing
        if self.identity.current() != current {
            return false;
        }
        debug!(
            "BLOB | {} holds {} bytes, ceiling is {}",
            current, entry.content_length, self.max_size
        );
        self.identity.roll();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MB;
    use crate::errors::StoreError;
    use crate::store::BlobEntry;
    use crate::test_support::{Call, MockStore};
    use tracing_test::traced_test;

    fn watcher(store: Arc<MockStore>, identity: Arc<BlobIdentity>) -> SizeWatcher {
        SizeWatcher::new(store, identity, "logs", MB, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_rolls_when_current_blob_reaches_ceiling() {
        let store = MockStore::new();
        let identity = Arc::new(BlobIdentity::new("app.log", true));
        let before = identity.current();
        store.set_listing(Ok(vec![BlobEntry {
            name: before.clone(),
            content_length: MB + 10,
        }]));

        assert!(watcher(store.clone(), Arc::clone(&identity)).check().await);
        assert_ne!(identity.current(), before);
        assert_eq!(
            store.calls(),
            vec![Call::List {
                prefix: "app.log".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_small_blob_is_kept() {
        let store = MockStore::new();
        let identity = Arc::new(BlobIdentity::new("app.log", true));
        let before = identity.current();
        store.set_listing(Ok(vec![BlobEntry {
            name: before.clone(),
            content_length: MB - 1,
        }]));

        assert!(!watcher(store, Arc::clone(&identity)).check().await);
        assert_eq!(identity.current(), before);
    }

    #[tokio::test]
    async fn test_only_current_blob_counts() {
        let store = MockStore::new();
        let identity = Arc::new(BlobIdentity::new("app.log", true));
        let before = identity.current();
        store.set_listing(Ok(vec![BlobEntry {
            name: "app.log-2020-01-01T00:00:00.000000000Z".to_string(),
            content_length: 10 * MB,
        }]));

        assert!(!watcher(store, Arc::clone(&identity)).check().await);
        assert_eq!(identity.current(), before);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_listing_error_is_ignored() {
        let store = MockStore::new();
        let identity = Arc::new(BlobIdentity::new("app.log", true));
        let before = identity.current();
        store.set_listing(Err(StoreError::Transport("dns failure".to_string())));

        assert!(!watcher(store, Arc::clone(&identity)).check().await);
        assert_eq!(identity.current(), before);
        assert!(logs_contain("Failed to list blobs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_interval_until_cancelled() {
        let store = MockStore::new();
        let identity = Arc::new(BlobIdentity::new("app.log", true));
        store.set_listing(Ok(vec![]));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            SizeWatcher::new(
                store.clone(),
                identity,
                "logs",
                MB,
                Duration::from_secs(60),
            )
            .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.calls().len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.calls().len(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
