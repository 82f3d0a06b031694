// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::StoreError;

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Number of blocks committed to the blob, including this one.
    pub committed_block_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub content_length: u64,
}

/// Anonymous read access granted on a newly created container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicAccess {
    Private,
    Blob,
    Container,
}

impl PublicAccess {
    #[must_use]
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            PublicAccess::Private => None,
            PublicAccess::Blob => Some("blob"),
            PublicAccess::Container => Some("container"),
        }
    }
}

/// The append-only object store the transport writes into.
#[async_trait]
pub trait RemoteAppendStore: Send + Sync {
    /// Appends `chunk` to the end of an existing append blob.
    async fn append(
        &self,
        container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<AppendOutcome, StoreError>;

    /// Creates (or replaces) an append blob whose initial content is `chunk`.
    async fn create_with_content(
        &self,
        container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<(), StoreError>;

    /// Lists blobs whose name starts with `prefix`, in name order.
    async fn list_by_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<BlobEntry>, StoreError>;

    /// Returns `true` when the container was created, `false` when it existed.
    async fn create_container_if_missing(
        &self,
        container: &str,
        access: PublicAccess,
    ) -> Result<bool, StoreError>;
}
