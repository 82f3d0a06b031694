// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory store double shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::errors::StoreError;
use crate::store::{AppendOutcome, BlobEntry, PublicAccess, RemoteAppendStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Append { name: String, chunk: String },
    Create { name: String, chunk: String },
    List { prefix: String },
    CreateContainer { container: String, access: PublicAccess },
}

/// Records every call. Appends succeed and count blocks per blob unless a
/// scripted result is queued.
#[derive(Default)]
pub struct MockStore {
    calls: Mutex<Vec<Call>>,
    append_results: Mutex<VecDeque<Result<AppendOutcome, StoreError>>>,
    create_results: Mutex<VecDeque<Result<(), StoreError>>>,
    listing: Mutex<Option<Result<Vec<BlobEntry>, StoreError>>>,
    container_result: Mutex<Option<Result<bool, StoreError>>>,
    block_counts: Mutex<HashMap<String, u64>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_append_result(&self, result: Result<AppendOutcome, StoreError>) {
        self.append_results.lock().unwrap().push_back(result);
    }

    pub fn push_create_result(&self, result: Result<(), StoreError>) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn set_listing(&self, result: Result<Vec<BlobEntry>, StoreError>) {
        *self.listing.lock().unwrap() = Some(result);
    }

    pub fn set_container_result(&self, result: Result<bool, StoreError>) {
        *self.container_result.lock().unwrap() = Some(result);
    }

    /// Makes every append wait for a permit on the returned semaphore.
    pub fn gate_appends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `(blob name, chunk)` of every append, in call order.
    pub fn appends(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Append { name, chunk } => Some((name, chunk)),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { name, chunk } => Some((name, chunk)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteAppendStore for MockStore {
    async fn append(
        &self,
        _container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<AppendOutcome, StoreError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        self.record(Call::Append {
            name: name.to_string(),
            chunk: chunk.to_string(),
        });

        if let Some(result) = self.append_results.lock().unwrap().pop_front() {
            return result;
        }
        let mut counts = self.block_counts.lock().unwrap();
        let count = counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        Ok(AppendOutcome {
            committed_block_count: *count,
        })
    }

    async fn create_with_content(
        &self,
        _container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<(), StoreError> {
        self.record(Call::Create {
            name: name.to_string(),
            chunk: chunk.to_string(),
        });
        if let Some(result) = self.create_results.lock().unwrap().pop_front() {
            return result;
        }
        self.block_counts.lock().unwrap().insert(name.to_string(), 1);
        Ok(())
    }

    async fn list_by_prefix(
        &self,
        _container: &str,
        prefix: &str,
    ) -> Result<Vec<BlobEntry>, StoreError> {
        self.record(Call::List {
            prefix: prefix.to_string(),
        });
        self.listing
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_container_if_missing(
        &self,
        container: &str,
        access: PublicAccess,
    ) -> Result<bool, StoreError> {
        self.record(Call::CreateContainer {
            container: container.to_string(),
            access,
        });
        self.container_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Ok(true))
    }
}
