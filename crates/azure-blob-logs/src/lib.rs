// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered log transport for Azure append blobs.
//!
//! Log lines are queued in memory, drained in batches by a single worker
//! task, split into chunks that fit the store's per-call limit and appended
//! in order. The target blob is rotated when its block count or size reaches
//! a ceiling, and created on demand when it does not exist yet.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod auth;
pub mod azure;
pub mod batch_worker;
pub mod blob_identity;
pub mod chunk;
pub mod config;
pub mod constants;
pub mod errors;
pub mod formatter;
pub mod retry;
pub mod size_watcher;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
