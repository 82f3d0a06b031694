// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// One mebibyte. Blob size ceilings are configured in this unit.
pub const MB: u64 = 1024 * 1024;

/// Largest payload accepted by a single append-block call.
pub const MAX_APPEND_SIZE: usize = 4 * 1024 * 1024;

/// Azure refuses appends past 50,000 committed blocks, so roll a bit earlier.
pub const DEFAULT_MAX_BLOCK_COUNT: u64 = 48_000;

pub const DEFAULT_LEVEL: &str = "info";

/// How often the size watcher asks the store for the current blob's length.
pub const SIZE_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Levels accepted by the `level` option, most severe first.
pub const LEVELS: [&str; 7] = ["error", "warn", "info", "verbose", "debug", "silly", "trace"];
