// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Name of the blob currently receiving appends.
//!
//! Rotated names are `<base>-<RFC 3339 timestamp>`, so a newer blob always
//! sorts after an older one. The batch worker and the size watcher both roll
//! the same identity; a redundant roll only skips one name.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct State {
    current: String,
    last_roll: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct BlobIdentity {
    base_name: String,
    state: Mutex<State>,
}

impl BlobIdentity {
    /// Starts on `base_name` itself, or on a timestamped name when rotation is
    /// enabled.
    #[must_use]
    pub fn new(base_name: impl Into<String>, rotation_enabled: bool) -> Self {
        let identity = Self {
            base_name: base_name.into(),
            state: Mutex::new(State {
                current: String::new(),
                last_roll: None,
            }),
        };
        let mut state = identity.lock();
        state.current = identity.base_name.clone();
        if rotation_enabled {
            Self::advance(&identity.base_name, &mut state);
        }
        drop(state);
        identity
    }

    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.lock().current.clone()
    }

    /// Moves appends to a fresh `<base>-<timestamp>` blob and returns its name.
    pub fn roll(&self) -> String {
        let mut state = self.lock();
        let previous = std::mem::take(&mut state.current);
        Self::advance(&self.base_name, &mut state);
        debug!("BLOB | Rolled from {} to {}", previous, state.current);
        state.current.clone()
    }

    fn advance(base_name: &str, state: &mut State) {
        let now = Utc::now();
        // two rolls within one clock tick must still differ
        let stamp = match state.last_roll {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        state.last_roll = Some(stamp);
        state.current = format!("{base_name}-{}", timestamp(stamp));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
