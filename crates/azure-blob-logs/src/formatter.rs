// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders log records into the plain text lines stored in the blob.
//!
//! ```text
//! [info] - 2024-03-01T10:20:30.500Z - request served - {"status":200} \n
//! ```
//!
//! The metadata segment (and the ` - ` in front of it) is left out when the
//! metadata is empty. Errors are normalized into a structured object before
//! rendering so their causes survive.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;

/// Structured form of an error attached to a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    /// Where the record was logged, not where the error was raised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<String>,
}

impl ErrorDetails {
    /// Captures the error's type name, message and `source()` chain, plus a
    /// backtrace of the logging call when `RUST_BACKTRACE` enables one.
    pub fn from_error<E: Error + 'static>(err: &E) -> Self {
        let full_name = std::any::type_name::<E>();
        let name = short_type_name(full_name).to_string();

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let backtrace = Backtrace::capture();
        let logged_at = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };

        Self {
            name,
            message: err.to_string(),
            causes,
            logged_at,
        }
    }
}

/// Optional payload attached to a log record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Metadata {
    #[default]
    None,
    Value(Value),
    Error(ErrorDetails),
}

impl Metadata {
    pub fn from_error<E: Error + 'static>(err: &E) -> Self {
        Metadata::Error(ErrorDetails::from_error(err))
    }

    /// Absent, null, scalars, and empty strings, arrays or objects carry
    /// nothing worth writing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Metadata::None => true,
            Metadata::Value(value) => match value {
                Value::Null | Value::Bool(_) | Value::Number(_) => true,
                Value::String(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
            },
            Metadata::Error(_) => false,
        }
    }

    fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let rendered = match self {
            Metadata::Value(value) => serde_json::to_string(value),
            Metadata::Error(details) => serde_json::to_string(details),
            Metadata::None => return None,
        };
        // Value and plain structs always serialize; fall back to Debug anyway
        Some(rendered.unwrap_or_else(|_| format!("{self:?}")))
    }
}

impl From<Value> for Metadata {
    fn from(value: Value) -> Self {
        Metadata::Value(value)
    }
}

impl From<ErrorDetails> for Metadata {
    fn from(details: ErrorDetails) -> Self {
        Metadata::Error(details)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormatter;

impl LineFormatter {
    /// Formats a record stamped with the current time.
    #[must_use]
    pub fn format(&self, level: &str, message: &str, metadata: &Metadata) -> String {
        self.format_at(Utc::now(), level, message, metadata)
    }

    #[must_use]
    pub fn format_at(
        &self,
        at: DateTime<Utc>,
        level: &str,
        message: &str,
        metadata: &Metadata,
    ) -> String {
        let ts = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        match metadata.render() {
            Some(meta) => format!("[{level}] - {ts} - {message} - {meta} \n"),
            None => format!("[{level}] - {ts} - {message} \n"),
        }
    }
}

fn short_type_name(full_name: &str) -> &str {
    // keep generics intact: "a::b::Wrapper<c::D>" -> "Wrapper<c::D>"
    let head = full_name.split('<').next().unwrap_or(full_name);
    match head.rfind("::") {
        Some(idx) => &full_name[idx + 2..],
        None => full_name,
    }
}
