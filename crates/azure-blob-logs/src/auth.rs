// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared Key authorization for the Blob service.
//!
//! Each request is signed with HMAC-SHA256 over a canonical description of
//! the request:
//!
//! ```text
//! VERB \n Content-Encoding \n Content-Language \n Content-Length \n
//! Content-MD5 \n Content-Type \n Date \n If-Modified-Since \n If-Match \n
//! If-None-Match \n If-Unmodified-Since \n Range \n
//! CanonicalizedHeaders CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Url};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Storage account name and its base64 access key.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub name: String,
    pub key: String,
}

impl AccountCredentials {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct SharedKeySigner {
    account: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    pub fn new(credentials: &AccountCredentials) -> Result<Self, StoreError> {
        let key = STANDARD
            .decode(credentials.key.trim())
            .map_err(|e| StoreError::Auth(format!("account key is not valid base64: {e}")))?;
        Ok(Self {
            account: credentials.name.clone(),
            key,
        })
    }

    /// Value for the `Authorization` header. `headers` must already hold
    /// every `x-ms-*` header and the content headers that will be sent.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<String, StoreError> {
        let string_to_sign = self.string_to_sign(method, url, headers);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| StoreError::Auth(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    fn string_to_sign(&self, method: &Method, url: &Url, headers: &HeaderMap) -> String {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
        };
        // a zero length is signed as an empty string
        let content_length = match header(CONTENT_LENGTH.as_str()) {
            "0" => "",
            other => other,
        };

        let mut out = String::new();
        out.push_str(method.as_str());
        out.push('\n');
        out.push_str(header("content-encoding"));
        out.push('\n');
        out.push_str(header("content-language"));
        out.push('\n');
        out.push_str(content_length);
        out.push('\n');
        out.push_str(header("content-md5"));
        out.push('\n');
        out.push_str(header(CONTENT_TYPE.as_str()));
        out.push('\n');
        // Date stays empty, x-ms-date is signed instead
        out.push('\n');
        for name in [
            "if-modified-since",
            "if-match",
            "if-none-match",
            "if-unmodified-since",
            "range",
        ] {
            out.push_str(header(name));
            out.push('\n');
        }
        out.push_str(&canonicalized_headers(headers));
        out.push_str(&self.canonicalized_resource(url));
        out
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.to_lowercase())
                .or_default()
                .push(value.into_owned());
        }
        for (name, mut values) in params {
            values.sort();
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(&values.join(","));
        }
        resource
    }
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v.trim())))
        .collect();
    ms_headers.sort_by(|a, b| a.0.cmp(b.0));

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}
