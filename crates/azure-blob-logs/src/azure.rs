// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`RemoteAppendStore`] backed by the Azure Blob service REST API.
//!
//! | operation | request |
//! |---|---|
//! | append | `PUT /{container}/{blob}?comp=appendblock` |
//! | create | `PUT /{container}/{blob}` with `x-ms-blob-type: AppendBlob`, then append |
//! | list | `GET /{container}?restype=container&comp=list&prefix=…` |
//! | create container | `PUT /{container}?restype=container` |

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::auth::{AccountCredentials, SharedKeySigner};
use crate::errors::StoreError;
use crate::store::{AppendOutcome, BlobEntry, PublicAccess, RemoteAppendStore};

const API_VERSION: &str = "2019-12-12";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const COMMITTED_BLOCK_COUNT: &str = "x-ms-blob-committed-block-count";
const ERROR_CODE: &str = "x-ms-error-code";

#[derive(Clone)]
pub struct AzureBlobClient {
    client: reqwest::Client,
    endpoint: Url,
    signer: SharedKeySigner,
}

impl AzureBlobClient {
    /// `endpoint` defaults to `https://<account>.blob.core.windows.net`.
    /// Emulators take a path-style endpoint such as
    /// `http://127.0.0.1:10000/devstoreaccount1`.
    pub fn new(
        credentials: &AccountCredentials,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", credentials.name),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| StoreError::InvalidResponse(format!("invalid endpoint {endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::InvalidResponse(format!(
                "endpoint {endpoint} cannot hold a path"
            )));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            signer: SharedKeySigner::new(credentials)?,
        })
    }

    fn url(&self, container: &str, blob: Option<&str>, query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                // keep virtual directories: "2024/03/app.log"
                segments.extend(blob.split('/'));
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<Response, StoreError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert("x-ms-date", header_value(&date)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let authorization = self.signer.authorization(&method, &url, &headers)?;
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    async fn create_append_blob(&self, container: &str, name: &str) -> Result<(), StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("AppendBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));

        let url = self.url(container, Some(name), &[]);
        let response = self.send(Method::PUT, url, headers, Vec::new()).await?;
        expect_status(response, StatusCode::CREATED).await.map(drop)
    }

    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut query = vec![("restype", "container"), ("comp", "list"), ("prefix", prefix)];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        let url = self.url(container, None, &query);
        let response = self.send(Method::GET, url, HeaderMap::new(), Vec::new()).await?;
        let response = expect_status(response, StatusCode::OK).await?;
        let body = response.text().await?;
        Ok(parse_list_page(&body))
    }
}

#[async_trait]
impl RemoteAppendStore for AzureBlobClient {
    async fn append(
        &self,
        container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<AppendOutcome, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));

        let url = self.url(container, Some(name), &[("comp", "appendblock")]);
        let response = self
            .send(Method::PUT, url, headers, chunk.as_bytes().to_vec())
            .await?;
        let response = expect_status(response, StatusCode::CREATED).await?;

        let committed_block_count = response
            .headers()
            .get(COMMITTED_BLOCK_COUNT)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| {
                StoreError::InvalidResponse(format!("append response without {COMMITTED_BLOCK_COUNT}"))
            })?;
        Ok(AppendOutcome {
            committed_block_count,
        })
    }

    async fn create_with_content(
        &self,
        container: &str,
        name: &str,
        chunk: &str,
    ) -> Result<(), StoreError> {
        self.create_append_blob(container, name).await?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.append(container, name, chunk).await.map(drop)
    }

    async fn list_by_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<BlobEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.list_page(container, prefix, marker.as_deref()).await?;
            entries.extend(page.entries);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        debug!("BLOB | Listed {} blob(s) under {}", entries.len(), prefix);
        Ok(entries)
    }

    async fn create_container_if_missing(
        &self,
        container: &str,
        access: PublicAccess,
    ) -> Result<bool, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(level) = access.header_value() {
            headers.insert("x-ms-blob-public-access", HeaderValue::from_static(level));
        }

        let url = self.url(container, None, &[("restype", "container")]);
        let response = self.send(Method::PUT, url, headers, Vec::new()).await?;
        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    entries: Vec<BlobEntry>,
    next_marker: Option<String>,
}

fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value).map_err(|e| StoreError::Auth(format!("invalid header value: {e}")))
}

async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, StoreError> {
    if response.status() == expected {
        Ok(response)
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: Response) -> StoreError {
    let status = response.status();
    let header_code = response
        .headers()
        .get(ERROR_CODE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    // HEAD-like failures carry no body, the header is the reliable source
    let code = match header_code {
        Some(code) => code,
        None => {
            let body = response.text().await.unwrap_or_default();
            xml_field(&body, "Code").unwrap_or_else(|| status.to_string())
        }
    };

    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound { code }
    } else {
        StoreError::Status { status, code }
    }
}

#[allow(clippy::expect_used)]
fn blob_regex() -> &'static Regex {
    static BLOB: OnceLock<Regex> = OnceLock::new();
    BLOB.get_or_init(|| {
        Regex::new(r"(?s)<Blob>.*?<Name>(.*?)</Name>.*?<Content-Length>(\d+)</Content-Length>.*?</Blob>")
            .expect("blob pattern is valid")
    })
}

fn parse_list_page(body: &str) -> ListPage {
    let entries = blob_regex()
        .captures_iter(body)
        .filter_map(|caps| {
            let name = unescape_xml(caps.get(1)?.as_str());
            let content_length = caps.get(2)?.as_str().parse().ok()?;
            Some(BlobEntry {
                name,
                content_length,
            })
        })
        .collect();

    let next_marker = xml_field(body, "NextMarker").filter(|marker| !marker.is_empty());
    ListPage {
        entries,
        next_marker,
    }
}

fn xml_field(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(unescape_xml(body[start..end].trim()))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
