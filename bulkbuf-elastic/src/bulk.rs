//! Elasticsearch `_bulk` API client
//!
//! Requests are encoded as NDJSON: one `index` action line followed by the
//! document itself for every item. Documents are sent verbatim unless they
//! span several lines, in which case they are re-serialized compactly so the
//! framing stays intact.

use crate::error::HealthcheckError;
use async_trait::async_trait;
use bulkbuf_core::{
    BackendError, BulkBackend, BulkItemResult, BulkRequest, BulkResponse, ConnectionError,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Serialize)]
struct IndexAction<'a> {
    index: ActionMeta<'a>,
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn encode_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Encode {
        message: err.to_string(),
    }
}

fn request_error(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout { timeout }
    } else {
        BackendError::transport(err)
    }
}

fn trim_line_endings(doc: &[u8]) -> &[u8] {
    let end = doc
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r'))
        .map_or(0, |last| last + 1);
    &doc[..end]
}

fn write_document(out: &mut Vec<u8>, doc: &[u8]) -> Result<(), BackendError> {
    let doc = trim_line_endings(doc);
    if doc.contains(&b'\n') {
        let value: serde_json::Value = serde_json::from_slice(doc).map_err(encode_error)?;
        serde_json::to_writer(&mut *out, &value).map_err(encode_error)?;
    } else {
        out.extend_from_slice(doc);
    }
    Ok(())
}

/// Encode `request` as a `_bulk` NDJSON body.
pub fn encode_bulk_body(request: &BulkRequest) -> Result<Vec<u8>, BackendError> {
    let mut body = Vec::new();
    for item in request.items() {
        let action = IndexAction {
            index: ActionMeta {
                index: &item.index,
                id: item.id.as_deref(),
                doc_type: item.doc_type.as_deref(),
            },
        };
        serde_json::to_writer(&mut body, &action).map_err(encode_error)?;
        body.push(b'\n');
        write_document(&mut body, &item.body)?;
        body.push(b'\n');
    }
    Ok(body)
}

fn describe_error(error: serde_json::Value) -> String {
    let kind = error.get("type").and_then(serde_json::Value::as_str);
    let reason = error.get("reason").and_then(serde_json::Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        _ => error.to_string(),
    }
}

/// Decode a `_bulk` response body.
pub fn decode_bulk_response(body: &[u8]) -> Result<BulkResponse, BackendError> {
    let raw: RawBulkResponse =
        serde_json::from_slice(body).map_err(|err| BackendError::Decode {
            message: err.to_string(),
        })?;

    let items = raw
        .items
        .into_iter()
        .filter_map(|entry| entry.into_values().next())
        .map(|item| BulkItemResult {
            index: item.index,
            id: item.id,
            status: item.status,
            error: item.error.map(describe_error),
        })
        .collect();

    Ok(BulkResponse {
        took_ms: raw.took,
        items,
    })
}

/// Basic auth credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A [`BulkBackend`] talking to one Elasticsearch node over HTTP.
#[derive(Debug, Clone)]
pub struct ElasticBulkBackend {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl ElasticBulkBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    /// Check that the node answers `GET /` with a success status.
    pub async fn ping(&self, timeout: Duration) -> Result<(), ConnectionError> {
        let response = self
            .request(Method::GET, "/")
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| ConnectionError::unavailable(&self.base_url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::unavailable(
                &self.base_url,
                HealthcheckError {
                    status: status.as_u16(),
                },
            ));
        }

        debug!("elasticsearch health check of {} succeeded", self.base_url);
        Ok(())
    }
}

#[async_trait]
impl BulkBackend for ElasticBulkBackend {
    async fn submit_bulk(
        &self,
        request: &BulkRequest,
        timeout: Duration,
    ) -> Result<BulkResponse, BackendError> {
        let body = encode_bulk_body(request)?;
        let path = format!("/_bulk?timeout={}s", timeout.as_secs().max(1));
        debug!(
            "sending {}-byte bulk request with {} actions to {}",
            body.len(),
            request.number_of_actions(),
            self.base_url
        );

        let response = self
            .request(Method::POST, &path)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|err| request_error(err, timeout))?;

        // The request timeout also covers reading the body
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| request_error(err, timeout))?;
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        decode_bulk_response(&bytes)
    }

    fn backend_name(&self) -> &str {
        "elasticsearch"
    }
}
