/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::config::Config;
use crate::error::{self, Error, ErrorKind};
use crate::io;
use bytes::Bytes;
use serde::Deserialize;
use std::path::Path;

pub(crate) const USER_AGENT: &str =
    concat!("s3-presigned-upload/", env!("CARGO_PKG_VERSION"));

/// S3 error codes that indicate a transient condition regardless of the
/// response status.
const TRANSIENT_S3_CODES: &[&str] = &["RequestTimeout", "SlowDown", "InternalError"];

/// Marker the broker puts into an error body when the server side cancelled
/// the upload.
const UPLOAD_INTERRUPTED_MARKER: &str = "upload interrupted";

/// Low-level HTTP client for S3 object and part PUTs against presigned URLs.
///
/// Shared read-only by all upload tasks of one coordinator; the underlying
/// connection pool is sized to the worker count.
#[derive(Debug, Clone)]
pub(crate) struct S3HttpClient {
    client: reqwest::Client,
    consistency_check: bool,
}

impl S3HttpClient {
    pub(crate) fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connection_timeout())
            .pool_max_idle_per_host(config.n_threads())
            .user_agent(USER_AGENT)
            .build()
            .map_err(error::invalid_input)?;
        Ok(Self {
            client,
            consistency_check: config.consistency_check_enabled(),
        })
    }

    /// PUT an entire file to `url` and return the response ETag.
    pub(crate) async fn put_object(&self, url: &str, path: &Path) -> Result<String, Error> {
        let len = tokio::fs::metadata(path).await.map_err(Error::from)?.len();
        let body = io::read_file_chunk(path, 0, len).await?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        self.put(url, body, Some(content_type.as_ref())).await
    }

    /// PUT the byte range `[offset, offset + length)` of a file to `url` and
    /// return the response ETag.
    pub(crate) async fn put_part(
        &self,
        url: &str,
        path: &Path,
        offset: u64,
        length: u64,
    ) -> Result<String, Error> {
        let body = io::read_file_chunk(path, offset, length).await?;
        self.put(url, body, None).await
    }

    /// HEAD `url` and return the object ETag.
    pub(crate) async fn head_object(&self, url: &str) -> Result<String, Error> {
        let response = self
            .client
            .head(url)
            .header(reqwest::header::ACCEPT, "application/xml")
            .send()
            .await
            .map_err(from_transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        parse_etag(response.headers())
    }

    async fn put(
        &self,
        url: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, Error> {
        let digest = format!("{:x}", md5::compute(&body));
        let mut request = self
            .client
            .put(url)
            .header(reqwest::header::ACCEPT, "application/xml")
            .body(body);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request.send().await.map_err(from_transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let etag = parse_etag(response.headers())?;
        if self.consistency_check {
            if etag != digest {
                return Err(Error::new(
                    ErrorKind::ConsistencyMismatch,
                    format!("calculated digest [{digest}] is different from S3 etag [{etag}]"),
                ));
            }
            tracing::debug!("consistency check successful");
        }
        Ok(etag)
    }
}

/// Pull the ETag out of a response header map, stripping surrounding quotes.
/// A missing ETag is treated as transient (the store should always send one).
pub(crate) fn parse_etag(headers: &reqwest::header::HeaderMap) -> Result<String, Error> {
    match headers.get(reqwest::header::ETAG) {
        Some(value) => {
            let etag = value
                .to_str()
                .map_err(|e| Error::new(ErrorKind::S3Permanent, e))?;
            Ok(etag.trim_matches('"').to_string())
        }
        None => Err(Error::new(
            ErrorKind::S3Transport,
            "response does not contain an etag",
        )),
    }
}

/// Translate a reqwest transport error into the retry taxonomy.
pub(crate) fn from_transport_error(err: reqwest::Error) -> Error {
    // reqwest does not expose DNS resolution failures structurally
    let dns_failure = {
        let mut next: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        let mut found = false;
        while let Some(e) = next {
            let msg = e.to_string();
            if msg.contains("dns error") || msg.contains("failed to lookup") {
                found = true;
                break;
            }
            next = e.source();
        }
        found
    };
    if dns_failure || err.is_builder() || err.is_request() && !err.is_timeout() && !err.is_connect()
    {
        Error::new(ErrorKind::S3Permanent, err)
    } else {
        Error::new(ErrorKind::S3Transport, err)
    }
}

/// Translate a non-2xx response into the retry taxonomy, consuming the body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if body.to_ascii_lowercase().contains(UPLOAD_INTERRUPTED_MARKER) {
        return error::interrupted(format!("server reported interrupted upload: HTTP {status}"));
    }

    let code = parse_s3_error_code(&body);
    let transient = match &code {
        Some(code) => TRANSIENT_S3_CODES.contains(&code.as_str()) || status.is_server_error(),
        None => {
            status.is_server_error()
                || status == reqwest::StatusCode::REQUEST_TIMEOUT
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        }
    };

    let description = match code {
        Some(code) => format!("HTTP {status} ({code})"),
        None => format!("HTTP {status}"),
    };
    if transient {
        Error::new(ErrorKind::S3Transport, description)
    } else {
        Error::new(ErrorKind::S3Permanent, description)
    }
}

#[derive(Debug, Deserialize)]
struct S3ErrorBody {
    #[serde(rename = "Code")]
    code: Option<String>,
}

fn parse_s3_error_code(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    quick_xml::de::from_str::<S3ErrorBody>(body)
        .ok()
        .and_then(|e| e.code)
}
