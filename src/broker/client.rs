/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::broker::transport::{
    UrlListRequest, UrlListResponse, ETAGS_PARAM, FINISH_UPLOAD_PARAM, OBJECT_KEY_BASE64_PARAM,
    OBJECT_KEY_PARAM, UPLOAD_SUCCESSFUL_PARAM,
};
use crate::broker::UrlBroker;
use crate::error::{self, Error, ErrorKind};
use crate::http::USER_AGENT;
use crate::types::PresignedUrl;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Header carrying the first few object keys of a request for broker-side
/// logging.
pub const ARTIFACT_KEYS_HEADER: &str = "X-S3-Artifact-Keys";

/// Header carrying the per-coordinator correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Upload-Correlation-Id";

const DEFAULT_ARTIFACT_KEYS_HEADER_LIMIT: usize = 10;

/// Marker the broker puts into an error body when the server side cancelled
/// the upload.
const UPLOAD_INTERRUPTED_MARKER: &str = "upload interrupted";

/// [`UrlBroker`] implementation speaking the v2 XML-over-HTTP protocol.
///
/// Minting requests are POSTed as XML to the configured endpoint; multipart
/// finalization is a form POST to the same endpoint. Each client instance
/// carries a stable correlation id and, optionally, a server-node affinity
/// cookie.
#[derive(Debug)]
pub struct HttpBrokerClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
    node_cookie: Option<(String, String)>,
    correlation_id: String,
    artifact_keys_header_limit: usize,
    shutdown: AtomicBool,
}

/// Fluent style builder for [`HttpBrokerClient`]
#[derive(Debug, Default)]
pub struct HttpBrokerClientBuilder {
    endpoint: Option<String>,
    credentials: Option<(String, String)>,
    node_cookie: Option<(String, String)>,
    connect_timeout: Option<Duration>,
    pool_size: Option<usize>,
    artifact_keys_header_limit: Option<usize>,
}

impl HttpBrokerClientBuilder {
    /// The broker endpoint URL that minting and finalization requests are
    /// POSTed to. Required.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// HTTP basic credentials attached to every request.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Server-node affinity cookie instructing a proxy in front of the broker
    /// where to land requests.
    pub fn node_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_cookie = Some((name.into(), value.into()));
        self
    }

    /// Connection timeout for broker requests.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Connection pool size; align with the upload worker count.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Maximum number of object keys repeated in the artifact-keys header of
    /// a batch request. Default 10.
    pub fn artifact_keys_header_limit(mut self, limit: usize) -> Self {
        self.artifact_keys_header_limit = Some(limit);
        self
    }

    /// Consumes the builder and constructs an [`HttpBrokerClient`]
    pub fn build(self) -> Result<HttpBrokerClient, Error> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| error::invalid_input("broker endpoint is required"))?;
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(size) = self.pool_size {
            builder = builder.pool_max_idle_per_host(size);
        }
        let http = builder.build().map_err(error::invalid_input)?;

        if self.node_cookie.is_none() {
            tracing::debug!("no node affinity cookie configured for broker requests");
        }

        Ok(HttpBrokerClient {
            http,
            endpoint,
            credentials: self.credentials,
            node_cookie: self.node_cookie,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            artifact_keys_header_limit: self
                .artifact_keys_header_limit
                .unwrap_or(DEFAULT_ARTIFACT_KEYS_HEADER_LIMIT),
            shutdown: AtomicBool::new(false),
        })
    }
}

impl HttpBrokerClient {
    /// Create a new `HttpBrokerClient` builder
    pub fn builder() -> HttpBrokerClientBuilder {
        HttpBrokerClientBuilder::default()
    }

    /// The correlation id attached to every request of this client instance.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.shutdown.load(Ordering::SeqCst) {
            tracing::warn!("presigned urls broker client already shut down");
            return Err(Error::new(
                ErrorKind::BrokerShutdown,
                "presigned urls broker client already shut down",
            ));
        }
        Ok(())
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/xml")
            .header(reqwest::header::ACCEPT_CHARSET, "UTF-8")
            .header(CORRELATION_ID_HEADER, &self.correlation_id);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }
        if let Some((name, value)) = &self.node_cookie {
            request = request.header(reqwest::header::COOKIE, format!("{name}={value}"));
        }
        request
    }

    async fn post_xml(&self, request: reqwest::RequestBuilder, xml: String) -> Result<String, Error> {
        let response = request
            .header(reqwest::header::CONTENT_TYPE, "application/xml; charset=UTF-8")
            .body(xml)
            .send()
            .await
            .map_err(transport_error)?;
        read_success_body(response).await
    }

    async fn fetch_one(
        &self,
        object_key: &str,
        request: UrlListRequest,
    ) -> Result<PresignedUrl, Error> {
        let body = self
            .post_xml(
                self.post().header(ARTIFACT_KEYS_HEADER, object_key),
                request.to_xml()?,
            )
            .await?;
        UrlListResponse::parse(&body)?
            .into_urls()?
            .into_iter()
            .find(|url| url.object_key() == object_key)
            .ok_or_else(|| {
                error::broker_shape(format!(
                    "broker response does not contain required object key '{object_key}'"
                ))
            })
    }

    async fn finish_multipart_upload(
        &self,
        object_key: &str,
        upload_id: &str,
        etags: Option<&[String]>,
    ) -> Result<(), Error> {
        let successful = etags.is_some();
        tracing::debug!(
            "multipart upload {upload_id} signaling {} started",
            if successful { "success" } else { "failure" }
        );

        let mut form: Vec<(&str, String)> = vec![
            (OBJECT_KEY_PARAM, object_key.to_string()),
            (
                OBJECT_KEY_BASE64_PARAM,
                general_purpose::STANDARD.encode(object_key.as_bytes()),
            ),
            (FINISH_UPLOAD_PARAM, upload_id.to_string()),
            (UPLOAD_SUCCESSFUL_PARAM, successful.to_string()),
        ];
        for etag in etags.unwrap_or_default() {
            form.push((ETAGS_PARAM, etag.clone()));
        }

        let response = self
            .post()
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;
        read_success_body(response).await?;
        tracing::debug!(
            "multipart upload {upload_id} signaling {} finished",
            if successful { "success" } else { "failure" }
        );
        Ok(())
    }
}

#[async_trait]
impl UrlBroker for HttpBrokerClient {
    async fn fetch_regular(
        &self,
        object_keys: &[String],
        digests: &HashMap<String, String>,
    ) -> Result<Vec<PresignedUrl>, Error> {
        self.ensure_open()?;
        let request = UrlListRequest::for_object_keys(
            object_keys
                .iter()
                .map(|key| (key.as_str(), digests.get(key).map(String::as_str))),
        );

        let mut post = self.post();
        for key in object_keys.iter().take(self.artifact_keys_header_limit) {
            post = post.header(ARTIFACT_KEYS_HEADER, key);
        }

        let body = self.post_xml(post, request.to_xml()?).await?;
        UrlListResponse::parse(&body)?.into_urls()
    }

    async fn fetch_single(
        &self,
        object_key: &str,
        digest: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, Error> {
        self.ensure_open()?;
        let request =
            UrlListRequest::for_single_key(object_key, digest, ttl.map(|t| t.as_secs()));
        self.fetch_one(object_key, request).await
    }

    async fn fetch_multipart(
        &self,
        object_key: &str,
        part_digests: &[String],
        upload_id: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, Error> {
        self.ensure_open()?;
        let request = UrlListRequest::for_multipart(
            object_key,
            part_digests,
            upload_id,
            ttl.map(|t| t.as_secs()),
        );
        self.fetch_one(object_key, request).await
    }

    async fn complete(
        &self,
        object_key: &str,
        upload_id: &str,
        etags: &[String],
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.finish_multipart_upload(object_key, upload_id, Some(etags))
            .await
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.finish_multipart_upload(object_key, upload_id, None)
            .await
    }

    fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::new(ErrorKind::BrokerFetch, err)
}

async fn read_success_body(response: reqwest::Response) -> Result<String, Error> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        return Ok(body);
    }
    if body.to_ascii_lowercase().contains(UPLOAD_INTERRUPTED_MARKER) {
        return Err(error::interrupted(format!(
            "broker reported interrupted upload: HTTP {status}"
        )));
    }
    let description = format!("broker request failed: HTTP {status}");
    if status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    {
        Err(Error::new(ErrorKind::BrokerFetch, description))
    } else {
        // auth errors and anything else the broker rejects outright
        Err(error::broker_shape(description))
    }
}
