/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::{DEFAULT_CONCURRENCY, MEBIBYTE, MIN_PART_SIZE_BYTES};
use std::cmp;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_URL_CHUNK_SIZE: usize = 100;
const DEFAULT_MIN_PART_SIZE: u64 = 8 * MEBIBYTE;
const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * MEBIBYTE;
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_URL_TTL: Duration = Duration::from_secs(600);

/// Configuration for an [`Uploader`](crate::client::Uploader)
#[derive(Debug, Clone)]
pub struct Config {
    max_attempts: u32,
    base_delay: Duration,
    presigned_url_max_chunk_size: usize,
    min_part_size: u64,
    multipart_threshold: u64,
    multipart_enabled: bool,
    connection_timeout: Duration,
    n_threads: usize,
    url_ttl: Duration,
    consistency_check_enabled: bool,
    path_prefix: String,
}

impl Config {
    /// Create a new `Config` builder
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Maximum number of attempts per retried operation
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay for exponential retry backoff
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Maximum number of object keys per broker batch request
    pub fn presigned_url_max_chunk_size(&self) -> usize {
        self.presigned_url_max_chunk_size
    }

    /// Multipart part size in bytes
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// File size at or above which multipart upload is used
    pub fn multipart_threshold(&self) -> u64 {
        self.multipart_threshold
    }

    /// Whether multipart uploads are enabled at all
    pub fn multipart_enabled(&self) -> bool {
        self.multipart_enabled
    }

    /// Connection timeout for broker and S3 requests
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Number of parallel upload workers (also sizes the HTTP connection pool)
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// How long a cached presigned URL snapshot is served before a refresh
    pub fn url_ttl(&self) -> Duration {
        self.url_ttl
    }

    /// Whether locally computed digests are compared against S3 ETags
    pub fn consistency_check_enabled(&self) -> bool {
        self.consistency_check_enabled
    }

    /// Prefix prepended to every logical artifact path to form the object key
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Fluent style builder for [`Config`]
#[derive(Debug, Clone, Default)]
pub struct Builder {
    max_attempts: Option<u32>,
    base_delay: Option<Duration>,
    presigned_url_max_chunk_size: Option<usize>,
    min_part_size: Option<u64>,
    multipart_threshold: Option<u64>,
    multipart_enabled: Option<bool>,
    connection_timeout: Option<Duration>,
    n_threads: Option<usize>,
    url_ttl: Option<Duration>,
    consistency_check_enabled: Option<bool>,
    path_prefix: Option<String>,
}

impl Builder {
    /// Maximum number of attempts per retried operation. Values below 1 are
    /// rounded up.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(cmp::max(max_attempts, 1));
        self
    }

    /// Base delay for exponential retry backoff.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Maximum number of object keys per broker batch request. Values below 1
    /// are rounded up.
    pub fn presigned_url_max_chunk_size(mut self, chunk_size: usize) -> Self {
        self.presigned_url_max_chunk_size = Some(cmp::max(chunk_size, 1));
        self
    }

    /// Multipart part size in bytes.
    ///
    /// The minimum part size is 5 MiB, any part size less than that will be
    /// rounded up.
    pub fn min_part_size(mut self, part_size: u64) -> Self {
        self.min_part_size = Some(cmp::max(part_size, MIN_PART_SIZE_BYTES));
        self
    }

    /// Minimum object size that should trigger a multipart upload.
    ///
    /// Clamped to at least the configured part size at [`build`](Self::build)
    /// time.
    pub fn multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = Some(threshold);
        self
    }

    /// Enable or disable multipart uploads entirely.
    pub fn multipart_enabled(mut self, enabled: bool) -> Self {
        self.multipart_enabled = Some(enabled);
        self
    }

    /// Connection timeout for broker and S3 requests.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Number of parallel upload workers. Values below 1 are rounded up.
    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(cmp::max(n_threads, 1));
        self
    }

    /// How long a cached presigned URL snapshot is served before a refresh.
    pub fn url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = Some(ttl);
        self
    }

    /// Compare locally computed digests against the ETags returned by S3.
    pub fn consistency_check_enabled(mut self, enabled: bool) -> Self {
        self.consistency_check_enabled = Some(enabled);
        self
    }

    /// Prefix prepended to every logical artifact path to form the object key.
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Consumes the builder and constructs a [`Config`]
    pub fn build(self) -> Config {
        let min_part_size = self.min_part_size.unwrap_or(DEFAULT_MIN_PART_SIZE);
        let multipart_threshold = cmp::max(
            self.multipart_threshold
                .unwrap_or(DEFAULT_MULTIPART_THRESHOLD),
            min_part_size,
        );
        Config {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_delay: self.base_delay.unwrap_or(DEFAULT_BASE_DELAY),
            presigned_url_max_chunk_size: self
                .presigned_url_max_chunk_size
                .unwrap_or(DEFAULT_URL_CHUNK_SIZE),
            min_part_size,
            multipart_threshold,
            multipart_enabled: self.multipart_enabled.unwrap_or(true),
            connection_timeout: self
                .connection_timeout
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            n_threads: self.n_threads.unwrap_or(DEFAULT_CONCURRENCY),
            url_ttl: self.url_ttl.unwrap_or(DEFAULT_URL_TTL),
            consistency_check_enabled: self.consistency_check_enabled.unwrap_or(true),
            path_prefix: self.path_prefix.unwrap_or_default(),
        }
    }
}
