/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The URL broker capability.
//!
//! The broker is the external orchestration server that mints short-lived
//! presigned URLs and tracks multipart upload ids on behalf of callers. The
//! upload engine holds exactly one abstraction against it: [`UrlBroker`].

mod client;
pub(crate) mod transport;

pub use client::{
    HttpBrokerClient, HttpBrokerClientBuilder, ARTIFACT_KEYS_HEADER, CORRELATION_ID_HEADER,
};

use crate::error::Error;
use crate::types::PresignedUrl;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Capability for negotiating presigned URLs with the external URL broker.
///
/// All calls may fail with recoverable transport errors
/// ([`ErrorKind::BrokerFetch`](crate::error::ErrorKind::BrokerFetch)) or
/// non-recoverable auth/shape errors. Implementations enter a terminal
/// shutdown state after [`close`](Self::close); further calls fail with
/// [`ErrorKind::BrokerShutdown`](crate::error::ErrorKind::BrokerShutdown).
///
/// Callers pass at most the configured chunk size of keys per
/// [`fetch_regular`](Self::fetch_regular) call; implementations do not split
/// batches internally.
#[async_trait]
pub trait UrlBroker: Send + Sync {
    /// Fetch regular (single PUT) presigned URLs for a batch of object keys.
    /// `digests` maps object keys to lowercase hex content digests and may be
    /// empty.
    async fn fetch_regular(
        &self,
        object_keys: &[String],
        digests: &HashMap<String, String>,
    ) -> Result<Vec<PresignedUrl>, Error>;

    /// Fetch a regular presigned URL for one object key, optionally with a
    /// content digest and an explicit TTL.
    async fn fetch_single(
        &self,
        object_key: &str,
        digest: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, Error>;

    /// Fetch multipart presigned URLs for one object key. The broker
    /// allocates an upload id when none is supplied.
    async fn fetch_multipart(
        &self,
        object_key: &str,
        part_digests: &[String],
        upload_id: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, Error>;

    /// Signal successful completion of a multipart upload with every part
    /// ETag in ascending part-number order.
    async fn complete(
        &self,
        object_key: &str,
        upload_id: &str,
        etags: &[String],
    ) -> Result<(), Error>;

    /// Signal abort of a multipart upload.
    async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), Error>;

    /// Enter the terminal shutdown state. Idempotent.
    fn close(&self);
}
