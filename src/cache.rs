/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::broker::UrlBroker;
use crate::config::Config;
use crate::error::{self, Error, ErrorKind, SharedError};
use crate::io::digest;
use crate::retry::Retrier;
use crate::types::PresignedUrl;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// TTL-bounded snapshot of presigned URLs for every object key of a batch,
/// plus the registry of live multipart upload ids.
///
/// Snapshot reads are lock-free on the shared `Arc`; refresh is single-flight:
/// exactly one refresh runs at a time and every concurrent reader observes the
/// same outcome, including failure. Multipart URL fetches always bypass the
/// snapshot because upload ids are stateful.
#[derive(Clone)]
pub(crate) struct UrlManager {
    inner: Arc<Inner>,
}

struct Inner {
    object_keys: Vec<String>,
    files: HashMap<String, PathBuf>,
    ttl: Duration,
    max_chunk_size: usize,
    consistency_check: bool,
    broker: Arc<dyn UrlBroker>,
    retrier: Retrier,
    state: Mutex<CacheState>,
    digests: tokio::sync::Mutex<Option<Arc<HashMap<String, String>>>>,
    registry: Mutex<HashMap<String, String>>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    inflight: Option<RefreshFuture>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Snapshot, SharedError>>>;

#[derive(Clone)]
struct Snapshot {
    fetched_at: Instant,
    urls: Arc<HashMap<String, PresignedUrl>>,
}

impl fmt::Debug for UrlManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlManager")
            .field("object_keys", &self.inner.object_keys.len())
            .field("ttl", &self.inner.ttl)
            .field("max_chunk_size", &self.inner.max_chunk_size)
            .finish()
    }
}

impl UrlManager {
    pub(crate) fn new(
        config: &Config,
        broker: Arc<dyn UrlBroker>,
        retrier: Retrier,
        files_by_key: HashMap<String, PathBuf>,
    ) -> Self {
        let mut object_keys: Vec<String> = files_by_key.keys().cloned().collect();
        object_keys.sort();
        Self {
            inner: Arc::new(Inner {
                object_keys,
                files: files_by_key,
                ttl: config.url_ttl(),
                max_chunk_size: config.presigned_url_max_chunk_size(),
                consistency_check: config.consistency_check_enabled(),
                broker,
                retrier,
                state: Mutex::new(CacheState::default()),
                digests: tokio::sync::Mutex::new(None),
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve the presigned URL for a regular (single PUT) upload of
    /// `object_key`, refreshing the snapshot when it is missing or expired.
    pub(crate) async fn get_regular(&self, object_key: &str) -> Result<String, Error> {
        let snapshot = self.current_snapshot().await?;
        let descriptor = snapshot.urls.get(object_key).ok_or_else(|| {
            error::broker_shape(format!(
                "object key '{object_key}' not found in cached response from broker"
            ))
        })?;
        if descriptor.is_multipart() {
            return Err(error::broker_shape(format!(
                "object key '{object_key}' resolved to a multipart upload, while a regular upload was expected"
            )));
        }
        if descriptor.parts().len() != 1 {
            return Err(error::broker_shape(format!(
                "object key '{object_key}' resolved to [{}] presigned urls, expected exactly [1]",
                descriptor.parts().len()
            )));
        }
        Ok(descriptor.parts()[0].url().to_string())
    }

    /// Fetch multipart presigned URLs for `object_key` and record the
    /// broker-allocated upload id in the multipart registry.
    pub(crate) async fn get_multipart(
        &self,
        object_key: &str,
        part_digests: &[String],
    ) -> Result<PresignedUrl, Error> {
        let inner = &self.inner;
        let descriptor = inner
            .retrier
            .run(|| inner.broker.fetch_multipart(object_key, part_digests, None, None))
            .await?;

        if !descriptor.is_multipart() {
            return Err(error::broker_shape(format!(
                "object key '{object_key}' resolved to a regular upload, while a multipart upload was expected"
            )));
        }
        let upload_id = descriptor
            .upload_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                error::broker_shape(format!(
                    "multipart response for object key '{object_key}' is missing an upload id"
                ))
            })?
            .to_string();

        inner
            .registry
            .lock()
            .unwrap()
            .insert(object_key.to_string(), upload_id);
        Ok(descriptor)
    }

    /// Complete (`etags` present) or abort a multipart upload at its terminal
    /// transition and drop it from the registry. A no-op when the object key
    /// never acquired an upload id.
    pub(crate) async fn finish_upload(
        &self,
        object_key: &str,
        etags: Option<Vec<String>>,
    ) -> Result<(), Error> {
        let upload_id = { self.inner.registry.lock().unwrap().remove(object_key) };
        let Some(upload_id) = upload_id else {
            return Ok(());
        };
        let success = etags.is_some();
        tracing::debug!(
            "sending {} for multipart upload of '{object_key}'",
            if success { "complete" } else { "abort" }
        );

        let inner = &self.inner;
        let result = inner
            .retrier
            .run(|| async {
                match &etags {
                    Some(etags) => inner.broker.complete(object_key, &upload_id, etags).await,
                    None => inner.broker.abort(object_key, &upload_id).await,
                }
            })
            .await;

        result.map_err(|e| {
            let message = format!(
                "failed to {} multipart upload for '{object_key}'",
                if success { "complete" } else { "abort" }
            );
            tracing::warn!("{message}: {e}");
            Error::new(ErrorKind::MultipartFinalize, e)
        })
    }

    /// Abort every multipart upload still present in the registry. Used on
    /// coordinator exit for uploads that never reached a terminal transition.
    /// Returns the first abort failure, if any.
    pub(crate) async fn abort_leftovers(&self) -> Result<(), Error> {
        let leftovers: Vec<(String, String)> = {
            self.inner.registry.lock().unwrap().drain().collect()
        };
        let mut first_error = None;
        for (object_key, upload_id) in leftovers {
            tracing::debug!("aborting unterminated multipart upload of '{object_key}'");
            let inner = &self.inner;
            let result = inner
                .retrier
                .run(|| inner.broker.abort(&object_key, &upload_id))
                .await;
            if let Err(e) = result {
                tracing::warn!("failed to abort multipart upload for '{object_key}': {e}");
                if first_error.is_none() {
                    first_error = Some(Error::new(ErrorKind::MultipartFinalize, e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Shut the broker client down.
    pub(crate) fn close(&self) {
        self.inner.broker.close();
    }

    async fn current_snapshot(&self) -> Result<Snapshot, Error> {
        let refresh = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(snapshot) = &state.snapshot {
                if snapshot.fetched_at.elapsed() < self.inner.ttl {
                    return Ok(snapshot.clone());
                }
            }
            match &state.inflight {
                Some(refresh) => refresh.clone(),
                None => {
                    // stale snapshot is discarded before the refresh begins
                    state.snapshot = None;
                    let refresh = Self::refresh(self.inner.clone()).boxed().shared();
                    state.inflight = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await.map_err(Error::from)
    }

    async fn refresh(inner: Arc<Inner>) -> Result<Snapshot, SharedError> {
        tracing::debug!(
            "fetching presigned urls for {} object keys",
            inner.object_keys.len()
        );
        let fetched_at = Instant::now();
        let result = Self::fetch_all(&inner).await;

        let mut state = inner.state.lock().unwrap();
        state.inflight = None;
        match result {
            Ok(urls) => {
                let snapshot = Snapshot {
                    fetched_at,
                    urls: Arc::new(urls),
                };
                state.snapshot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                state.snapshot = None;
                tracing::debug!("fetching presigned urls failed: {e}");
                Err(SharedError(Arc::new(e)))
            }
        }
    }

    async fn fetch_all(inner: &Inner) -> Result<HashMap<String, PresignedUrl>, Error> {
        let digests = Self::digest_map(inner).await?;
        let mut urls = HashMap::with_capacity(inner.object_keys.len());
        let total_chunks = inner.object_keys.len().div_ceil(inner.max_chunk_size);
        for (i, chunk) in inner.object_keys.chunks(inner.max_chunk_size).enumerate() {
            tracing::debug!(
                "fetching presigned url chunk {}/{total_chunks} of size {}",
                i + 1,
                chunk.len()
            );
            let fetched = inner
                .retrier
                .run(|| inner.broker.fetch_regular(chunk, &digests))
                .await?;
            for url in fetched {
                urls.insert(url.object_key().to_string(), url);
            }
        }
        Ok(urls)
    }

    /// Full-file digests keyed by object key, computed once per batch and
    /// only when the consistency check is enabled.
    async fn digest_map(inner: &Inner) -> Result<Arc<HashMap<String, String>>, Error> {
        if !inner.consistency_check {
            return Ok(Arc::new(HashMap::new()));
        }
        let mut cached = inner.digests.lock().await;
        if let Some(digests) = cached.as_ref() {
            return Ok(digests.clone());
        }
        let mut digests = HashMap::with_capacity(inner.files.len());
        for (key, path) in &inner.files {
            match digest::digest_file(path).await {
                Ok(hex) => {
                    digests.insert(key.clone(), hex);
                }
                // missing files fail later in the task with a clearer error
                Err(e) => tracing::debug!("could not digest '{}': {e}", path.display()),
            }
        }
        let digests = Arc::new(digests);
        *cached = Some(digests.clone());
        Ok(digests)
    }
}
