/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::cache::UrlManager;
use crate::config::Config;
use crate::error::{self, Error};
use crate::http::S3HttpClient;
use crate::interrupt::Interrupter;
use crate::io::splitter::{self, FilePart};
use crate::progress::{ProgressListener, UploadDescription};
use crate::retry::Retrier;
use crate::types::{strip_query, FileUploadInfo};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Drives one file to a durable S3 object.
///
/// Decides regular vs multipart, acquires URLs through the [`UrlManager`],
/// streams bytes through the shared [`S3HttpClient`] under the [`Retrier`],
/// and reports multipart completion or abort at its terminal transition.
/// The interrupter is honored before the upload, before every part, and
/// during every retry backoff.
pub(crate) struct UploadTask {
    artifact_path: String,
    object_key: String,
    file: PathBuf,
    config: Config,
    urls: UrlManager,
    s3: S3HttpClient,
    progress: Arc<dyn ProgressListener>,
    interrupter: Arc<dyn Interrupter>,
    retrier: Retrier,
    remaining_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("artifact_path", &self.artifact_path)
            .field("object_key", &self.object_key)
            .field("file", &self.file)
            .finish()
    }
}

impl UploadTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        artifact_path: String,
        object_key: String,
        file: PathBuf,
        config: Config,
        urls: UrlManager,
        s3: S3HttpClient,
        progress: Arc<dyn ProgressListener>,
        interrupter: Arc<dyn Interrupter>,
        retrier: Retrier,
    ) -> Self {
        Self {
            artifact_path,
            object_key,
            file,
            config,
            urls,
            s3,
            progress,
            interrupter,
            retrier,
            remaining_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    pub(crate) fn object_key(&self) -> &str {
        &self.object_key
    }

    fn description(&self) -> UploadDescription<'_> {
        UploadDescription {
            absolute_path: &self.file,
            object_key: &self.object_key,
        }
    }

    fn check_interrupted(&self) -> Result<(), Error> {
        match self.interrupter.reason() {
            Some(reason) => Err(error::interrupted(reason)),
            None => Ok(()),
        }
    }

    fn finished_percentage(&self) -> u8 {
        let total = self.total_bytes.load(Ordering::Relaxed);
        if total == 0 {
            return 100;
        }
        let remaining = self.remaining_bytes.load(Ordering::Relaxed);
        100 - ((remaining as f64 * 100.0) / total as f64).round() as u8
    }

    pub(crate) async fn run(&self) -> Result<FileUploadInfo, Error> {
        self.check_interrupted()?;

        let size = match tokio::fs::metadata(&self.file).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                return Err(Error::from(e));
            }
        };
        self.total_bytes.store(size, Ordering::Relaxed);
        self.remaining_bytes.store(size, Ordering::Relaxed);
        self.progress.before_upload_started(&self.description());

        let multipart =
            self.config.multipart_enabled() && size >= self.config.multipart_threshold();
        let result = if multipart {
            self.multipart_upload(size).await
        } else {
            self.regular_upload(size).await
        };

        match result {
            Ok(digest) => Ok(FileUploadInfo::new(
                self.artifact_path.clone(),
                self.file.clone(),
                size,
                digest,
            )),
            Err(e) => {
                self.progress.on_file_upload_failed(&self.description(), &e);
                Err(e)
            }
        }
    }

    async fn regular_upload(&self, size: u64) -> Result<String, Error> {
        tracing::debug!("uploading artifact {} using regular upload", self.artifact_path);
        let url = self.urls.get_regular(&self.object_key).await?;
        let etag = self
            .retrier
            .run(|| self.s3.put_object(&url, &self.file))
            .await?;
        self.remaining_bytes.fetch_sub(size, Ordering::Relaxed);
        self.progress
            .on_file_upload_success(&self.description(), strip_query(&url));
        Ok(etag)
    }

    async fn multipart_upload(&self, size: u64) -> Result<String, Error> {
        tracing::debug!("multipart upload of {} started", self.description());
        let part_size = self.config.min_part_size();
        let part_count = size.div_ceil(part_size);

        let result = self.upload_parts(size, part_count, part_size).await;
        match result {
            Ok(etags) => {
                self.urls
                    .finish_upload(&self.object_key, Some(etags.clone()))
                    .await?;
                splitter::multipart_digest(&etags)
            }
            Err(e) => {
                tracing::warn!("multipart upload of {} failed: {e}", self.description());
                if e.is_interrupted() {
                    // the coordinator aborts leftover uploads during shutdown
                    return Err(e);
                }
                if let Err(abort_err) = self.urls.finish_upload(&self.object_key, None).await {
                    return Err(abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        size: u64,
        part_count: u64,
        part_size: u64,
    ) -> Result<Vec<String>, Error> {
        let parts = splitter::split(
            &self.file,
            part_count,
            part_size,
            self.config.consistency_check_enabled(),
        )
        .await?;
        // one entry per part so the broker knows the part count even when
        // digests are not computed
        let digests: Vec<String> = parts
            .iter()
            .map(|p| p.digest.clone().unwrap_or_default())
            .collect();

        let descriptor = self.urls.get_multipart(&self.object_key, &digests).await?;
        if descriptor.parts().len() != parts.len() {
            return Err(error::broker_shape(format!(
                "broker returned [{}] part urls for '{}', expected [{}]",
                descriptor.parts().len(),
                self.object_key,
                parts.len()
            )));
        }

        debug_assert_eq!(parts.iter().map(|p| p.length).sum::<u64>(), size);
        let mut etags = vec![String::new(); parts.len()];
        for url_part in descriptor.parts() {
            self.check_interrupted()?;
            self.progress
                .before_part_upload_started(&self.description(), url_part.part_number());

            let index = url_part.part_number().checked_sub(1).ok_or_else(|| {
                error::broker_shape(format!(
                    "broker returned part number [0] for '{}'",
                    self.object_key
                ))
            })? as usize;
            let file_part: &FilePart = parts.get(index).ok_or_else(|| {
                error::broker_shape(format!(
                    "broker returned part number [{}] beyond the [{}] planned parts of '{}'",
                    url_part.part_number(),
                    parts.len(),
                    self.object_key
                ))
            })?;

            let etag = self
                .retrier
                .run(|| {
                    self.s3
                        .put_part(url_part.url(), &self.file, file_part.offset, file_part.length)
                })
                .await
                .map_err(|e| {
                    self.progress.on_part_upload_failed(&self.description(), &e);
                    e
                })?;

            etags[index] = etag;
            self.remaining_bytes
                .fetch_sub(file_part.length, Ordering::Relaxed);
            self.progress.on_part_upload_success(
                &self.description(),
                strip_query(url_part.url()),
                self.finished_percentage(),
            );
        }

        if etags.iter().any(String::is_empty) {
            return Err(error::broker_shape(format!(
                "broker part urls for '{}' did not cover every part number",
                self.object_key
            )));
        }

        let first_url = descriptor
            .parts()
            .first()
            .map(|p| strip_query(p.url()).to_string())
            .unwrap_or_default();
        self.progress
            .on_file_upload_success(&self.description(), &first_url);
        Ok(etags)
    }
}
