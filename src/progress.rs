/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of uploads that receive verbose per-part logging from
/// [`TracingProgressListener`]. Later uploads only log failures.
pub const MAX_VERBOSE_UPLOAD_LOGS: usize = 10;

/// Identifies one upload for progress reporting, formatted as
/// `[/abs/path => object/key]`.
#[derive(Debug, Clone, Copy)]
pub struct UploadDescription<'a> {
    pub(crate) absolute_path: &'a Path,
    pub(crate) object_key: &'a str,
}

impl fmt::Display for UploadDescription<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} => {}]", self.absolute_path.display(), self.object_key)
    }
}

/// Observer for per-file and per-part upload events.
///
/// All methods default to no-ops; implement only what you need. Listeners are
/// shared across workers and must be cheap and non-blocking.
#[allow(unused_variables)]
pub trait ProgressListener: Send + Sync {
    /// A file upload is about to start
    fn before_upload_started(&self, upload: &UploadDescription<'_>) {}

    /// A multipart part upload is about to start
    fn before_part_upload_started(&self, upload: &UploadDescription<'_>, part_number: u32) {}

    /// A part finished uploading; `url` has its query string stripped
    fn on_part_upload_success(&self, upload: &UploadDescription<'_>, url: &str, percent: u8) {}

    /// A part failed after retries
    fn on_part_upload_failed(&self, upload: &UploadDescription<'_>, error: &Error) {}

    /// The whole file finished uploading; `url` has its query string stripped
    fn on_file_upload_success(&self, upload: &UploadDescription<'_>, url: &str) {}

    /// The file upload failed
    fn on_file_upload_failed(&self, upload: &UploadDescription<'_>, error: &Error) {}
}

/// A [`ProgressListener`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressListener;

impl ProgressListener for NoopProgressListener {}

/// Default listener that forwards events to `tracing`.
///
/// Failures are logged at `warn` for every upload. Per-part and success lines
/// are logged at `debug` for the first [`MAX_VERBOSE_UPLOAD_LOGS`] uploads
/// only, so large batches do not flood the log.
#[derive(Debug, Default)]
pub struct TracingProgressListener {
    log_counter: AtomicUsize,
}

impl TracingProgressListener {
    /// Create a listener with a fresh verbosity budget.
    pub fn new() -> Self {
        Self::default()
    }

    fn verbose(&self) -> bool {
        self.log_counter.load(Ordering::Relaxed) < MAX_VERBOSE_UPLOAD_LOGS
    }
}

impl ProgressListener for TracingProgressListener {
    fn before_upload_started(&self, upload: &UploadDescription<'_>) {
        if self.verbose() {
            tracing::debug!("started uploading {upload}");
        }
    }

    fn before_part_upload_started(&self, upload: &UploadDescription<'_>, part_number: u32) {
        if self.verbose() {
            tracing::debug!("started uploading part #{part_number} of {upload}");
        }
    }

    fn on_part_upload_success(&self, upload: &UploadDescription<'_>, url: &str, percent: u8) {
        if self.verbose() {
            tracing::debug!("upload {upload} to {url} at {percent}%");
        }
    }

    fn on_part_upload_failed(&self, upload: &UploadDescription<'_>, error: &Error) {
        tracing::warn!("upload chunk {upload} failed with error: {error}");
    }

    fn on_file_upload_success(&self, upload: &UploadDescription<'_>, url: &str) {
        if self.log_counter.fetch_add(1, Ordering::Relaxed) < MAX_VERBOSE_UPLOAD_LOGS {
            tracing::debug!("upload {upload} to {url} is finished");
        }
    }

    fn on_file_upload_failed(&self, upload: &UploadDescription<'_>, error: &Error) {
        tracing::warn!("upload {upload} failed with error: {error}");
    }
}
