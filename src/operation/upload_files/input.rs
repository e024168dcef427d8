/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::interrupt::{Interrupter, NeverInterrupted};
use crate::progress::{ProgressListener, TracingProgressListener};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Input type for uploading a batch of files.
///
/// Maps absolute file paths to logical artifact paths. Entries mapping to the
/// same object key are resolved last-write-wins with a warning.
#[non_exhaustive]
pub struct UploadFilesInput {
    pub(crate) files: Vec<(PathBuf, String)>,
    pub(crate) interrupter: Arc<dyn Interrupter>,
    pub(crate) progress: Arc<dyn ProgressListener>,
}

impl fmt::Debug for UploadFilesInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFilesInput")
            .field("files", &self.files)
            .field("interrupter", &"<interrupter>")
            .field("progress", &"<listener>")
            .finish()
    }
}

impl UploadFilesInput {
    /// Create a new builder for `UploadFilesInput`
    pub fn builder() -> UploadFilesInputBuilder {
        UploadFilesInputBuilder::default()
    }
}

/// Fluent style builder for [`UploadFilesInput`]
#[derive(Default)]
pub struct UploadFilesInputBuilder {
    files: Vec<(PathBuf, String)>,
    interrupter: Option<Arc<dyn Interrupter>>,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl fmt::Debug for UploadFilesInputBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFilesInputBuilder")
            .field("files", &self.files)
            .finish()
    }
}

impl UploadFilesInputBuilder {
    /// Add one file to upload under the given logical artifact path.
    ///
    /// An artifact path that is empty or ends with `/` is completed with the
    /// file name.
    pub fn file(mut self, path: impl Into<PathBuf>, artifact_path: impl Into<String>) -> Self {
        self.files.push((path.into(), artifact_path.into()));
        self
    }

    /// Add several files at once.
    pub fn files<P, S>(mut self, files: impl IntoIterator<Item = (P, S)>) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        self.files
            .extend(files.into_iter().map(|(p, s)| (p.into(), s.into())));
        self
    }

    /// Capability polled at every suspension point to stop the batch
    /// cooperatively. Defaults to never interrupting.
    pub fn interrupter(mut self, interrupter: Arc<dyn Interrupter>) -> Self {
        self.interrupter = Some(interrupter);
        self
    }

    /// Observer for per-file and per-part progress events. Defaults to the
    /// tracing-backed listener.
    pub fn progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    /// Consumes the builder and constructs an [`UploadFilesInput`]
    pub fn build(self) -> UploadFilesInput {
        UploadFilesInput {
            files: self.files,
            interrupter: self
                .interrupter
                .unwrap_or_else(|| Arc::new(NeverInterrupted)),
            progress: self
                .progress
                .unwrap_or_else(|| Arc::new(TracingProgressListener::new())),
        }
    }
}
