/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use super::UploadFilesContext;
use crate::error::{self, Error};
use crate::types::FileUploadInfo;
use std::sync::atomic::Ordering;
use tokio::task;

/// Handle for an in-flight `UploadFiles` operation.
///
/// # Cancellation
///
/// Cancellation is cooperative and driven by the interrupter supplied with
/// the input: once it fires, workers stop accepting new jobs, in-flight tasks
/// observe the signal at their next suspension point, every multipart upload
/// that acquired an upload id is aborted, and [`join`](Self::join) returns an
/// empty result list rather than an error. Dropping the handle instead
/// cancels the worker tasks at their await points without broker-side
/// cleanup.
#[derive(Debug)]
#[non_exhaustive]
pub struct UploadFilesHandle {
    /// All tasks spawned for this operation
    pub(crate) tasks: task::JoinSet<Result<(), Error>>,
    /// The context used to drive the batch to completion
    pub(crate) ctx: UploadFilesContext,
}

impl UploadFilesHandle {
    /// Consume the handle and wait for every upload to reach a terminal
    /// state.
    ///
    /// All-or-fail semantics: the first non-interrupted task failure is
    /// returned as an error after the pool drains and multipart bookkeeping
    /// is finalized; successful uploads of a failed batch are discarded.
    #[tracing::instrument(skip_all, level = "debug", name = "join-upload-files")]
    pub async fn join(mut self) -> Result<Vec<FileUploadInfo>, Error> {
        while let Some(join_result) = self.tasks.join_next().await {
            join_result.map_err(Error::from)??;
        }

        let state = &self.ctx.state;
        // abort multipart uploads that never reached a terminal transition
        let leftovers = state.urls.abort_leftovers().await;
        state.urls.close();

        if state.interrupted.load(Ordering::SeqCst) {
            tracing::debug!("upload batch interrupted, returning empty result list");
            return Ok(Vec::new());
        }
        leftovers.map_err(error::upload_failed)?;
        if let Some(e) = state.first_error.lock().unwrap().take() {
            return Err(error::upload_failed(e));
        }

        let mut successes = state.successes.lock().unwrap();
        Ok(std::mem::take(&mut *successes))
    }
}
