/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use super::UploadFilesContext;
use crate::error::Error;
use crate::operation::upload::UploadTask;
use async_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone)]
pub(super) struct UploadJob {
    pub(super) object_key: String,
    pub(super) artifact_path: String,
    pub(super) file: PathBuf,
}

/// Feed upload jobs into the bounded work channel until the pool shuts down.
pub(super) async fn distribute_work(
    ctx: UploadFilesContext,
    jobs: Vec<UploadJob>,
    work_tx: Sender<UploadJob>,
) -> Result<(), Error> {
    for job in jobs {
        if ctx.state.shutdown.load(Ordering::SeqCst) {
            tracing::debug!("upload submission rejected by pool shutdown");
            break;
        }
        if work_tx.send(job).await.is_err() {
            // channel closed by an interrupted worker
            tracing::debug!("upload submission rejected by pool shutdown");
            break;
        }
    }
    Ok(())
}

/// Pull jobs off the work channel and drive each file to a terminal state.
///
/// A non-interrupted failure is recorded and does not cancel siblings; an
/// interrupted failure shuts the pool down cooperatively.
pub(super) async fn upload_files(
    ctx: UploadFilesContext,
    work_rx: Receiver<UploadJob>,
) -> Result<(), Error> {
    while let Ok(job) = work_rx.recv().await {
        if ctx.state.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let state = &ctx.state;
        let task = UploadTask::new(
            job.artifact_path.clone(),
            job.object_key.clone(),
            job.file.clone(),
            state.config.clone(),
            state.urls.clone(),
            state.s3.clone(),
            state.progress.clone(),
            state.interrupter.clone(),
            state.retrier.clone(),
        );

        match task.run().await {
            Ok(info) => {
                tracing::debug!("worker finished uploading {:?}", task.object_key());
                state.successes.lock().unwrap().push(info);
            }
            Err(e) if e.is_interrupted() => {
                tracing::debug!("upload has been interrupted, shutting down worker pool");
                state.interrupted.store(true, Ordering::SeqCst);
                state.shutdown.store(true, Ordering::SeqCst);
                work_rx.close();
            }
            Err(e) => {
                tracing::warn!(
                    "failed to upload artifact [{} => {}]: {e}",
                    job.file.display(),
                    job.object_key
                );
                let mut first_error = state.first_error.lock().unwrap();
                if first_error.is_none() {
                    *first_error = Some(e);
                }
            }
        }
    }

    tracing::trace!("work channel closed, worker finished");
    Ok(())
}
