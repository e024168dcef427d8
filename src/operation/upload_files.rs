/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

mod input;
pub use input::{UploadFilesInput, UploadFilesInputBuilder};

mod handle;
pub use handle::UploadFilesHandle;

mod worker;

use crate::cache::UrlManager;
use crate::config::Config;
use crate::error::Error;
use crate::http::S3HttpClient;
use crate::interrupt::Interrupter;
use crate::progress::ProgressListener;
use crate::retry::Retrier;
use crate::types::FileUploadInfo;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::Instrument;
use worker::UploadJob;

/// Operation struct for uploading a batch of files through presigned URLs
#[derive(Clone, Default, Debug)]
pub(crate) struct UploadFiles;

impl UploadFiles {
    /// Execute a single `UploadFiles` operation
    pub(crate) async fn orchestrate(
        handle: Arc<crate::client::Handle>,
        input: UploadFilesInput,
    ) -> Result<UploadFilesHandle, Error> {
        let config = handle.config.clone();
        let jobs = normalize(&config, input.files);

        let files_by_key: HashMap<String, PathBuf> = jobs
            .iter()
            .map(|job| (job.object_key.clone(), job.file.clone()))
            .collect();
        let retrier = Retrier::new(&config, input.interrupter.clone());
        let urls = UrlManager::new(&config, handle.broker.clone(), retrier.clone(), files_by_key);
        let s3 = S3HttpClient::new(&config)?;

        let concurrency = config.n_threads();
        let ctx = UploadFilesContext {
            state: Arc::new(UploadFilesState {
                config,
                urls,
                s3,
                retrier,
                progress: input.progress,
                interrupter: input.interrupter,
                successes: Mutex::new(Vec::new()),
                first_error: Mutex::new(None),
                interrupted: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
        };

        // all work lands in one JoinSet so dropping the handle cancels it
        let mut tasks = JoinSet::new();
        let (work_tx, work_rx) = async_channel::bounded(concurrency);

        tasks.spawn(worker::distribute_work(ctx.clone(), jobs, work_tx));
        for i in 0..concurrency {
            let worker = worker::upload_files(ctx.clone(), work_rx.clone())
                .instrument(tracing::debug_span!("file-uploader", worker = i));
            tasks.spawn(worker);
        }

        Ok(UploadFilesHandle { tasks, ctx })
    }
}

/// `UploadFiles` operation specific state
pub(crate) struct UploadFilesState {
    pub(crate) config: Config,
    pub(crate) urls: UrlManager,
    pub(crate) s3: S3HttpClient,
    pub(crate) retrier: Retrier,
    pub(crate) progress: Arc<dyn ProgressListener>,
    pub(crate) interrupter: Arc<dyn Interrupter>,
    pub(crate) successes: Mutex<Vec<FileUploadInfo>>,
    pub(crate) first_error: Mutex<Option<Error>>,
    pub(crate) interrupted: AtomicBool,
    pub(crate) shutdown: AtomicBool,
}

impl fmt::Debug for UploadFilesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFilesState")
            .field("config", &self.config)
            .field("urls", &self.urls)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UploadFilesContext {
    pub(crate) state: Arc<UploadFilesState>,
}

/// Turn the raw file map into one job per object key, applying the configured
/// path prefix. Clashing object keys resolve last-write-wins with a warning.
fn normalize(config: &Config, files: Vec<(PathBuf, String)>) -> Vec<UploadJob> {
    let mut jobs: Vec<UploadJob> = Vec::with_capacity(files.len());
    let mut index_by_key: HashMap<String, usize> = HashMap::with_capacity(files.len());

    for (file, artifact_path) in files {
        let artifact_path = normalize_artifact_path(&artifact_path, &file);
        let object_key = format!("{}{artifact_path}", config.path_prefix());
        match index_by_key.get(&object_key) {
            Some(&index) => {
                if jobs[index].file != file {
                    tracing::warn!(
                        "found clashing artifacts path: {artifact_path} leading to different files \
                         [{}, {}]. Only the last file will be uploaded to the specified artifact path.",
                        jobs[index].file.display(),
                        file.display()
                    );
                }
                jobs[index] = UploadJob {
                    object_key,
                    artifact_path,
                    file,
                };
            }
            None => {
                index_by_key.insert(object_key.clone(), jobs.len());
                jobs.push(UploadJob {
                    object_key,
                    artifact_path,
                    file,
                });
            }
        }
    }
    jobs
}

/// Normalize a logical artifact path: forward slashes, no leading slash, no
/// `.`/`..` segments. Paths that are empty or end with `/` are completed with
/// the file name.
fn normalize_artifact_path(artifact_path: &str, file: &Path) -> String {
    let logical = artifact_path.trim().replace('\\', "/");
    let cleaned = path_clean::clean(&logical);
    let mut normalized = cleaned
        .to_string_lossy()
        .trim_start_matches('/')
        .to_string();

    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if normalized.is_empty() || normalized == "." {
        normalized = file_name;
    } else if logical.ends_with('/') {
        normalized = format!("{normalized}/{file_name}");
    }
    normalized
}

#[cfg(test)]
mod test {
    use super::*;

    fn config_with_prefix(prefix: &str) -> Config {
        Config::builder().path_prefix(prefix).build()
    }

    #[test]
    fn artifact_paths_are_cleaned() {
        let file = Path::new("/tmp/foo.txt");
        assert_eq!(normalize_artifact_path("dir/foo.txt", file), "dir/foo.txt");
        assert_eq!(normalize_artifact_path("./dir/../foo.txt", file), "foo.txt");
        assert_eq!(normalize_artifact_path("/dir/foo.txt", file), "dir/foo.txt");
        assert_eq!(normalize_artifact_path("dir\\sub\\foo.txt", file), "dir/sub/foo.txt");
    }

    #[test]
    fn empty_or_directory_paths_take_the_file_name() {
        let file = Path::new("/tmp/foo.txt");
        assert_eq!(normalize_artifact_path("", file), "foo.txt");
        assert_eq!(normalize_artifact_path("dir/", file), "dir/foo.txt");
        assert_eq!(normalize_artifact_path(".", file), "foo.txt");
    }

    #[test]
    fn prefix_is_prepended_to_object_keys() {
        let jobs = normalize(
            &config_with_prefix("build-42/"),
            vec![(PathBuf::from("/tmp/foo.txt"), "dir/foo.txt".to_string())],
        );
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].object_key, "build-42/dir/foo.txt");
        assert_eq!(jobs[0].artifact_path, "dir/foo.txt");
    }

    #[test]
    fn clashing_keys_resolve_last_write_wins() {
        let jobs = normalize(
            &config_with_prefix(""),
            vec![
                (PathBuf::from("/tmp/a.txt"), "same.txt".to_string()),
                (PathBuf::from("/tmp/other.txt"), "other.txt".to_string()),
                (PathBuf::from("/tmp/b.txt"), "same.txt".to_string()),
            ],
        );
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].object_key, "same.txt");
        assert_eq!(jobs[0].file, PathBuf::from("/tmp/b.txt"));
        assert_eq!(jobs[1].object_key, "other.txt");
    }

    #[test]
    fn same_file_twice_is_not_a_clash() {
        let jobs = normalize(
            &config_with_prefix(""),
            vec![
                (PathBuf::from("/tmp/a.txt"), "same.txt".to_string()),
                (PathBuf::from("/tmp/a.txt"), "same.txt".to_string()),
            ],
        );
        assert_eq!(jobs.len(), 1);
    }
}
