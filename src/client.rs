/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::broker::UrlBroker;
use crate::config::Config;
use crate::error::Error;
use crate::operation::upload_files::{UploadFiles, UploadFilesHandle, UploadFilesInput};
use std::fmt;
use std::sync::Arc;

/// Upload client for publishing batches of files through presigned URLs.
///
/// The client is cheap to clone and each clone shares the configuration and
/// the broker client. One batch at a time per broker client: the broker is
/// shut down when a batch finishes.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use s3_presigned_upload::broker::HttpBrokerClient;
/// use s3_presigned_upload::operation::upload_files::UploadFilesInput;
/// use s3_presigned_upload::{Config, Uploader};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = HttpBrokerClient::builder()
///     .endpoint("https://build.example.com/artifact-urls")
///     .build()?;
/// let config = Config::builder().path_prefix("build-42/").build();
/// let uploader = Uploader::new(config, Arc::new(broker));
///
/// let input = UploadFilesInput::builder()
///     .file("/work/out/app.jar", "bin/app.jar")
///     .build();
/// let uploaded = uploader.upload_files(input).await?.join().await?;
/// # let _ = uploaded;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Uploader {
    handle: Arc<Handle>,
}

/// Shared state between client clones and in-flight operations.
pub(crate) struct Handle {
    pub(crate) config: Config,
    pub(crate) broker: Arc<dyn UrlBroker>,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.handle.config)
            .finish()
    }
}

impl Uploader {
    /// Create a new upload client from a configuration and a URL broker.
    pub fn new(config: Config, broker: Arc<dyn UrlBroker>) -> Self {
        Self {
            handle: Arc::new(Handle { config, broker }),
        }
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &Config {
        &self.handle.config
    }

    /// Upload a batch of files. Returns a handle that must be
    /// [`join`](UploadFilesHandle::join)ed to drive the batch to completion.
    pub async fn upload_files(
        &self,
        input: UploadFilesInput,
    ) -> Result<UploadFilesHandle, Error> {
        UploadFiles::orchestrate(self.handle.clone(), input).await
    }
}
