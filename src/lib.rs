/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/* Automatically managed default lints */
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
/* End of automatically managed default lints */

//! Presigned-URL S3 upload engine.
//!
//! Publishes a batch of local files as named objects into an S3-compatible
//! object store. The uploading agent never holds long-term S3 credentials;
//! short-lived presigned URLs are minted by an external URL broker and file
//! bytes are streamed directly to S3 over HTTP. Multipart completion and
//! abort are reported back to the broker.

#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub(crate) const MEBIBYTE: u64 = 1024 * 1024;

/// Minimum multipart part size accepted by S3-compatible stores.
pub(crate) const MIN_PART_SIZE_BYTES: u64 = 5 * MEBIBYTE;

pub(crate) const DEFAULT_CONCURRENCY: usize = 4;

/// Error types emitted by `s3-presigned-upload`
pub mod error;

/// Common types used by `s3-presigned-upload`
pub mod types;

/// Upload engine configuration
pub mod config;

/// Cooperative cancellation capability
pub mod interrupt;

/// Observable upload progress events
pub mod progress;

/// The URL broker capability and its HTTP implementation
pub mod broker;

/// Upload client
pub mod client;

/// Upload operations
pub mod operation;

pub(crate) mod cache;
pub(crate) mod http;
pub(crate) mod io;
pub(crate) mod retry;

pub use client::Uploader;
pub use config::Config;
