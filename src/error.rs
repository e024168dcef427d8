/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::Arc;

/// A boxed error that is `Send` and `Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by this library.
///
/// Use the [`std::error::Error::source`] chain to inspect the underlying
/// cause; per-task failures are wrapped in [`ErrorKind::UploadFailed`] at the
/// batch boundary with the task error preserved as the source.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: BoxError,
}

/// General categories of upload errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The batch was cooperatively cancelled: the interrupter fired, the
    /// broker reported the upload as interrupted, or an I/O operation was
    /// interrupted.
    Interrupted,

    /// A source file does not exist
    FileNotFound,

    /// Transport-level failure talking to the URL broker (retried)
    BrokerFetch,

    /// The broker response was malformed or missing a requested object key
    BrokerShape,

    /// The broker client was used after `close()`
    BrokerShutdown,

    /// Transport-level failure talking to S3 (retried)
    S3Transport,

    /// S3 rejected the request with a non-throttling client error
    S3Permanent,

    /// The locally computed digest did not match the ETag returned by S3
    ConsistencyMismatch,

    /// Completing or aborting a multipart upload failed after retries
    MultipartFinalize,

    /// Terminal batch-level failure aggregating the root cause
    UploadFailed,

    /// I/O errors reading source files
    IOError,

    /// Some kind of internal runtime issue (e.g. task failure, poisoned mutex)
    RuntimeError,

    /// Operation input validation issues
    InvalidInput,
}

impl Error {
    /// Creates a new [`Error`] from a known kind of error as well as an
    /// arbitrary error source.
    pub fn new<E>(kind: ErrorKind, err: E) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            kind,
            source: err.into(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether a retry may succeed for this error.
    ///
    /// Only transport-level broker and S3 failures and digest mismatches
    /// (which may reflect transient corruption on a single attempt) are
    /// considered recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::BrokerFetch | ErrorKind::S3Transport | ErrorKind::ConsistencyMismatch
        )
    }

    /// Whether this error, or any error in its source chain, represents a
    /// cooperative interruption of the batch.
    pub fn is_interrupted(&self) -> bool {
        if self.kind == ErrorKind::Interrupted {
            return true;
        }
        let mut next = std::error::Error::source(self);
        while let Some(err) = next {
            if let Some(err) = err.downcast_ref::<Error>() {
                if err.kind == ErrorKind::Interrupted {
                    return true;
                }
            }
            if let Some(err) = err.downcast_ref::<std::io::Error>() {
                if err.kind() == std::io::ErrorKind::Interrupted {
                    return true;
                }
            }
            next = err.source();
        }
        false
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Interrupted => write!(f, "upload interrupted"),
            ErrorKind::FileNotFound => write!(f, "source file not found"),
            ErrorKind::BrokerFetch => write!(f, "failed fetching presigned urls from broker"),
            ErrorKind::BrokerShape => write!(f, "unexpected broker response"),
            ErrorKind::BrokerShutdown => write!(f, "broker client already shut down"),
            ErrorKind::S3Transport => write!(f, "transient S3 failure"),
            ErrorKind::S3Permanent => write!(f, "S3 rejected the request"),
            ErrorKind::ConsistencyMismatch => write!(f, "consistency check failed"),
            ErrorKind::MultipartFinalize => write!(f, "failed to finalize multipart upload"),
            ErrorKind::UploadFailed => write!(f, "file upload failed"),
            ErrorKind::IOError => write!(f, "I/O error"),
            ErrorKind::RuntimeError => write!(f, "runtime error"),
            ErrorKind::InvalidInput => write!(f, "invalid input"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        let kind = match value.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::IOError,
        };
        Self::new(kind, value)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::new(ErrorKind::RuntimeError, value)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error
where
    T: Send + Sync + 'static,
{
    fn from(value: std::sync::PoisonError<T>) -> Self {
        Self::new(ErrorKind::RuntimeError, value)
    }
}

/// An error shared between all waiters of a single-flight refresh.
#[derive(Debug, Clone)]
pub(crate) struct SharedError(pub(crate) Arc<Error>);

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<SharedError> for Error {
    fn from(value: SharedError) -> Self {
        Error::new(value.0.kind().clone(), value)
    }
}

pub(crate) fn invalid_input<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::InvalidInput, err)
}

pub(crate) fn interrupted(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::Interrupted, reason.into())
}

pub(crate) fn broker_shape<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::BrokerShape, err)
}

pub(crate) fn upload_failed<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::UploadFailed, err)
}
