/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::{Path, PathBuf};

/// Description of a single successfully uploaded file.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadInfo {
    pub(crate) artifact_path: String,
    pub(crate) absolute_path: PathBuf,
    pub(crate) size: u64,
    pub(crate) digest: String,
}

impl FileUploadInfo {
    pub(crate) fn new(
        artifact_path: impl Into<String>,
        absolute_path: impl Into<PathBuf>,
        size: u64,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            absolute_path: absolute_path.into(),
            size,
            digest: digest.into(),
        }
    }

    /// Logical artifact path the file was published under (before prefixing)
    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    /// Absolute path of the source file
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Size of the uploaded object in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stable digest of the uploaded object.
    ///
    /// Equals the S3 ETag for regular uploads; for multipart uploads it is
    /// the S3-style composite `md5(concat(part_md5s))-N` digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// A presigned URL descriptor minted by the URL broker for one object key.
///
/// A non-multipart descriptor carries exactly one part with part number 1.
/// A multipart descriptor carries one or more ordered parts and a non-empty
/// upload id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub(crate) object_key: String,
    pub(crate) upload_id: Option<String>,
    pub(crate) multipart: bool,
    pub(crate) parts: Vec<UrlPart>,
}

impl PresignedUrl {
    /// Create a descriptor. Broker implementations use this to assemble
    /// responses.
    pub fn new(
        object_key: impl Into<String>,
        upload_id: Option<String>,
        multipart: bool,
        parts: Vec<UrlPart>,
    ) -> Self {
        Self {
            object_key: object_key.into(),
            upload_id,
            multipart,
            parts,
        }
    }

    /// The object key this descriptor was minted for
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// The broker-allocated multipart upload id, if any
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    /// Whether this descriptor belongs to a multipart upload
    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Presigned URLs ordered by ascending part number
    pub fn parts(&self) -> &[UrlPart] {
        &self.parts
    }
}

/// One presigned URL for a specific part number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPart {
    pub(crate) part_number: u32,
    pub(crate) url: String,
}

impl UrlPart {
    /// Create a part URL. Part numbers are 1-based.
    pub fn new(part_number: u32, url: impl Into<String>) -> Self {
        Self {
            part_number,
            url: url.into(),
        }
    }

    /// 1-based S3 part number
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    /// The presigned URL to PUT this part to
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Strip the query string (the signature) from a presigned URL for logging.
pub(crate) fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strip_query_removes_signature() {
        assert_eq!(
            strip_query("https://s3.example.com/bucket/key?X-Amz-Signature=abc"),
            "https://s3.example.com/bucket/key"
        );
        assert_eq!(strip_query("https://s3.example.com/k"), "https://s3.example.com/k");
    }
}
