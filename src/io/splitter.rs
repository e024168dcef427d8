/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::{self, Error};
use crate::io::digest;
use std::path::Path;

/// Maximum number of parts that a single S3 multipart upload supports
pub(crate) const MAX_PARTS: u64 = 10_000;

/// One planned slice of a file for multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilePart {
    /// 0-based part index; the S3 part number is `index + 1`
    pub(crate) index: usize,
    pub(crate) offset: u64,
    pub(crate) length: u64,
    /// lowercase hex MD5 of the slice, when digests were requested
    pub(crate) digest: Option<String>,
}

/// Split `path` into `part_count` ordered parts with stride `part_size`;
/// the last part carries the remainder. Part lengths always sum to the file
/// length, and every part except possibly the last has length `part_size`.
pub(crate) async fn split(
    path: &Path,
    part_count: u64,
    part_size: u64,
    want_digests: bool,
) -> Result<Vec<FilePart>, Error> {
    if part_count < 1 || part_count > MAX_PARTS {
        return Err(error::invalid_input(format!(
            "multipart upload requires between 1 and {MAX_PARTS} parts, got {part_count}"
        )));
    }
    let file_len = tokio::fs::metadata(path).await.map_err(Error::from)?.len();

    let mut parts = Vec::with_capacity(part_count as usize);
    for index in 0..part_count {
        let offset = index * part_size;
        let length = if index == part_count - 1 {
            file_len - offset
        } else {
            part_size
        };
        let digest = if want_digests {
            Some(digest::digest_range(path, offset, length).await?)
        } else {
            None
        };
        parts.push(FilePart {
            index: index as usize,
            offset,
            length,
            digest,
        });
    }
    Ok(parts)
}

/// The S3-style composite digest of a completed multipart upload:
/// `hex(md5(concat(unhex(etag_i)))) + "-" + N`.
pub(crate) fn multipart_digest<S: AsRef<str>>(etags: &[S]) -> Result<String, Error> {
    let mut concatenated = Vec::with_capacity(etags.len() * 16);
    for etag in etags {
        let raw = hex::decode(etag.as_ref().trim_matches('"'))
            .map_err(|e| error::invalid_input(format!("etag is not valid hex: {e}")))?;
        concatenated.extend_from_slice(&raw);
    }
    Ok(format!("{:x}-{}", md5::compute(&concatenated), etags.len()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MEBIBYTE;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn splits_with_remainder_in_last_part() {
        let mut tmp = NamedTempFile::new().unwrap();
        // 11 MiB of zeros split at a 5 MiB stride -> 5 MiB, 5 MiB, 1 MiB
        let data = vec![0u8; (11 * MEBIBYTE) as usize];
        tmp.write_all(&data).unwrap();

        let parts = split(tmp.path(), 3, 5 * MEBIBYTE, false).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].length, 5 * MEBIBYTE);
        assert_eq!(parts[1].length, 5 * MEBIBYTE);
        assert_eq!(parts[2].length, MEBIBYTE);
        assert_eq!(parts[2].offset, 10 * MEBIBYTE);
        assert_eq!(parts.iter().map(|p| p.length).sum::<u64>(), 11 * MEBIBYTE);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_remainder() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![1u8; (10 * MEBIBYTE) as usize]).unwrap();

        let parts = split(tmp.path(), 2, 5 * MEBIBYTE, false).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.length == 5 * MEBIBYTE));
    }

    #[tokio::test]
    async fn part_digests_match_slices() {
        let mut tmp = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..2048u32).flat_map(|i| i.to_le_bytes()).collect();
        tmp.write_all(&data).unwrap();

        let parts = split(tmp.path(), 2, 4096, true).await.unwrap();
        assert_eq!(
            parts[0].digest.as_deref().unwrap(),
            format!("{:x}", md5::compute(&data[..4096]))
        );
        assert_eq!(
            parts[1].digest.as_deref().unwrap(),
            format!("{:x}", md5::compute(&data[4096..]))
        );
    }

    #[tokio::test]
    async fn rejects_out_of_range_part_counts() {
        let tmp = NamedTempFile::new().unwrap();
        assert!(split(tmp.path(), 0, 5 * MEBIBYTE, false).await.is_err());
        assert!(split(tmp.path(), MAX_PARTS + 1, 5 * MEBIBYTE, false)
            .await
            .is_err());
    }

    #[test]
    fn multipart_digest_matches_s3_etag_formula() {
        let part1 = format!("{:x}", md5::compute(b"first part"));
        let part2 = format!("{:x}", md5::compute(b"second part"));

        let mut concatenated = hex::decode(&part1).unwrap();
        concatenated.extend(hex::decode(&part2).unwrap());
        let expected = format!("{:x}-2", md5::compute(&concatenated));

        assert_eq!(multipart_digest(&[part1, part2]).unwrap(), expected);
    }

    #[test]
    fn multipart_digest_strips_quotes() {
        let quoted = format!("\"{:x}\"", md5::compute(b"data"));
        assert!(multipart_digest(&[quoted]).unwrap().ends_with("-1"));
    }

    #[test]
    fn multipart_digest_rejects_non_hex() {
        assert!(multipart_digest(&["not-hex!"]).is_err());
    }
}
