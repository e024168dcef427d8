/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

pub(crate) mod digest;
pub(crate) mod splitter;

use crate::error::Error;
use bytes::{Bytes, BytesMut};
use std::ops::DerefMut;
use std::path::Path;

/// Read `[offset, offset + length)` of `path` into memory.
///
/// Each PUT buffers at most one part, so memory stays bounded by
/// `n_threads * min_part_size`.
pub(crate) async fn read_file_chunk(
    path: &Path,
    offset: u64,
    length: u64,
) -> Result<Bytes, Error> {
    let path = path.to_path_buf();
    let handle = tokio::task::spawn_blocking(move || {
        let mut dst = BytesMut::with_capacity(length as usize);
        // the raw &[u8] slice must have the correct size; on success exactly
        // `length` bytes are read from the file
        unsafe { dst.set_len(dst.capacity()) }
        file_util::read_file_chunk_sync(dst.deref_mut(), path, offset)?;
        Ok::<Bytes, std::io::Error>(dst.freeze())
    });

    Ok(handle.await.map_err(Error::from)??)
}

mod file_util {
    #[cfg(unix)]
    pub(super) use unix::read_file_chunk_sync;
    #[cfg(windows)]
    pub(super) use windows::read_file_chunk_sync;

    #[cfg(unix)]
    mod unix {
        use std::fs::File;
        use std::io;
        use std::os::unix::fs::FileExt;
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let file = File::open(path)?;
            if dst.is_empty() {
                return Ok(());
            }
            file.read_exact_at(dst, offset)
        }
    }

    #[cfg(windows)]
    mod windows {
        use std::fs::File;
        use std::io;
        use std::io::{Read, Seek, SeekFrom};
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let mut file = File::open(path)?;
            if dst.is_empty() {
                return Ok(());
            }
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(dst)
        }
    }
}
