/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};

pin_project_lite::pin_project! {
    /// Lazy byte stream over a file slice that updates an MD5 context as
    /// bytes flow through it.
    ///
    /// The stream is restartable by construction: a retried operation opens a
    /// fresh reader, which reopens the file and reinitializes the digest. On
    /// a partial read or I/O error the digest is undefined and must not be
    /// consumed.
    pub(crate) struct DigestingReader {
        #[pin]
        inner: File,
        remaining: u64,
        context: md5::Context,
    }
}

impl std::fmt::Debug for DigestingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestingReader")
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl DigestingReader {
    /// Open a reader over `[offset, offset + length)` of `path`.
    pub(crate) async fn open(
        path: impl AsRef<Path>,
        offset: u64,
        length: u64,
    ) -> std::io::Result<Self> {
        let mut inner = File::open(path).await?;
        if offset > 0 {
            inner.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Self {
            inner,
            remaining: length,
            context: md5::Context::new(),
        })
    }

    /// Number of bytes left to stream.
    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Consume the reader and return the lowercase hex digest of the bytes
    /// streamed so far. Only meaningful after the stream reached EOF.
    pub(crate) fn digest_hex(self) -> String {
        format!("{:x}", self.context.compute())
    }
}

impl AsyncRead for DigestingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.project();
        let max = std::cmp::min(*this.remaining, buf.remaining() as u64) as usize;
        if max == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut limited = buf.take(max);
        ready!(this.inner.poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        this.context.consume(limited.filled());
        *this.remaining -= n as u64;

        // the bytes were initialized through `limited`
        unsafe { buf.assume_init(n) };
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

/// Stream `[offset, offset + length)` of `path` once and return its lowercase
/// hex MD5 digest. Fails with an I/O error if the slice cannot be fully read.
pub(crate) async fn digest_range(
    path: impl AsRef<Path>,
    offset: u64,
    length: u64,
) -> std::io::Result<String> {
    let mut reader = DigestingReader::open(path, offset, length).await?;
    let mut sink = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut sink).await?;
        if n == 0 {
            break;
        }
    }
    if reader.remaining() > 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file shorter than requested range",
        ));
    }
    Ok(reader.digest_hex())
}

/// Lowercase hex MD5 digest of a whole file.
pub(crate) async fn digest_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let len = tokio::fs::metadata(path.as_ref()).await?.len();
    digest_range(path, 0, len).await
}
