// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! An async reader adapter that feeds every byte into a [`MultiHasher`].
//!
//! Used when streaming an upload chunk to disk: the chunk is copied from the
//! client into the staging file while all four digests advance, so the bytes
//! never have to be read a second time.

use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use pin_project_lite::pin_project;
use tokio::io::AsyncRead;

use crate::MultiHasher;

pin_project! {
    /// Wraps an [`AsyncRead`] and incrementally hashes every byte that passes
    /// through.
    ///
    /// Call [`into_parts`](Self::into_parts) once the stream is consumed to
    /// get the hasher back, either to finish it or to save its state.
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        hasher: MultiHasher,
    }
}

impl<R> HashingReader<R> {
    /// Start hashing from scratch.
    pub fn new(inner: R) -> Self {
        Self::resume(inner, MultiHasher::new())
    }

    /// Continue hashing with a hasher that already saw earlier bytes.
    pub fn resume(inner: R, hasher: MultiHasher) -> Self {
        Self { inner, hasher }
    }

    /// Total number of bytes hashed, including any from before a resume.
    pub fn bytes_hashed(&self) -> u64 {
        self.hasher.size()
    }

    pub fn into_parts(self) -> (R, MultiHasher) {
        (self.inner, self.hasher)
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let new_bytes = &buf.filled()[before..];
            if !new_bytes.is_empty() {
                this.hasher.update(new_bytes);
            }
        }
        result
    }
}
