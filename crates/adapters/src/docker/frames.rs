// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attached-stream framing.
//!
//! Without a tty the engine multiplexes stdout/stderr over one stream with
//! an 8-byte header per frame: `[tag, 0, 0, 0, len_be32]`, tag 1 = stdout,
//! tag 2 = stderr. With a tty the stream is raw bytes, all tagged stdout.

use async_trait::async_trait;
use parlor_core::StreamKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::http::io_error;
use crate::backend::{BackendError, Frame, FrameReader, StdinWriter};

const TTY_READ_CHUNK: usize = 4096;

pub(crate) struct DockerFrameReader<R> {
    io: R,
    tty: bool,
}

impl<R> DockerFrameReader<R> {
    pub(crate) fn new(io: R, tty: bool) -> Self {
        Self { io, tty }
    }
}

#[async_trait]
impl<R> FrameReader for DockerFrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Option<Frame>, BackendError> {
        if self.tty {
            let mut buf = vec![0u8; TTY_READ_CHUNK];
            let n = self.io.read(&mut buf).await.map_err(io_error)?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            return Ok(Some(Frame { stream: StreamKind::Stdout, data: buf }));
        }

        let mut header = [0u8; 8];
        if !read_exact_or_eof(&mut self.io, &mut header).await? {
            return Ok(None);
        }
        let Some(stream) = StreamKind::from_tag(header[0]) else {
            return Err(BackendError::Protocol(format!("unexpected stream tag {}", header[0])));
        };
        let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut data = vec![0u8; length];
        self.io.read_exact(&mut data).await.map_err(io_error)?;
        Ok(Some(Frame { stream, data }))
    }
}

/// Fill `buf` completely. `Ok(false)` on clean EOF at a frame boundary; a
/// partial frame is a protocol error.
async fn read_exact_or_eof<R>(io: &mut R, buf: &mut [u8]) -> Result<bool, BackendError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = io.read(&mut buf[filled..]).await.map_err(io_error)?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(BackendError::Protocol("truncated stream frame".to_string()));
        }
        filled += n;
    }
    Ok(true)
}

pub(crate) struct DockerStdinWriter<W> {
    io: W,
}

impl<W> DockerStdinWriter<W> {
    pub(crate) fn new(io: W) -> Self {
        Self { io }
    }
}

#[async_trait]
impl<W> StdinWriter for DockerStdinWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), BackendError> {
        self.io.write_all(data).await.map_err(io_error)?;
        self.io.flush().await.map_err(io_error)
    }
}

#[cfg(test)]
#[path = "frames_tests.rs"]
mod tests;
