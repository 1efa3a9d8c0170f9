// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client for the Docker Engine API.
//!
//! One connection per request, `Connection: close`. The attach endpoint
//! upgrades the connection instead; its response head is read unbuffered so
//! no stream bytes are swallowed by a read-ahead buffer.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

use crate::backend::BackendError;

/// A duplex engine connection; Unix socket or TCP.
pub(crate) trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

pub(crate) const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transport {
    Unix(PathBuf),
    Tcp(String),
}

impl Transport {
    pub(crate) fn parse(url: Option<&str>) -> Result<Self, BackendError> {
        let Some(url) = url else {
            return Ok(Self::Unix(PathBuf::from(DEFAULT_SOCKET)));
        };
        if let Some(path) = url.strip_prefix("unix://") {
            Ok(Self::Unix(PathBuf::from(path)))
        } else if let Some(addr) = url.strip_prefix("tcp://").or_else(|| url.strip_prefix("http://")) {
            Ok(Self::Tcp(addr.trim_end_matches('/').to_string()))
        } else {
            Err(BackendError::Unavailable(format!("unsupported engine url: {url}")))
        }
    }

    async fn connect(&self) -> Result<Box<dyn Conn>, BackendError> {
        match self {
            Self::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(|error| {
                    BackendError::Unavailable(format!("connect {}: {}", path.display(), error))
                })?;
                Ok(Box::new(stream))
            }
            Self::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await.map_err(|error| {
                    BackendError::Unavailable(format!("connect {addr}: {error}"))
                })?;
                Ok(Box::new(stream))
            }
        }
    }
}

/// Response to a plain (non-upgrading) request.
#[derive(Debug)]
pub(crate) struct Response {
    pub status: u16,
    pub body: String,
}

/// Issue one request and read the full response.
pub(crate) async fn request(
    transport: &Transport,
    method: &str,
    path: &str,
    body: Option<&serde_json::Value>,
) -> Result<Response, BackendError> {
    tokio::time::timeout(REQUEST_TIMEOUT, send_request(transport, method, path, body))
        .await
        .map_err(|_| BackendError::Unavailable(format!("{method} {path} timed out")))?
}

async fn send_request(
    transport: &Transport,
    method: &str,
    path: &str,
    body: Option<&serde_json::Value>,
) -> Result<Response, BackendError> {
    let mut stream = transport.connect().await?;
    let raw = format_request(method, path, body);
    stream.write_all(raw.as_bytes()).await.map_err(io_error)?;
    let mut reader = BufReader::new(stream);
    read_response(&mut reader).await
}

pub(crate) fn format_request(method: &str, path: &str, body: Option<&serde_json::Value>) -> String {
    match body {
        Some(body) => {
            let body = body.to_string();
            format!(
                "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        }
        None => {
            format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        }
    }
}

/// Read a status line, headers, and body (Content-Length, chunked, or
/// read-to-close).
pub(crate) async fn read_response<R>(reader: &mut R) -> Result<Response, BackendError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await.map_err(io_error)?;
    let status = parse_status_line(&line)?;

    let mut content_length: Option<usize> = None;
    let mut chunked = false;
    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await.map_err(io_error)?;
        if n == 0 {
            return Err(BackendError::Protocol("truncated response headers".to_string()));
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("transfer-encoding")
                && value.eq_ignore_ascii_case("chunked")
            {
                chunked = true;
            }
        }
    }

    let body = if chunked {
        read_chunked_body(reader).await?
    } else if let Some(length) = content_length {
        let mut buf = vec![0u8; length];
        reader.read_exact(&mut buf).await.map_err(io_error)?;
        buf
    } else {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.map_err(io_error)?;
        buf
    };

    Ok(Response { status, body: String::from_utf8_lossy(&body).into_owned() })
}

pub(crate) fn parse_status_line(line: &str) -> Result<u16, BackendError> {
    // "HTTP/1.1 200 OK"
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| BackendError::Protocol(format!("bad status line: {line:?}")))
}

async fn read_chunked_body<R>(reader: &mut R) -> Result<Vec<u8>, BackendError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(io_error)?;
        let size_field = line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| BackendError::Protocol(format!("bad chunk size: {size_field:?}")))?;
        if size == 0 {
            let mut trailer = String::new();
            let _ = reader.read_line(&mut trailer).await;
            break;
        }
        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).await.map_err(io_error)?;
        body.extend_from_slice(&chunk);
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await.map_err(io_error)?;
    }
    Ok(body)
}

/// Send an upgrading request and hand back the raw duplex stream once the
/// engine switches protocols.
pub(crate) async fn upgrade(
    transport: &Transport,
    method: &str,
    path: &str,
) -> Result<Box<dyn Conn>, BackendError> {
    let mut stream = transport.connect().await?;
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nUpgrade: tcp\r\nConnection: Upgrade\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(raw.as_bytes()).await.map_err(io_error)?;

    let head = read_head_unbuffered(&mut stream).await?;
    let status = parse_status_line(head.lines().next().unwrap_or_default())?;
    // 101 Switching Protocols; older engines answer 200 with the raw stream.
    if status != 101 && status != 200 {
        return Err(BackendError::Api { status, message: "attach rejected".to_string() });
    }
    Ok(stream)
}

async fn read_head_unbuffered(stream: &mut Box<dyn Conn>) -> Result<String, BackendError> {
    let mut head: Vec<u8> = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.map_err(io_error)?;
        if n == 0 {
            return Err(BackendError::Protocol("connection closed during upgrade".to_string()));
        }
        head.push(byte[0]);
        if head.len() > 16 * 1024 {
            return Err(BackendError::Protocol("oversized upgrade response".to_string()));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

pub(crate) fn io_error(error: std::io::Error) -> BackendError {
    BackendError::Unavailable(error.to_string())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
