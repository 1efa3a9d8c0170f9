// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Cursor;

use parlor_core::StreamKind;

use super::*;

fn multiplexed(framess: &[(u8, &[u8])]) -> Vec<u8> {
    let mut raw = Vec::new();
    for (tag, data) in framess {
        raw.push(*tag);
        raw.extend_from_slice(&[0, 0, 0]);
        raw.extend_from_slice(&(data.len() as u32).to_be_bytes());
        raw.extend_from_slice(data);
    }
    raw
}

#[tokio::test]
async fn decodes_multiplexed_frames() {
    let raw = multiplexed(&[(1, b"hi\n"), (2, b"oops"), (1, b"")]);
    let mut reader = DockerFrameReader::new(Cursor::new(raw), false);

    let frame = reader.read_frame().await.unwrap().unwrap();
    assert_eq!(frame.stream, StreamKind::Stdout);
    assert_eq!(frame.data, b"hi\n");

    let frame = reader.read_frame().await.unwrap().unwrap();
    assert_eq!(frame.stream, StreamKind::Stderr);
    assert_eq!(frame.data, b"oops");

    let frame = reader.read_frame().await.unwrap().unwrap();
    assert_eq!(frame.stream, StreamKind::Stdout);
    assert!(frame.data.is_empty());

    assert!(reader.read_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn eof_at_frame_boundary_is_clean() {
    let mut reader = DockerFrameReader::new(Cursor::new(Vec::new()), false);
    assert!(reader.read_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn partial_header_is_a_protocol_error() {
    let mut reader = DockerFrameReader::new(Cursor::new(vec![1, 0, 0]), false);
    assert!(matches!(reader.read_frame().await, Err(BackendError::Protocol(_))));
}

#[tokio::test]
async fn unknown_tag_is_a_protocol_error() {
    let raw = multiplexed(&[(7, b"x")]);
    let mut reader = DockerFrameReader::new(Cursor::new(raw), false);
    assert!(matches!(reader.read_frame().await, Err(BackendError::Protocol(_))));
}

#[tokio::test]
async fn tty_stream_is_raw_stdout() {
    let mut reader = DockerFrameReader::new(Cursor::new(b"$ echo hi".to_vec()), true);
    let frame = reader.read_frame().await.unwrap().unwrap();
    assert_eq!(frame.stream, StreamKind::Stdout);
    assert_eq!(frame.data, b"$ echo hi");
    assert!(reader.read_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn stdin_writer_flushes() {
    let mut sink = Cursor::new(Vec::new());
    {
        let mut writer = DockerStdinWriter::new(&mut sink);
        writer.write_stdin(b"echo hello\n").await.unwrap();
    }
    assert_eq!(sink.into_inner(), b"echo hello\n");
}
