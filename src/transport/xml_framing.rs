// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-level framing for the XML-RPC configuration service.
//!
//! The configuration service has no length prefix: a frame is exactly one
//! top-level XML element. [`FrameReader`] scans incoming bytes counting tag
//! depth to find the end of that element without attempting to understand
//! its contents — decoding the captured bytes into structured values is a
//! separate step, left to the caller (spec §4.B).

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Frames larger than this are treated as a protocol violation rather than
/// buffered indefinitely.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub struct FrameReader<S> {
    inner: S,
    buf: BytesMut,
}

impl<S: AsyncRead + Unpin> FrameReader<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, buf: BytesMut::with_capacity(4096) }
    }

    /// Reads the next complete top-level XML element. Returns `Ok(None)` on
    /// clean EOF with no partial frame buffered.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(end) = find_frame_end(&self.buf)? {
                let frame = self.buf.split_to(end).freeze();
                return Ok(Some(frame));
            }
            if self.buf.len() > MAX_FRAME_LEN {
                return Err(Error::protocol("XML frame exceeded maximum size"));
            }

            let mut chunk = [0u8; 8192];
            let n = self
                .inner
                .read(&mut chunk)
                .await
                .map_err(|e| Error::protocol(format!("reading XML frame: {e}")))?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::protocol("connection closed mid-frame"));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

pub struct FrameWriter<S> {
    inner: S,
}

impl<S: AsyncWrite + Unpin> FrameWriter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.inner.write_all(frame).await.map_err(|e| Error::protocol(format!("writing XML frame: {e}")))?;
        self.inner.flush().await.map_err(|e| Error::protocol(format!("flushing XML frame: {e}")))
    }
}

/// Parser states while scanning for comments / CDATA, so that `<` and `>`
/// inside them never contribute to tag depth.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InTag,
    InComment,
    InCData,
    InDecl,
}

/// Scans `buf` for the end of one top-level XML element starting at the
/// first `<`. Returns the byte offset one past the end of that element, or
/// `None` if the buffer doesn't yet hold a complete element.
fn find_frame_end(buf: &[u8]) -> Result<Option<usize>> {
    let start = match buf.iter().position(|&b| b == b'<') {
        Some(i) => i,
        None => return Ok(None),
    };

    let mut i = start;
    let mut depth: i32 = 0;
    let mut state = ScanState::Outside;

    while i < buf.len() {
        match state {
            ScanState::Outside => {
                if buf[i] == b'<' {
                    if buf[i..].starts_with(b"<!--") {
                        state = ScanState::InComment;
                        i += 4;
                        continue;
                    }
                    if buf[i..].starts_with(b"<![CDATA[") {
                        state = ScanState::InCData;
                        i += 9;
                        continue;
                    }
                    if buf[i..].starts_with(b"<?") {
                        state = ScanState::InDecl;
                        i += 2;
                        continue;
                    }
                    state = ScanState::InTag;
                }
                i += 1;
            },
            ScanState::InTag => {
                let is_self_closing = buf[i] == b'/' && buf.get(i + 1) == Some(&b'>');
                if is_self_closing {
                    i += 2;
                    state = ScanState::Outside;
                    if depth == 0 {
                        return Ok(Some(i));
                    }
                    continue;
                }
                if buf[i] == b'>' {
                    let tag_start = buf[..i].iter().rposition(|&b| b == b'<').unwrap_or(start);
                    let closing = buf.get(tag_start + 1) == Some(&b'/');
                    if closing {
                        depth -= 1;
                    } else {
                        depth += 1;
                    }
                    i += 1;
                    state = ScanState::Outside;
                    if depth == 0 {
                        return Ok(Some(i));
                    }
                    continue;
                }
                i += 1;
            },
            ScanState::InComment => {
                if buf[i..].starts_with(b"-->") {
                    i += 3;
                    state = ScanState::Outside;
                } else {
                    i += 1;
                }
            },
            ScanState::InCData => {
                if buf[i..].starts_with(b"]]>") {
                    i += 3;
                    state = ScanState::Outside;
                } else {
                    i += 1;
                }
            },
            ScanState::InDecl => {
                if buf[i..].starts_with(b"?>") {
                    i += 2;
                    state = ScanState::Outside;
                } else {
                    i += 1;
                }
            },
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_one_frame_at_a_time() {
        let data = b"<a><b/></a><c></c>".to_vec();
        let mut reader = FrameReader::new(std::io::Cursor::new(data));
        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&first[..], b"<a><b/></a>");
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&second[..], b"<c></c>");
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ignores_angle_brackets_in_cdata_and_comments() {
        let data = b"<a><!-- <fake> --><![CDATA[<also fake>]]></a>".to_vec();
        let data_len = data.len();
        let mut reader = FrameReader::new(std::io::Cursor::new(data));
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.len(), data_len);
    }

    #[tokio::test]
    async fn partial_frame_yields_eof_error_without_more_data() {
        let data = b"<a><b>".to_vec();
        let mut reader = FrameReader::new(std::io::Cursor::new(data));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
