//! NDJSON framing for MCP module streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! so that a misbehaving module cannot make the bridge buffer an unbounded
//! amount of output while waiting for a newline.
//!
//! Two entry points share the same framing rules:
//!
//! - [`McpCodec`] implements [`Decoder`]/[`Encoder`] for use with
//!   [`tokio_util::codec::FramedRead`] / [`tokio_util::codec::FramedWrite`].
//! - [`LineFramer`] is the push-style form used by the output pump: each
//!   stdout chunk is handed to [`LineFramer::feed`], which yields the
//!   complete lines it made available.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted from a module: 1 MiB.
///
/// Longer lines are reported as [`AppError::Framing`] and skipped up to the
/// next newline; the bytes are never retained.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for module stdio streams.
///
/// Each `\n`-terminated UTF-8 string is one message. A trailing `\r` is
/// stripped on decode.
#[derive(Debug)]
pub struct McpCodec(LinesCodec);

impl McpCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for McpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for McpCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // The length limit is a decoder concern only.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

/// Incremental line framer over raw stdout chunks.
///
/// Bytes are appended at the back of an internal buffer and complete lines
/// are split off its front; a line is never scanned twice. Partial trailing
/// content stays buffered until a later chunk completes it.
#[derive(Debug, Default)]
pub struct LineFramer {
    codec: McpCodec,
    buf: BytesMut,
}

impl LineFramer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return an iterator over the lines it completed.
    ///
    /// Blank and whitespace-only lines are skipped. Oversized or non-UTF-8
    /// lines surface as `Err(AppError::Framing)` items and framing resumes
    /// at the next line. Dropping the iterator early is harmless: unread
    /// lines are returned by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buf.extend_from_slice(chunk);
        Frames { framer: self }
    }

    /// Number of bytes currently retained (an incomplete trailing line).
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

/// Lazy iterator returned by [`LineFramer::feed`].
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Frames<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.framer.codec.decode(&mut self.framer.buf) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Framing(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) if io_err.kind() == std::io::ErrorKind::InvalidData => {
            AppError::Framing(format!("invalid utf-8: {io_err}"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
