//! NDJSON line framing for the worker's stdio.
//!
//! Both ends read with this decoder: the server on the worker's stdout, the
//! worker on its own stdin. Lines are capped at [`MAX_LINE_BYTES`] so an
//! unterminated line cannot grow the read buffer without bound. Writes go
//! through [`super::control::to_line`] and need no codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line decoder yielding non-blank lines without their `\r\n` ending.
///
/// An over-long line decodes to [`AppError::Protocol`] once; decoding then
/// resumes at the next line.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a decoder with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }

    fn next_line(&mut self, src: &mut BytesMut, at_eof: bool) -> Result<Option<String>> {
        loop {
            let decoded = if at_eof {
                self.0.decode_eof(src)
            } else {
                self.0.decode(src)
            };
            match decoded.map_err(map_codec_error)? {
                Some(line) if line.trim().is_empty() => {}
                other => return Ok(other),
            }
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.next_line(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.next_line(src, true)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("progress line exceeds {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(err) => AppError::Io(format!("worker pipe: {err}")),
    }
}
