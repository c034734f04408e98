//! Frame Decompression
//!
//! Venues disagree on what a binary WebSocket frame holds: Huobi wraps
//! every payload in gzip, OKX in a raw deflate stream, others send
//! plain text. `FrameCodec` collapses all three into UTF-8 text.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder};

use crate::application::ports::FrameKind;

/// Errors from decompressing or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The compressed stream was corrupt.
    #[error("failed to decompress frame: {0}")]
    Decompress(#[from] std::io::Error),
    /// The decompressed payload was not UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Stateless decoder for one venue's frame encoding.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    frame: FrameKind,
}

impl FrameCodec {
    /// Codec for the given frame kind.
    #[must_use]
    pub const fn new(frame: FrameKind) -> Self {
        Self { frame }
    }

    /// Decode one binary frame into text.
    ///
    /// # Errors
    ///
    /// Fails on corrupt compressed data or non-UTF-8 payloads.
    pub fn decode(&self, payload: &[u8]) -> Result<String, TransportError> {
        let bytes = match self.frame {
            FrameKind::Plain => payload.to_vec(),
            FrameKind::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(payload).read_to_end(&mut out)?;
                out
            }
            FrameKind::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(payload).read_to_end(&mut out)?;
                out
            }
        };
        Ok(String::from_utf8(bytes)?)
    }
}
