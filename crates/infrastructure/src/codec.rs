//! Newline-delimited JSON framing for the worker streams.
//!
//! One frame is one JSON object followed by `\n`. Compact JSON never
//! contains a raw newline, so the terminator is unambiguous. Inbound bytes
//! are fed in arbitrary chunks; complete frames are decoded and the trailing
//! partial frame is carried over to the next [`FrameCodec::feed`].

use postwhale_domain::{DomainError, ResponseEnvelope};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Frame terminator.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Default cap on a single inbound frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but cannot be attributed to a call.
    #[error("unattributable frame: {0}")]
    Envelope(#[from] DomainError),
}

/// Decodes one frame without its terminator.
///
/// A trailing `\r` is ignored. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`FrameDecodeError`] if the line is not a JSON object with a
/// numeric `requestId`.
pub fn decode_frame(line: &[u8]) -> Result<Option<ResponseEnvelope>, FrameDecodeError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(line)?;
    Ok(Some(ResponseEnvelope::from_value(value)?))
}

/// Stateful splitter for the worker's output stream.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: Vec<u8>,
    max_frame_len: usize,
    discarding: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Creates a codec with the default frame cap.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Creates a codec that drops frames longer than `max_frame_len` bytes.
    #[must_use]
    pub const fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Encodes a value as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
        let mut frame = serde_json::to_vec(value)?;
        frame.push(FRAME_TERMINATOR);
        Ok(frame)
    }

    /// Accepts newly arrived bytes and returns every envelope completed by
    /// them, in stream order.
    ///
    /// Malformed or unattributable frames are logged and skipped; decoding
    /// resumes at the next terminator.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ResponseEnvelope> {
        let mut envelopes = Vec::new();
        let mut rest = bytes;

        while let Some(end) = rest.iter().position(|&b| b == FRAME_TERMINATOR) {
            let (chunk, tail) = rest.split_at(end);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(chunk);
            let line = std::mem::take(&mut self.buffer);

            if line.len() > self.max_frame_len {
                tracing::warn!(len = line.len(), max = self.max_frame_len, "Dropping oversized frame");
                continue;
            }

            match decode_frame(&line) {
                Ok(Some(envelope)) => envelopes.push(envelope),
                Ok(None) => {}
                Err(error) => tracing::warn!(%error, "Dropping inbound frame"),
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_len {
                tracing::warn!(
                    len = self.buffer.len(),
                    max = self.max_frame_len,
                    "Partial frame exceeds limit, skipping to next terminator"
                );
                self.buffer.clear();
                self.discarding = true;
            }
        }

        envelopes
    }

    /// Bytes of the partial frame waiting for its terminator.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}
