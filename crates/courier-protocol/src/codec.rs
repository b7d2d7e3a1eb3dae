//! Codec for encoding and decoding Courier frames.
//!
//! Frames are plain JSON documents, one per transport message.

use bytes::Bytes;
use serde::de::Error as _;
use serde::Serialize;
use thiserror::Error;

use crate::frames::{Frame, FrameRef};

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {max}", max = MAX_FRAME_SIZE)]
    FrameTooLarge(usize),

    /// Not a JSON object with a string `event` field.
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The payload does not match the shape required by its event.
    #[error("Invalid payload for '{event}': {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Whether this error should be dropped without being reported.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_) | ProtocolError::FrameTooLarge(_))
    }
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    encode_event(&frame.event, &frame.data)
}

/// Encode an event and its payload without building an owned [`Frame`].
///
/// The result is shared between every recipient of a broadcast.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_event<T: Serialize + ?Sized>(event: &str, data: &T) -> Result<Bytes, ProtocolError> {
    let payload =
        serde_json::to_vec(&FrameRef { event, data }).map_err(ProtocolError::Encode)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large, not JSON, or lacks an `event` string.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    // Serde would also accept a JSON array in place of the object.
    if data.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'{') {
        return Err(ProtocolError::Malformed(serde_json::Error::custom(
            "frame is not a JSON object",
        )));
    }

    serde_json::from_slice(data).map_err(ProtocolError::Malformed)
}
