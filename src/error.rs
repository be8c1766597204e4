//! Error Types
//!
//! `EngineError` is what the codec engine reports; `DecodeError` is what the
//! session and converter surface to callers.

use thiserror::Error;

use crate::media::{HwDeviceKind, PixelFormat};

/// Result reported by a codec engine primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Not enough input buffered yet (EAGAIN)
    #[error("resource temporarily unavailable")]
    Again,
    /// End of stream reached
    #[error("end of stream")]
    Eof,
    #[error("decoder not found: {0}")]
    DecoderNotFound(String),
    /// Format negotiation answered "none"
    #[error("no {0} candidate offered during format negotiation")]
    NegotiationFailed(PixelFormat),
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Any other negative result from the native engine
    #[error("{message} (error {code})")]
    Native { code: i32, message: String },
}

impl EngineError {
    /// Whether this is the transient "feed more input" condition
    pub fn is_again(&self) -> bool {
        matches!(self, EngineError::Again)
    }
}

/// Errors surfaced by `StreamSession` and `FrameConverter`
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {locator}: {source}")]
    Open {
        locator: String,
        #[source]
        source: EngineError,
    },

    #[error("no decodable video stream found in {locator}")]
    NoStreamFound { locator: String },

    #[error("failed to initialize {kind} device context: {source}")]
    DeviceInit {
        kind: HwDeviceKind,
        #[source]
        source: EngineError,
    },

    #[error("failed to open decoder: {0}")]
    CodecOpen(#[source] EngineError),

    #[error("decode failed: {0}")]
    Decode(#[source] EngineError),

    #[error("hardware frame transfer failed: {0}")]
    Transfer(#[source] EngineError),

    #[error("could not initialize the conversion context: {0}")]
    ConversionContext(#[source] EngineError),

    #[error("frame {width}x{height} {format:?} does not match converter source {expected}")]
    FrameMismatch {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: String,
    },

    #[error("failed to allocate {what}: {source}")]
    Allocation {
        what: &'static str,
        #[source]
        source: EngineError,
    },

    /// A previous pull failed; the session must be dropped
    #[error("session is in a terminal state after a fatal error")]
    Terminated,
}
