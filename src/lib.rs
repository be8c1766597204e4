//! Stream Decode Library
//!
//! Pull-based video decoding with optional hardware acceleration, and
//! conversion of decoded pictures into a caller-chosen size and pixel format.

pub mod config;
pub mod error;
pub mod media;
pub mod utils;

pub use error::{DecodeError, EngineError};
pub use media::{
    FrameConverter, FrameDescriptor, HwDeviceKind, PixelFormat, Plane, PlaneArray, Size,
    StreamSession,
};
