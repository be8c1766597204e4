//! Frame Converter
//!
//! Rescales and reformats decoded pictures into one persistent packed
//! buffer (alignment 1). Each conversion overwrites the previous one.

use log::info;

use crate::error::{DecodeError, EngineError};

use super::engine::{Engine, ImageSpec, Scaler};
use super::frame::{FrameDescriptor, ImageLayout};
use super::{PixelFormat, Size};

pub struct FrameConverter<S: Scaler> {
    scaler: S,
    source: ImageSpec,
    layout: ImageLayout,
    /// Source plane shapes, when the source format has a known layout
    source_layout: Option<ImageLayout>,
    buffer: Vec<u8>,
}

impl<S: Scaler> FrameConverter<S> {
    /// Build a converter from `source_size`/`source_format` pictures to
    /// `destination_size`/`destination_format`.
    pub fn new<E>(
        engine: &E,
        source_size: Size,
        source_format: PixelFormat,
        destination_size: Size,
        destination_format: PixelFormat,
    ) -> Result<Self, DecodeError>
    where
        E: Engine<Scaler = S>,
    {
        let layout = engine.image_layout(destination_format, destination_size).ok_or_else(|| {
            DecodeError::ConversionContext(EngineError::Unsupported(format!(
                "cannot convert to {} at {}",
                destination_format, destination_size
            )))
        })?;

        let source = ImageSpec {
            size: source_size,
            format: source_format,
        };
        let destination = ImageSpec {
            size: destination_size,
            format: destination_format,
        };
        let scaler = engine
            .scaler(source, destination)
            .map_err(DecodeError::ConversionContext)?;

        info!(
            "Frame converter: {} {} -> {} {} ({} bytes)",
            source_size, source_format, destination_size, destination_format, layout.buffer_size
        );

        Ok(Self {
            scaler,
            source,
            layout,
            source_layout: engine.image_layout(source_format, source_size),
            buffer: vec![0u8; layout.buffer_size],
        })
    }

    /// Convert `frame` into the internal buffer and describe the result.
    /// The returned view is invalidated by the next call.
    pub fn convert(&mut self, frame: &FrameDescriptor<'_>) -> Result<FrameDescriptor<'_>, DecodeError> {
        self.check_source(frame)?;

        self.scaler
            .scale(frame, &mut self.buffer, &self.layout)
            .map_err(DecodeError::ConversionContext)?;

        Ok(self.layout.describe(&self.buffer))
    }

    /// The scaler reads whole planes; refuse pictures that do not match the
    /// geometry it was built for.
    fn check_source(&self, frame: &FrameDescriptor<'_>) -> Result<(), DecodeError> {
        let mismatch = |expected: String| DecodeError::FrameMismatch {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            expected,
        };

        if frame.size() != self.source.size || frame.format != self.source.format {
            return Err(mismatch(format!("{} {}", self.source.size, self.source.format)));
        }

        if let Some(layout) = &self.source_layout {
            if frame.planes.len() < layout.planes.len() {
                return Err(mismatch(format!("{} planes", layout.planes.len())));
            }
            for (index, (plane, expected)) in frame.planes.iter().zip(layout.planes.iter()).enumerate() {
                if plane.stride < expected.stride || plane.rows() < expected.rows {
                    return Err(mismatch(format!(
                        "plane {} of at least {} rows of {} bytes",
                        index, expected.rows, expected.stride
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn source_size(&self) -> Size {
        self.source.size
    }

    pub fn source_format(&self) -> PixelFormat {
        self.source.format
    }

    pub fn destination_size(&self) -> Size {
        self.layout.size
    }

    pub fn destination_format(&self) -> PixelFormat {
        self.layout.format
    }

    /// Bytes per converted picture
    pub fn buffer_size(&self) -> usize {
        self.layout.buffer_size
    }
}
