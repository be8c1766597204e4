//! Codec Engine Contract
//!
//! The demux/decode/scale primitives a `StreamSession` and `FrameConverter`
//! drive. Every associated handle type owns its native resource and releases
//! it on drop.

use crate::error::EngineError;

use super::frame::{FrameDescriptor, ImageLayout};
use super::negotiate::FormatNegotiator;
use super::{CodecId, HwDeviceKind, MediaType, PixelFormat, Size};

/// Zero bytes appended after codec extradata so bitstream readers can
/// over-read safely (AV_INPUT_BUFFER_PADDING_SIZE)
pub const INPUT_PADDING: usize = 64;

/// Stream description as enumerated by the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub media_type: MediaType,
    pub codec: CodecId,
    /// Coded picture size
    pub width: u32,
    pub height: u32,
    /// Out-of-band codec configuration (parameter sets)
    pub extradata: Vec<u8>,
}

/// Which decoder to allocate for the selected stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderChoice<'a> {
    /// A specific decoder implementation, e.g. `h264_qsv`
    ByName(&'a str),
    /// The engine's default decoder for the stream's codec
    Default,
}

/// Geometry and format of one side of a scaling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub size: Size,
    pub format: PixelFormat,
}

/// Reusable holder for one compressed access unit
pub trait PacketBuffer {
    /// Drop the contents, keep the allocation
    fn unref(&mut self);

    /// Index of the stream the current contents belong to
    fn stream_index(&self) -> usize;
}

/// Reusable holder for one decoded picture
pub trait FrameBuffer {
    /// Drop the contents, keep the allocation
    fn unref(&mut self);

    /// Copy a device-resident picture into this (host) buffer
    fn transfer_from(&mut self, device_frame: &Self) -> Result<(), EngineError>;

    fn descriptor(&self) -> FrameDescriptor<'_>;
}

/// An opened container
pub trait Container {
    type Packet: PacketBuffer;
    type Parameters;

    fn streams(&self) -> Vec<StreamInfo>;

    /// Mark a stream so the demuxer skips its packets
    fn discard(&mut self, index: usize);

    /// Engine heuristic for the most suitable stream of `media_type`
    fn best_stream(&self, media_type: MediaType) -> Option<usize>;

    /// Codec parameters of a stream, in the form the decoder consumes
    fn parameters(&self, index: usize) -> Option<Self::Parameters>;

    /// Read the next packet. `EngineError::Eof` at end of stream.
    fn read_packet(&mut self, packet: &mut Self::Packet) -> Result<(), EngineError>;

    /// Container-level key/value tags, in container order
    fn metadata(&self) -> Vec<(String, String)>;
}

/// A decode context, configured and then opened once
pub trait Decoder {
    type Packet: PacketBuffer;
    type Frame: FrameBuffer;
    type Device;
    type Parameters;

    /// Store extradata followed by `INPUT_PADDING` zero bytes
    fn set_extradata(&mut self, bytes: &[u8]) -> Result<(), EngineError>;

    fn bind_device(&mut self, device: &Self::Device) -> Result<(), EngineError>;

    /// Install the format negotiation step; must happen before `open`
    fn install_negotiator(&mut self, negotiator: FormatNegotiator);

    fn negotiator(&self) -> Option<&FormatNegotiator>;

    /// Apply stream parameters and open the codec
    fn open(&mut self, parameters: &Self::Parameters) -> Result<(), EngineError>;

    /// Software-equivalent pixel format of decoded pictures
    fn sw_format(&self) -> PixelFormat;

    fn codec_name(&self) -> String;

    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), EngineError>;

    /// Signal end of input so buffered pictures can be drained
    fn send_eof(&mut self) -> Result<(), EngineError>;

    /// `Again` when more input is needed, `Eof` once fully drained
    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<(), EngineError>;
}

/// Scaling/reformatting engine bound to one source and destination spec
pub trait Scaler {
    /// Scale `source` into `destination`, laid out as `layout`
    fn scale(
        &mut self,
        source: &FrameDescriptor<'_>,
        destination: &mut [u8],
        layout: &ImageLayout,
    ) -> Result<(), EngineError>;
}

/// Factory for every native handle a session or converter needs
pub trait Engine {
    type Packet: PacketBuffer;
    type Frame: FrameBuffer;
    type Device;
    type Parameters;
    type Container: Container<Packet = Self::Packet, Parameters = Self::Parameters>;
    type Decoder: Decoder<
        Packet = Self::Packet,
        Frame = Self::Frame,
        Device = Self::Device,
        Parameters = Self::Parameters,
    >;
    type Scaler: Scaler;

    fn open_container(&self, locator: &str) -> Result<Self::Container, EngineError>;

    fn alloc_decoder(
        &self,
        choice: DecoderChoice<'_>,
        parameters: &Self::Parameters,
    ) -> Result<Self::Decoder, EngineError>;

    fn create_device(&self, kind: HwDeviceKind) -> Result<Self::Device, EngineError>;

    fn alloc_packet(&self) -> Result<Self::Packet, EngineError>;

    fn alloc_frame(&self) -> Result<Self::Frame, EngineError>;

    /// Build a fast (bilinear) scaler between two specs
    fn scaler(&self, source: ImageSpec, destination: ImageSpec) -> Result<Self::Scaler, EngineError>;

    /// Plane offsets, strides and total size of one host-memory image of
    /// `format` at `size`, packed with alignment 1. `None` when the engine
    /// cannot lay the format out.
    ///
    /// Defaults to the built-in table of common software formats.
    fn image_layout(&self, format: PixelFormat, size: Size) -> Option<ImageLayout> {
        ImageLayout::new(format, size)
    }
}
