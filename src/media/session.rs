//! Stream Session
//!
//! Opens a container, selects the video stream, binds an optional hardware
//! device and pulls decoded pictures one at a time.
//!
//! The session owns every native buffer it decodes into. Frames handed out by
//! `pull_next_frame()` borrow the session and are overwritten by the next
//! pull; copy plane data out if it must outlive that.

use log::{debug, info, warn};

use crate::error::{DecodeError, EngineError};

use super::engine::{
    Container, Decoder, DecoderChoice, Engine, FrameBuffer, PacketBuffer, StreamInfo,
};
use super::frame::FrameDescriptor;
use super::negotiate::FormatNegotiator;
use super::{CodecId, HwDeviceKind, MediaType, PixelFormat, Size};

/// Where decoded pictures land before the caller sees them
enum FrameSource<E: Engine> {
    /// Decoder output is already host memory
    Software { frame: E::Frame },
    /// Decoder output is device memory and gets downloaded into `host`.
    /// The device reference lives as long as the frames rendered from it.
    Hardware {
        frame: E::Frame,
        host: E::Frame,
        _device: E::Device,
    },
}

impl<E: Engine> FrameSource<E> {
    fn reset(&mut self) {
        match self {
            FrameSource::Software { frame } => frame.unref(),
            FrameSource::Hardware { frame, host, .. } => {
                frame.unref();
                host.unref();
            }
        }
    }

    fn decode_target(&mut self) -> &mut E::Frame {
        match self {
            FrameSource::Software { frame } => frame,
            FrameSource::Hardware { frame, .. } => frame,
        }
    }

    /// Make the received picture host-readable
    fn download(&mut self) -> Result<(), EngineError> {
        match self {
            FrameSource::Software { .. } => Ok(()),
            FrameSource::Hardware { frame, host, .. } => host.transfer_from(frame),
        }
    }

    fn output(&self) -> &E::Frame {
        match self {
            FrameSource::Software { frame } => frame,
            FrameSource::Hardware { host, .. } => host,
        }
    }

    fn is_hardware(&self) -> bool {
        matches!(self, FrameSource::Hardware { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading packets from the container
    Decoding,
    /// Container exhausted, collecting pictures the decoder still buffers
    Draining,
    Finished,
    /// A fatal error occurred; only drop is valid
    Failed,
}

/// Container key/value tags in container order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerMetadata {
    entries: Vec<(String, String)>,
}

impl ContainerMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode session over one video stream of one container
pub struct StreamSession<E: Engine> {
    // Field order is drop order: frames, packet, codec, container.
    source: FrameSource<E>,
    packet: E::Packet,
    decoder: E::Decoder,
    container: E::Container,

    state: State,
    stream_index: usize,
    frame_size: Size,
    pixel_format: PixelFormat,
    hw_pixel_format: PixelFormat,
    codec_name: String,
    frames_decoded: u64,
}

/// First stream carrying video of `codec`
fn select_stream(streams: &[StreamInfo], codec: CodecId) -> Option<&StreamInfo> {
    streams
        .iter()
        .find(|s| s.media_type == MediaType::Video && s.codec == codec)
}

impl<E: Engine> StreamSession<E> {
    /// Open `locator` and prepare a decoder for its video stream, using
    /// `hw_device` for acceleration unless it is `HwDeviceKind::None`.
    pub fn open(engine: &E, locator: &str, hw_device: HwDeviceKind) -> Result<Self, DecodeError> {
        info!("Opening {} (hw device: {})", locator, hw_device);

        let mut container = engine
            .open_container(locator)
            .map_err(|source| DecodeError::Open {
                locator: locator.to_string(),
                source,
            })?;

        let no_stream = || DecodeError::NoStreamFound {
            locator: locator.to_string(),
        };

        let streams = container.streams();
        let (stream, choice) = match hw_device.dedicated_decoder() {
            Some(dedicated) => {
                let stream = select_stream(&streams, dedicated.codec)
                    .cloned()
                    .ok_or_else(no_stream)?;
                for other in streams.iter().filter(|s| s.index != stream.index) {
                    container.discard(other.index);
                }
                info!(
                    "Stream #{} selected for {}, {} other stream(s) discarded",
                    stream.index,
                    dedicated.name,
                    streams.len() - 1
                );
                (stream, DecoderChoice::ByName(dedicated.name))
            }
            None => {
                let index = container
                    .best_stream(MediaType::Video)
                    .ok_or_else(no_stream)?;
                let stream = streams
                    .iter()
                    .find(|s| s.index == index)
                    .cloned()
                    .ok_or_else(no_stream)?;
                info!("Best video stream: #{} ({:?})", stream.index, stream.codec);
                (stream, DecoderChoice::Default)
            }
        };

        let parameters = container.parameters(stream.index).ok_or_else(no_stream)?;
        let mut decoder = engine
            .alloc_decoder(choice, &parameters)
            .map_err(DecodeError::CodecOpen)?;

        let device = if hw_device.is_none() {
            None
        } else {
            let device = engine
                .create_device(hw_device)
                .map_err(|source| DecodeError::DeviceInit {
                    kind: hw_device,
                    source,
                })?;
            decoder
                .bind_device(&device)
                .map_err(|source| DecodeError::DeviceInit {
                    kind: hw_device,
                    source,
                })?;
            info!("Device {} init OK", hw_device);
            Some(device)
        };

        if !stream.extradata.is_empty() {
            decoder
                .set_extradata(&stream.extradata)
                .map_err(DecodeError::CodecOpen)?;
            debug!("Copied {} bytes of codec extradata", stream.extradata.len());
        }

        let hw_pixel_format = hw_device.hw_pixel_format();
        if device.is_some() {
            decoder.install_negotiator(FormatNegotiator::new(hw_pixel_format));
        }

        if let Err(e) = decoder.open(&parameters) {
            let cause = decoder
                .negotiator()
                .and_then(|n| n.failure())
                .cloned()
                .unwrap_or(e);
            return Err(DecodeError::CodecOpen(cause));
        }

        // Engines may open fine and only fail later; a hardware session never
        // silently continues on a software path it did not ask for.
        if let Some(failure) = decoder.negotiator().and_then(|n| n.failure()) {
            warn!("Format negotiation failed during open: {}", failure);
            return Err(DecodeError::CodecOpen(failure.clone()));
        }
        if let Some(negotiator) = decoder.negotiator().filter(|n| n.has_run()) {
            info!(
                "Negotiated {} after {} request(s)",
                negotiator.hw_format(),
                negotiator.invocations()
            );
        }

        let frame_size = Size::new(stream.width, stream.height);
        let pixel_format = decoder.sw_format();
        let codec_name = decoder.codec_name();

        info!("Codec: {}", codec_name);
        info!("Size: {}", frame_size);
        info!("PixelFormat: {}", pixel_format);

        let packet = engine
            .alloc_packet()
            .map_err(|source| DecodeError::Allocation { what: "packet", source })?;
        let frame = engine
            .alloc_frame()
            .map_err(|source| DecodeError::Allocation { what: "frame", source })?;

        let source = match device {
            Some(device) => {
                let host = engine.alloc_frame().map_err(|source| DecodeError::Allocation {
                    what: "transfer frame",
                    source,
                })?;
                FrameSource::Hardware {
                    frame,
                    host,
                    _device: device,
                }
            }
            None => FrameSource::Software { frame },
        };

        Ok(Self {
            source,
            packet,
            decoder,
            container,
            state: State::Decoding,
            stream_index: stream.index,
            frame_size,
            pixel_format,
            hw_pixel_format,
            codec_name,
            frames_decoded: 0,
        })
    }

    /// Decode the next picture.
    ///
    /// Returns `Ok(None)` once the stream is exhausted, and keeps doing so.
    /// After an error the session is terminal and every later call returns
    /// `DecodeError::Terminated`.
    pub fn pull_next_frame(&mut self) -> Result<Option<FrameDescriptor<'_>>, DecodeError> {
        match self.state {
            State::Failed => return Err(DecodeError::Terminated),
            State::Finished => return Ok(None),
            State::Decoding | State::Draining => {}
        }

        self.source.reset();

        match self.decode_next() {
            Ok(true) => {}
            Ok(false) => {
                info!("End of stream after {} frame(s)", self.frames_decoded);
                self.state = State::Finished;
                return Ok(None);
            }
            Err(e) => {
                self.state = State::Failed;
                return Err(e);
            }
        }

        self.frames_decoded += 1;
        let frame = self.source.output().descriptor();
        if self.frames_decoded == 1 {
            info!(
                "First decoded frame: {}x{}, format: {}",
                frame.width, frame.height, frame.format
            );
        }
        Ok(Some(frame))
    }

    /// Take pictures the decoder already holds before feeding it more input.
    /// `Ok(false)` when the stream and the decoder are both exhausted.
    fn decode_next(&mut self) -> Result<bool, DecodeError> {
        loop {
            match self.decoder.receive_frame(self.source.decode_target()) {
                Ok(()) => break,
                Err(e) if e.is_again() => {}
                Err(EngineError::Eof) => return Ok(false),
                Err(e) => return Err(self.decode_failure(e)),
            }

            // EAGAIN: output is empty, the decoder needs another packet
            if self.state != State::Decoding {
                warn!("Decoder requested more input while draining");
                return Ok(false);
            }
            if !self.feed_packet()? {
                debug!("Container exhausted, draining decoder");
                self.decoder
                    .send_eof()
                    .map_err(|e| self.decode_failure(e))?;
                self.state = State::Draining;
            }
        }

        self.source.download().map_err(DecodeError::Transfer)?;
        Ok(true)
    }

    /// Read up to the next packet of the selected stream and submit it.
    /// `Ok(false)` at end of container.
    fn feed_packet(&mut self) -> Result<bool, DecodeError> {
        loop {
            self.packet.unref();
            match self.container.read_packet(&mut self.packet) {
                Ok(()) => {}
                Err(EngineError::Eof) => return Ok(false),
                Err(e) => return Err(DecodeError::Decode(e)),
            }

            if self.packet.stream_index() == self.stream_index {
                break;
            }
            debug!(
                "Skipping packet of stream #{} (decoding #{})",
                self.packet.stream_index(),
                self.stream_index
            );
        }

        let sent = self.decoder.send_packet(&self.packet);
        self.packet.unref();

        // Output was drained before this submission
        match sent {
            Ok(()) => Ok(true),
            Err(e) if e.is_again() => {
                warn!("Decoder refused input with no output pending, packet dropped");
                Ok(true)
            }
            Err(e) => Err(self.decode_failure(e)),
        }
    }

    /// A negotiation the engine deferred until decoding surfaces as the
    /// codec-open failure it really is.
    fn decode_failure(&self, error: EngineError) -> DecodeError {
        match self.decoder.negotiator().and_then(|n| n.failure()) {
            Some(failure) => DecodeError::CodecOpen(failure.clone()),
            None => DecodeError::Decode(error),
        }
    }

    /// Container-level tags (title, encoder, ...)
    pub fn container_metadata(&self) -> ContainerMetadata {
        let entries = self.container.metadata();
        for (key, value) in &entries {
            debug!("ContextInfo key: {} val: {}", key, value);
        }
        ContainerMetadata { entries }
    }

    /// Coded size of the selected stream
    pub fn frame_size(&self) -> Size {
        self.frame_size
    }

    /// Software-equivalent pixel format reported when the decoder opened
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Device-resident format negotiated for hardware sessions,
    /// `PixelFormat::None` for software sessions
    pub fn hw_pixel_format(&self) -> PixelFormat {
        self.hw_pixel_format
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn is_hw_accelerated(&self) -> bool {
        self.source.is_hardware()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Pool allocated during format negotiation, if any
    pub fn frame_pool(&self) -> Option<super::PoolConfig> {
        self.decoder.negotiator().and_then(|n| n.pool()).copied()
    }
}
