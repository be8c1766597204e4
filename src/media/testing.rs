//! Scripted in-memory engine for unit tests
//!
//! Every handle reports allocation, release and use to a shared `Ledger` so
//! tests can assert on resource discipline without a native codec library.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::EngineError;

use super::engine::{
    Container, Decoder, DecoderChoice, Engine, FrameBuffer, ImageSpec, PacketBuffer, Scaler,
    StreamInfo, INPUT_PADDING,
};
use super::frame::{FrameDescriptor, ImageLayout, Plane, PlaneArray, PlaneLayout};
use super::negotiate::{FormatNegotiator, FramePoolAllocator, PoolConfig};
use super::{CodecId, HwDeviceKind, MediaType, PixelFormat, Size};

/// Everything the mock handles observed
#[derive(Debug, Default)]
pub struct Ledger {
    pub containers_opened: u32,
    pub containers_closed: u32,
    pub decoders_allocated: u32,
    pub decoders_freed: u32,
    pub devices_created: u32,
    pub devices_freed: u32,
    pub devices_bound: u32,
    pub packets_allocated: u32,
    pub packets_freed: u32,
    pub frames_allocated: u32,
    pub frames_freed: u32,
    /// Release order of every handle, by kind
    pub drop_order: Vec<&'static str>,

    pub discarded: Vec<usize>,
    pub decoder_choice: Option<String>,
    pub extradata: Option<Vec<u8>>,
    pub pools: Vec<PoolConfig>,

    pub read_attempts: u32,
    /// Stream index of every packet handed out by the container
    pub packets_read: Vec<usize>,
    /// Stream index of every packet submitted to a decoder
    pub packets_submitted: Vec<usize>,
    pub packet_unrefs: u32,
    pub packet_filled: bool,
    pub reads_into_filled_packet: u32,
    pub eof_signals: u32,
    /// Submissions refused with "try again"
    pub send_rejections: u32,

    pub transfers: u32,
    pub scale_calls: u32,
}

/// What the mock container holds and how the mock decoder behaves
#[derive(Debug, Clone)]
pub struct Script {
    pub streams: Vec<StreamInfo>,
    /// Stream index of each packet, in container order
    pub packets: Vec<usize>,
    pub best_stream: Option<usize>,
    pub metadata: Vec<(String, String)>,

    pub sw_format: PixelFormat,
    /// Formats offered during negotiation
    pub candidates: Vec<PixelFormat>,
    /// Negotiate while opening rather than on first receive
    pub negotiate_on_open: bool,
    /// Open succeeds even when negotiation answered "none"
    pub tolerate_failed_negotiation: bool,
    /// Pictures held back before output starts
    pub reorder_delay: usize,
    /// Pictures produced by each submitted packet
    pub pictures_per_packet: usize,
    /// Submissions answer "try again" while this many pictures are pending
    pub max_pending: Option<usize>,
    /// Answer "try again" instead of end-of-stream once drained
    pub again_when_drained: bool,

    pub fail_open_container: bool,
    pub fail_device: bool,
    pub fail_open: bool,
    /// Zero-based packet read that fails with an I/O error
    pub fail_read_at: Option<usize>,
    /// Zero-based submission that fails
    pub fail_send_at: Option<usize>,
    pub fail_transfer: bool,
    pub fail_scaler: bool,
    /// Single-plane formats (bytes per pixel) the engine lays out beyond
    /// the built-in table
    pub packed_formats: Vec<(PixelFormat, usize)>,
}

impl Script {
    pub fn stream(index: usize, media_type: MediaType, codec: CodecId) -> StreamInfo {
        StreamInfo {
            index,
            media_type,
            codec,
            width: 1920,
            height: 1080,
            extradata: Vec::new(),
        }
    }

    /// A single H.264 stream with `frames` packets
    pub fn video(frames: usize) -> Self {
        Self {
            streams: vec![Self::stream(0, MediaType::Video, CodecId::H264)],
            packets: vec![0; frames],
            best_stream: Some(0),
            metadata: Vec::new(),
            sw_format: PixelFormat::Yuv420p,
            candidates: Vec::new(),
            negotiate_on_open: true,
            tolerate_failed_negotiation: false,
            reorder_delay: 0,
            pictures_per_packet: 1,
            max_pending: None,
            again_when_drained: false,
            fail_open_container: false,
            fail_device: false,
            fail_open: false,
            fail_read_at: None,
            fail_send_at: None,
            fail_transfer: false,
            fail_scaler: false,
            packed_formats: Vec::new(),
        }
    }

    /// Audio on stream 0, H.264 video on stream 1, packets interleaved
    pub fn with_audio(frames: usize) -> Self {
        let mut script = Self::video(frames);
        script.streams = vec![
            Self::stream(0, MediaType::Audio, CodecId::Other(86018)),
            Self::stream(1, MediaType::Video, CodecId::H264),
        ];
        script.packets = (0..frames).flat_map(|_| [0, 1]).collect();
        script.best_stream = Some(1);
        script
    }
}

fn native(code: i32, message: &str) -> EngineError {
    EngineError::Native {
        code,
        message: message.to_string(),
    }
}

pub struct MockEngine {
    script: Rc<Script>,
    ledger: Rc<RefCell<Ledger>>,
}

impl MockEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script: Rc::new(script),
            ledger: Rc::new(RefCell::new(Ledger::default())),
        }
    }

    pub fn ledger(&self) -> Ref<'_, Ledger> {
        self.ledger.borrow()
    }
}

pub struct MockContainer {
    script: Rc<Script>,
    ledger: Rc<RefCell<Ledger>>,
    cursor: usize,
    discarded: Vec<usize>,
}

impl Drop for MockContainer {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.containers_closed += 1;
        ledger.drop_order.push("container");
    }
}

impl Container for MockContainer {
    type Packet = MockPacket;
    type Parameters = StreamInfo;

    fn streams(&self) -> Vec<StreamInfo> {
        self.script.streams.clone()
    }

    fn discard(&mut self, index: usize) {
        self.discarded.push(index);
        self.ledger.borrow_mut().discarded.push(index);
    }

    fn best_stream(&self, _media_type: MediaType) -> Option<usize> {
        self.script.best_stream
    }

    fn parameters(&self, index: usize) -> Option<StreamInfo> {
        self.script.streams.iter().find(|s| s.index == index).cloned()
    }

    fn read_packet(&mut self, packet: &mut MockPacket) -> Result<(), EngineError> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.read_attempts += 1;
        if packet.stream.is_some() {
            ledger.reads_into_filled_packet += 1;
        }
        if self.script.fail_read_at == Some(ledger.packets_read.len()) {
            return Err(native(-5, "Input/output error"));
        }

        while let Some(&index) = self.script.packets.get(self.cursor) {
            self.cursor += 1;
            if self.discarded.contains(&index) {
                continue;
            }
            packet.stream = Some(index);
            ledger.packets_read.push(index);
            ledger.packet_filled = true;
            return Ok(());
        }
        Err(EngineError::Eof)
    }

    fn metadata(&self) -> Vec<(String, String)> {
        self.script.metadata.clone()
    }
}

pub struct MockPacket {
    ledger: Rc<RefCell<Ledger>>,
    stream: Option<usize>,
}

impl Drop for MockPacket {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.packets_freed += 1;
        ledger.drop_order.push("packet");
    }
}

impl PacketBuffer for MockPacket {
    fn unref(&mut self) {
        self.stream = None;
        let mut ledger = self.ledger.borrow_mut();
        ledger.packet_unrefs += 1;
        ledger.packet_filled = false;
    }

    fn stream_index(&self) -> usize {
        self.stream.unwrap_or(usize::MAX)
    }
}

pub struct MockFrame {
    ledger: Rc<RefCell<Ledger>>,
    fail_transfer: bool,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Format a device frame downloads to
    sw_format: PixelFormat,
    planes: Vec<(Vec<u8>, usize)>,
}

impl MockFrame {
    /// Render `picture` into this frame, reusing plane allocations
    fn fill(&mut self, size: Size, format: PixelFormat, sw_format: PixelFormat, picture: u8) {
        self.width = size.width;
        self.height = size.height;
        self.format = format;
        self.sw_format = sw_format;

        // Device frames carry one opaque surface handle
        let shapes: Vec<(usize, usize)> = match ImageLayout::new(format, size) {
            Some(layout) => layout.planes.iter().map(|p| (p.stride, p.rows)).collect(),
            None => vec![(8, 1)],
        };

        self.planes.resize_with(shapes.len(), || (Vec::new(), 0));
        for ((data, stride), (plane_stride, rows)) in self.planes.iter_mut().zip(shapes) {
            data.resize(plane_stride * rows, picture);
            data.fill(picture);
            *stride = plane_stride;
        }
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.frames_freed += 1;
        ledger.drop_order.push("frame");
    }
}

impl FrameBuffer for MockFrame {
    fn unref(&mut self) {
        self.width = 0;
        self.height = 0;
        self.format = PixelFormat::None;
        for (data, _) in &mut self.planes {
            data.clear();
        }
    }

    fn transfer_from(&mut self, device_frame: &Self) -> Result<(), EngineError> {
        if !device_frame.format.is_hardware() {
            return Err(native(-22, "Invalid argument"));
        }
        if self.fail_transfer {
            return Err(native(-5, "Input/output error"));
        }
        let picture = device_frame
            .planes
            .first()
            .and_then(|(data, _)| data.first().copied())
            .unwrap_or(0);
        self.fill(
            Size::new(device_frame.width, device_frame.height),
            device_frame.sw_format,
            device_frame.sw_format,
            picture,
        );
        self.ledger.borrow_mut().transfers += 1;
        Ok(())
    }

    fn descriptor(&self) -> FrameDescriptor<'_> {
        let planes = if self.format.is_hardware() {
            PlaneArray::new()
        } else {
            self.planes
                .iter()
                .map(|(data, stride)| Plane {
                    data: data.as_slice(),
                    stride: *stride,
                })
                .collect()
        };
        FrameDescriptor {
            width: self.width,
            height: self.height,
            format: self.format,
            planes,
        }
    }
}

pub struct MockDevice {
    ledger: Rc<RefCell<Ledger>>,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.devices_freed += 1;
        ledger.drop_order.push("device");
    }
}

struct MockPool {
    ledger: Rc<RefCell<Ledger>>,
    sw_format: PixelFormat,
    coded_size: (u32, u32),
}

impl FramePoolAllocator for MockPool {
    fn sw_format(&self) -> PixelFormat {
        self.sw_format
    }

    fn coded_size(&self) -> (u32, u32) {
        self.coded_size
    }

    fn allocate_pool(&mut self, config: &PoolConfig) -> Result<(), EngineError> {
        self.ledger.borrow_mut().pools.push(*config);
        Ok(())
    }
}

pub struct MockDecoder {
    script: Rc<Script>,
    ledger: Rc<RefCell<Ledger>>,
    name: String,
    stream: Option<StreamInfo>,
    device_bound: bool,
    negotiator: Option<FormatNegotiator>,
    output_format: PixelFormat,
    queue: VecDeque<u8>,
    submissions: usize,
    next_picture: u8,
    draining: bool,
}

impl MockDecoder {
    /// Run negotiation against the scripted candidates; false when it
    /// answered "none"
    fn negotiate(&mut self) -> bool {
        let Some(negotiator) = self.negotiator.as_mut() else {
            return true;
        };
        let coded_size = self
            .stream
            .as_ref()
            .map(|s| (s.width, s.height))
            .unwrap_or_default();
        let mut pool = MockPool {
            ledger: Rc::clone(&self.ledger),
            sw_format: self.script.sw_format,
            coded_size,
        };
        let chosen = negotiator.negotiate(&self.script.candidates, &mut pool);
        if chosen == PixelFormat::None {
            return false;
        }
        self.output_format = chosen;
        true
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.decoders_freed += 1;
        ledger.drop_order.push("decoder");
    }
}

impl Decoder for MockDecoder {
    type Packet = MockPacket;
    type Frame = MockFrame;
    type Device = MockDevice;
    type Parameters = StreamInfo;

    fn set_extradata(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let mut stored = bytes.to_vec();
        stored.resize(bytes.len() + INPUT_PADDING, 0);
        self.ledger.borrow_mut().extradata = Some(stored);
        Ok(())
    }

    fn bind_device(&mut self, _device: &MockDevice) -> Result<(), EngineError> {
        self.device_bound = true;
        self.ledger.borrow_mut().devices_bound += 1;
        Ok(())
    }

    fn install_negotiator(&mut self, negotiator: FormatNegotiator) {
        self.negotiator = Some(negotiator);
    }

    fn negotiator(&self) -> Option<&FormatNegotiator> {
        self.negotiator.as_ref()
    }

    fn open(&mut self, parameters: &StreamInfo) -> Result<(), EngineError> {
        if self.script.fail_open {
            return Err(native(-1094995529, "Invalid data found when processing input"));
        }
        self.stream = Some(parameters.clone());
        if self.script.negotiate_on_open
            && !self.negotiate()
            && !self.script.tolerate_failed_negotiation
        {
            return Err(native(-22, "Invalid argument"));
        }
        Ok(())
    }

    fn sw_format(&self) -> PixelFormat {
        self.script.sw_format
    }

    fn codec_name(&self) -> String {
        self.name.clone()
    }

    fn send_packet(&mut self, packet: &MockPacket) -> Result<(), EngineError> {
        let submission = self.submissions;
        self.submissions += 1;
        self.ledger
            .borrow_mut()
            .packets_submitted
            .push(packet.stream_index());

        if self.script.fail_send_at == Some(submission) {
            return Err(native(-1094995529, "Invalid data found when processing input"));
        }
        if self
            .script
            .max_pending
            .is_some_and(|max| self.queue.len() >= max)
        {
            self.ledger.borrow_mut().send_rejections += 1;
            return Err(EngineError::Again);
        }
        for _ in 0..self.script.pictures_per_packet {
            self.queue.push_back(self.next_picture);
            self.next_picture = self.next_picture.wrapping_add(1);
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), EngineError> {
        self.draining = true;
        self.ledger.borrow_mut().eof_signals += 1;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut MockFrame) -> Result<(), EngineError> {
        let pending = self
            .negotiator
            .as_ref()
            .map(|n| !n.has_run())
            .unwrap_or(false);
        if pending && !self.negotiate() {
            return Err(native(-22, "Invalid argument"));
        }

        let ready = self.queue.len() > self.script.reorder_delay
            || (self.draining && !self.queue.is_empty());
        if !ready {
            return Err(if self.draining && !self.script.again_when_drained {
                EngineError::Eof
            } else {
                EngineError::Again
            });
        }

        let picture = self.queue.pop_front().unwrap_or_default();
        let size = self
            .stream
            .as_ref()
            .map(|s| Size::new(s.width, s.height))
            .unwrap_or_default();
        let format = if self.device_bound && self.output_format.is_hardware() {
            self.output_format
        } else {
            self.script.sw_format
        };
        frame.fill(size, format, self.script.sw_format, picture);
        Ok(())
    }
}

pub struct MockScaler {
    ledger: Rc<RefCell<Ledger>>,
}

impl Scaler for MockScaler {
    /// Paints the destination with the first source byte
    fn scale(
        &mut self,
        source: &FrameDescriptor<'_>,
        destination: &mut [u8],
        layout: &ImageLayout,
    ) -> Result<(), EngineError> {
        if destination.len() < layout.buffer_size {
            return Err(native(-22, "Invalid argument"));
        }
        let value = source
            .plane(0)
            .and_then(|p| p.data.first().copied())
            .unwrap_or(0);
        destination[..layout.buffer_size].fill(value);
        self.ledger.borrow_mut().scale_calls += 1;
        Ok(())
    }
}

impl Engine for MockEngine {
    type Packet = MockPacket;
    type Frame = MockFrame;
    type Device = MockDevice;
    type Parameters = StreamInfo;
    type Container = MockContainer;
    type Decoder = MockDecoder;
    type Scaler = MockScaler;

    fn open_container(&self, locator: &str) -> Result<MockContainer, EngineError> {
        if self.script.fail_open_container || locator.is_empty() {
            return Err(native(-2, "No such file or directory"));
        }
        self.ledger.borrow_mut().containers_opened += 1;
        Ok(MockContainer {
            script: Rc::clone(&self.script),
            ledger: Rc::clone(&self.ledger),
            cursor: 0,
            discarded: Vec::new(),
        })
    }

    fn alloc_decoder(
        &self,
        choice: DecoderChoice<'_>,
        parameters: &StreamInfo,
    ) -> Result<MockDecoder, EngineError> {
        let name = match choice {
            DecoderChoice::ByName(name) => name.to_string(),
            DecoderChoice::Default => match parameters.codec {
                CodecId::H264 => "h264".to_string(),
                CodecId::Hevc => "hevc".to_string(),
                other => return Err(EngineError::DecoderNotFound(format!("{:?}", other))),
            },
        };

        let mut ledger = self.ledger.borrow_mut();
        ledger.decoders_allocated += 1;
        if let DecoderChoice::ByName(name) = choice {
            ledger.decoder_choice = Some(name.to_string());
        }

        Ok(MockDecoder {
            script: Rc::clone(&self.script),
            ledger: Rc::clone(&self.ledger),
            name,
            stream: None,
            device_bound: false,
            negotiator: None,
            output_format: PixelFormat::None,
            queue: VecDeque::new(),
            submissions: 0,
            next_picture: 0,
            draining: false,
        })
    }

    fn create_device(&self, kind: HwDeviceKind) -> Result<MockDevice, EngineError> {
        if self.script.fail_device || kind.is_none() {
            return Err(native(-1313558101, "Unknown error occurred"));
        }
        self.ledger.borrow_mut().devices_created += 1;
        Ok(MockDevice {
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn alloc_packet(&self) -> Result<MockPacket, EngineError> {
        self.ledger.borrow_mut().packets_allocated += 1;
        Ok(MockPacket {
            ledger: Rc::clone(&self.ledger),
            stream: None,
        })
    }

    fn alloc_frame(&self) -> Result<MockFrame, EngineError> {
        self.ledger.borrow_mut().frames_allocated += 1;
        Ok(MockFrame {
            ledger: Rc::clone(&self.ledger),
            fail_transfer: self.script.fail_transfer,
            width: 0,
            height: 0,
            format: PixelFormat::None,
            sw_format: PixelFormat::None,
            planes: Vec::new(),
        })
    }

    fn scaler(&self, source: ImageSpec, destination: ImageSpec) -> Result<MockScaler, EngineError> {
        if self.script.fail_scaler || destination.format.is_hardware() {
            return Err(native(-22, "Invalid argument"));
        }
        if source.size.width == 0 || destination.size.width == 0 {
            return Err(native(-22, "Invalid argument"));
        }
        Ok(MockScaler {
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn image_layout(&self, format: PixelFormat, size: Size) -> Option<ImageLayout> {
        if let Some(layout) = ImageLayout::new(format, size) {
            return Some(layout);
        }
        let &(_, bytes_per_pixel) = self.script.packed_formats.iter().find(|(f, _)| *f == format)?;
        let stride = size.width as usize * bytes_per_pixel;
        let rows = size.height as usize;
        let mut planes = PlaneArray::new();
        planes.push(PlaneLayout { offset: 0, stride, rows }).ok()?;
        Some(ImageLayout {
            format,
            size,
            planes,
            buffer_size: stride * rows,
        })
    }
}
