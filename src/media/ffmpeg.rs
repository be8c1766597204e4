//! FFmpeg Engine
//!
//! `Engine` implementation over ffmpeg-next. Raw FFI covers what the safe
//! wrapper does not expose: stream discard, hardware device contexts, the
//! get_format callback and frame download.

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, decoder};
use ffmpeg::ffi;
use ffmpeg::software::scaling::{Context as ScalerContext, Flags as ScalerFlags};
use ffmpeg::{format, frame, media, Packet};
use log::{debug, info, warn};
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;
use std::sync::OnceLock;

use crate::error::EngineError;

use super::engine::{
    Container, Decoder, DecoderChoice, Engine, FrameBuffer, ImageSpec, PacketBuffer, Scaler,
    StreamInfo, INPUT_PADDING,
};
use super::frame::{FrameDescriptor, ImageLayout, Plane, PlaneArray, PlaneLayout};
use super::negotiate::{FormatNegotiator, FramePoolAllocator, PoolConfig};
use super::{CodecId, HwDeviceKind, MediaType, PixelFormat, Size};

static FFMPEG_INIT: OnceLock<Result<(), ffmpeg::Error>> = OnceLock::new();

/// MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET
const QSV_DECODER_TARGET: c_int = 0x0010;

/// Leading fields of AVQSVFramesContext
#[repr(C)]
struct QsvFramesContext {
    surfaces: *mut c_void,
    nb_surfaces: c_int,
    frame_type: c_int,
}

fn engine_error(error: ffmpeg::Error) -> EngineError {
    match error {
        ffmpeg::Error::Eof => EngineError::Eof,
        ffmpeg::Error::Other { errno } if errno == libc::EAGAIN => EngineError::Again,
        other => EngineError::Native {
            code: c_int::from(other),
            message: other.to_string(),
        },
    }
}

fn out_of_memory() -> EngineError {
    engine_error(ffmpeg::Error::from(-libc::ENOMEM))
}

const PIXEL_FORMATS: &[(ffi::AVPixelFormat, PixelFormat)] = &[
    (ffi::AVPixelFormat::AV_PIX_FMT_NONE, PixelFormat::None),
    (ffi::AVPixelFormat::AV_PIX_FMT_YUV420P, PixelFormat::Yuv420p),
    (ffi::AVPixelFormat::AV_PIX_FMT_YUV422P, PixelFormat::Yuv422p),
    (ffi::AVPixelFormat::AV_PIX_FMT_YUV444P, PixelFormat::Yuv444p),
    (ffi::AVPixelFormat::AV_PIX_FMT_NV12, PixelFormat::Nv12),
    (ffi::AVPixelFormat::AV_PIX_FMT_NV21, PixelFormat::Nv21),
    (ffi::AVPixelFormat::AV_PIX_FMT_P010LE, PixelFormat::P010le),
    (ffi::AVPixelFormat::AV_PIX_FMT_GRAY8, PixelFormat::Gray8),
    (ffi::AVPixelFormat::AV_PIX_FMT_RGB24, PixelFormat::Rgb24),
    (ffi::AVPixelFormat::AV_PIX_FMT_BGR24, PixelFormat::Bgr24),
    (ffi::AVPixelFormat::AV_PIX_FMT_RGBA, PixelFormat::Rgba),
    (ffi::AVPixelFormat::AV_PIX_FMT_BGRA, PixelFormat::Bgra),
    (ffi::AVPixelFormat::AV_PIX_FMT_ARGB, PixelFormat::Argb),
    (ffi::AVPixelFormat::AV_PIX_FMT_ABGR, PixelFormat::Abgr),
    (ffi::AVPixelFormat::AV_PIX_FMT_VDPAU, PixelFormat::Vdpau),
    (ffi::AVPixelFormat::AV_PIX_FMT_CUDA, PixelFormat::Cuda),
    (ffi::AVPixelFormat::AV_PIX_FMT_VAAPI, PixelFormat::Vaapi),
    (ffi::AVPixelFormat::AV_PIX_FMT_DXVA2_VLD, PixelFormat::Dxva2Vld),
    (ffi::AVPixelFormat::AV_PIX_FMT_D3D11, PixelFormat::D3d11),
    (ffi::AVPixelFormat::AV_PIX_FMT_QSV, PixelFormat::Qsv),
    (ffi::AVPixelFormat::AV_PIX_FMT_VIDEOTOOLBOX, PixelFormat::VideoToolbox),
    (ffi::AVPixelFormat::AV_PIX_FMT_DRM_PRIME, PixelFormat::DrmPrime),
    (ffi::AVPixelFormat::AV_PIX_FMT_OPENCL, PixelFormat::OpenCl),
    (ffi::AVPixelFormat::AV_PIX_FMT_MEDIACODEC, PixelFormat::MediaCodec),
];

fn pixel_from_raw(raw: i32) -> PixelFormat {
    PIXEL_FORMATS
        .iter()
        .find(|(av, _)| *av as i32 == raw)
        .map(|(_, format)| *format)
        .unwrap_or(PixelFormat::Other(raw))
}

fn pixel_to_av(format: PixelFormat) -> ffi::AVPixelFormat {
    if let PixelFormat::Other(raw) = format {
        return av_from_raw(raw);
    }
    PIXEL_FORMATS
        .iter()
        .find(|(_, f)| *f == format)
        .map(|(av, _)| *av)
        .unwrap_or(ffi::AVPixelFormat::AV_PIX_FMT_NONE)
}

/// Out-of-range values map to `AV_PIX_FMT_NONE`
fn av_from_raw(raw: i32) -> ffi::AVPixelFormat {
    if (0..ffi::AVPixelFormat::AV_PIX_FMT_NB as i32).contains(&raw) {
        // AVPixelFormat discriminants run contiguously from 0 to AV_PIX_FMT_NB
        unsafe { std::mem::transmute::<i32, ffi::AVPixelFormat>(raw) }
    } else {
        ffi::AVPixelFormat::AV_PIX_FMT_NONE
    }
}

/// Alignment-1 layout as libavutil computes it for a host-memory image
fn packed_layout(format: PixelFormat, size: Size) -> Option<ImageLayout> {
    let av = pixel_to_av(format);
    if format.is_hardware() || av == ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        return None;
    }
    let width = c_int::try_from(size.width).ok().filter(|w| *w > 0)?;
    let height = c_int::try_from(size.height).ok().filter(|h| *h > 0)?;

    let total = unsafe { ffi::av_image_get_buffer_size(av, width, height, 1) };
    let buffer_size = usize::try_from(total).ok()?;

    // A null base turns the plane pointers into offsets
    let mut data = [ptr::null_mut::<u8>(); 4];
    let mut linesize = [0 as c_int; 4];
    let ret = unsafe {
        ffi::av_image_fill_arrays(
            data.as_mut_ptr(),
            linesize.as_mut_ptr(),
            ptr::null(),
            av,
            width,
            height,
            1,
        )
    };
    if ret < 0 {
        return None;
    }

    let offsets: Vec<(usize, usize)> = data
        .iter()
        .zip(linesize)
        .take_while(|(_, stride)| *stride > 0)
        .map(|(plane, stride)| (*plane as usize, stride as usize))
        .collect();

    let mut planes = PlaneArray::new();
    for (i, &(offset, stride)) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).map(|(next, _)| *next).unwrap_or(buffer_size);
        let rows = end.checked_sub(offset)? / stride;
        planes.push(PlaneLayout { offset, stride, rows }).ok()?;
    }

    Some(ImageLayout {
        format,
        size,
        planes,
        buffer_size,
    })
}

fn device_type(kind: HwDeviceKind) -> ffi::AVHWDeviceType {
    use ffi::AVHWDeviceType::*;
    match kind {
        HwDeviceKind::None => AV_HWDEVICE_TYPE_NONE,
        HwDeviceKind::Vdpau => AV_HWDEVICE_TYPE_VDPAU,
        HwDeviceKind::Cuda => AV_HWDEVICE_TYPE_CUDA,
        HwDeviceKind::Vaapi => AV_HWDEVICE_TYPE_VAAPI,
        HwDeviceKind::Dxva2 => AV_HWDEVICE_TYPE_DXVA2,
        HwDeviceKind::Qsv => AV_HWDEVICE_TYPE_QSV,
        HwDeviceKind::VideoToolbox => AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
        HwDeviceKind::D3d11va => AV_HWDEVICE_TYPE_D3D11VA,
        HwDeviceKind::Drm => AV_HWDEVICE_TYPE_DRM,
        HwDeviceKind::OpenCl => AV_HWDEVICE_TYPE_OPENCL,
        HwDeviceKind::MediaCodec => AV_HWDEVICE_TYPE_MEDIACODEC,
    }
}

fn codec_from_id(id: codec::Id) -> CodecId {
    match id {
        codec::Id::H264 => CodecId::H264,
        codec::Id::HEVC => CodecId::Hevc,
        codec::Id::AV1 => CodecId::Av1,
        codec::Id::VP8 => CodecId::Vp8,
        codec::Id::VP9 => CodecId::Vp9,
        codec::Id::MPEG2VIDEO => CodecId::Mpeg2,
        codec::Id::MPEG4 => CodecId::Mpeg4,
        other => CodecId::Other(ffi::AVCodecID::from(other) as i32),
    }
}

fn media_from(medium: media::Type) -> MediaType {
    match medium {
        media::Type::Video => MediaType::Video,
        media::Type::Audio => MediaType::Audio,
        media::Type::Subtitle => MediaType::Subtitle,
        media::Type::Data => MediaType::Data,
        media::Type::Attachment => MediaType::Attachment,
        media::Type::Unknown => MediaType::Unknown,
    }
}

/// Process-wide FFmpeg setup. Safe to call repeatedly.
pub fn init() -> Result<(), EngineError> {
    let result = FFMPEG_INIT.get_or_init(|| {
        let result = ffmpeg::init();
        if result.is_ok() {
            unsafe {
                ffi::av_log_set_level(ffi::AV_LOG_ERROR as i32);
            }
            info!("FFmpeg initialized");
        }
        result
    });
    result.clone().map_err(engine_error)
}

/// Handle to the FFmpeg libraries
#[derive(Debug, Clone, Copy)]
pub struct FfmpegEngine {
    _initialized: (),
}

impl FfmpegEngine {
    pub fn new() -> Result<Self, EngineError> {
        init()?;
        Ok(Self { _initialized: () })
    }
}

pub struct FfmpegContainer {
    input: format::context::Input,
}

impl Container for FfmpegContainer {
    type Packet = FfmpegPacket;
    type Parameters = codec::Parameters;

    fn streams(&self) -> Vec<StreamInfo> {
        self.input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let (width, height, extradata) = unsafe {
                    let raw = parameters.as_ptr();
                    let extradata = if (*raw).extradata.is_null() || (*raw).extradata_size <= 0 {
                        Vec::new()
                    } else {
                        std::slice::from_raw_parts((*raw).extradata, (*raw).extradata_size as usize)
                            .to_vec()
                    };
                    ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32, extradata)
                };
                StreamInfo {
                    index: stream.index(),
                    media_type: media_from(parameters.medium()),
                    codec: codec_from_id(parameters.id()),
                    width,
                    height,
                    extradata,
                }
            })
            .collect()
    }

    fn discard(&mut self, index: usize) {
        unsafe {
            let ctx = self.input.as_mut_ptr();
            if index < (*ctx).nb_streams as usize {
                let stream = *(*ctx).streams.add(index);
                (*stream).discard = ffi::AVDiscard::AVDISCARD_ALL;
            }
        }
    }

    fn best_stream(&self, media_type: MediaType) -> Option<usize> {
        let medium = match media_type {
            MediaType::Video => media::Type::Video,
            MediaType::Audio => media::Type::Audio,
            MediaType::Subtitle => media::Type::Subtitle,
            MediaType::Data => media::Type::Data,
            MediaType::Attachment => media::Type::Attachment,
            MediaType::Unknown => media::Type::Unknown,
        };
        self.input.streams().best(medium).map(|s| s.index())
    }

    fn parameters(&self, index: usize) -> Option<codec::Parameters> {
        self.input.stream(index).map(|s| s.parameters())
    }

    fn read_packet(&mut self, packet: &mut FfmpegPacket) -> Result<(), EngineError> {
        packet.packet.read(&mut self.input).map_err(engine_error)
    }

    fn metadata(&self) -> Vec<(String, String)> {
        self.input
            .metadata()
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

pub struct FfmpegPacket {
    packet: Packet,
}

impl PacketBuffer for FfmpegPacket {
    fn unref(&mut self) {
        unsafe {
            ffi::av_packet_unref(self.packet.as_mut_ptr());
        }
    }

    fn stream_index(&self) -> usize {
        self.packet.stream()
    }
}

pub struct FfmpegFrame {
    frame: frame::Video,
}

impl FrameBuffer for FfmpegFrame {
    fn unref(&mut self) {
        unsafe {
            ffi::av_frame_unref(self.frame.as_mut_ptr());
        }
    }

    fn transfer_from(&mut self, device_frame: &Self) -> Result<(), EngineError> {
        let ret = unsafe {
            ffi::av_hwframe_transfer_data(self.frame.as_mut_ptr(), device_frame.frame.as_ptr(), 0)
        };
        if ret < 0 {
            return Err(engine_error(ffmpeg::Error::from(ret)));
        }
        Ok(())
    }

    fn descriptor(&self) -> FrameDescriptor<'_> {
        let format = unsafe { pixel_from_raw((*self.frame.as_ptr()).format) };
        let planes = if self.frame.is_empty() || format.is_hardware() {
            PlaneArray::new()
        } else {
            (0..self.frame.planes())
                .map(|i| Plane {
                    data: self.frame.data(i),
                    stride: self.frame.stride(i),
                })
                .collect()
        };

        FrameDescriptor {
            width: self.frame.width(),
            height: self.frame.height(),
            format,
            planes,
        }
    }
}

/// Reference to an `AVHWDeviceContext`
pub struct FfmpegDevice {
    ctx: *mut ffi::AVBufferRef,
    kind: HwDeviceKind,
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        debug!("Releasing {} device", self.kind);
        unsafe {
            ffi::av_buffer_unref(&mut self.ctx);
        }
    }
}

/// Pool allocation against a decode context, only valid inside its
/// get_format callback
struct CodecPool {
    ctx: *mut ffi::AVCodecContext,
}

impl FramePoolAllocator for CodecPool {
    fn sw_format(&self) -> PixelFormat {
        unsafe { pixel_from_raw((*self.ctx).sw_pix_fmt as i32) }
    }

    fn coded_size(&self) -> (u32, u32) {
        unsafe {
            (
                (*self.ctx).coded_width.max(0) as u32,
                (*self.ctx).coded_height.max(0) as u32,
            )
        }
    }

    fn allocate_pool(&mut self, config: &PoolConfig) -> Result<(), EngineError> {
        unsafe {
            if (*self.ctx).hw_device_ctx.is_null() {
                return Err(EngineError::Unsupported("no hardware device bound".to_string()));
            }

            let mut frames_ref = ffi::av_hwframe_ctx_alloc((*self.ctx).hw_device_ctx);
            if frames_ref.is_null() {
                return Err(out_of_memory());
            }

            let frames = (*frames_ref).data as *mut ffi::AVHWFramesContext;
            (*frames).format = pixel_to_av(config.format);
            (*frames).sw_format = pixel_to_av(config.sw_format);
            (*frames).width = config.width as c_int;
            (*frames).height = config.height as c_int;
            (*frames).initial_pool_size = config.initial_size as c_int;

            if config.format == PixelFormat::Qsv {
                let qsv = (*frames).hwctx as *mut QsvFramesContext;
                if !qsv.is_null() {
                    (*qsv).frame_type = QSV_DECODER_TARGET;
                }
            }

            let ret = ffi::av_hwframe_ctx_init(frames_ref);
            if ret < 0 {
                ffi::av_buffer_unref(&mut frames_ref);
                return Err(engine_error(ffmpeg::Error::from(ret)));
            }

            ffi::av_buffer_unref(&mut (*self.ctx).hw_frames_ctx);
            (*self.ctx).hw_frames_ctx = frames_ref;
        }
        Ok(())
    }
}

/// get_format callback. `opaque` carries the session's negotiator.
unsafe extern "C" fn negotiate_format(
    ctx: *mut ffi::AVCodecContext,
    candidates: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    let negotiator = (*ctx).opaque as *mut FormatNegotiator;
    if negotiator.is_null() || candidates.is_null() {
        return ffi::AVPixelFormat::AV_PIX_FMT_NONE;
    }

    let mut offered = Vec::new();
    let mut cursor = candidates;
    while *cursor != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        offered.push(pixel_from_raw(*cursor as i32));
        cursor = cursor.add(1);
    }

    let mut pool = CodecPool { ctx };
    pixel_to_av((*negotiator).negotiate(&offered, &mut pool))
}

enum DecoderState {
    Configuring(codec::Context),
    Open(decoder::Video),
    /// Transient while opening; left behind if opening failed
    Closed,
}

pub struct FfmpegDecoder {
    state: DecoderState,
    codec: codec::Codec,
    /// Applied after stream parameters, which would otherwise replace it
    extradata: Option<Vec<u8>>,
    /// Boxed so the callback's opaque pointer stays valid
    negotiator: Option<Box<FormatNegotiator>>,
}

impl FfmpegDecoder {
    fn raw(&self) -> Option<*const ffi::AVCodecContext> {
        unsafe {
            match &self.state {
                DecoderState::Configuring(ctx) => Some(ctx.as_ptr()),
                DecoderState::Open(video) => Some(video.as_ptr()),
                DecoderState::Closed => None,
            }
        }
    }

    fn configuring(&mut self) -> Result<*mut ffi::AVCodecContext, EngineError> {
        match &mut self.state {
            DecoderState::Configuring(ctx) => Ok(unsafe { ctx.as_mut_ptr() }),
            _ => Err(EngineError::Unsupported("decoder is already open".to_string())),
        }
    }

    fn opened(&mut self) -> Result<&mut decoder::Video, EngineError> {
        match &mut self.state {
            DecoderState::Open(video) => Ok(video),
            _ => Err(EngineError::Unsupported("decoder is not open".to_string())),
        }
    }
}

/// Replace the context's extradata with a padded copy of `bytes`
unsafe fn apply_extradata(ctx: *mut ffi::AVCodecContext, bytes: &[u8]) -> Result<(), EngineError> {
    ffi::av_freep(&mut (*ctx).extradata as *mut *mut u8 as *mut c_void);
    (*ctx).extradata_size = 0;

    let buffer = ffi::av_mallocz(bytes.len() + INPUT_PADDING) as *mut u8;
    if buffer.is_null() {
        return Err(out_of_memory());
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
    (*ctx).extradata = buffer;
    (*ctx).extradata_size = bytes.len() as c_int;
    Ok(())
}

impl Decoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;
    type Device = FfmpegDevice;
    type Parameters = codec::Parameters;

    fn set_extradata(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let ctx = self.configuring()?;
        unsafe { apply_extradata(ctx, bytes)? };
        self.extradata = Some(bytes.to_vec());
        Ok(())
    }

    fn bind_device(&mut self, device: &FfmpegDevice) -> Result<(), EngineError> {
        let ctx = self.configuring()?;
        unsafe {
            let reference = ffi::av_buffer_ref(device.ctx);
            if reference.is_null() {
                return Err(out_of_memory());
            }
            ffi::av_buffer_unref(&mut (*ctx).hw_device_ctx);
            (*ctx).hw_device_ctx = reference;
        }
        Ok(())
    }

    fn install_negotiator(&mut self, negotiator: FormatNegotiator) {
        let mut boxed = Box::new(negotiator);
        match self.configuring() {
            Ok(ctx) => unsafe {
                (*ctx).opaque = &mut *boxed as *mut FormatNegotiator as *mut c_void;
                (*ctx).get_format = Some(negotiate_format);
            },
            Err(e) => warn!("Format negotiator not installed: {}", e),
        }
        self.negotiator = Some(boxed);
    }

    fn negotiator(&self) -> Option<&FormatNegotiator> {
        self.negotiator.as_deref()
    }

    fn open(&mut self, parameters: &codec::Parameters) -> Result<(), EngineError> {
        let mut context = match std::mem::replace(&mut self.state, DecoderState::Closed) {
            DecoderState::Configuring(ctx) => ctx,
            other => {
                self.state = other;
                return Err(EngineError::Unsupported("decoder is already open".to_string()));
            }
        };

        context
            .set_parameters(parameters.clone())
            .map_err(engine_error)?;
        if let Some(extradata) = &self.extradata {
            unsafe { apply_extradata(context.as_mut_ptr(), extradata)? };
        }
        context.set_threading(codec::threading::Config::count(4));

        let video = context
            .decoder()
            .open_as(self.codec)
            .and_then(|opened| opened.video())
            .map_err(engine_error)?;

        info!("Opened decoder {}", self.codec.name());
        self.state = DecoderState::Open(video);
        Ok(())
    }

    fn sw_format(&self) -> PixelFormat {
        let Some(ctx) = self.raw() else {
            return PixelFormat::None;
        };
        unsafe {
            if (*ctx).sw_pix_fmt != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
                pixel_from_raw((*ctx).sw_pix_fmt as i32)
            } else {
                pixel_from_raw((*ctx).pix_fmt as i32)
            }
        }
    }

    fn codec_name(&self) -> String {
        self.codec.name().to_string()
    }

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<(), EngineError> {
        self.opened()?.send_packet(&packet.packet).map_err(engine_error)
    }

    fn send_eof(&mut self) -> Result<(), EngineError> {
        self.opened()?.send_eof().map_err(engine_error)
    }

    fn receive_frame(&mut self, frame: &mut FfmpegFrame) -> Result<(), EngineError> {
        self.opened()?
            .receive_frame(&mut frame.frame)
            .map_err(engine_error)
    }
}

pub struct FfmpegScaler {
    context: ScalerContext,
}

impl Scaler for FfmpegScaler {
    fn scale(
        &mut self,
        source: &FrameDescriptor<'_>,
        destination: &mut [u8],
        layout: &ImageLayout,
    ) -> Result<(), EngineError> {
        if destination.len() < layout.buffer_size {
            return Err(EngineError::Unsupported(format!(
                "destination holds {} bytes, {} needed",
                destination.len(),
                layout.buffer_size
            )));
        }

        let mut src_data = [ptr::null::<u8>(); 8];
        let mut src_stride = [0 as c_int; 8];
        for (i, plane) in source.planes.iter().enumerate() {
            src_data[i] = plane.as_ptr();
            src_stride[i] = plane.stride as c_int;
        }

        let mut dst_data = [ptr::null_mut::<u8>(); 8];
        let mut dst_stride = [0 as c_int; 8];
        let base = destination.as_mut_ptr();
        for (i, plane) in layout.planes.iter().enumerate() {
            dst_data[i] = unsafe { base.add(plane.offset) };
            dst_stride[i] = plane.stride as c_int;
        }

        let ret = unsafe {
            ffi::sws_scale(
                self.context.as_mut_ptr(),
                src_data.as_ptr(),
                src_stride.as_ptr(),
                0,
                source.height as c_int,
                dst_data.as_ptr(),
                dst_stride.as_ptr(),
            )
        };
        if ret < 0 {
            return Err(engine_error(ffmpeg::Error::from(ret)));
        }
        Ok(())
    }
}

impl Engine for FfmpegEngine {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;
    type Device = FfmpegDevice;
    type Parameters = codec::Parameters;
    type Container = FfmpegContainer;
    type Decoder = FfmpegDecoder;
    type Scaler = FfmpegScaler;

    fn open_container(&self, locator: &str) -> Result<FfmpegContainer, EngineError> {
        let input = format::input(&locator).map_err(engine_error)?;
        debug!("Container format: {}", input.format().name());
        Ok(FfmpegContainer { input })
    }

    fn alloc_decoder(
        &self,
        choice: DecoderChoice<'_>,
        parameters: &codec::Parameters,
    ) -> Result<FfmpegDecoder, EngineError> {
        let codec = match choice {
            DecoderChoice::ByName(name) => decoder::find_by_name(name)
                .ok_or_else(|| EngineError::DecoderNotFound(name.to_string()))?,
            DecoderChoice::Default => decoder::find(parameters.id())
                .ok_or_else(|| EngineError::DecoderNotFound(format!("{:?}", parameters.id())))?,
        };

        Ok(FfmpegDecoder {
            state: DecoderState::Configuring(codec::Context::new_with_codec(codec)),
            codec,
            extradata: None,
            negotiator: None,
        })
    }

    fn create_device(&self, kind: HwDeviceKind) -> Result<FfmpegDevice, EngineError> {
        let mut ctx: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(&mut ctx, device_type(kind), ptr::null(), ptr::null_mut(), 0)
        };
        if ret < 0 || ctx.is_null() {
            return Err(engine_error(ffmpeg::Error::from(ret)));
        }
        Ok(FfmpegDevice { ctx, kind })
    }

    fn alloc_packet(&self) -> Result<FfmpegPacket, EngineError> {
        Ok(FfmpegPacket {
            packet: Packet::empty(),
        })
    }

    fn alloc_frame(&self) -> Result<FfmpegFrame, EngineError> {
        Ok(FfmpegFrame {
            frame: frame::Video::empty(),
        })
    }

    fn scaler(&self, source: ImageSpec, destination: ImageSpec) -> Result<FfmpegScaler, EngineError> {
        let context = ScalerContext::get(
            pixel_to_av(source.format).into(),
            source.size.width,
            source.size.height,
            pixel_to_av(destination.format).into(),
            destination.size.width,
            destination.size.height,
            ScalerFlags::FAST_BILINEAR,
        )
        .map_err(engine_error)?;
        Ok(FfmpegScaler { context })
    }

    fn image_layout(&self, format: PixelFormat, size: Size) -> Option<ImageLayout> {
        packed_layout(format, size)
    }
}
