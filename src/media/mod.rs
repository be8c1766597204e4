//! Media Pipeline
//!
//! Stream sessions, hardware format negotiation and frame conversion.

mod converter;
mod frame;
mod negotiate;
mod session;

pub mod engine;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod testing;

pub use converter::FrameConverter;
pub use frame::{FrameDescriptor, ImageLayout, Plane, PlaneArray, PlaneLayout, MAX_PLANES};
pub use negotiate::{FormatNegotiator, FramePoolAllocator, PoolConfig, INITIAL_POOL_SIZE, POOL_ALIGNMENT};
pub use session::{ContainerMetadata, StreamSession};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel format tag of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Sentinel "no format"
    #[default]
    None,
    /// YUV 4:2:0 planar (Y, U, V separate planes)
    Yuv420p,
    /// YUV 4:2:2 planar
    Yuv422p,
    /// YUV 4:4:4 planar
    Yuv444p,
    /// Y plane + interleaved UV plane, 4:2:0
    Nv12,
    /// Y plane + interleaved VU plane, 4:2:0
    Nv21,
    /// 10-bit NV12 layout, little endian
    P010le,
    Gray8,
    /// Packed 3 bytes per pixel
    Rgb24,
    /// Packed 3 bytes per pixel
    Bgr24,
    Rgba,
    Bgra,
    Argb,
    Abgr,

    // Hardware-resident formats
    Vdpau,
    Cuda,
    Vaapi,
    Dxva2Vld,
    D3d11,
    Qsv,
    VideoToolbox,
    DrmPrime,
    OpenCl,
    MediaCodec,

    /// Engine format without a named tag (raw engine value)
    Other(i32),
}

impl PixelFormat {
    /// Whether frames in this format live in device memory
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            PixelFormat::Vdpau
                | PixelFormat::Cuda
                | PixelFormat::Vaapi
                | PixelFormat::Dxva2Vld
                | PixelFormat::D3d11
                | PixelFormat::Qsv
                | PixelFormat::VideoToolbox
                | PixelFormat::DrmPrime
                | PixelFormat::OpenCl
                | PixelFormat::MediaCodec
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::None => "none",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Nv21 => "nv21",
            PixelFormat::P010le => "p010le",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Argb => "argb",
            PixelFormat::Abgr => "abgr",
            PixelFormat::Vdpau => "vdpau",
            PixelFormat::Cuda => "cuda",
            PixelFormat::Vaapi => "vaapi",
            PixelFormat::Dxva2Vld => "dxva2_vld",
            PixelFormat::D3d11 => "d3d11",
            PixelFormat::Qsv => "qsv",
            PixelFormat::VideoToolbox => "videotoolbox",
            PixelFormat::DrmPrime => "drm_prime",
            PixelFormat::OpenCl => "opencl",
            PixelFormat::MediaCodec => "mediacodec",
            PixelFormat::Other(_) => "other",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Other(raw) => write!(f, "other({})", raw),
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    /// Parses the software formats a converter can target
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.to_ascii_lowercase().as_str() {
            "yuv420p" => PixelFormat::Yuv420p,
            "yuv422p" => PixelFormat::Yuv422p,
            "yuv444p" => PixelFormat::Yuv444p,
            "nv12" => PixelFormat::Nv12,
            "nv21" => PixelFormat::Nv21,
            "p010le" => PixelFormat::P010le,
            "gray8" | "gray" => PixelFormat::Gray8,
            "rgb24" => PixelFormat::Rgb24,
            "bgr24" => PixelFormat::Bgr24,
            "rgba" => PixelFormat::Rgba,
            "bgra" => PixelFormat::Bgra,
            "argb" => PixelFormat::Argb,
            "abgr" => PixelFormat::Abgr,
            other => return Err(format!("unsupported output pixel format: {}", other)),
        };
        Ok(format)
    }
}

/// Hardware acceleration device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HwDeviceKind {
    /// Software decoding
    #[default]
    None,
    Vdpau,
    /// NVIDIA CUDA
    Cuda,
    /// VA-API (Linux)
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows)
    Dxva2,
    /// Intel QuickSync
    Qsv,
    /// VideoToolbox (macOS)
    #[value(name = "videotoolbox")]
    VideoToolbox,
    /// Direct3D 11 (Windows)
    D3d11va,
    Drm,
    #[value(name = "opencl")]
    OpenCl,
    /// MediaCodec (Android)
    #[value(name = "mediacodec")]
    MediaCodec,
}

/// Decoder that must be used for a device kind instead of the stream's default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedicatedDecoder {
    pub name: &'static str,
    pub codec: CodecId,
}

impl HwDeviceKind {
    pub fn name(&self) -> &'static str {
        match self {
            HwDeviceKind::None => "none",
            HwDeviceKind::Vdpau => "vdpau",
            HwDeviceKind::Cuda => "cuda",
            HwDeviceKind::Vaapi => "vaapi",
            HwDeviceKind::Dxva2 => "dxva2",
            HwDeviceKind::Qsv => "qsv",
            HwDeviceKind::VideoToolbox => "videotoolbox",
            HwDeviceKind::D3d11va => "d3d11va",
            HwDeviceKind::Drm => "drm",
            HwDeviceKind::OpenCl => "opencl",
            HwDeviceKind::MediaCodec => "mediacodec",
        }
    }

    pub fn is_none(&self) -> bool {
        *self == HwDeviceKind::None
    }

    /// Device-resident pixel format decoded frames carry for this device
    pub fn hw_pixel_format(&self) -> PixelFormat {
        match self {
            HwDeviceKind::None => PixelFormat::None,
            HwDeviceKind::Vdpau => PixelFormat::Vdpau,
            HwDeviceKind::Cuda => PixelFormat::Cuda,
            HwDeviceKind::Vaapi => PixelFormat::Vaapi,
            HwDeviceKind::Dxva2 => PixelFormat::Dxva2Vld,
            HwDeviceKind::Qsv => PixelFormat::Qsv,
            HwDeviceKind::VideoToolbox => PixelFormat::VideoToolbox,
            HwDeviceKind::D3d11va => PixelFormat::D3d11,
            HwDeviceKind::Drm => PixelFormat::DrmPrime,
            HwDeviceKind::OpenCl => PixelFormat::OpenCl,
            HwDeviceKind::MediaCodec => PixelFormat::MediaCodec,
        }
    }

    /// QSV decodes through its own H.264 decoder; every other kind uses the
    /// stream's default decoder.
    pub fn dedicated_decoder(&self) -> Option<DedicatedDecoder> {
        match self {
            HwDeviceKind::Qsv => Some(DedicatedDecoder {
                name: "h264_qsv",
                codec: CodecId::H264,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for HwDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codec identity of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    Hevc,
    Av1,
    Vp8,
    Vp9,
    Mpeg2,
    Mpeg4,
    /// Raw engine codec id
    Other(i32),
}

/// Media type of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

/// Picture dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale both dimensions by `factor`, never below 1x1
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            width: ((self.width as f32 * factor) as u32).max(1),
            height: ((self.height as f32 * factor) as u32).max(1),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
