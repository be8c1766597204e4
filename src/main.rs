//! Stream Decode CLI
//!
//! Decodes every frame of a media file or URL, optionally on a hardware
//! device, and converts each picture to the requested size and format.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use streamdecode::config::Settings;
use streamdecode::media::ffmpeg::{FfmpegEngine, FfmpegScaler};
use streamdecode::utils::{format_bytes, get_log_file_path, init_logging};
use streamdecode::{FrameConverter, HwDeviceKind, PixelFormat, StreamSession};

/// Pull-based video decoder
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file path or URL
    input: String,

    /// Hardware device to decode on
    #[arg(long, value_enum)]
    hw: Option<HwDeviceKind>,

    /// Output size relative to the decoded size
    #[arg(long)]
    scale: Option<f32>,

    /// Output pixel format (e.g. bgr24, rgba, nv12)
    #[arg(long)]
    format: Option<PixelFormat>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Print container metadata before decoding
    #[arg(long)]
    metadata: bool,

    /// Mirror log output to the console
    #[arg(long)]
    console: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Keep these options as the new defaults
    #[arg(long)]
    save_settings: bool,
}

impl Args {
    /// Command-line flags override persisted settings
    fn apply(&self, settings: &mut Settings) {
        if let Some(hw) = self.hw {
            settings.hw_device = hw;
        }
        if let Some(scale) = self.scale {
            settings.output_scale = scale;
        }
        if let Some(format) = self.format {
            settings.output_format = format;
        }
        if self.max_frames.is_some() {
            settings.max_frames = self.max_frames;
        }
        settings.console_log |= self.console;
        settings.verbose_log |= self.verbose;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable settings: {:#}", e);
        Settings::default()
    });
    args.apply(&mut settings);
    if args.save_settings {
        settings.save().context("Failed to save settings")?;
    }

    init_logging(settings.console_log, settings.verbose_log).context("Failed to install logger")?;
    info!("streamdecode {} starting", env!("CARGO_PKG_VERSION"));
    info!("Log file: {}", get_log_file_path().display());

    let engine = FfmpegEngine::new().context("Failed to initialize FFmpeg")?;
    let mut session = StreamSession::open(&engine, &args.input, settings.hw_device)
        .with_context(|| format!("Cannot decode {}", args.input))?;

    println!(
        "{}: {} {} via {}{}",
        args.input,
        session.codec_name(),
        session.frame_size(),
        session.pixel_format(),
        if session.is_hw_accelerated() {
            format!(" ({} on {})", session.hw_pixel_format(), settings.hw_device)
        } else {
            String::new()
        }
    );

    if args.metadata {
        let metadata = session.container_metadata();
        if metadata.is_empty() {
            println!("(no container metadata)");
        }
        for (key, value) in metadata.iter() {
            println!("{}: {}", key, value);
        }
    }

    let scale = settings.effective_scale();
    let mut converter: Option<FrameConverter<FfmpegScaler>> = None;
    let mut converted_bytes = 0u64;
    let started = Instant::now();

    while let Some(frame) = session.pull_next_frame()? {
        let rebuild = converter
            .as_ref()
            .map(|c| c.source_size() != frame.size() || c.source_format() != frame.format)
            .unwrap_or(true);
        if rebuild {
            if converter.is_some() {
                warn!("Frame geometry changed to {} {}", frame.size(), frame.format);
            }
            let built = FrameConverter::new(
                &engine,
                frame.size(),
                frame.format,
                frame.size().scaled(scale),
                settings.output_format,
            )?;
            println!(
                "Converting to {} {} ({} per frame)",
                built.destination_size(),
                built.destination_format(),
                format_bytes(built.buffer_size() as u64)
            );
            converter = Some(built);
        }

        if let Some(converter) = converter.as_mut() {
            let output = converter.convert(&frame)?;
            converted_bytes += output.planes.iter().map(|p| p.data.len() as u64).sum::<u64>();
        }

        if settings.max_frames.is_some_and(|max| session.frames_decoded() >= max) {
            info!("Reached frame limit");
            break;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let frames = session.frames_decoded();
    let fps = if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 };
    println!(
        "Decoded {} frame(s) in {:.2}s ({:.1} fps), converted {} to {}",
        frames,
        elapsed,
        fps,
        format_bytes(converted_bytes),
        settings.output_format
    );
    info!("Done: {} frames, {:.1} fps", frames, fps);

    Ok(())
}
