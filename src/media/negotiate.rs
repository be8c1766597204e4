//! Hardware Format Negotiation
//!
//! The engine offers candidate pixel formats once it knows the stream
//! geometry. The negotiator picks the device-resident format and, as a side
//! effect, allocates the fixed-size hardware frame pool the decoder renders
//! into.

use log::{info, warn};

use crate::error::EngineError;

use super::PixelFormat;

/// Frames allocated up front in the hardware pool
pub const INITIAL_POOL_SIZE: u32 = 32;

/// Pool surface dimensions are rounded up to this many pixels
pub const POOL_ALIGNMENT: u32 = 32;

/// Round `value` up to a multiple of `alignment` (a power of two)
pub fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Geometry and formats of a hardware frame pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Device-resident format of pool surfaces
    pub format: PixelFormat,
    /// Host format the surfaces download to
    pub sw_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub initial_size: u32,
}

/// Side-effect interface a negotiation runs against. Implemented by the
/// engine's decode context while it is asking for a format.
pub trait FramePoolAllocator {
    /// Software-equivalent format the decoder reports for the stream
    fn sw_format(&self) -> PixelFormat;

    /// Coded (unaligned) picture size
    fn coded_size(&self) -> (u32, u32);

    /// Allocate and initialize the pool, binding it to the decode context
    fn allocate_pool(&mut self, config: &PoolConfig) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Pending,
    Selected,
    Failed(EngineError),
}

/// One-shot `negotiate(candidates) -> chosen` step for a hardware session
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    hw_format: PixelFormat,
    pool: Option<PoolConfig>,
    outcome: Outcome,
    invocations: u32,
}

impl FormatNegotiator {
    pub fn new(hw_format: PixelFormat) -> Self {
        Self {
            hw_format,
            pool: None,
            outcome: Outcome::Pending,
            invocations: 0,
        }
    }

    pub fn hw_format(&self) -> PixelFormat {
        self.hw_format
    }

    /// Pick a format from `candidates`. Answers the hardware format when
    /// offered (allocating the pool the first time), `PixelFormat::None`
    /// otherwise.
    pub fn negotiate(
        &mut self,
        candidates: &[PixelFormat],
        allocator: &mut dyn FramePoolAllocator,
    ) -> PixelFormat {
        self.invocations += 1;
        info!(
            "Format negotiation: candidates {:?}, want {}",
            candidates, self.hw_format
        );

        if !candidates.contains(&self.hw_format) {
            warn!("Format negotiation: {} not offered", self.hw_format);
            self.outcome = Outcome::Failed(EngineError::NegotiationFailed(self.hw_format));
            return PixelFormat::None;
        }

        if self.pool.is_some() {
            info!("Format negotiation: pool already allocated, selecting {}", self.hw_format);
            self.outcome = Outcome::Selected;
            return self.hw_format;
        }

        let (coded_width, coded_height) = allocator.coded_size();
        let config = PoolConfig {
            format: self.hw_format,
            sw_format: allocator.sw_format(),
            width: align_up(coded_width, POOL_ALIGNMENT),
            height: align_up(coded_height, POOL_ALIGNMENT),
            initial_size: INITIAL_POOL_SIZE,
        };

        match allocator.allocate_pool(&config) {
            Ok(()) => {
                info!(
                    "Hardware frame pool ready: {}x{} {} (sw {}), {} surfaces",
                    config.width, config.height, config.format, config.sw_format, config.initial_size
                );
                self.pool = Some(config);
                self.outcome = Outcome::Selected;
                self.hw_format
            }
            Err(e) => {
                warn!("Failed to initialize hardware frame pool: {}", e);
                self.outcome = Outcome::Failed(e);
                PixelFormat::None
            }
        }
    }

    /// Pool allocated by a successful negotiation
    pub fn pool(&self) -> Option<&PoolConfig> {
        self.pool.as_ref()
    }

    /// Number of times the engine asked for a format
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    pub fn has_run(&self) -> bool {
        self.invocations > 0
    }

    /// Failure of the most recent negotiation, if it answered "none"
    pub fn failure(&self) -> Option<&EngineError> {
        match &self.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}
