pub mod signal;
pub mod codec;
pub mod validate;
pub mod modulation;
pub mod emitter;
pub mod dispatch;
pub mod session;
pub mod error;
pub mod audio;

#[cfg(not(target_arch = "wasm32"))]
pub mod routing;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use signal::*;
pub use codec::*;
pub use validate::*;
pub use modulation::*;
pub use audio::*;
pub use emitter::*;
pub use dispatch::*;
pub use session::*;
pub use error::*;

use std::time::Duration;

pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
pub const AMPLITUDE: i16 = 0x7FFF;
pub const MIN_CARRIER_HZ: u32 = 30_000;
pub const MAX_CARRIER_HZ: u32 = 60_000;
pub const DEFAULT_MIN_BUFFER_BYTES: usize = 3528;
pub const DEFAULT_MAX_SIGNAL_DURATION_MS: u64 = 2_000;

/// How the audio sink picks the analog output it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingStrategy {
    /// Use explicit device selection when the host can enumerate outputs.
    #[default]
    Auto,
    /// Select the first wired output device by name.
    Device,
    /// Drive the host's default output device.
    Default,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_signal_duration: Duration,
    pub min_buffer_bytes: Option<usize>,
    pub routing: RoutingStrategy,
    pub playback_grace: Duration,
    pub allow_audio_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_signal_duration: Duration::from_millis(DEFAULT_MAX_SIGNAL_DURATION_MS),
            min_buffer_bytes: None,
            routing: RoutingStrategy::Auto,
            playback_grace: Duration::from_millis(500),
            allow_audio_fallback: false,
        }
    }
}
