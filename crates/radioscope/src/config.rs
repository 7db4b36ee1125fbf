//! Configuration constants for the radioscope core

/// Signal tap configuration
pub mod tap {
    /// Number of oscilloscope points published per block
    pub const WAVEFORM_POINTS: usize = 128;

    /// Number of peak-magnitude bins published per block
    pub const MAGNITUDE_BINS: usize = 64;

    /// Maximum number of samples analysed from a single block.
    /// Larger blocks are truncated.
    pub const WORK_CAPACITY: usize = 65_536;

    /// Weight of the new sample in the waveform smoothing (old value gets the rest)
    pub const WAVE_SMOOTHING: f32 = 0.4;

    /// Weight of a rising peak in the magnitude smoothing
    pub const ATTACK_WEIGHT: f32 = 0.5;

    /// Weight of a falling peak in the magnitude smoothing
    pub const DECAY_WEIGHT: f32 = 0.15;

    /// Peak level above which a signal counts as present
    pub const SIGNAL_FLOOR: f32 = 0.001;

    /// Frames collected by `TappedSource` before a block is handed to the tap
    pub const BLOCK_FRAMES: usize = 1024;
}

/// Oscilloscope rendering configuration
pub mod render {
    /// Visual gain applied to waveform samples before clamping to [-1, 1]
    pub const TRACE_GAIN: f32 = 3.0;

    /// Fraction of the half-height a full-scale trace may use
    pub const TRACE_HEADROOM: f64 = 0.88;

    /// Fraction of the half-height used by the idle animation
    pub const IDLE_HEADROOM: f64 = 0.9;

    /// Number of points in each idle animation wave
    pub const IDLE_STEPS: usize = 160;

    /// Target frame interval for renderers (~60 fps)
    pub const FRAME_INTERVAL_MS: u64 = 16;
}

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("Radioscope/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Read timeout in seconds
    pub const READ_TIMEOUT_SECS: u64 = 30;

    /// Size of a single network read (bytes)
    pub const CHUNK_SIZE: usize = 8 * 1024;

    /// Audio chunks buffered between the network thread and the decoder
    pub const CHUNK_QUEUE_BOUND: usize = 32;
}

/// Timeout configuration for the playback engine
pub mod timeouts {
    /// Maximum time to wait for the format probe in seconds
    pub const PROBE_TIMEOUT_SECS: u64 = 10;

    /// Time after `play` without a single audio block before the stream is failed
    pub const NO_AUDIO_TIMEOUT_SECS: u64 = 15;

    /// Time without new audio blocks before playback counts as stalled
    pub const STALL_TIMEOUT_MS: u64 = 2000;

    /// Poll interval of the session thread
    pub const SESSION_POLL_MS: u64 = 100;
}

/// Application metadata
pub mod app {
    /// Application name (used for the config directory)
    pub const NAME: &str = "radioscope";

    /// Settings file name inside the config directory
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Volume used when nothing has been persisted yet
    pub const DEFAULT_VOLUME: f32 = 0.8;
}
