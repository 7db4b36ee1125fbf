//! Audio flow monitoring
//!
//! Pure-logic state machine that watches the tap's processed-block counter
//! to tell when audio starts flowing, stalls, recovers, or never arrives.
//! No I/O or audio hardware dependency.

use std::time::{Duration, Instant};

use crate::config::timeouts::{NO_AUDIO_TIMEOUT_SECS, STALL_TIMEOUT_MS};

/// Monitor states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Waiting for the first block after playback was requested
    WaitingForAudio,
    /// Blocks are arriving
    Flowing,
    /// Blocks stopped arriving; may recover
    Stalled,
    /// Nothing ever arrived. Terminal.
    NoAudio,
}

/// A state change reported by `StallMonitor::update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowChange {
    Started,
    Stalled,
    Resumed,
    NoAudio,
}

/// Tracks the block counter over time
#[derive(Debug)]
pub struct StallMonitor {
    state: FlowState,
    last_count: u64,
    last_progress: Instant,
    no_audio_timeout: Duration,
    stall_timeout: Duration,
}

impl Default for StallMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StallMonitor {
    /// Create a monitor using the configured timeouts
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(NO_AUDIO_TIMEOUT_SECS),
            Duration::from_millis(STALL_TIMEOUT_MS),
        )
    }

    /// Create a monitor with custom timeouts (for testing)
    pub fn with_timeouts(no_audio: Duration, stall: Duration) -> Self {
        Self {
            state: FlowState::WaitingForAudio,
            last_count: 0,
            last_progress: Instant::now(),
            no_audio_timeout: no_audio,
            stall_timeout: stall,
        }
    }

    /// Start waiting for audio again from `count`, e.g. after a resume
    pub fn restart(&mut self, count: u64) {
        self.state = FlowState::WaitingForAudio;
        self.last_count = count;
        self.last_progress = Instant::now();
    }

    pub fn update(&mut self, count: u64) -> Option<FlowChange> {
        self.update_at(count, Instant::now())
    }

    /// Feed the current block counter observed at `now`
    pub fn update_at(&mut self, count: u64, now: Instant) -> Option<FlowChange> {
        let progressed = count > self.last_count;
        if progressed {
            self.last_count = count;
            self.last_progress = now;
        }
        let idle = now.saturating_duration_since(self.last_progress);

        let (next, change) = match self.state {
            FlowState::WaitingForAudio if progressed => (FlowState::Flowing, Some(FlowChange::Started)),
            FlowState::WaitingForAudio if idle >= self.no_audio_timeout => {
                (FlowState::NoAudio, Some(FlowChange::NoAudio))
            }
            FlowState::Flowing if !progressed && idle >= self.stall_timeout => {
                (FlowState::Stalled, Some(FlowChange::Stalled))
            }
            FlowState::Stalled if progressed => (FlowState::Flowing, Some(FlowChange::Resumed)),
            state => (state, None),
        };

        if next != self.state {
            tracing::trace!(from = ?self.state, to = ?next, count, "audio flow");
            self.state = next;
        }
        change
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// True once the monitor has given up on the stream
    pub fn is_failed(&self) -> bool {
        self.state == FlowState::NoAudio
    }
}
