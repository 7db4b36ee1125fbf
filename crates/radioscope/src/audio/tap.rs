//! Real-time signal tap
//!
//! `SignalTap` runs on the audio thread and reduces each PCM block to a
//! fixed-size oscilloscope trace and a set of peak magnitudes. Results are
//! published into `FeatureBuffers`, which any thread may read at any time.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::presence;
use crate::config::tap::{
    ATTACK_WEIGHT, DECAY_WEIGHT, MAGNITUDE_BINS, WAVEFORM_POINTS, WAVE_SMOOTHING, WORK_CAPACITY,
};

/// Shared output of a `SignalTap`.
///
/// Every value is an `f32` stored as raw bits in an `AtomicU32` and accessed
/// with `Ordering::Relaxed`. Individual values never tear, but there is no
/// ordering between values: a reader may observe part of one block's update
/// and part of the next. Readers treat the arrays as a best-effort snapshot.
///
/// The tap is the only writer. Reads never block the writer.
pub struct FeatureBuffers {
    waveform: [AtomicU32; WAVEFORM_POINTS],
    magnitudes: [AtomicU32; MAGNITUDE_BINS],
    blocks: AtomicU64,
    attached: AtomicBool,
}

/// Handle to a tap's output, shared between audio, control and render threads
pub type TapHandle = Arc<FeatureBuffers>;

impl FeatureBuffers {
    fn new() -> Self {
        Self {
            waveform: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            magnitudes: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            blocks: AtomicU64::new(0),
            attached: AtomicBool::new(true),
        }
    }

    /// Snapshot of the oscilloscope trace, each value in [-1, 1]
    pub fn waveform(&self) -> [f32; WAVEFORM_POINTS] {
        let mut out = [0.0; WAVEFORM_POINTS];
        self.read_waveform(&mut out);
        out
    }

    /// Copy the trace into a caller-owned buffer
    pub fn read_waveform(&self, out: &mut [f32; WAVEFORM_POINTS]) {
        for (dst, src) in out.iter_mut().zip(&self.waveform) {
            *dst = f32::from_bits(src.load(Ordering::Relaxed));
        }
    }

    /// Snapshot of the peak magnitudes, each value in [0, 1]
    pub fn magnitudes(&self) -> [f32; MAGNITUDE_BINS] {
        let mut out = [0.0; MAGNITUDE_BINS];
        for (dst, src) in out.iter_mut().zip(&self.magnitudes) {
            *dst = f32::from_bits(src.load(Ordering::Relaxed));
        }
        out
    }

    /// Whether any magnitude is above the noise floor
    pub fn has_signal(&self) -> bool {
        presence::has_signal(&self.magnitudes())
    }

    /// Number of non-empty blocks processed since the tap was created
    pub fn blocks_processed(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// False once the owning session has torn the tap down
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Relaxed)
    }

    /// Stop accepting input. Values already published stay readable.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Relaxed);
    }
}

impl fmt::Debug for FeatureBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBuffers")
            .field("blocks", &self.blocks_processed())
            .field("attached", &self.is_attached())
            .field("has_signal", &self.has_signal())
            .finish()
    }
}

/// Audio-thread feature extractor.
///
/// All scratch space is allocated in `new`; `process` performs no allocation,
/// locking or I/O.
pub struct SignalTap {
    shared: TapHandle,
    work: Box<[f32]>,
    bins: [f32; MAGNITUDE_BINS],
    wave_smoothed: [f32; WAVEFORM_POINTS],
    smoothed: [f32; MAGNITUDE_BINS],
}

impl SignalTap {
    /// Create a tap with fresh, zeroed output buffers
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FeatureBuffers::new()),
            work: vec![0.0; WORK_CAPACITY].into_boxed_slice(),
            bins: [0.0; MAGNITUDE_BINS],
            wave_smoothed: [0.0; WAVEFORM_POINTS],
            smoothed: [0.0; MAGNITUDE_BINS],
        }
    }

    /// Handle to the published features
    pub fn handle(&self) -> TapHandle {
        Arc::clone(&self.shared)
    }

    /// Largest block analysed in full; longer blocks are truncated
    pub fn capacity(&self) -> usize {
        self.work.len()
    }

    /// Analyse one block of mono samples (the first channel).
    pub fn process(&mut self, block: &[f32]) {
        if block.is_empty() || !self.shared.is_attached() {
            return;
        }
        let count = block.len().min(self.work.len());
        let block = &block[..count];

        self.update_waveform(block);
        self.update_magnitudes(block);

        self.shared.blocks.fetch_add(1, Ordering::Relaxed);
    }

    fn update_waveform(&mut self, block: &[f32]) {
        let count = block.len();
        let stride = (count / WAVEFORM_POINTS).max(1);
        let last = count - 1;

        for (i, (smoothed, out)) in self
            .wave_smoothed
            .iter_mut()
            .zip(&self.shared.waveform)
            .enumerate()
        {
            let s = sanitize(block[(i * stride).min(last)]).clamp(-1.0, 1.0);
            *smoothed = WAVE_SMOOTHING * s + (1.0 - WAVE_SMOOTHING) * *smoothed;
            out.store(smoothed.to_bits(), Ordering::Relaxed);
        }
    }

    fn update_magnitudes(&mut self, block: &[f32]) {
        let count = block.len();
        let work = &mut self.work[..count];
        for (w, s) in work.iter_mut().zip(block) {
            *w = sanitize(*s).abs();
        }

        let per_bin = (count / MAGNITUDE_BINS).max(1);
        for (i, bin) in self.bins.iter_mut().enumerate() {
            let start = i * per_bin;
            *bin = if start >= count {
                0.0
            } else {
                let end = (start + per_bin).min(count);
                work[start..end].iter().fold(0.0f32, |acc, &v| acc.max(v))
            };
        }

        for ((smoothed, &peak), out) in self
            .smoothed
            .iter_mut()
            .zip(&self.bins)
            .zip(&self.shared.magnitudes)
        {
            let peak = peak.min(1.0);
            let weight = if peak > *smoothed {
                ATTACK_WEIGHT
            } else {
                DECAY_WEIGHT
            };
            *smoothed = weight * peak + (1.0 - weight) * *smoothed;
            out.store(smoothed.to_bits(), Ordering::Relaxed);
        }
    }
}

impl Default for SignalTap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTap")
            .field("capacity", &self.work.len())
            .field("shared", &self.shared)
            .finish()
    }
}

#[inline]
fn sanitize(s: f32) -> f32 {
    if s.is_finite() {
        s
    } else {
        0.0
    }
}
