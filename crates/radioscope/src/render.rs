//! Oscilloscope projection
//!
//! `Scope` turns the tap's feature buffers into normalized points once per
//! display frame: `x` in [0, 1] left to right, `y` in [-1, 1] with 0 at the
//! center line. Front ends scale the points to their own canvas.

use std::f64::consts::PI;

use crate::audio::FeatureBuffers;
use crate::config::render::{IDLE_HEADROOM, IDLE_STEPS, TRACE_GAIN, TRACE_HEADROOM};
use crate::config::tap::WAVEFORM_POINTS;

/// Phase multipliers of the two idle waves
const IDLE_PHASES: [f64; 2] = [1.0, 1.4];

/// What a frame is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Live trace from the tap
    Signal,
    /// Animated placeholder while nothing is audible
    Idle,
}

/// One rendered frame, borrowing the scope's buffers
#[derive(Debug, Clone, Copy)]
pub struct ScopeFrame<'a> {
    pub mode: ScopeMode,
    pub primary: &'a [(f64, f64)],
    /// Second idle wave; empty in signal mode
    pub secondary: &'a [(f64, f64)],
}

/// Per-frame projector with reused point buffers
#[derive(Debug)]
pub struct Scope {
    samples: [f32; WAVEFORM_POINTS],
    primary: Vec<(f64, f64)>,
    secondary: Vec<(f64, f64)>,
}

impl Scope {
    pub fn new() -> Self {
        let capacity = WAVEFORM_POINTS.max(IDLE_STEPS);
        Self {
            samples: [0.0; WAVEFORM_POINTS],
            primary: Vec::with_capacity(capacity),
            secondary: Vec::with_capacity(IDLE_STEPS),
        }
    }

    /// Project the current features, or the idle animation at `time`
    /// seconds when there is no tap or no audible signal
    pub fn render(&mut self, features: Option<&FeatureBuffers>, time: f64) -> ScopeFrame<'_> {
        match features {
            Some(buffers) if buffers.has_signal() => {
                buffers.read_waveform(&mut self.samples);
                self.project_trace();
                ScopeFrame {
                    mode: ScopeMode::Signal,
                    primary: &self.primary,
                    secondary: &[],
                }
            }
            _ => {
                idle_wave(&mut self.primary, time, IDLE_PHASES[0]);
                idle_wave(&mut self.secondary, time, IDLE_PHASES[1]);
                ScopeFrame {
                    mode: ScopeMode::Idle,
                    primary: &self.primary,
                    secondary: &self.secondary,
                }
            }
        }
    }

    fn project_trace(&mut self) {
        self.primary.clear();
        let last = (WAVEFORM_POINTS - 1) as f64;
        for (i, &s) in self.samples.iter().enumerate() {
            let y = trace_level(s) * TRACE_HEADROOM;
            self.primary.push((i as f64 / last, y));
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Amplified, clamped trace value for one waveform sample
pub fn trace_level(sample: f32) -> f64 {
    if !sample.is_finite() {
        return 0.0;
    }
    f64::from((sample * TRACE_GAIN).clamp(-1.0, 1.0))
}

fn idle_wave(points: &mut Vec<(f64, f64)>, t: f64, phase: f64) {
    points.clear();
    let last = (IDLE_STEPS - 1) as f64;
    for i in 0..IDLE_STEPS {
        let p = i as f64 / last;
        let y = (p * PI * 4.0 + t * 2.0 * phase).sin() * 0.35
            + (p * PI * 7.0 + t * 1.3 * phase).sin() * 0.18
            + (p * PI * 2.5 + t * 0.8 * phase).sin() * 0.12;
        points.push((p, y * IDLE_HEADROOM));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SignalTap;

    fn loud_tap(value: f32) -> SignalTap {
        let mut tap = SignalTap::new();
        for _ in 0..8 {
            tap.process(&[value; 1024]);
        }
        tap
    }

    // --- trace_level ---

    #[test]
    fn gain_then_clamp() {
        assert!((trace_level(0.1) - 0.3).abs() < 1e-6);
        assert!((trace_level(-0.2) + 0.6).abs() < 1e-6);
        assert_eq!(trace_level(0.5), 1.0);
        assert_eq!(trace_level(-0.9), -1.0);
        assert_eq!(trace_level(f32::NAN), 0.0);
    }

    // --- Idle mode ---

    #[test]
    fn no_tap_renders_idle() {
        let mut scope = Scope::new();
        let frame = scope.render(None, 0.0);
        assert_eq!(frame.mode, ScopeMode::Idle);
        assert_eq!(frame.primary.len(), IDLE_STEPS);
        assert_eq!(frame.secondary.len(), IDLE_STEPS);
    }

    #[test]
    fn silent_tap_renders_idle() {
        let tap = SignalTap::new();
        let handle = tap.handle();
        let mut scope = Scope::new();
        assert_eq!(scope.render(Some(&*handle), 1.0).mode, ScopeMode::Idle);
    }

    #[test]
    fn idle_is_deterministic_in_time() {
        let mut a = Scope::new();
        let mut b = Scope::new();
        let fa: Vec<_> = a.render(None, 2.5).primary.to_vec();
        let fb: Vec<_> = b.render(None, 2.5).primary.to_vec();
        assert_eq!(fa, fb);

        let later: Vec<_> = a.render(None, 3.0).primary.to_vec();
        assert_ne!(fa, later);
    }

    #[test]
    fn idle_waves_differ_by_phase() {
        let mut scope = Scope::new();
        let frame = scope.render(None, 1.0);
        assert_ne!(frame.primary, frame.secondary);
        // at t = 0 the phase has no effect
        let frame = scope.render(None, 0.0);
        assert_eq!(frame.primary, frame.secondary);
    }

    #[test]
    fn idle_stays_in_bounds() {
        let mut scope = Scope::new();
        for step in 0..50 {
            let frame = scope.render(None, step as f64 * 0.37);
            for &(x, y) in frame.primary.iter().chain(frame.secondary) {
                assert!((0.0..=1.0).contains(&x));
                assert!(y.abs() <= 0.65 * IDLE_HEADROOM + 1e-9);
            }
        }
    }

    // --- Signal mode ---

    #[test]
    fn audible_tap_renders_trace() {
        let tap = loud_tap(0.1);
        let handle = tap.handle();
        let mut scope = Scope::new();
        let frame = scope.render(Some(&*handle), 0.0);
        assert_eq!(frame.mode, ScopeMode::Signal);
        assert_eq!(frame.primary.len(), WAVEFORM_POINTS);
        assert!(frame.secondary.is_empty());

        let expected = trace_level(handle.waveform()[0]) * TRACE_HEADROOM;
        assert!((frame.primary[0].1 - expected).abs() < 1e-9);
        assert_eq!(frame.primary[0].0, 0.0);
        assert_eq!(frame.primary[WAVEFORM_POINTS - 1].0, 1.0);
    }

    #[test]
    fn loud_trace_clamps_to_headroom() {
        let tap = loud_tap(-0.9);
        let handle = tap.handle();
        let mut scope = Scope::new();
        let frame = scope.render(Some(&*handle), 0.0);
        for &(_, y) in frame.primary {
            assert!((y + TRACE_HEADROOM).abs() < 1e-9);
        }
    }

    #[test]
    fn buffers_are_reused() {
        let tap = loud_tap(0.2);
        let handle = tap.handle();
        let mut scope = Scope::new();
        let before = scope.primary.capacity();
        for t in 0..10 {
            scope.render(Some(&*handle), t as f64);
            scope.render(None, t as f64);
        }
        assert_eq!(scope.primary.capacity(), before);
    }
}
