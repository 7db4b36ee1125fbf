//! Signal-presence detection
//!
//! Used by renderers to choose between the live trace and the idle animation.

use crate::config::tap::SIGNAL_FLOOR;

/// Largest value in a set of magnitudes (0 for an empty set)
pub fn peak<'a>(magnitudes: impl IntoIterator<Item = &'a f32>) -> f32 {
    magnitudes
        .into_iter()
        .copied()
        .filter(|m| m.is_finite())
        .fold(0.0, f32::max)
}

/// True when the loudest magnitude is above the noise floor
pub fn has_signal<'a>(magnitudes: impl IntoIterator<Item = &'a f32>) -> bool {
    peak(magnitudes) > SIGNAL_FLOOR
}
