//! Tap insertion point
//!
//! `TappedSource` wraps any `rodio::Source` on the audio path. Samples pass
//! through untouched; the first channel is gathered into fixed-size blocks
//! that are handed to a `SignalTap` as they fill.

use std::num::NonZero;
use std::time::Duration;

use rodio::Source;

use crate::config::tap::BLOCK_FRAMES;

use super::tap::SignalTap;

/// Source wrapper that feeds a `SignalTap`
pub struct TappedSource<S> {
    inner: S,
    tap: SignalTap,
    block: Box<[f32]>,
    filled: usize,
    channel: u16,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
}

impl<S> TappedSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(source: S, tap: SignalTap) -> Self {
        let channels = source.channels();
        let sample_rate = source.sample_rate();
        Self {
            inner: source,
            tap,
            block: vec![0.0; BLOCK_FRAMES].into_boxed_slice(),
            filled: 0,
            channel: 0,
            channels,
            sample_rate,
        }
    }

    fn flush(&mut self) {
        if self.filled > 0 {
            self.tap.process(&self.block[..self.filled]);
            self.filled = 0;
        }
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(sample) = self.inner.next() else {
            self.flush();
            return None;
        };

        if self.channel == 0 {
            self.block[self.filled] = sample;
            self.filled += 1;
            if self.filled == self.block.len() {
                self.flush();
            }
        }
        self.channel += 1;
        if self.channel >= self.channels.get() {
            self.channel = 0;
        }

        Some(sample)
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> NonZero<u16> {
        self.channels
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
