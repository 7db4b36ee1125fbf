//! Streaming engine seam
//!
//! The player drives playback through `StreamEngine`/`EngineSession` and
//! hears back through `EngineSignal`s. Engines run on their own threads;
//! signals travel over a channel tagged with the session that produced them,
//! so the player can drop anything from a session it has already torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use reqwest::Url;

use crate::audio::SignalTap;
use crate::error::Result;
use crate::stream::MetadataItem;

pub mod rodio_engine;

pub use rodio_engine::RodioEngine;

/// Playback activity reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Paused,
    /// Playback requested but stalled or buffering
    WaitingToPlay,
    Playing,
}

/// Asynchronous lifecycle notifications from a stream session
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// The item is decoded and ready; output starts on `play()`
    ReadyToPlay,
    /// The stream failed, with a reason when one is known
    Failed(Option<String>),
    TimeControl(TimeControl),
    /// A timed-metadata update
    Metadata(Vec<MetadataItem>),
}

/// An `EngineSignal` tagged with its session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSignal {
    pub session: u64,
    pub signal: EngineSignal,
}

/// Shared cancellation flag for one session
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Engine-side handle for reporting signals.
///
/// Once the session's token is cancelled every send is a silent no-op.
#[derive(Debug, Clone)]
pub struct SignalSender {
    session: u64,
    tx: Sender<SessionSignal>,
    token: CancelToken,
}

impl SignalSender {
    pub fn new(session: u64, tx: Sender<SessionSignal>, token: CancelToken) -> Self {
        Self { session, tx, token }
    }

    /// Deliver a signal. Returns false if the session was cancelled or the
    /// player is gone.
    pub fn send(&self, signal: EngineSignal) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.tx
            .send(SessionSignal {
                session: self.session,
                signal,
            })
            .is_ok()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Everything an engine needs to start one stream
#[derive(Debug)]
pub struct SessionRequest {
    pub url: Url,
    /// Tap to install on the audio path; the engine owns it from here on
    pub tap: SignalTap,
    /// Initial output volume (0.0 - 1.0)
    pub volume: f32,
    pub signals: SignalSender,
}

/// A streaming/decode engine
pub trait StreamEngine: Send {
    /// Start connecting to a stream. Progress is reported through
    /// `request.signals`; an `Err` means the session could not be created.
    fn open(&mut self, request: SessionRequest) -> Result<Box<dyn EngineSession>>;
}

/// Control handle for one open stream
pub trait EngineSession: Send {
    fn play(&mut self);

    fn pause(&mut self);

    fn set_volume(&mut self, volume: f32);

    /// Release the stream. No further audio is fed to the tap afterwards.
    fn close(&mut self);
}
