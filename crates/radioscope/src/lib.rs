//! Radioscope: internet radio oscilloscope
//!
//! Live stream playback with a real-time signal tap and a playback state
//! machine.
//!
//! ## Quick start
//!
//! ```no_run
//! use radioscope::engine::RodioEngine;
//! use radioscope::player::RadioPlayer;
//! use radioscope::settings::SettingsStore;
//! use radioscope::station::Station;
//!
//! let store = SettingsStore::open_default().unwrap_or_default();
//! let mut player = RadioPlayer::new(Box::new(RodioEngine::new()), Box::new(store));
//! player.play(Station::new("Example", "http://radio.example.com/stream"));
//! ```

pub mod audio;
pub mod config;
mod country;
pub mod engine;
pub mod error;
pub mod player;
pub mod render;
pub mod settings;
pub mod station;
pub mod stream;

pub use error::{RadioError, Result};
