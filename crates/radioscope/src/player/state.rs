//! Playback state

use std::fmt;

/// The single state of the player
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Connecting, buffering or stalled
    Loading,
    Playing,
    /// Playback failed; the message is shown to the user
    Error(String),
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Playing or on its way there
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Loading)
    }

    /// Status line for display, if the state has one
    pub fn status_text(&self) -> Option<&str> {
        match self {
            Self::Loading => Some("Buffering..."),
            Self::Error(msg) => Some(msg),
            Self::Idle | Self::Playing => None,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Playing => write!(f, "Playing"),
            Self::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}
