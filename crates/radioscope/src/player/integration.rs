//! OS media integration
//!
//! Remote transport commands, now-playing info and "now playing"
//! notifications. Delivery to the OS is up to the front end; these types
//! only decide what to show and when.

use crate::station::Station;

use super::adapter::RadioPlayer;
use super::events::PlayerEvent;
use super::state::PlaybackState;

/// Transport command from a media key or system control center
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    TogglePlayPause,
}

impl RadioPlayer {
    /// Apply a remote command. Live radio can't pause, so pause stops.
    pub fn handle_remote(&mut self, command: RemoteCommand) {
        tracing::debug!(?command, "remote command");
        match command {
            RemoteCommand::Play | RemoteCommand::TogglePlayPause => self.toggle_play_stop(),
            RemoteCommand::Pause | RemoteCommand::Stop => self.stop(),
        }
    }
}

/// What the system's now-playing surface should show
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub is_live: bool,
    /// 1.0 while playing, 0.0 otherwise
    pub playback_rate: f32,
    pub artwork_url: Option<String>,
}

impl NowPlayingInfo {
    pub fn new(station: &Station, is_playing: bool) -> Self {
        let artist = [station.country.trim(), station.tags.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .take(2)
            .collect::<Vec<_>>()
            .join(" · ");

        Self {
            title: station.name.clone(),
            artist,
            is_live: true,
            playback_rate: if is_playing { 1.0 } else { 0.0 },
            artwork_url: station.favicon_url().map(|u| u.to_string()),
        }
    }
}

/// A "now playing" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub subtitle: String,
}

impl Notification {
    pub fn now_playing(station: &Station) -> Self {
        Self {
            title: "Now Playing".to_string(),
            body: station.name.clone(),
            subtitle: station.meta_string(),
        }
    }
}

/// Decides when to notify: on every entry into `Playing` with a station
#[derive(Debug)]
pub struct NotificationTrigger {
    enabled: bool,
    playing: bool,
}

impl NotificationTrigger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            playing: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Feed a player event; returns the notification to show, if any
    pub fn observe(&mut self, event: &PlayerEvent) -> Option<Notification> {
        let PlayerEvent::StateChanged { state, station } = event else {
            return None;
        };
        let entered = *state == PlaybackState::Playing && !self.playing;
        self.playing = state.is_playing();

        if !entered || !self.enabled {
            return None;
        }
        station.as_ref().map(Notification::now_playing)
    }
}
