//! Playback state machine
//!
//! `RadioPlayer` turns user intent and engine signals into a single
//! `PlaybackState`, broadcasting changes on an `EventBus`.

pub mod adapter;
pub mod events;
pub mod integration;
pub mod state;

pub use adapter::RadioPlayer;
pub use events::{EventBus, PlayerEvent};
pub use integration::{Notification, NotificationTrigger, NowPlayingInfo, RemoteCommand};
pub use state::PlaybackState;
