//! Player event broadcasting
//!
//! `EventBus` fans out `PlayerEvent`s to any number of observers (renderer,
//! notification trigger, now-playing publisher), each on its own channel.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::audio::TapHandle;
use crate::station::Station;

use super::state::PlaybackState;

/// Observable changes of the player
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChanged {
        state: PlaybackState,
        station: Option<Station>,
    },
    StationChanged(Option<Station>),
    StreamTitleChanged(Option<String>),
    /// A fresh tap is live; renderers should read from it
    TapAttached(TapHandle),
    TapDetached,
    VolumeChanged {
        volume: f32,
        muted: bool,
    },
}

/// Broadcast mechanism for player events
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Emit an event to all subscribers. Removes disconnected subscribers.
    pub fn emit(&self, event: PlayerEvent) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(PlayerEvent::TapDetached);
        assert!(matches!(a.try_recv(), Ok(PlayerEvent::TapDetached)));
        assert!(matches!(b.try_recv(), Ok(PlayerEvent::TapDetached)));
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.emit(PlayerEvent::StreamTitleChanged(Some("early".into())));
        let rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        bus.emit(PlayerEvent::TapDetached);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventBus::new().emit(PlayerEvent::StationChanged(None));
    }
}
