//! Playback engine adapter
//!
//! `RadioPlayer` owns at most one stream session and folds the engine's
//! asynchronous lifecycle signals into a single `PlaybackState`. It is not
//! `Sync`: every mutation happens on the thread that owns it, and engine
//! threads talk to it only through the session signal channel.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::audio::{SignalTap, TapHandle};
use crate::engine::{
    CancelToken, EngineSession, EngineSignal, SessionRequest, SessionSignal, SignalSender,
    StreamEngine, TimeControl,
};
use crate::settings::Persistence;
use crate::station::Station;
use crate::stream::common_title;

use super::events::{EventBus, PlayerEvent};
use super::state::PlaybackState;

/// Message used when the engine fails without a reason
const GENERIC_FAILURE: &str = "Stream failed";

/// Everything bound to one playback attempt
struct StreamSession {
    id: u64,
    engine: Box<dyn EngineSession>,
    tap: TapHandle,
    token: CancelToken,
    title: Option<String>,
}

/// The playback state machine
pub struct RadioPlayer {
    engine: Box<dyn StreamEngine>,
    persistence: Box<dyn Persistence>,
    state: PlaybackState,
    current_station: Option<Station>,
    session: Option<StreamSession>,
    next_session_id: u64,
    signal_tx: Sender<SessionSignal>,
    signal_rx: Receiver<SessionSignal>,
    events: Arc<EventBus>,
    /// Last volume/mute pair announced to observers
    announced_volume: Option<(f32, bool)>,
}

impl RadioPlayer {
    pub fn new(engine: Box<dyn StreamEngine>, persistence: Box<dyn Persistence>) -> Self {
        let (signal_tx, signal_rx) = unbounded();
        Self {
            engine,
            persistence,
            state: PlaybackState::Idle,
            current_station: None,
            session: None,
            next_session_id: 1,
            signal_tx,
            signal_rx,
            events: Arc::new(EventBus::new()),
            announced_volume: None,
        }
    }

    // --- Queries ---

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn current_station(&self) -> Option<&Station> {
        self.current_station.as_ref()
    }

    /// Title announced by the stream, if any
    pub fn stream_title(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.title.as_deref())
    }

    /// Feature buffers of the live session's tap
    pub fn features(&self) -> Option<TapHandle> {
        self.session.as_ref().map(|s| Arc::clone(&s.tap))
    }

    /// Whether the live tap currently carries audible signal
    pub fn has_signal(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.tap.has_signal())
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Channel the engines report on, for callers that `select!` over it
    /// and hand each message to `handle_signal`
    pub fn signal_receiver(&self) -> Receiver<SessionSignal> {
        self.signal_rx.clone()
    }

    pub fn persistence(&self) -> &dyn Persistence {
        self.persistence.as_ref()
    }

    pub fn persistence_mut(&mut self) -> &mut dyn Persistence {
        self.persistence.as_mut()
    }

    /// Volume the output should run at right now
    pub fn effective_volume(&self) -> f32 {
        if self.persistence.is_muted() {
            0.0
        } else {
            self.persistence.volume()
        }
    }

    // --- Commands ---

    /// Start streaming `station`, replacing whatever was playing
    pub fn play(&mut self, station: Station) {
        self.teardown();
        self.set_station(Some(station.clone()));
        self.set_state(PlaybackState::Loading);

        let url = match station.stream_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %station.url, "rejected stream url");
                self.set_state(PlaybackState::Error(e.to_string()));
                return;
            }
        };

        self.persistence.record_last_station(&station);

        let id = self.next_session_id;
        self.next_session_id += 1;

        let token = CancelToken::new();
        let tap = SignalTap::new();
        let handle = tap.handle();
        let request = SessionRequest {
            url,
            tap,
            volume: self.effective_volume(),
            signals: SignalSender::new(id, self.signal_tx.clone(), token.clone()),
        };

        match self.engine.open(request) {
            Ok(engine) => {
                tracing::debug!(session = id, station = %station.name, "session opened");
                self.session = Some(StreamSession {
                    id,
                    engine,
                    tap: Arc::clone(&handle),
                    token,
                    title: None,
                });
                self.events.emit(PlayerEvent::TapAttached(handle));
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "engine refused to open stream");
                token.cancel();
                handle.detach();
                self.set_state(PlaybackState::Error(e.to_string()));
            }
        }
    }

    /// Tear down the session and go idle. Safe to call at any time.
    pub fn stop(&mut self) {
        self.teardown();
        self.set_state(PlaybackState::Idle);
    }

    /// Stop when playing, otherwise (re)start the remembered station
    pub fn toggle_play_stop(&mut self) {
        if self.state.is_playing() {
            self.stop();
        } else if let Some(station) = self.current_station.clone() {
            self.play(station);
        }
    }

    /// Remember a station without starting it
    pub fn restore_station(&mut self, station: Station) {
        self.set_station(Some(station));
    }

    /// Push the stored volume and mute flag to the live session
    pub fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        if let Some(session) = self.session.as_mut() {
            session.engine.set_volume(volume);
        }
        let current = (self.persistence.volume(), self.persistence.is_muted());
        if self.announced_volume != Some(current) {
            self.announced_volume = Some(current);
            let (volume, muted) = current;
            self.events.emit(PlayerEvent::VolumeChanged { volume, muted });
        }
    }

    /// Apply a fraction of the effective volume, for fades
    pub fn set_fade_volume(&mut self, fraction: f32) {
        let volume = fraction.clamp(0.0, 1.0) * self.effective_volume();
        if let Some(session) = self.session.as_mut() {
            session.engine.set_volume(volume);
        }
    }

    /// Store a new volume and apply it
    pub fn set_volume(&mut self, volume: f32) {
        self.persistence.set_volume(volume);
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.persistence.is_muted();
        self.persistence.set_muted(muted);
        self.apply_volume();
    }

    // --- Signals ---

    /// Handle every signal already queued. Returns how many were applied.
    pub fn process_signals(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(signal) = self.signal_rx.try_recv() {
            if self.handle_signal(signal) {
                applied += 1;
            }
        }
        applied
    }

    /// Block up to `timeout` for one signal and handle it.
    /// Returns whether a live-session signal was applied.
    pub fn wait_for_signal(&mut self, timeout: Duration) -> bool {
        match self.signal_rx.recv_timeout(timeout) {
            Ok(signal) => self.handle_signal(signal),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Apply one engine signal. Signals from sessions that are no longer
    /// live are dropped and `false` is returned.
    pub fn handle_signal(&mut self, signal: SessionSignal) -> bool {
        let live = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == signal.session && !s.token.is_cancelled());
        if !live {
            tracing::trace!(session = signal.session, "dropping stale session signal");
            return false;
        }

        match signal.signal {
            EngineSignal::ReadyToPlay => {
                if let Some(session) = self.session.as_mut() {
                    session.engine.play();
                }
            }
            EngineSignal::Failed(reason) => {
                let message = reason.unwrap_or_else(|| GENERIC_FAILURE.to_string());
                tracing::warn!(session = signal.session, %message, "stream failed");
                self.set_state(PlaybackState::Error(message));
            }
            EngineSignal::TimeControl(TimeControl::Playing) => {
                self.set_state(PlaybackState::Playing);
            }
            EngineSignal::TimeControl(TimeControl::WaitingToPlay) => {
                if self.state.is_playing() {
                    self.set_state(PlaybackState::Loading);
                }
            }
            EngineSignal::TimeControl(TimeControl::Paused) => {
                if self.state.is_playing() {
                    self.set_state(PlaybackState::Idle);
                }
            }
            EngineSignal::Metadata(items) => {
                let title = common_title(&items).map(str::to_owned);
                self.set_title(title);
            }
        }
        true
    }

    // --- Internals ---

    /// Cancel, close, detach, release. A no-op without a session.
    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.token.cancel();
        session.engine.pause();
        session.engine.close();
        session.tap.detach();
        tracing::debug!(session = session.id, "session closed");

        self.events.emit(PlayerEvent::TapDetached);
        if session.title.is_some() {
            self.events.emit(PlayerEvent::StreamTitleChanged(None));
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "playback state");
        self.state = state;
        self.events.emit(PlayerEvent::StateChanged {
            state: self.state.clone(),
            station: self.current_station.clone(),
        });
    }

    fn set_station(&mut self, station: Option<Station>) {
        if self.current_station == station {
            return;
        }
        self.current_station = station;
        self.events
            .emit(PlayerEvent::StationChanged(self.current_station.clone()));
    }

    fn set_title(&mut self, title: Option<String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.title == title {
            return;
        }
        session.title = title.clone();
        self.events.emit(PlayerEvent::StreamTitleChanged(title));
    }
}

impl Drop for RadioPlayer {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{RadioError, Result};
    use crate::stream::{MetadataItem, MetadataKey};
    use std::sync::Mutex;

    /// Calls a fake session received, in order
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Play,
        Pause,
        SetVolume(f32),
        Close,
    }

    /// Shared record of what the fake engine was asked to do
    #[derive(Default)]
    pub(crate) struct Script {
        pub(crate) opens: usize,
        pub(crate) refuse: Option<String>,
        pub(crate) senders: Vec<SignalSender>,
        /// Taps handed over by the player, standing in for the audio path
        pub(crate) taps: Vec<SignalTap>,
        pub(crate) volumes: Vec<f32>,
        pub(crate) calls: Vec<Vec<Call>>,
    }

    pub(crate) struct FakeEngine(pub(crate) Arc<Mutex<Script>>);

    struct FakeSession {
        index: usize,
        script: Arc<Mutex<Script>>,
    }

    impl StreamEngine for FakeEngine {
        fn open(&mut self, request: SessionRequest) -> Result<Box<dyn EngineSession>> {
            let mut script = self.0.lock().unwrap();
            script.opens += 1;
            if let Some(reason) = script.refuse.clone() {
                return Err(RadioError::Stream(reason));
            }
            let index = script.senders.len();
            script.senders.push(request.signals);
            script.taps.push(request.tap);
            script.volumes.push(request.volume);
            script.calls.push(Vec::new());
            Ok(Box::new(FakeSession {
                index,
                script: Arc::clone(&self.0),
            }))
        }
    }

    impl FakeSession {
        fn record(&self, call: Call) {
            self.script.lock().unwrap().calls[self.index].push(call);
        }
    }

    impl EngineSession for FakeSession {
        fn play(&mut self) {
            self.record(Call::Play);
        }

        fn pause(&mut self) {
            self.record(Call::Pause);
        }

        fn set_volume(&mut self, volume: f32) {
            self.record(Call::SetVolume(volume));
        }

        fn close(&mut self) {
            self.record(Call::Close);
        }
    }

    /// In-memory persistence that counts last-station writes
    #[derive(Default)]
    pub(crate) struct MemoryPersistence {
        pub(crate) volume: f32,
        pub(crate) muted: bool,
        pub(crate) last: Arc<Mutex<Vec<Station>>>,
    }

    impl Persistence for MemoryPersistence {
        fn volume(&self) -> f32 {
            self.volume
        }

        fn is_muted(&self) -> bool {
            self.muted
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn record_last_station(&mut self, station: &Station) {
            self.last.lock().unwrap().push(station.clone());
        }
    }

    pub(crate) struct Harness {
        pub(crate) player: RadioPlayer,
        pub(crate) script: Arc<Mutex<Script>>,
        pub(crate) last: Arc<Mutex<Vec<Station>>>,
    }

    pub(crate) fn harness() -> Harness {
        harness_with(0.8, false)
    }

    pub(crate) fn harness_with(volume: f32, muted: bool) -> Harness {
        let script = Arc::new(Mutex::new(Script::default()));
        let last = Arc::new(Mutex::new(Vec::new()));
        let persistence = MemoryPersistence {
            volume,
            muted,
            last: Arc::clone(&last),
        };
        let player = RadioPlayer::new(
            Box::new(FakeEngine(Arc::clone(&script))),
            Box::new(persistence),
        );
        Harness {
            player,
            script,
            last,
        }
    }

    pub(crate) fn station() -> Station {
        Station::new("Jazz FM", "http://radio.example.com/jazz")
            .with_metadata("FR", "jazz, swing")
            .with_stats(128, 42)
    }

    impl Harness {
        /// Send a signal as the engine of session `index` (0-based open order)
        pub(crate) fn emit(&self, index: usize, signal: EngineSignal) -> bool {
            self.script.lock().unwrap().senders[index].send(signal)
        }

        pub(crate) fn calls(&self, index: usize) -> Vec<Call> {
            self.script.lock().unwrap().calls[index].clone()
        }

        pub(crate) fn opens(&self) -> usize {
            self.script.lock().unwrap().opens
        }

        pub(crate) fn tap(&self, index: usize) -> TapHandle {
            self.script.lock().unwrap().taps[index].handle()
        }

        /// Push a PCM block through session `index`'s tap
        pub(crate) fn feed(&self, index: usize, block: &[f32]) {
            self.script.lock().unwrap().taps[index].process(block);
        }

        /// Drive session `index` through ready → playing
        pub(crate) fn start(&mut self, index: usize) {
            self.emit(index, EngineSignal::ReadyToPlay);
            self.emit(index, EngineSignal::TimeControl(TimeControl::Playing));
            self.player.process_signals();
        }
    }

    fn drain(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        rx.try_iter().collect()
    }

    fn states(events: &[PlayerEvent]) -> Vec<PlaybackState> {
        events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::StateChanged { state, .. } => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    // --- play ---

    #[test]
    fn initial_state_is_idle() {
        let h = harness();
        assert_eq!(*h.player.state(), PlaybackState::Idle);
        assert!(h.player.current_station().is_none());
        assert!(!h.player.has_session());
        assert!(h.player.features().is_none());
    }

    #[test]
    fn play_enters_loading_and_opens_engine() {
        let mut h = harness();
        h.player.play(station());
        assert_eq!(*h.player.state(), PlaybackState::Loading);
        assert_eq!(h.opens(), 1);
        assert!(h.player.has_session());
        assert_eq!(h.player.current_station(), Some(&station()));
        assert_eq!(h.last.lock().unwrap().len(), 1);
    }

    #[test]
    fn play_passes_effective_volume() {
        let mut h = harness_with(0.5, false);
        h.player.play(station());
        let mut muted = harness_with(0.5, true);
        muted.player.play(station());
        assert_eq!(h.script.lock().unwrap().volumes, vec![0.5]);
        assert_eq!(muted.script.lock().unwrap().volumes, vec![0.0]);
    }

    #[test]
    fn invalid_url_fails_without_session() {
        let mut h = harness();
        let bad = Station::new("Broken", "not a url");
        h.player.play(bad.clone());
        assert_eq!(
            *h.player.state(),
            PlaybackState::Error("Invalid stream URL".into())
        );
        assert_eq!(h.opens(), 0);
        assert!(!h.player.has_session());
        assert!(h.last.lock().unwrap().is_empty());
        assert_eq!(h.player.current_station(), Some(&bad));
    }

    #[test]
    fn unsupported_scheme_is_invalid() {
        let mut h = harness();
        h.player.play(Station::new("Ftp", "ftp://example.com/stream"));
        assert_eq!(
            *h.player.state(),
            PlaybackState::Error("Invalid stream URL".into())
        );
        assert_eq!(h.opens(), 0);
    }

    #[test]
    fn engine_refusal_becomes_error() {
        let mut h = harness();
        h.script.lock().unwrap().refuse = Some("no output".into());
        h.player.play(station());
        assert!(matches!(h.player.state(), PlaybackState::Error(msg) if msg.contains("no output")));
        assert!(!h.player.has_session());
        assert_eq!(h.player.current_station(), Some(&station()));
    }

    #[test]
    fn play_emits_station_loading_and_tap() {
        let mut h = harness();
        let rx = h.player.subscribe();
        h.player.play(station());
        let events = drain(&rx);
        assert!(matches!(&events[0], PlayerEvent::StationChanged(Some(s)) if *s == station()));
        assert!(matches!(
            &events[1],
            PlayerEvent::StateChanged { state: PlaybackState::Loading, station: Some(_) }
        ));
        assert!(matches!(events[2], PlayerEvent::TapAttached(_)));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn each_session_gets_fresh_zeroed_tap() {
        let mut h = harness();
        h.player.play(station());
        let first = h.tap(0);
        h.player.play(station());
        let second = h.tap(1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.waveform().iter().all(|&v| v == 0.0));
        assert!(second.magnitudes().iter().all(|&v| v == 0.0));
        assert!(Arc::ptr_eq(&h.player.features().unwrap(), &second));
    }

    // --- Session replacement ---

    #[test]
    fn replay_tears_down_previous_session_first() {
        let mut h = harness();
        h.player.play(station());
        h.player.play(Station::new("Other", "https://other.example.com/live"));

        assert_eq!(h.opens(), 2);
        assert_eq!(h.calls(0), vec![Call::Pause, Call::Close]);
        assert!(!h.tap(0).is_attached());
        assert!(h.tap(1).is_attached());
    }

    #[test]
    fn replay_from_playing_cancels_old_sender() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        h.player.play(station());
        assert!(!h.emit(0, EngineSignal::TimeControl(TimeControl::Playing)));
        assert_eq!(*h.player.state(), PlaybackState::Loading);
    }

    #[test]
    fn stale_signals_are_ignored() {
        let mut h = harness();
        h.player.play(station());
        let stale = SessionSignal {
            session: 999,
            signal: EngineSignal::Failed(Some("late".into())),
        };
        assert!(!h.player.handle_signal(stale));
        assert_eq!(*h.player.state(), PlaybackState::Loading);
    }

    #[test]
    fn signal_queued_before_replay_is_dropped() {
        let mut h = harness();
        h.player.play(station());
        // queued by the old engine before it was cancelled
        h.emit(0, EngineSignal::Failed(Some("old".into())));
        h.player.play(station());
        assert_eq!(h.player.process_signals(), 0);
        assert_eq!(*h.player.state(), PlaybackState::Loading);
    }

    // --- Signal table ---

    #[test]
    fn ready_to_play_starts_output_without_state_change() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::ReadyToPlay);
        assert_eq!(h.player.process_signals(), 1);
        assert_eq!(*h.player.state(), PlaybackState::Loading);
        assert_eq!(h.calls(0), vec![Call::Play]);
    }

    #[test]
    fn playing_signal_enters_playing() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        assert_eq!(*h.player.state(), PlaybackState::Playing);
    }

    #[test]
    fn failure_uses_engine_message() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::Failed(Some("No audio received from stream".into())));
        h.player.process_signals();
        assert_eq!(
            *h.player.state(),
            PlaybackState::Error("No audio received from stream".into())
        );
        assert_eq!(h.player.current_station(), Some(&station()));
    }

    #[test]
    fn failure_without_message_is_generic() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        h.emit(0, EngineSignal::Failed(None));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Error("Stream failed".into()));
    }

    #[test]
    fn stall_demotes_playing_and_recovers() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        h.emit(0, EngineSignal::TimeControl(TimeControl::WaitingToPlay));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Loading);
        h.emit(0, EngineSignal::TimeControl(TimeControl::Playing));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Playing);
    }

    #[test]
    fn waiting_outside_playing_is_ignored() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::Failed(Some("x".into())));
        h.emit(0, EngineSignal::TimeControl(TimeControl::WaitingToPlay));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Error("x".into()));
    }

    #[test]
    fn paused_demotes_playing_to_idle_only() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::TimeControl(TimeControl::Paused));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Loading);

        h.start(0);
        h.emit(0, EngineSignal::TimeControl(TimeControl::Paused));
        h.player.process_signals();
        assert_eq!(*h.player.state(), PlaybackState::Idle);
    }

    #[test]
    fn wait_for_signal_times_out_quietly() {
        let mut h = harness();
        h.player.play(station());
        assert!(!h.player.wait_for_signal(Duration::from_millis(10)));
        h.emit(0, EngineSignal::TimeControl(TimeControl::Playing));
        assert!(h.player.wait_for_signal(Duration::from_millis(100)));
        assert!(h.player.state().is_playing());
    }

    // --- Stream title ---

    #[test]
    fn title_captured_from_common_title() {
        let mut h = harness();
        let rx = h.player.subscribe();
        h.player.play(station());
        h.emit(
            0,
            EngineSignal::Metadata(vec![
                MetadataItem::new(MetadataKey::StreamUrl, "http://x"),
                MetadataItem::title("Artist - Song"),
            ]),
        );
        h.player.process_signals();
        assert_eq!(h.player.stream_title(), Some("Artist - Song"));
        assert!(drain(&rx).iter().any(
            |e| matches!(e, PlayerEvent::StreamTitleChanged(Some(t)) if t == "Artist - Song")
        ));
    }

    #[test]
    fn empty_or_missing_title_clears() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("Song")]));
        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("")]));
        h.player.process_signals();
        assert_eq!(h.player.stream_title(), None);

        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("Song")]));
        h.emit(
            0,
            EngineSignal::Metadata(vec![MetadataItem::new(MetadataKey::StreamUrl, "x")]),
        );
        h.player.process_signals();
        assert_eq!(h.player.stream_title(), None);
    }

    #[test]
    fn repeated_title_emits_once() {
        let mut h = harness();
        h.player.play(station());
        let rx = h.player.subscribe();
        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("Song")]));
        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("Song")]));
        h.player.process_signals();
        let titles = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, PlayerEvent::StreamTitleChanged(_)))
            .count();
        assert_eq!(titles, 1);
    }

    // --- stop ---

    #[test]
    fn stop_tears_down_in_order() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        h.emit(0, EngineSignal::Metadata(vec![MetadataItem::title("Song")]));
        h.player.process_signals();

        let rx = h.player.subscribe();
        h.player.stop();

        assert_eq!(*h.player.state(), PlaybackState::Idle);
        assert_eq!(h.calls(0), vec![Call::Play, Call::Pause, Call::Close]);
        assert!(!h.tap(0).is_attached());
        assert!(h.player.stream_title().is_none());
        assert!(!h.emit(0, EngineSignal::TimeControl(TimeControl::Playing)));
        // station survives for the next toggle
        assert_eq!(h.player.current_station(), Some(&station()));

        let events = drain(&rx);
        assert!(matches!(events[0], PlayerEvent::TapDetached));
        assert!(matches!(events[1], PlayerEvent::StreamTitleChanged(None)));
        assert_eq!(states(&events), vec![PlaybackState::Idle]);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut h = harness();
        h.player.stop();
        h.player.play(station());
        h.player.stop();
        let rx = h.player.subscribe();
        h.player.stop();
        h.player.stop();
        assert!(drain(&rx).is_empty());
        assert_eq!(h.calls(0), vec![Call::Pause, Call::Close]);
    }

    #[test]
    fn stop_from_error_goes_idle() {
        let mut h = harness();
        h.player.play(Station::new("Bad", "::"));
        h.player.stop();
        assert_eq!(*h.player.state(), PlaybackState::Idle);
    }

    #[test]
    fn drop_tears_down_session() {
        let mut h = harness();
        h.player.play(station());
        let tap = h.tap(0);
        let Harness { player, script, .. } = h;
        drop(player);
        assert!(!tap.is_attached());
        assert_eq!(
            script.lock().unwrap().calls[0],
            vec![Call::Pause, Call::Close]
        );
    }

    // --- toggle ---

    #[test]
    fn toggle_without_station_does_nothing() {
        let mut h = harness();
        h.player.toggle_play_stop();
        assert_eq!(*h.player.state(), PlaybackState::Idle);
        assert_eq!(h.opens(), 0);
    }

    #[test]
    fn toggle_stops_when_playing_and_replays_otherwise() {
        let mut h = harness();
        h.player.play(station());
        h.start(0);
        h.player.toggle_play_stop();
        assert_eq!(*h.player.state(), PlaybackState::Idle);

        h.player.toggle_play_stop();
        assert_eq!(*h.player.state(), PlaybackState::Loading);
        assert_eq!(h.opens(), 2);
    }

    #[test]
    fn toggle_retries_after_error() {
        let mut h = harness();
        h.player.play(station());
        h.emit(0, EngineSignal::Failed(Some("dead".into())));
        h.player.process_signals();
        h.player.toggle_play_stop();
        assert_eq!(*h.player.state(), PlaybackState::Loading);
        assert_eq!(h.opens(), 2);
        assert_eq!(h.calls(0), vec![Call::Pause, Call::Close]);
    }

    #[test]
    fn restore_station_enables_toggle() {
        let mut h = harness();
        h.player.restore_station(station());
        assert_eq!(*h.player.state(), PlaybackState::Idle);
        assert_eq!(h.opens(), 0);
        h.player.toggle_play_stop();
        assert_eq!(h.opens(), 1);
    }

    // --- Volume ---

    #[test]
    fn apply_volume_respects_mute() {
        let mut h = harness_with(0.6, false);
        h.player.play(station());
        h.player.apply_volume();
        h.player.toggle_mute();
        h.player.toggle_mute();
        assert_eq!(
            h.calls(0),
            vec![Call::SetVolume(0.6), Call::SetVolume(0.0), Call::SetVolume(0.6)]
        );
        assert_eq!(*h.player.state(), PlaybackState::Loading);
    }

    #[test]
    fn set_volume_persists_and_emits() {
        let mut h = harness();
        let rx = h.player.subscribe();
        h.player.set_volume(0.25);
        assert_eq!(h.player.persistence().volume(), 0.25);
        assert!(drain(&rx).iter().any(|e| matches!(
            e,
            PlayerEvent::VolumeChanged { volume, muted: false } if *volume == 0.25
        )));
    }

    #[test]
    fn fade_volume_scales_effective_volume() {
        let mut h = harness_with(0.8, false);
        h.player.play(station());
        h.player.set_fade_volume(0.5);
        h.player.persistence_mut().set_muted(true);
        h.player.set_fade_volume(0.5);
        assert_eq!(
            h.calls(0),
            vec![Call::SetVolume(0.4), Call::SetVolume(0.0)]
        );
    }

    // --- Presence ---

    #[test]
    fn has_signal_follows_live_tap() {
        let mut h = harness();
        assert!(!h.player.has_signal());
        h.player.play(station());
        assert!(!h.player.has_signal());

        h.feed(0, &[0.5; 256]);
        assert!(h.player.has_signal());

        h.player.stop();
        assert!(!h.player.has_signal());
        // input after teardown never reaches the buffers
        let tap = h.tap(0);
        let before = tap.blocks_processed();
        h.feed(0, &[0.5; 256]);
        assert_eq!(tap.blocks_processed(), before);
    }
}
