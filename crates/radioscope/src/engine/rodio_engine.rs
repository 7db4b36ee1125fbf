//! rodio/symphonia stream engine
//!
//! Each session runs on its own `"stream-session"` thread: HTTP connect with
//! ICY metadata, format probe, decode, and output through a rodio `Player`
//! with the session's `SignalTap` spliced into the audio path. Commands from
//! the player arrive over a channel; progress goes back as `EngineSignal`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use rodio::{DeviceSinkBuilder, Player};
use symphonia::core::probe::ProbeResult;

use crate::audio::decoder::{format_hint, start_probe, SymphoniaSource};
use crate::audio::{FlowChange, StallMonitor, TappedSource};
use crate::config::timeouts::{PROBE_TIMEOUT_SECS, SESSION_POLL_MS};
use crate::error::{RadioError, Result};
use crate::stream::icy;

use super::{EngineSession, EngineSignal, SessionRequest, SignalSender, StreamEngine, TimeControl};

/// Commands sent to a session thread
#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionCommand {
    Play,
    Pause,
    SetVolume(f32),
    Close,
}

/// Engine that plays streams on the default output device
#[derive(Debug, Default)]
pub struct RodioEngine;

impl RodioEngine {
    pub fn new() -> Self {
        Self
    }
}

impl StreamEngine for RodioEngine {
    fn open(&mut self, request: SessionRequest) -> Result<Box<dyn EngineSession>> {
        // Unbounded: nothing drains commands while the thread is connecting
        let (cmd_tx, cmd_rx) = unbounded::<SessionCommand>();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let session = request.signals.session();

        thread::Builder::new()
            .name("stream-session".to_string())
            .spawn(move || run_session(request, cmd_rx, thread_stop))
            .map_err(|e| RadioError::Audio(format!("Failed to spawn session thread: {}", e)))?;

        tracing::debug!(session, "stream session opened");
        Ok(Box::new(RodioSession {
            cmd_tx,
            stop,
            session,
        }))
    }
}

/// Control handle for a session thread
#[derive(Debug)]
pub struct RodioSession {
    cmd_tx: Sender<SessionCommand>,
    stop: Arc<AtomicBool>,
    session: u64,
}

impl RodioSession {
    fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!(session = self.session, ?cmd, "session thread gone, command dropped");
        }
    }
}

impl EngineSession for RodioSession {
    fn play(&mut self) {
        self.send(SessionCommand::Play);
    }

    fn pause(&mut self) {
        self.send(SessionCommand::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(SessionCommand::SetVolume(volume));
    }

    fn close(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(session = self.session, "stream session closing");
        self.send(SessionCommand::Close);
    }
}

impl Drop for RodioSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// What the session thread still wants after the probe phase
struct Pending {
    play: bool,
    volume: f32,
}

fn run_session(request: SessionRequest, cmd_rx: Receiver<SessionCommand>, stop: Arc<AtomicBool>) {
    let SessionRequest {
        url,
        tap,
        volume,
        signals,
    } = request;

    let meta_signals = signals.clone();
    let connected = icy::connect(&url, Arc::clone(&stop), move |items| {
        meta_signals.send(EngineSignal::Metadata(items));
    });
    let (reader, headers) = match connected {
        Ok(c) => c,
        Err(e) => {
            fail(&signals, &e.to_string());
            return;
        }
    };

    let hint = format_hint(url.as_str(), headers.content_type.as_deref());
    let probe_rx = match start_probe(reader, hint) {
        Ok(rx) => rx,
        Err(e) => {
            stop.store(true, Ordering::SeqCst);
            fail(&signals, &e.to_string());
            return;
        }
    };

    let mut pending = Pending {
        play: false,
        volume,
    };
    let probed = match await_format(&probe_rx, &cmd_rx, &stop, &mut pending) {
        Some(Ok(p)) => p,
        Some(Err(e)) => {
            stop.store(true, Ordering::SeqCst);
            fail(&signals, &e.to_string());
            return;
        }
        None => return,
    };

    let source = match SymphoniaSource::from_probed(probed) {
        Ok(s) => s,
        Err(e) => {
            stop.store(true, Ordering::SeqCst);
            fail(&signals, &e.to_string());
            return;
        }
    };
    tracing::debug!(codec = %source.codec_info(), "stream decoded");

    // Output is created on this thread (cpal streams may be !Send)
    let mut stream = match DeviceSinkBuilder::open_default_sink() {
        Ok(s) => s,
        Err(e) => {
            stop.store(true, Ordering::SeqCst);
            fail(&signals, &format!("Failed to open audio output: {}", e));
            return;
        }
    };
    stream.log_on_drop(false);

    // `stream` must be declared before `player` so the player drops first
    let player = Player::connect_new(stream.mixer());
    player.pause();
    player.set_volume(pending.volume);

    let features = tap.handle();
    let error_slot = source.error_slot();
    player.append(TappedSource::new(source, tap));

    signals.send(EngineSignal::ReadyToPlay);

    let mut monitor = StallMonitor::new();
    let mut playing = false;
    if pending.play {
        player.play();
        playing = true;
        monitor.restart(features.blocks_processed());
    }

    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(SESSION_POLL_MS)) {
            Ok(SessionCommand::Play) => {
                if !playing {
                    player.play();
                    playing = true;
                    monitor.restart(features.blocks_processed());
                }
            }
            Ok(SessionCommand::Pause) => {
                if playing {
                    player.pause();
                    playing = false;
                    signals.send(EngineSignal::TimeControl(TimeControl::Paused));
                }
            }
            Ok(SessionCommand::SetVolume(v)) => player.set_volume(v),
            Ok(SessionCommand::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !playing {
            continue;
        }

        if player.empty() {
            let reason = error_slot.lock().ok().and_then(|slot| slot.clone());
            match reason {
                Some(msg) => fail(&signals, &format!("Stream error: {}", msg)),
                None => {
                    tracing::debug!("stream ended");
                    signals.send(EngineSignal::TimeControl(TimeControl::Paused));
                }
            }
            break;
        }

        match monitor.update(features.blocks_processed()) {
            Some(FlowChange::Started) | Some(FlowChange::Resumed) => {
                signals.send(EngineSignal::TimeControl(TimeControl::Playing));
            }
            Some(FlowChange::Stalled) => {
                tracing::debug!("audio stalled");
                signals.send(EngineSignal::TimeControl(TimeControl::WaitingToPlay));
            }
            Some(FlowChange::NoAudio) => {
                fail(&signals, "No audio received from stream");
                break;
            }
            None => {}
        }
    }

    stop.store(true, Ordering::SeqCst);
    player.stop();
    tracing::debug!(session = signals.session(), "stream session ended");
}

/// Wait for format detection while still honouring commands.
///
/// Returns `None` when the session was closed in the meantime.
fn await_format(
    probe_rx: &Receiver<Result<ProbeResult>>,
    cmd_rx: &Receiver<SessionCommand>,
    stop: &AtomicBool,
    pending: &mut Pending,
) -> Option<Result<ProbeResult>> {
    let deadline = Instant::now() + Duration::from_secs(PROBE_TIMEOUT_SECS);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        select! {
            recv(probe_rx) -> msg => {
                return Some(msg.unwrap_or_else(|_| {
                    Err(RadioError::Decode("Probe thread panicked".to_string()))
                }));
            }
            recv(cmd_rx) -> cmd => match cmd {
                Ok(SessionCommand::Play) => pending.play = true,
                Ok(SessionCommand::Pause) => pending.play = false,
                Ok(SessionCommand::SetVolume(v)) => pending.volume = v,
                Ok(SessionCommand::Close) | Err(_) => {
                    stop.store(true, Ordering::SeqCst);
                    return None;
                }
            },
            default(remaining) => {
                return Some(Err(RadioError::Timeout(format!(
                    "Unable to detect audio format (timed out after {}s)",
                    PROBE_TIMEOUT_SECS
                ))));
            }
        }
    }
}

fn fail(signals: &SignalSender, msg: &str) {
    tracing::warn!(session = signals.session(), error = msg, "stream failed");
    signals.send(EngineSignal::Failed(Some(msg.to_string())));
}
