//! Radioscope CLI: terminal internet radio with a live oscilloscope

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MediaKeyCode};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::canvas::{Canvas, Line as TraceLine};
use ratatui::widgets::*;
use tracing_subscriber::EnvFilter;

use radioscope::audio::TapHandle;
use radioscope::config::render::FRAME_INTERVAL_MS;
use radioscope::engine::RodioEngine;
use radioscope::player::{
    Notification, NotificationTrigger, NowPlayingInfo, PlaybackState, PlayerEvent, RadioPlayer,
    RemoteCommand,
};
use radioscope::render::{Scope, ScopeMode};
use radioscope::settings::{Settings, SettingsStore};
use radioscope::station::Station;

#[derive(Parser)]
#[command(name = "radioscope", about = "Terminal internet radio with a live oscilloscope", version)]
struct Cli {
    /// Stream URL to play (otherwise the last station is loaded; space plays it)
    url: Option<String>,

    /// Display name for the station
    #[arg(long)]
    name: Option<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write logs to this file; filter with RUST_LOG
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// How long a "now playing" banner stays up
const BANNER_SECS: u64 = 4;

/// Volume change per key press
const VOLUME_STEP: f32 = 0.05;

/// Steps of the fade-out on quit
const FADE_STEPS: u32 = 8;

/// Requests from the UI thread to the control thread
#[derive(Debug)]
enum UiCommand {
    Play(Station),
    /// Remember a station without starting it
    Restore(Station),
    Toggle,
    Stop,
    Remote(RemoteCommand),
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Quit,
}

/// UI-side view of the player, folded from `PlayerEvent`s
struct App {
    state: PlaybackState,
    station: Option<Station>,
    title: Option<String>,
    tap: Option<TapHandle>,
    volume: f32,
    muted: bool,
    visualizer: bool,
    scope: Scope,
    notifications: NotificationTrigger,
    banner: Option<(Notification, Instant)>,
    started: Instant,
    running: bool,
}

impl App {
    fn new(settings: &Settings) -> Self {
        Self {
            state: PlaybackState::Idle,
            station: None,
            title: None,
            tap: None,
            volume: settings.volume,
            muted: settings.muted,
            visualizer: settings.visualizer_enabled,
            scope: Scope::new(),
            notifications: NotificationTrigger::new(settings.notifications_enabled),
            banner: None,
            started: Instant::now(),
            running: true,
        }
    }

    fn apply(&mut self, event: PlayerEvent) {
        if let Some(note) = self.notifications.observe(&event) {
            tracing::info!(station = %note.body, "{}", note.title);
            self.banner = Some((note, Instant::now()));
        }
        match event {
            PlayerEvent::StateChanged { state, station } => {
                self.state = state;
                if station.is_some() {
                    self.station = station;
                }
            }
            PlayerEvent::StationChanged(station) => self.station = station,
            PlayerEvent::StreamTitleChanged(title) => self.title = title,
            PlayerEvent::TapAttached(tap) => self.tap = Some(tap),
            PlayerEvent::TapDetached => self.tap = None,
            PlayerEvent::VolumeChanged { volume, muted } => {
                self.volume = volume;
                self.muted = muted;
            }
        }
    }

    fn banner(&self) -> Option<&Notification> {
        self.banner
            .as_ref()
            .filter(|(_, at)| at.elapsed() < Duration::from_secs(BANNER_SECS))
            .map(|(note, _)| note)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_ref())?;

    let store = match &cli.settings {
        Some(path) => SettingsStore::open(path.clone()),
        None => SettingsStore::open_default(),
    };
    let store = match store {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Warning: {}; using default settings", e);
            SettingsStore::in_memory(Settings::default())
        }
    };
    let settings = store.settings().clone();

    let initial = match cli.url {
        Some(url) => {
            let name = cli
                .name
                .unwrap_or_else(|| extract_host(&url).to_string());
            UiCommand::Play(Station::new(name, url))
        }
        None => match settings.last_station.clone() {
            Some(station) => UiCommand::Restore(station),
            None => {
                eprintln!("Error: no stream URL given and no last station saved");
                std::process::exit(1);
            }
        },
    };

    let player = RadioPlayer::new(Box::new(RodioEngine::new()), Box::new(store));
    let events = player.subscribe();
    let mut app = App::new(&settings);

    let (cmd_tx, cmd_rx) = unbounded();
    let control = thread::Builder::new()
        .name("control".into())
        .spawn(move || run_control(player, cmd_rx))?;
    let _ = cmd_tx.send(initial);

    // Suppress stderr during the TUI. ALSA/PulseAudio and other libs write
    // diagnostic messages to stderr which corrupt the ratatui display.
    let saved_stderr = unsafe { libc::dup(2) };
    {
        let devnull = File::open("/dev/null")?;
        unsafe { libc::dup2(devnull.as_raw_fd(), 2) };
    }

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &mut app, &events, &cmd_tx);

    // Stop and join while still in the alternate screen
    // (the output device may log on close)
    let _ = cmd_tx.send(UiCommand::Quit);
    if control.join().is_err() {
        tracing::warn!("control thread panicked");
    }

    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    if saved_stderr >= 0 {
        unsafe {
            libc::dup2(saved_stderr, 2);
            libc::close(saved_stderr);
        }
    }

    result
}

fn init_tracing(log_file: Option<&PathBuf>) -> io::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("radioscope=info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/// Owns the player: applies UI commands and engine signals in arrival order
fn run_control(mut player: RadioPlayer, commands: Receiver<UiCommand>) {
    let signals = player.signal_receiver();
    loop {
        select! {
            recv(commands) -> msg => match msg {
                Ok(UiCommand::Quit) | Err(_) => break,
                Ok(cmd) => apply_command(&mut player, cmd),
            },
            recv(signals) -> msg => {
                if let Ok(signal) = msg {
                    player.handle_signal(signal);
                }
            }
        }
    }

    if player.state().is_playing() {
        for step in (0..FADE_STEPS).rev() {
            player.set_fade_volume(step as f32 / FADE_STEPS as f32);
            thread::sleep(Duration::from_millis(FRAME_INTERVAL_MS));
        }
    }
    player.stop();
}

fn apply_command(player: &mut RadioPlayer, cmd: UiCommand) {
    match cmd {
        UiCommand::Play(station) => player.play(station),
        UiCommand::Restore(station) => player.restore_station(station),
        UiCommand::Toggle => player.toggle_play_stop(),
        UiCommand::Stop => player.stop(),
        UiCommand::Remote(command) => player.handle_remote(command),
        UiCommand::VolumeUp => {
            let volume = player.persistence().volume() + VOLUME_STEP;
            player.set_volume(volume);
        }
        UiCommand::VolumeDown => {
            let volume = player.persistence().volume() - VOLUME_STEP;
            player.set_volume(volume);
        }
        UiCommand::ToggleMute => player.toggle_mute(),
        UiCommand::Quit => {}
    }
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &Receiver<PlayerEvent>,
    cmd_tx: &Sender<UiCommand>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(FRAME_INTERVAL_MS);
    let mut last_tick = Instant::now();

    while app.running {
        for event in events.try_iter() {
            app.apply(event);
        }

        terminal.draw(|f| draw_ui(f, app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(cmd) = key_command(key.code) {
                        if matches!(cmd, UiCommand::Quit) {
                            app.running = false;
                        } else {
                            let _ = cmd_tx.send(cmd);
                        }
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
    Ok(())
}

fn key_command(code: KeyCode) -> Option<UiCommand> {
    let cmd = match code {
        KeyCode::Char('q') | KeyCode::Esc => UiCommand::Quit,
        KeyCode::Char(' ') => UiCommand::Toggle,
        KeyCode::Char('s') => UiCommand::Stop,
        KeyCode::Char('m') => UiCommand::ToggleMute,
        KeyCode::Char('+') | KeyCode::Char('=') => UiCommand::VolumeUp,
        KeyCode::Char('-') => UiCommand::VolumeDown,
        KeyCode::Media(MediaKeyCode::Play) => UiCommand::Remote(RemoteCommand::Play),
        KeyCode::Media(MediaKeyCode::Pause) => UiCommand::Remote(RemoteCommand::Pause),
        KeyCode::Media(MediaKeyCode::Stop) => UiCommand::Remote(RemoteCommand::Stop),
        KeyCode::Media(MediaKeyCode::PlayPause) => {
            UiCommand::Remote(RemoteCommand::TogglePlayPause)
        }
        _ => return None,
    };
    Some(cmd)
}

fn draw_ui(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" Radioscope v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::vertical([
        Constraint::Length(4), // station + now playing
        Constraint::Min(6),    // scope
        Constraint::Length(1), // help bar
    ])
    .split(inner);

    draw_metadata(f, app, chunks[0]);
    draw_scope(f, app, chunks[1]);
    draw_help(f, app, chunks[2]);
}

fn draw_metadata(f: &mut Frame, app: &App, area: Rect) {
    let Some(station) = &app.station else {
        f.render_widget(
            Paragraph::new("  No station").style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    };

    let info = NowPlayingInfo::new(station, app.state.is_playing());
    let (status, status_color) = match &app.state {
        PlaybackState::Playing => ("● LIVE".to_string(), Color::Red),
        PlaybackState::Loading => ("Buffering...".to_string(), Color::Yellow),
        PlaybackState::Idle => ("Stopped".to_string(), Color::DarkGray),
        PlaybackState::Error(msg) => (msg.clone(), Color::Red),
    };

    let now = match (app.banner(), &app.title) {
        (Some(note), _) => format!("{}: {}", note.title, note.body),
        (None, Some(title)) => title.clone(),
        (None, None) => "---".to_string(),
    };
    let max_len = area.width.saturating_sub(16) as usize;
    let detail = if info.artist.is_empty() {
        station.meta_string()
    } else {
        info.artist.clone()
    };

    let text = vec![
        Line::from(vec![
            Span::styled("  Station: ", Style::default().fg(Color::DarkGray)),
            Span::styled(info.title.clone(), Style::default().fg(Color::White).bold()),
            Span::raw("  "),
            Span::styled(status, Style::default().fg(status_color)),
        ]),
        Line::from(vec![
            Span::styled("  Now Playing: ", Style::default().fg(Color::DarkGray)),
            Span::styled(truncate_str(&now, max_len), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("  ", Style::default()),
            Span::styled(truncate_str(&detail, max_len), Style::default().fg(Color::DarkGray)),
        ]),
    ];
    f.render_widget(Paragraph::new(text), area);
}

fn draw_scope(f: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .title(" Scope ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    if !app.visualizer {
        f.render_widget(block, area);
        return;
    }

    let time = app.started.elapsed().as_secs_f64();
    let frame = app.scope.render(app.tap.as_deref(), time);
    let (primary_color, secondary_color) = match frame.mode {
        ScopeMode::Signal => (Color::Cyan, Color::Cyan),
        ScopeMode::Idle => (Color::DarkGray, Color::Rgb(60, 60, 80)),
    };

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, 1.0])
        .y_bounds([-1.0, 1.0])
        .paint(|ctx| {
            for pair in frame.secondary.windows(2) {
                let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                ctx.draw(&TraceLine::new(x1, y1, x2, y2, secondary_color));
            }
            for pair in frame.primary.windows(2) {
                let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                ctx.draw(&TraceLine::new(x1, y1, x2, y2, primary_color));
            }
        });
    f.render_widget(canvas, area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let vol_display = if app.muted {
        "MUTE".to_string()
    } else {
        format!("{}%", (app.volume * 100.0).round() as u32)
    };

    let help = Line::from(vec![
        Span::styled("  'space' ", Style::default().fg(Color::Yellow)),
        Span::raw("play/stop  |  "),
        Span::styled("'s' ", Style::default().fg(Color::Yellow)),
        Span::raw("stop  |  "),
        Span::styled("'m' ", Style::default().fg(Color::Yellow)),
        Span::raw("mute  |  "),
        Span::styled("'+'/'-' ", Style::default().fg(Color::Yellow)),
        Span::raw("volume  |  "),
        Span::styled("'q' ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  |  "),
        Span::styled(
            format!("Vol: {}", vol_display),
            Style::default().fg(Color::Cyan).bold(),
        ),
    ]);

    f.render_widget(Paragraph::new(help).alignment(Alignment::Left), area);
}

fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or(url)
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max > 3 {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(&Settings::default())
    }

    #[test]
    fn extract_host_from_url() {
        assert_eq!(extract_host("http://radio.example.com/live"), "radio.example.com");
        assert_eq!(extract_host("no-scheme"), "no-scheme");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("Café del Mar", 7), "Café...");
        assert_eq!(truncate_str("abcdef", 2), "ab");
    }

    #[test]
    fn keys_map_to_commands() {
        assert!(matches!(key_command(KeyCode::Char(' ')), Some(UiCommand::Toggle)));
        assert!(matches!(key_command(KeyCode::Esc), Some(UiCommand::Quit)));
        assert!(matches!(
            key_command(KeyCode::Media(MediaKeyCode::PlayPause)),
            Some(UiCommand::Remote(RemoteCommand::TogglePlayPause))
        ));
        assert!(key_command(KeyCode::Char('x')).is_none());
    }

    #[test]
    fn app_folds_player_events() {
        let mut app = app();
        let station = Station::new("Jazz", "http://jazz.example.com");
        app.apply(PlayerEvent::StationChanged(Some(station.clone())));
        app.apply(PlayerEvent::StateChanged {
            state: PlaybackState::Playing,
            station: Some(station),
        });
        app.apply(PlayerEvent::StreamTitleChanged(Some("Song".into())));
        app.apply(PlayerEvent::VolumeChanged {
            volume: 0.3,
            muted: true,
        });

        assert!(app.state.is_playing());
        assert_eq!(app.title.as_deref(), Some("Song"));
        assert!(app.muted);
        assert_eq!(app.banner().map(|n| n.body.as_str()), Some("Jazz"));
    }

    #[test]
    fn tap_follows_attach_and_detach() {
        let mut app = app();
        let tap = radioscope::audio::SignalTap::new();
        app.apply(PlayerEvent::TapAttached(tap.handle()));
        assert!(app.tap.is_some());
        app.apply(PlayerEvent::TapDetached);
        assert!(app.tap.is_none());
    }
}
