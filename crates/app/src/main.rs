mod playback;
mod terminal;

use std::{
    fs::File,
    io,
    ops::ControlFlow,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
};
use spectrum_player_core::{
    decode, is_playable_type, run_frame_loop, AppConfig, AudioEngine, FileInfo, FrameRenderer,
    InputBridge, IntervalTicks, OfflineOutput, PixelSurface, PlayerError, Result, Surface,
};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

use crate::{
    playback::RodioOutput,
    terminal::{cell_to_logical, fit_density, logical_size, PlayIndicator, TerminalSurface},
};

/// Audio fed to the analyser before a snapshot frame, so smoothing settles
/// the way it would during playback.
const SNAPSHOT_LEAD_IN: f64 = 0.25;
const SNAPSHOT_STEPS: u32 = 15;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            config,
            log_file,
        } => {
            match log_file {
                Some(path) => init_tracing(Arc::new(File::create(path)?), false),
                None => init_tracing(io::sink, false),
            }
            let config = AppConfig::load_or_default(config.as_deref())?;
            run_play(&file, &config)
        }
        Commands::Snapshot {
            file,
            output,
            at,
            width,
            height,
            config,
        } => {
            init_tracing(io::stderr, true);
            let mut config = AppConfig::load_or_default(config.as_deref())?;
            config.render.width = width.unwrap_or(config.render.width);
            config.render.height = height.unwrap_or(config.render.height);
            run_snapshot(&file, &output, at, &config)
        }
    }
}

fn run_play(file: &Path, config: &AppConfig) -> Result<()> {
    let payload = std::fs::read(file)?;
    let info = file_info(file);
    tracing::info!(?file, mime = %info.mime_type, "starting playback");

    let mut engine = AudioEngine::initialize(RodioOutput::open_default()?);

    let terminal = ratatui::init();
    execute!(io::stdout(), EnableMouseCapture, EnableFocusChange)?;
    let result = play_session(terminal, &mut engine, payload, &info, config);
    let restored = execute!(io::stdout(), DisableMouseCapture, DisableFocusChange);
    ratatui::restore();

    engine.shutdown();
    result?;
    restored?;
    Ok(())
}

fn play_session(
    terminal: ratatui::DefaultTerminal,
    engine: &mut AudioEngine<RodioOutput>,
    payload: Vec<u8>,
    info: &FileInfo,
    config: &AppConfig,
) -> Result<()> {
    let cell_scale = config.terminal.cell_scale;
    let area = terminal.size()?;
    let density = fit_density(area.width, area.height, cell_scale);
    let indicator = PlayIndicator::default();
    let surface = TerminalSurface::new(terminal, density, indicator.clone())?;
    let mut renderer = FrameRenderer::initialize(surface, density);
    let mut bridge = InputBridge::new(indicator);

    if let Err(err) = bridge.on_file_selected(engine, payload, &info.mime_type, &info.name) {
        bridge.report(&mut renderer, &err);
    }

    renderer.start();
    let mut ticks = IntervalTicks::new(Duration::from_millis(config.render.frame_interval_ms));
    let frames = run_frame_loop(&mut renderer, engine, &mut ticks, |renderer, engine, _now| {
        if let Some(event) = engine.poll_load() {
            bridge.on_load_event(renderer, &event);
        }

        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(ControlFlow::Break(())),
                    KeyCode::Char(' ') => {
                        bridge.on_toggle_gesture(engine);
                    }
                    _ => {}
                },
                Event::FocusLost => renderer.stop(),
                Event::FocusGained => renderer.start(),
                Event::Resize(cols, rows) => {
                    let density = fit_density(cols, rows, cell_scale);
                    renderer.surface_mut().set_pixel_density(density);
                    let (width, height) = logical_size(cols, rows, density);
                    renderer.resize(width, height);
                }
                Event::Mouse(MouseEvent {
                    kind: MouseEventKind::Down(MouseButton::Left),
                    column,
                    row,
                    ..
                }) => {
                    let density = renderer.surface().pixel_density();
                    let (x, y) = cell_to_logical(column, row, density);
                    bridge.on_pointer_down(engine, renderer, x, y);
                }
                _ => {}
            }
        }

        Ok(ControlFlow::Continue(()))
    })?;

    tracing::info!(frames, "playback session ended");
    Ok(())
}

fn run_snapshot(file: &Path, output: &Path, at: f64, config: &AppConfig) -> Result<()> {
    let info = file_info(file);
    if !is_playable_type(&info.mime_type) {
        return Err(PlayerError::UnplayableType {
            mime: info.mime_type,
        });
    }

    let audio = decode(std::fs::read(file)?, &info.mime_type)?;
    let duration = audio.duration_seconds();
    let mut engine = AudioEngine::initialize(OfflineOutput::new());
    engine.load_decoded(audio, info)?;

    let at = at.clamp(0.0, duration);
    let lead_in = SNAPSHOT_LEAD_IN.min(at);
    engine.seek((at - lead_in) / duration);
    let step = lead_in / f64::from(SNAPSHOT_STEPS);
    for _ in 0..SNAPSHOT_STEPS {
        engine.output_mut().render_seconds(step);
        engine.sample();
    }

    let surface = PixelSurface::new(config.render.width, config.render.height);
    let mut renderer = FrameRenderer::initialize(surface, config.render.pixel_density);
    renderer.show_file_info(engine.file_info().cloned());
    renderer.start();
    renderer.render_frame(&mut engine, 0.0)?;
    renderer.surface().save_png(output)?;

    tracing::info!(?output, at, "snapshot written");
    Ok(())
}

fn file_info(path: &Path) -> FileInfo {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".into());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    FileInfo {
        name,
        mime_type: mime_for_extension(extension.as_deref()).to_string(),
    }
}

fn mime_for_extension(extension: Option<&str>) -> &'static str {
    match extension {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg" | "oga") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

fn init_tracing<W>(writer: W, ansi: bool)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(ansi)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal audio player with a live spectrum view", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a file with the live visualisation in the terminal.
    Play {
        /// Audio or video file to play.
        file: PathBuf,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write logs to this file instead of discarding them.
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Render a single frame of a file to a PNG image.
    Snapshot {
        /// Audio or video file to analyse.
        file: PathBuf,
        /// Destination PNG path.
        output: PathBuf,
        /// Playback position of the frame, in seconds.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_follow_extensions() {
        assert_eq!(file_info(Path::new("music/Song.MP3")).mime_type, "audio/mpeg");
        assert_eq!(file_info(Path::new("clip.webm")).mime_type, "video/webm");
        assert_eq!(file_info(Path::new("notes.txt")).mime_type, "application/octet-stream");
        assert_eq!(file_info(Path::new("music/Song.MP3")).name, "Song.MP3");
    }

    #[test]
    fn cli_parses_snapshot_options() {
        let cli = Cli::parse_from([
            "spectrum-player",
            "snapshot",
            "in.wav",
            "out.png",
            "--at",
            "1.5",
            "--width",
            "640",
        ]);
        match cli.command {
            Commands::Snapshot { at, width, height, .. } => {
                assert_eq!(at, 1.5);
                assert_eq!(width, Some(640));
                assert_eq!(height, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
