//! Per-frame conversion of an analysis snapshot into the retained scene.

mod color;
mod surface;

pub use color::{clamp_byte, hex_byte, rgb_to_hex, Color};
pub use surface::{PixelSurface, Surface, CLEAR_COLOR};

use crate::{
    audio::{FileInfo, Snapshot, SnapshotSource},
    scene::{LayerKind, Point, Rect, Scene},
    timeline::FpsTicker,
    Result,
};

/// Minimum time between two updates of the FPS readout.
pub const FPS_UPDATE_INTERVAL: f64 = 1000.0;
/// How long a notice stays in the info layer.
pub const NOTICE_TIMEOUT: f64 = 4000.0;

pub const WAVEFORM_WIDTH: f32 = 440.0;
pub const WAVEFORM_HEIGHT: f32 = 200.0;
pub const GRAPH_OFFSET_Y: f32 = 60.0;

/// Height of the progress row, which is also the width reserved for the
/// play/pause glyph in front of it.
pub const TRACK_ROW_HEIGHT: f32 = 32.0;
pub const TRACK_ROW_WIDTH: f32 = WAVEFORM_WIDTH - TRACK_ROW_HEIGHT;
pub const TRACK_BAR_HEIGHT: f32 = 8.0;
pub const TRACK_INSET: f32 = (TRACK_ROW_HEIGHT - TRACK_BAR_HEIGHT) * 0.5;
pub const TRACK_BAR_WIDTH: f32 = TRACK_ROW_WIDTH - TRACK_INSET * 2.0;
pub const TRACK_OFFSET_Y: f32 = 360.0;

pub const INFO_OFFSET: Point = Point::new(10.0, 10.0);
const INFO_FONT_SIZE: f32 = 13.0;
const INFO_LINE_HEIGHT: f32 = 16.0;
const BACKDROP_ALPHA: f32 = 0.2;
const WAVEFORM_LINE_WIDTH: f32 = 2.0;

/// Filled width of the progress bar for a position/duration pair.
pub fn track_fill_width(position: f64, duration: f64) -> f32 {
    let progress = if duration > 0.0 && duration.is_finite() {
        position / duration
    } else {
        0.0
    };
    TRACK_BAR_WIDTH * progress as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq)]
struct Notice {
    message: String,
    shown_at: f64,
}

/// Owns the scene and the output surface and redraws everything once per
/// display frame.
#[derive(Debug)]
pub struct FrameRenderer<S: Surface> {
    surface: S,
    scene: Scene,
    ticker: FpsTicker,
    frame_pending: bool,
    last_frame_time: f64,
    last_fps_update: f64,
    fps_text: String,
    file_info: Option<FileInfo>,
    notice: Option<Notice>,
    frames_rendered: u64,
}

impl<S: Surface> FrameRenderer<S> {
    /// Builds the persistent layers on top of `surface`. The renderer starts
    /// out stopped.
    pub fn initialize(mut surface: S, pixel_density: f32) -> Self {
        surface.set_pixel_density(pixel_density);

        let mut scene = Scene::new();
        scene
            .layer_mut(LayerKind::Graph)
            .set_position(0.0, GRAPH_OFFSET_Y);
        let track = scene.layer_mut(LayerKind::Track);
        track.set_position(0.0, TRACK_OFFSET_Y);
        track.set_interactive(true);
        scene
            .layer_mut(LayerKind::Info)
            .set_position(INFO_OFFSET.x, INFO_OFFSET.y);

        let (width, height) = surface.size();
        tracing::debug!(width, height, pixel_density, "renderer initialised");

        Self {
            surface,
            scene,
            ticker: FpsTicker::new(),
            frame_pending: false,
            last_frame_time: 0.0,
            last_fps_update: 0.0,
            fps_text: String::new(),
            file_info: None,
            notice: None,
            frames_rendered: 0,
        }
    }

    /// Draws one frame if one is pending and schedules the next. Returns
    /// `false` without touching the scene when rendering is stopped.
    pub fn render_frame<A>(&mut self, audio: &mut A, frame_time: f64) -> Result<bool>
    where
        A: SnapshotSource + ?Sized,
    {
        if !self.frame_pending {
            return Ok(false);
        }
        self.frame_pending = false;
        self.last_frame_time = frame_time;

        let (width, height) = self.surface.size();
        let (width, height) = (width as f32, height as f32);

        let snapshot = audio.sample();
        self.draw_track(snapshot.as_ref(), width);
        self.draw_waveform(snapshot.map(|s| s.time_domain), width);
        let mean = self.draw_bars(snapshot.map(|s| s.frequency), width, height);
        let background = rgb_to_hex(f64::from(mean) * 0.5, 16.0, 32.0);
        self.draw_background(background, width, height);
        self.draw_info(frame_time);

        let presented = self.surface.present(&self.scene);

        self.ticker.update(frame_time);
        if frame_time - self.last_fps_update >= FPS_UPDATE_INTERVAL {
            self.fps_text = format!("{}", self.ticker.fps().trunc() as u32);
            self.last_fps_update = frame_time;
        }

        self.frames_rendered += 1;
        self.frame_pending = true;
        presented.map(|_| true)
    }

    /// Schedules the first frame. Has no effect while a frame is pending.
    pub fn start(&mut self) {
        if !self.frame_pending {
            self.frame_pending = true;
            tracing::debug!("rendering started");
        }
    }

    /// Drops the pending frame. Later `render_frame` calls do nothing until
    /// `start` is called again.
    pub fn stop(&mut self) {
        if self.frame_pending {
            tracing::debug!("rendering stopped");
        }
        self.frame_pending = false;
    }

    /// Changes the surface size. The scene keeps its current content until
    /// the next frame is drawn.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
    }

    pub fn state(&self) -> RenderState {
        if self.frame_pending {
            RenderState::Running
        } else {
            RenderState::Stopped
        }
    }

    pub fn has_pending_frame(&self) -> bool {
        self.frame_pending
    }

    /// Number of frames waiting to be drawn, at most one.
    pub fn pending_frames(&self) -> usize {
        usize::from(self.frame_pending)
    }

    /// Maps a surface position onto the progress track. Returns track-local
    /// coordinates when the point lies on the track row.
    pub fn track_hit(&self, x: f32, y: f32) -> Option<Point> {
        self.scene
            .hit_test(Point::new(x, y))
            .filter(|hit| hit.layer == LayerKind::Track)
            .map(|hit| hit.local)
    }

    pub fn show_file_info(&mut self, info: Option<FileInfo>) {
        self.file_info = info;
    }

    /// Shows `message` in the info layer for [`NOTICE_TIMEOUT`] milliseconds,
    /// measured on the frame clock.
    pub fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some(Notice {
            message: message.into(),
            shown_at: self.last_frame_time,
        });
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_ref().map(|notice| notice.message.as_str())
    }

    pub fn fps_text(&self) -> &str {
        &self.fps_text
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn draw_background(&mut self, color: Color, width: f32, height: f32) {
        let layer = self.scene.layer_mut(LayerKind::Background);
        layer.clear();
        layer.fill_rect(Rect::new(0.0, 0.0, width, height), color, 1.0);
    }

    /// Returns the mean bar amplitude in [0, 255].
    fn draw_bars(&mut self, frequency: Option<&[u8]>, width: f32, height: f32) -> f32 {
        let layer = self.scene.layer_mut(LayerKind::Bars);
        layer.clear();

        let Some(frequency) = frequency.filter(|f| !f.is_empty()) else {
            return 0.0;
        };

        let bar_width = width / frequency.len() as f32;
        let mut x = 0.0;
        let mut sum = 0u32;

        for &value in frequency {
            let bar_height = f32::from(value) * height / 255.0;
            layer.fill_rect(
                Rect::new(x, height - bar_height, bar_width, bar_height),
                rgb_to_hex(f64::from(value), 0.0, 0.0),
                1.0,
            );
            x += bar_width;
            sum += u32::from(value);
        }

        sum as f32 / frequency.len() as f32
    }

    fn draw_waveform(&mut self, time_domain: Option<&[u8]>, width: f32) {
        let layer = self.scene.layer_mut(LayerKind::Graph);
        layer.clear();

        let left = (width - WAVEFORM_WIDTH) * 0.5;
        layer.fill_rect(
            Rect::new(left, 0.0, WAVEFORM_WIDTH, WAVEFORM_HEIGHT),
            Color::BLACK,
            BACKDROP_ALPHA,
        );

        let points = match time_domain {
            Some(values) if !values.is_empty() => {
                let step = if values.len() > 1 {
                    WAVEFORM_WIDTH / (values.len() - 1) as f32
                } else {
                    0.0
                };
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &value)| {
                        Point::new(
                            left + i as f32 * step,
                            f32::from(value) * WAVEFORM_HEIGHT / 255.0,
                        )
                    })
                    .collect()
            }
            _ => vec![
                Point::new(left, WAVEFORM_HEIGHT * 0.5),
                Point::new(left + WAVEFORM_WIDTH, WAVEFORM_HEIGHT * 0.5),
            ],
        };
        layer.polyline(points, WAVEFORM_LINE_WIDTH, Color::WHITE);
    }

    fn draw_track(&mut self, snapshot: Option<&Snapshot<'_>>, width: f32) {
        let layer = self.scene.layer_mut(LayerKind::Track);
        layer.clear();

        let Some(snapshot) = snapshot else {
            return;
        };

        layer.set_position(
            (width - WAVEFORM_WIDTH) * 0.5 + TRACK_ROW_HEIGHT,
            TRACK_OFFSET_Y,
        );
        layer.fill_rect(
            Rect::new(0.0, 0.0, TRACK_ROW_WIDTH, TRACK_ROW_HEIGHT),
            Color::BLACK,
            BACKDROP_ALPHA,
        );
        layer.fill_rect(
            Rect::new(TRACK_INSET, TRACK_INSET, TRACK_BAR_WIDTH, TRACK_BAR_HEIGHT),
            Color::BLACK,
            BACKDROP_ALPHA,
        );
        layer.fill_rect(
            Rect::new(
                TRACK_INSET,
                TRACK_INSET,
                track_fill_width(snapshot.position, snapshot.duration),
                TRACK_BAR_HEIGHT,
            ),
            Color::WHITE,
            1.0,
        );
    }

    fn draw_info(&mut self, now: f64) {
        if self
            .notice
            .as_ref()
            .is_some_and(|notice| now - notice.shown_at >= NOTICE_TIMEOUT)
        {
            self.notice = None;
        }

        let layer = self.scene.layer_mut(LayerKind::Info);
        layer.clear();

        let mut lines = vec![self.fps_text.clone()];
        if let Some(info) = &self.file_info {
            lines.push(format!("{} ({})", info.name, info.mime_type));
        }
        if let Some(notice) = &self.notice {
            lines.push(notice.message.clone());
        }

        for (row, line) in lines.into_iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            layer.text(
                Point::new(0.0, row as f32 * INFO_LINE_HEIGHT),
                line,
                Color::WHITE,
                INFO_FONT_SIZE,
            );
        }
    }
}
