use std::{cell::Cell, rc::Rc};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color as TermColor, Style},
    DefaultTerminal,
};
use spectrum_player_core::{
    render::{TRACK_OFFSET_Y, TRACK_ROW_HEIGHT, WAVEFORM_WIDTH},
    scene::LayerKind,
    Color, ControlAffordance, PixelSurface, PlaybackState, Point, Result, Scene, Shape, Surface,
};

/// Logical extent the fixed-position scene needs to be fully visible: the
/// waveform box width and the bottom edge of the progress row.
const SCENE_WIDTH: f32 = WAVEFORM_WIDTH;
const SCENE_HEIGHT: f32 = TRACK_OFFSET_Y + TRACK_ROW_HEIGHT;

/// Pixel density for a terminal of `cols` x `rows` cells. `cell_scale` is an
/// upper bound; small terminals get a lower density so the whole scene fits.
pub fn fit_density(cols: u16, rows: u16, cell_scale: f32) -> f32 {
    let fit = (f32::from(cols) / SCENE_WIDTH).min(f32::from(rows) * 2.0 / SCENE_HEIGHT);
    if fit > 0.0 {
        cell_scale.min(fit)
    } else {
        cell_scale
    }
}

/// Logical surface size for a terminal of `cols` x `rows` cells. Every cell
/// holds two vertically stacked pixels.
pub fn logical_size(cols: u16, rows: u16, cell_scale: f32) -> (u32, u32) {
    let width = f32::from(cols) / cell_scale;
    let height = f32::from(rows) * 2.0 / cell_scale;
    (width.round() as u32, height.round() as u32)
}

/// Centre of a terminal cell in logical coordinates.
pub fn cell_to_logical(col: u16, row: u16, cell_scale: f32) -> (f32, f32) {
    (
        (f32::from(col) + 0.5) / cell_scale,
        (f32::from(row) * 2.0 + 1.0) / cell_scale,
    )
}

/// Play/pause state shared between the input side and the surface.
#[derive(Debug, Clone, Default)]
pub struct PlayIndicator(Rc<Cell<Option<PlaybackState>>>);

impl PlayIndicator {
    pub fn get(&self) -> Option<PlaybackState> {
        self.0.get()
    }
}

impl ControlAffordance for PlayIndicator {
    fn refresh(&mut self, state: PlaybackState) {
        self.0.set(Some(state));
    }
}

/// Presents the scene as half-block characters. The scene is rasterised at
/// one pixel per half cell and text shapes are written on top as glyphs.
pub struct TerminalSurface {
    terminal: DefaultTerminal,
    pixels: PixelSurface,
    indicator: PlayIndicator,
}

impl TerminalSurface {
    pub fn new(
        terminal: DefaultTerminal,
        density: f32,
        indicator: PlayIndicator,
    ) -> Result<Self> {
        let area = terminal.size()?;
        let (width, height) = logical_size(area.width, area.height, density);
        let mut pixels = PixelSurface::new(width, height);
        pixels.set_pixel_density(density);

        Ok(Self {
            terminal,
            pixels,
            indicator,
        })
    }
}

impl Surface for TerminalSurface {
    fn size(&self) -> (u32, u32) {
        self.pixels.size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.pixels.resize(width, height);
    }

    fn pixel_density(&self) -> f32 {
        self.pixels.pixel_density()
    }

    fn set_pixel_density(&mut self, density: f32) {
        self.pixels.set_pixel_density(density);
    }

    fn present(&mut self, scene: &Scene) -> Result<()> {
        self.pixels.present(scene)?;

        let density = self.pixels.pixel_density();
        let image = self.pixels.image();
        let indicator = self.indicator.get();

        self.terminal.draw(|frame| {
            let area = frame.area();
            let buf = frame.buffer_mut();
            blit(buf, area, image);
            draw_text(buf, area, scene, density);
            if let Some(state) = indicator {
                draw_indicator(buf, area, scene, density, state);
            }
        })?;
        Ok(())
    }
}

fn term_color(pixel: &image::Rgba<u8>) -> TermColor {
    TermColor::Rgb(pixel[0], pixel[1], pixel[2])
}

fn blit(buf: &mut Buffer, area: Rect, image: &image::RgbaImage) {
    let cols = area.width.min(image.width().min(u32::from(u16::MAX)) as u16);
    let rows = area.height.min((image.height() / 2).min(u32::from(u16::MAX)) as u16);

    for row in 0..rows {
        for col in 0..cols {
            let top = image.get_pixel(u32::from(col), u32::from(row) * 2);
            let bottom = image.get_pixel(u32::from(col), u32::from(row) * 2 + 1);
            buf[(area.x + col, area.y + row)]
                .set_char('▀')
                .set_fg(term_color(top))
                .set_bg(term_color(bottom));
        }
    }
}

/// Maps a logical point onto the cell grid, if it lands inside `area`.
fn cell_at(area: Rect, point: Point, density: f32) -> Option<(u16, u16)> {
    let col = (point.x * density).floor();
    let row = (point.y * density / 2.0).floor();
    let inside = (0.0..f32::from(area.width)).contains(&col)
        && (0.0..f32::from(area.height)).contains(&row);
    if !inside {
        return None;
    }
    Some((area.x + col as u16, area.y + row as u16))
}

fn draw_text(buf: &mut Buffer, area: Rect, scene: &Scene, density: f32) {
    for layer in scene.layers() {
        let offset = layer.position();
        for shape in layer.shapes() {
            let Shape::Text {
                at, content, color, ..
            } = shape
            else {
                continue;
            };
            let origin = Point::new(offset.x + at.x, offset.y + at.y);
            if let Some((x, y)) = cell_at(area, origin, density) {
                let style = Style::default().fg(rgb(*color));
                buf.set_string(x, y, content, style);
            }
        }
    }
}

/// Draws the play/pause glyph in the slot left of the progress bar.
fn draw_indicator(
    buf: &mut Buffer,
    area: Rect,
    scene: &Scene,
    density: f32,
    state: PlaybackState,
) {
    let track = scene.layer(LayerKind::Track);
    if track.is_empty() {
        return;
    }

    let half = TRACK_ROW_HEIGHT * 0.5;
    let slot = Point::new(track.position().x - half, TRACK_OFFSET_Y + half);
    let glyph = match state {
        PlaybackState::Active => "⏸",
        PlaybackState::Inactive => "▶",
    };
    if let Some((x, y)) = cell_at(area, slot, density) {
        buf.set_string(x, y, glyph, Style::default().fg(rgb(Color::WHITE)));
    }
}

fn rgb(color: Color) -> TermColor {
    TermColor::Rgb(color.r(), color.g(), color.b())
}
