use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::{
    render::Color,
    scene::{Point, Rect, Scene, Shape},
    Result,
};

/// Colour the surface is cleared to before the scene is drawn.
pub const CLEAR_COLOR: Color = Color(0x303030);

/// Externally owned 2D output the renderer presents its scene to. Sizes are
/// logical; the pixel density maps them to physical pixels.
pub trait Surface {
    fn size(&self) -> (u32, u32);
    /// Takes effect on the next [`present`](Surface::present).
    fn resize(&mut self, width: u32, height: u32);
    fn pixel_density(&self) -> f32;
    fn set_pixel_density(&mut self, density: f32);
    fn present(&mut self, scene: &Scene) -> Result<()>;
}

/// Software rasterizer backed by an RGBA image. Text shapes are skipped; they
/// are left to surfaces that own a font, such as a terminal.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    density: f32,
    image: RgbaImage,
    frames_presented: u64,
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            density: 1.0,
            image: RgbaImage::new(0, 0),
            frames_presented: 0,
        }
    }

    /// The last presented frame.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image.save(path)?;
        Ok(())
    }

    fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.density).round() as u32,
            (self.height as f32 * self.density).round() as u32,
        )
    }

    fn fill_rect(&mut self, rect: Rect, offset: Point, color: Color, alpha: f32) {
        let d = self.density;
        let x0 = pixel_edge((rect.x + offset.x) * d);
        let y0 = pixel_edge((rect.y + offset.y) * d);
        let x1 = pixel_edge((rect.x + offset.x + rect.width) * d);
        let y1 = pixel_edge((rect.y + offset.y + rect.height) * d);

        for y in clamp_span(y0, y1, self.image.height()) {
            for x in clamp_span(x0, x1, self.image.width()) {
                blend(self.image.get_pixel_mut(x, y), color, alpha);
            }
        }
    }

    fn polyline(&mut self, points: &[Point], offset: Point, width: f32, color: Color) {
        let d = self.density;
        let half = (width * d).max(1.0) * 0.5;

        for segment in points.windows(2) {
            let (ax, ay) = ((segment[0].x + offset.x) * d, (segment[0].y + offset.y) * d);
            let (bx, by) = ((segment[1].x + offset.x) * d, (segment[1].y + offset.y) * d);
            let steps = (bx - ax).abs().max((by - ay).abs()).ceil().max(1.0) as usize;

            for step in 0..=steps {
                let t = step as f32 / steps as f32;
                let cx = ax + (bx - ax) * t;
                let cy = ay + (by - ay) * t;
                let xs = clamp_span(pixel_edge(cx - half), pixel_edge(cx + half), self.image.width());
                let ys = clamp_span(pixel_edge(cy - half), pixel_edge(cy + half), self.image.height());
                for y in ys {
                    for x in xs.clone() {
                        blend(self.image.get_pixel_mut(x, y), color, 1.0);
                    }
                }
            }
        }
    }
}

impl Surface for PixelSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn pixel_density(&self) -> f32 {
        self.density
    }

    fn set_pixel_density(&mut self, density: f32) {
        if density.is_finite() && density > 0.0 {
            self.density = density;
        }
    }

    fn present(&mut self, scene: &Scene) -> Result<()> {
        let (width, height) = self.physical_size();
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        }

        let clear = Rgba([CLEAR_COLOR.r(), CLEAR_COLOR.g(), CLEAR_COLOR.b(), 255]);
        self.image.pixels_mut().for_each(|pixel| *pixel = clear);

        for layer in scene.layers() {
            let offset = layer.position();
            for shape in layer.shapes() {
                match shape {
                    Shape::Rect { rect, color, alpha } => {
                        self.fill_rect(*rect, offset, *color, *alpha)
                    }
                    Shape::Polyline {
                        points,
                        width,
                        color,
                    } => self.polyline(points, offset, *width, *color),
                    Shape::Text { .. } => {}
                }
            }
        }

        self.frames_presented += 1;
        Ok(())
    }
}

/// Index of the first pixel whose centre lies at or beyond `coordinate`.
fn pixel_edge(coordinate: f32) -> i64 {
    (coordinate - 0.5).ceil() as i64
}

fn clamp_span(start: i64, end: i64, limit: u32) -> std::ops::Range<u32> {
    let limit = i64::from(limit);
    let start = start.clamp(0, limit) as u32;
    let end = end.clamp(0, limit) as u32;
    start..end.max(start)
}

fn blend(pixel: &mut Rgba<u8>, color: Color, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let source = [color.r(), color.g(), color.b()];
    for (channel, src) in pixel.0.iter_mut().take(3).zip(source) {
        let mixed = f32::from(src) * alpha + f32::from(*channel) * (1.0 - alpha);
        *channel = mixed.round() as u8;
    }
    pixel.0[3] = 255;
}
