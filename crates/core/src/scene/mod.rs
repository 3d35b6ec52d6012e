use serde::{Deserialize, Serialize};

use crate::render::Color;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }
}

/// One retained draw command, in layer-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rect {
        rect: Rect,
        color: Color,
        alpha: f32,
    },
    Polyline {
        points: Vec<Point>,
        width: f32,
        color: Color,
    },
    Text {
        at: Point,
        content: String,
        color: Color,
        size: f32,
    },
}

/// The persistent layers of the visualisation, in draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Background,
    Bars,
    Graph,
    Track,
    Info,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Background,
        LayerKind::Bars,
        LayerKind::Graph,
        LayerKind::Track,
        LayerKind::Info,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// A positioned display list. Clearing keeps the allocation so layers can be
/// redrawn every frame without being rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    position: Point,
    interactive: bool,
    shapes: Vec<Shape>,
}

impl Layer {
    fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            position: Point::default(),
            interactive: false,
            shapes: Vec::new(),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = Point::new(x, y);
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color, alpha: f32) {
        self.shapes.push(Shape::Rect { rect, color, alpha });
    }

    pub fn polyline(&mut self, points: Vec<Point>, width: f32, color: Color) {
        self.shapes.push(Shape::Polyline {
            points,
            width,
            color,
        });
    }

    pub fn text(&mut self, at: Point, content: impl Into<String>, color: Color, size: f32) {
        self.shapes.push(Shape::Text {
            at,
            content: content.into(),
            color,
            size,
        });
    }

    /// Converts a scene point into layer-local coordinates.
    pub fn to_local(&self, point: Point) -> Point {
        Point::new(point.x - self.position.x, point.y - self.position.y)
    }

    /// Whether any filled rectangle of the layer covers `local`.
    pub fn hit(&self, local: Point) -> bool {
        self.shapes.iter().any(|shape| match shape {
            Shape::Rect { rect, .. } => rect.contains(local),
            _ => false,
        })
    }
}

/// Result of a successful hit test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub layer: LayerKind,
    pub local: Point,
}

/// Retained draw surface graph owned by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    layers: [Layer; 5],
}

impl Scene {
    pub fn new() -> Self {
        Self {
            layers: LayerKind::ALL.map(Layer::new),
        }
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        &self.layers[kind.index()]
    }

    pub fn layer_mut(&mut self, kind: LayerKind) -> &mut Layer {
        &mut self.layers[kind.index()]
    }

    /// Layers in draw order, bottom first.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Finds the topmost interactive layer under `point`.
    pub fn hit_test(&self, point: Point) -> Option<Hit> {
        self.layers
            .iter()
            .rev()
            .filter(|layer| layer.interactive)
            .find_map(|layer| {
                let local = layer.to_local(point);
                layer.hit(local).then_some(Hit {
                    layer: layer.kind,
                    local,
                })
            })
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
