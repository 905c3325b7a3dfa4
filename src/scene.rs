use crate::geometry::Point;
use image::Rgba;

pub type Color = Rgba<u8>;

/// Builds a colour from a `0xRRGGBB` literal and an explicit alpha.
pub const fn rgb(hex: u32, alpha: u8) -> Color {
    Rgba([
        ((hex >> 16) & 0xff) as u8,
        ((hex >> 8) & 0xff) as u8,
        (hex & 0xff) as u8,
        alpha,
    ])
}

pub const WHITE: Color = rgb(0xffffff, 255);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Fill(Color),
    Stroke { color: Color, width: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect {
        origin: Point,
        width: f32,
        height: f32,
        corner_radius: f32,
        paint: Paint,
    },
    Circle {
        center: Point,
        radius: f32,
        paint: Paint,
    },
    /// Radial fill fading from `inner` at the centre to fully transparent at `radius`.
    RadialGlow {
        center: Point,
        radius: f32,
        inner: Color,
    },
    Path {
        points: Vec<Point>,
        closed: bool,
        paint: Paint,
    },
    Text {
        anchor: Point,
        text: String,
        size: f32,
        color: Color,
    },
}

/// A retained draw list handed to the window host on each redraw.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub shapes: Vec<Shape>,
    /// Whole-layer translation, used by the shake hint and slide-in.
    pub translation: Point,
    pub scale: f32,
    pub opacity: f32,
    /// Clip every shape to a circle inscribed in the window.
    pub circular_clip: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            shapes: Vec::new(),
            translation: Point::default(),
            scale: 1.0,
            opacity: 1.0,
            circular_clip: false,
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, shape: Shape) -> &mut Self {
        self.shapes.push(shape);
        self
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().filter_map(|shape| match shape {
            Shape::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}
