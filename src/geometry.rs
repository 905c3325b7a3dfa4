use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: f32) -> Self {
        Self::new(side, side)
    }

    pub fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Physical display description used to size overlays and the mirrored display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    pub width_px: u32,
    pub height_px: u32,
    /// Pixels per density-independent pixel.
    pub density: f32,
    pub density_dpi: u32,
}

impl DisplayMetrics {
    pub fn dp(&self, value: f32) -> f32 {
        value * self.density
    }

    pub fn size(&self) -> Size {
        Size::new(self.width_px as f32, self.height_px as f32)
    }
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            width_px: 1080,
            height_px: 2400,
            density: 2.625,
            density_dpi: 420,
        }
    }
}
