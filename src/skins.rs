//! Interchangeable visual treatments for the bubble glyph and the scanning overlay.
//!
//! Every skin is a pure function of the elapsed animation time, so a frame can
//! be reproduced exactly by sampling the same timestamp.

use crate::geometry::{Point, Size};
use crate::scene::{Paint, Scene, Shape, WHITE, rgb};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub trait Skin: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Draws one frame for a window of `size` pixels at `density` px per dp.
    fn draw(&self, elapsed: Duration, size: Size, density: f32) -> Scene;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleSkin {
    #[default]
    Plasma,
    Bolt,
}

impl BubbleSkin {
    pub fn build(self) -> Arc<dyn Skin> {
        match self {
            BubbleSkin::Plasma => Arc::new(PlasmaSkin),
            BubbleSkin::Bolt => Arc::new(BoltSkin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanningSkin {
    #[default]
    Sonar,
    Sweep,
}

impl ScanningSkin {
    pub fn build(self) -> Arc<dyn Skin> {
        match self {
            ScanningSkin::Sonar => Arc::new(SonarSkin),
            ScanningSkin::Sweep => Arc::new(SweepSkin),
        }
    }
}

/// Navy disc with three drifting translucent blobs and a central glow.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlasmaSkin;

impl Skin for PlasmaSkin {
    fn name(&self) -> &'static str {
        "plasma"
    }

    fn draw(&self, elapsed: Duration, size: Size, _density: f32) -> Scene {
        let t = elapsed.as_secs_f32() * 2.5;
        let c = size.center();
        let r = size.width.min(size.height) / 2.0 - 2.0;

        let mut scene = Scene {
            circular_clip: true,
            ..Scene::default()
        };
        scene.push(Shape::Circle {
            center: c,
            radius: r,
            paint: Paint::Fill(rgb(0x1e3a8a, 255)),
        });

        let blobs = [
            (1.1, 0.0, 0.35, 0.9, 0.0, 0.30, 0.62, rgb(0x3b82f6, 165)),
            (0.7, 2.1, 0.30, 1.3, 1.0, 0.40, 0.55, rgb(0x93c5fd, 130)),
            (1.5, 4.2, 0.25, 0.8, 3.0, 0.35, 0.45, rgb(0xdbeafe, 90)),
        ];
        for (fx, px, ax, fy, py, ay, radius, color) in blobs {
            scene.push(Shape::Circle {
                center: c.offset((t * fx + px).sin() * r * ax, (t * fy + py).cos() * r * ay),
                radius: r * radius,
                paint: Paint::Fill(color),
            });
        }

        scene.push(Shape::Circle {
            center: c,
            radius: r * 0.28,
            paint: Paint::Fill(rgb(0xffffff, 55)),
        });
        scene
    }
}

/// Dark disc with a lightning bolt whose halo breathes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoltSkin;

impl Skin for BoltSkin {
    fn name(&self) -> &'static str {
        "bolt"
    }

    fn draw(&self, elapsed: Duration, size: Size, density: f32) -> Scene {
        let t = elapsed.as_secs_f32();
        let c = size.center();
        let r = size.width.min(size.height) / 2.0 - 2.0;
        let pulse = (t * 3.0).sin() * 0.5 + 0.5;

        let mut scene = Scene {
            circular_clip: true,
            ..Scene::default()
        };
        scene.push(Shape::Circle {
            center: c,
            radius: r,
            paint: Paint::Fill(rgb(0x111827, 255)),
        });
        scene.push(Shape::RadialGlow {
            center: c,
            radius: r * (0.7 + pulse * 0.25),
            inner: rgb(0xfacc15, (60.0 + pulse * 80.0) as u8),
        });

        // Normalised bolt outline, y pointing down.
        let outline: [(f32, f32); 6] = [
            (0.10, -0.62),
            (-0.30, 0.06),
            (-0.02, 0.06),
            (-0.12, 0.62),
            (0.30, -0.10),
            (0.02, -0.10),
        ];
        let points = outline
            .iter()
            .map(|(x, y)| c.offset(x * r, y * r))
            .collect::<Vec<_>>();
        scene.push(Shape::Path {
            points: points.clone(),
            closed: true,
            paint: Paint::Fill(rgb(0xfde047, 255)),
        });
        scene.push(Shape::Path {
            points,
            closed: true,
            paint: Paint::Stroke {
                color: rgb(0xffffff, (120.0 + pulse * 100.0) as u8),
                width: 1.2 * density,
            },
        });
        scene
    }
}

/// Staggered sonar rings, a wobbling membrane, a breathing core and a label.
#[derive(Debug, Clone, Copy, Default)]
pub struct SonarSkin;

const SONAR_RINGS: usize = 6;
const MEMBRANE_STEPS: usize = 140;

impl Skin for SonarSkin {
    fn name(&self) -> &'static str {
        "sonar"
    }

    fn draw(&self, elapsed: Duration, size: Size, density: f32) -> Scene {
        let t = elapsed.as_secs_f32() * 0.625;
        let c = size.center();
        let max_r = c.x.hypot(c.y);

        let mut scene = Scene::new();
        scene.push(backdrop(size));

        for i in 0..SONAR_RINGS {
            let phase = (t * 0.35 + i as f32 / SONAR_RINGS as f32).rem_euclid(1.0);
            let radius = max_r * (0.08 + phase * 0.92);
            let alpha = ((phase * PI).sin() * 210.0).clamp(0.0, 210.0);
            scene.push(Shape::Circle {
                center: c,
                radius,
                paint: Paint::Stroke {
                    color: rgb(0xffffff, (alpha * 0.3) as u8),
                    width: 10.0 * density,
                },
            });
            scene.push(Shape::Circle {
                center: c,
                radius,
                paint: Paint::Stroke {
                    color: rgb(0xffffff, alpha as u8),
                    width: 1.8 * density,
                },
            });
        }

        let wave_r = max_r * (0.38 + t.sin() * 0.06);
        for wave in 0..2 {
            let phase_offset = wave as f32 * PI;
            let points = (0..=MEMBRANE_STEPS)
                .map(|step| {
                    let theta = step as f32 / MEMBRANE_STEPS as f32 * 2.0 * PI;
                    let wobble = (theta * 5.0 + t * 3.0 + phase_offset).sin() * wave_r * 0.04;
                    let radius = wave_r + wobble;
                    Point::new(c.x + theta.cos() * radius, c.y + theta.sin() * radius)
                })
                .collect();
            let alpha = (90.0 + (t * 2.0 + wave as f32 * 1.4).sin() * 50.0).clamp(50.0, 140.0);
            scene.push(Shape::Path {
                points,
                closed: true,
                paint: Paint::Stroke {
                    color: rgb(0xffffff, alpha as u8),
                    width: (1.6 + wave as f32 * 0.8) * density,
                },
            });
        }

        scene.push(Shape::RadialGlow {
            center: c,
            radius: max_r * (0.60 + (t * 1.8).sin() * 0.18),
            inner: rgb(0xffffff, 0x55),
        });
        scene.push(label(c.offset(0.0, max_r * 0.68), t, density));
        scene
    }
}

/// A horizontal scan line travelling down the screen with a fading trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSkin;

impl Skin for SweepSkin {
    fn name(&self) -> &'static str {
        "sweep"
    }

    fn draw(&self, elapsed: Duration, size: Size, density: f32) -> Scene {
        let t = elapsed.as_secs_f32();
        let phase = (t * 0.6).rem_euclid(1.0);
        let y = size.height * phase;
        let trail = 48.0 * density;

        let mut scene = Scene::new();
        scene.push(backdrop(size));
        for step in 0..8 {
            let offset = trail * step as f32 / 8.0;
            scene.push(Shape::Rect {
                origin: Point::new(0.0, y - offset),
                width: size.width,
                height: trail / 8.0,
                corner_radius: 0.0,
                paint: Paint::Fill(rgb(0x60a5fa, (70 - step * 8) as u8)),
            });
        }
        scene.push(Shape::Rect {
            origin: Point::new(0.0, y),
            width: size.width,
            height: 2.0 * density,
            corner_radius: 0.0,
            paint: Paint::Fill(WHITE),
        });
        scene.push(label(size.center(), t * 0.625, density));
        scene
    }
}

fn backdrop(size: Size) -> Shape {
    Shape::Rect {
        origin: Point::default(),
        width: size.width,
        height: size.height,
        corner_radius: 0.0,
        paint: Paint::Fill(rgb(0x000000, 0xf0)),
    }
}

fn label(anchor: Point, t: f32, density: f32) -> Shape {
    let alpha = (190.0 + (t * 1.6).sin() * 50.0).clamp(140.0, 240.0);
    Shape::Text {
        anchor,
        text: "Scanning…".to_string(),
        size: 16.0 * density,
        color: rgb(0xffffff, alpha as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::{BubbleSkin, ScanningSkin};
    use crate::geometry::Size;
    use std::time::Duration;

    #[test]
    fn frames_are_reproducible_at_fixed_timestamps() {
        for skin in [BubbleSkin::Plasma.build(), BubbleSkin::Bolt.build()] {
            let at = Duration::from_millis(1234);
            let size = Size::square(126.0);
            assert_eq!(skin.draw(at, size, 2.625), skin.draw(at, size, 2.625));
            assert_ne!(
                skin.draw(at, size, 2.625),
                skin.draw(at + Duration::from_millis(500), size, 2.625),
                "{} should animate",
                skin.name()
            );
        }
    }

    #[test]
    fn scanning_skins_show_a_label() {
        for skin in [ScanningSkin::Sonar.build(), ScanningSkin::Sweep.build()] {
            let scene = skin.draw(Duration::from_secs(2), Size::new(1080.0, 2400.0), 2.625);
            assert!(scene.texts().any(|text| text == "Scanning…"));
        }
    }
}
