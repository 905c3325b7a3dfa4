use crate::animation::fade_in;
use crate::geometry::{DisplayMetrics, Point, Size};
use crate::overlay::{Gravity, OverlayKind, OverlaySlot, WindowHost, WindowSpec};
use crate::scene::{Paint, Scene, Shape, rgb};
use tokio::time::Instant;

pub const TARGET_SIZE_DP: f32 = 64.0;
/// Gap between the target and the bottom edge of the display.
pub const TARGET_MARGIN_DP: f32 = 56.0;
const ARMED_SCALE: f32 = 1.25;

/// Screen-space centre of the target for a display.
pub fn target_center(metrics: &DisplayMetrics) -> Point {
    Point::new(
        metrics.width_px as f32 / 2.0,
        metrics.height_px as f32 - metrics.dp(TARGET_MARGIN_DP) - metrics.dp(TARGET_SIZE_DP) / 2.0,
    )
}

/// The "drop here to close" circle shown while the bubble is dragged.
#[derive(Debug)]
pub struct DismissTarget {
    slot: OverlaySlot,
    armed: bool,
    shown_at: Option<Instant>,
}

impl Default for DismissTarget {
    fn default() -> Self {
        Self {
            slot: OverlaySlot::new(OverlayKind::DismissTarget),
            armed: false,
            shown_at: None,
        }
    }
}

impl DismissTarget {
    pub fn is_shown(&self) -> bool {
        self.slot.is_attached()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn show(&mut self, host: &dyn WindowHost, now: Instant) {
        if self.slot.is_attached() {
            return;
        }
        let metrics = host.display_metrics();
        let side = metrics.dp(TARGET_SIZE_DP);
        let spec = WindowSpec {
            kind: OverlayKind::DismissTarget,
            size: Size::square(side),
            position: Point::new(0.0, metrics.dp(TARGET_MARGIN_DP)),
            gravity: Gravity::BottomCenter,
            focusable: false,
            touchable: false,
        };
        if self.slot.attach(host, &spec) {
            self.armed = false;
            self.shown_at = Some(now);
            self.redraw(host, now);
        }
    }

    /// Returns whether the armed state changed.
    pub fn set_armed(&mut self, host: &dyn WindowHost, armed: bool, now: Instant) -> bool {
        if self.armed == armed {
            return false;
        }
        self.armed = armed;
        self.redraw(host, now);
        true
    }

    pub fn hide(&mut self, host: &dyn WindowHost) {
        self.slot.detach(host);
        self.armed = false;
        self.shown_at = None;
    }

    pub fn redraw(&self, host: &dyn WindowHost, now: Instant) {
        let Some(shown_at) = self.shown_at else {
            return;
        };
        let metrics = host.display_metrics();
        let scene = self.scene(now.saturating_duration_since(shown_at), &metrics);
        self.slot.render(host, &scene);
    }

    fn scene(&self, since_shown: std::time::Duration, metrics: &DisplayMetrics) -> Scene {
        let side = metrics.dp(TARGET_SIZE_DP);
        let center = Size::square(side).center();
        let radius = side / 2.0 - 4.0;
        let arm = radius * 0.32;
        let (opacity, scale) = fade_in(since_shown);
        let background = if self.armed {
            rgb(0xb71c1c, 0xcc)
        } else {
            rgb(0x1a1a2e, 0xcc)
        };
        let cross = Paint::Stroke {
            color: rgb(0xffffff, 255),
            width: metrics.dp(2.5),
        };

        let mut scene = Scene {
            opacity,
            scale: if self.armed { scale * ARMED_SCALE } else { scale },
            ..Scene::default()
        };
        scene
            .push(Shape::Circle {
                center,
                radius,
                paint: Paint::Fill(background),
            })
            .push(Shape::Circle {
                center,
                radius,
                paint: Paint::Stroke {
                    color: rgb(0xffffff, 100),
                    width: metrics.dp(1.5),
                },
            })
            .push(Shape::Path {
                points: vec![center.offset(-arm, -arm), center.offset(arm, arm)],
                closed: false,
                paint: cross,
            })
            .push(Shape::Path {
                points: vec![center.offset(arm, -arm), center.offset(-arm, arm)],
                closed: false,
                paint: cross,
            });
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::{DismissTarget, target_center};
    use crate::geometry::{DisplayMetrics, Point};
    use crate::headless::HeadlessWindowHost;
    use crate::overlay::OverlayKind;
    use tokio::time::Instant;

    fn metrics() -> DisplayMetrics {
        DisplayMetrics {
            width_px: 1080,
            height_px: 2400,
            density: 2.0,
            density_dpi: 320,
        }
    }

    #[test]
    fn centre_sits_above_the_bottom_margin() {
        assert_eq!(target_center(&metrics()), Point::new(540.0, 2224.0));
    }

    #[test]
    fn arming_scales_up_and_hiding_removes_the_window() {
        let host = HeadlessWindowHost::new(metrics());
        let mut target = DismissTarget::default();
        let now = Instant::now();

        target.show(&host, now);
        target.show(&host, now);
        assert_eq!(host.attach_count(OverlayKind::DismissTarget), 1);

        assert!(target.set_armed(&host, true, now + std::time::Duration::from_secs(1)));
        assert!(!target.set_armed(&host, true, now));
        let scene = host
            .last_scene(OverlayKind::DismissTarget)
            .expect("rendered");
        assert!((scene.scale - 1.25).abs() < 1e-4);

        target.hide(&host);
        assert!(!host.is_attached(OverlayKind::DismissTarget));
        assert!(!target.is_armed());
    }
}
