use crate::animation::{
    EDGE_SNAP_DURATION, FRAME_INTERVAL, RedrawLoop, decelerate, lerp, progress, shake_offset,
    spawn_redraw,
};
use crate::dismiss_target::{DismissTarget, target_center};
use crate::geometry::{Point, Size};
use crate::gesture::{GestureTracker, GestureUpdate, TouchEvent};
use crate::overlay::{Gravity, OverlayKind, OverlaySlot, WindowHost, WindowSpec};
use crate::skins::Skin;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const BUBBLE_SIZE_DP: f32 = 48.0;
pub const EDGE_MARGIN_DP: f32 = 12.0;
pub const INITIAL_POSITION: Point = Point::new(0.0, 200.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleOutcome {
    Tap,
    Dismiss,
}

#[derive(Debug, Clone, Copy)]
pub struct BubbleOptions {
    pub frame_interval: Duration,
    /// Slide to the nearest side edge after a drag that did not dismiss.
    pub snap_to_edge: bool,
}

impl Default for BubbleOptions {
    fn default() -> Self {
        Self {
            frame_interval: FRAME_INTERVAL,
            snap_to_edge: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EdgeSnap {
    from_x: f32,
    to_x: f32,
    started: Instant,
}

#[derive(Debug)]
struct BubbleState {
    slot: OverlaySlot,
    dismiss: DismissTarget,
    tracker: GestureTracker,
    position: Point,
    shake_from: Option<Instant>,
    snap: Option<EdgeSnap>,
}

/// The persistent, draggable entry point of the capture flow.
pub struct Bubble {
    host: Arc<dyn WindowHost>,
    state: Arc<Mutex<BubbleState>>,
    redraw: Option<RedrawLoop>,
    options: BubbleOptions,
}

impl std::fmt::Debug for Bubble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bubble")
            .field("attached", &self.is_attached())
            .field("options", &self.options)
            .finish()
    }
}

fn lock(state: &Mutex<BubbleState>) -> MutexGuard<'_, BubbleState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Bubble {
    /// Attaches the bubble and starts its redraw loop. Must run inside a tokio runtime.
    pub fn show(host: Arc<dyn WindowHost>, skin: Arc<dyn Skin>, options: BubbleOptions) -> Self {
        let metrics = host.display_metrics();
        let side = metrics.dp(BUBBLE_SIZE_DP);
        let mut slot = OverlaySlot::new(OverlayKind::Bubble);
        slot.attach(
            host.as_ref(),
            &WindowSpec {
                kind: OverlayKind::Bubble,
                size: Size::square(side),
                position: INITIAL_POSITION,
                gravity: Gravity::TopStart,
                focusable: false,
                touchable: true,
            },
        );
        let attached = slot.is_attached();

        let state = Arc::new(Mutex::new(BubbleState {
            slot,
            dismiss: DismissTarget::default(),
            tracker: GestureTracker::new(metrics.density, target_center(&metrics)),
            position: INITIAL_POSITION,
            shake_from: None,
            snap: None,
        }));

        let redraw = attached.then(|| {
            let host = host.clone();
            let state = state.clone();
            spawn_redraw(options.frame_interval, move |now, elapsed| {
                let mut state = lock(&state);
                if !state.slot.is_attached() {
                    return false;
                }
                state.frame(host.as_ref(), skin.as_ref(), now, elapsed, side);
                true
            })
        });

        Self {
            host,
            state,
            redraw,
            options,
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).slot.is_attached()
    }

    pub fn position(&self) -> Point {
        lock(&self.state).position
    }

    pub fn is_dismiss_target_shown(&self) -> bool {
        lock(&self.state).dismiss.is_shown()
    }

    /// Feeds one touch to the bubble; returns the outcome the owner should act on.
    pub fn handle_touch(&self, event: TouchEvent) -> Option<BubbleOutcome> {
        let host = self.host.as_ref();
        let mut state = lock(&self.state);
        if !state.slot.is_attached() {
            return None;
        }
        let position = state.position;
        match state.tracker.handle(event, position) {
            GestureUpdate::None => None,
            GestureUpdate::DragStarted { window, armed } => {
                state.snap = None;
                state.move_to(host, window);
                state.dismiss.show(host, event.at);
                state.dismiss.set_armed(host, armed, event.at);
                None
            }
            GestureUpdate::Dragged {
                window,
                armed_changed,
            } => {
                state.move_to(host, window);
                if let Some(armed) = armed_changed {
                    state.dismiss.set_armed(host, armed, event.at);
                }
                None
            }
            GestureUpdate::Tap => Some(BubbleOutcome::Tap),
            GestureUpdate::Dismiss => {
                state.dismiss.hide(host);
                Some(BubbleOutcome::Dismiss)
            }
            GestureUpdate::DragCancelled { window } => {
                state.move_to(host, window);
                state.dismiss.hide(host);
                if self.options.snap_to_edge {
                    let metrics = host.display_metrics();
                    let side = metrics.dp(BUBBLE_SIZE_DP);
                    let margin = metrics.dp(EDGE_MARGIN_DP);
                    let width = metrics.width_px as f32;
                    let to_x = if window.x + side / 2.0 > width / 2.0 {
                        width - side - margin
                    } else {
                        margin
                    };
                    state.snap = Some(EdgeSnap {
                        from_x: window.x,
                        to_x,
                        started: event.at,
                    });
                }
                None
            }
        }
    }

    /// Stops the redraw loop and removes the bubble and any dismiss target.
    /// Safe to call repeatedly, including mid-drag.
    pub fn teardown(&mut self) {
        if let Some(mut redraw) = self.redraw.take() {
            redraw.stop();
        }
        let host = self.host.as_ref();
        let mut state = lock(&self.state);
        state.dismiss.hide(host);
        if state.slot.detach(host) {
            debug!("bubble removed");
        }
    }
}

impl Drop for Bubble {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl BubbleState {
    fn move_to(&mut self, host: &dyn WindowHost, position: Point) {
        self.position = position;
        self.slot.reposition(host, position);
    }

    fn frame(
        &mut self,
        host: &dyn WindowHost,
        skin: &dyn Skin,
        now: Instant,
        elapsed: Duration,
        side: f32,
    ) {
        let metrics = host.display_metrics();

        if self.tracker.poll_long_press(now) {
            self.shake_from = Some(now);
        }
        let shake = self
            .shake_from
            .and_then(|from| shake_offset(now.saturating_duration_since(from)));
        if shake.is_none() {
            self.shake_from = None;
        }

        if let Some(snap) = self.snap {
            let t = progress(now.saturating_duration_since(snap.started), EDGE_SNAP_DURATION);
            let x = lerp(snap.from_x, snap.to_x, decelerate(t));
            let y = self.position.y;
            self.move_to(host, Point::new(x, y));
            if t >= 1.0 {
                self.snap = None;
            }
        }

        let mut scene = skin.draw(elapsed, Size::square(side), metrics.density);
        if let Some(offset) = shake {
            scene.translation = Point::new(metrics.dp(offset), 0.0);
        }
        self.slot.render(host, &scene);
        self.dismiss.redraw(host, now);
    }
}

#[cfg(test)]
mod tests {
    use super::{Bubble, BubbleOptions, BubbleOutcome, INITIAL_POSITION};
    use crate::geometry::{DisplayMetrics, Point};
    use crate::gesture::TouchEvent;
    use crate::headless::HeadlessWindowHost;
    use crate::overlay::OverlayKind;
    use crate::skins::BubbleSkin;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn host() -> Arc<HeadlessWindowHost> {
        Arc::new(HeadlessWindowHost::new(DisplayMetrics {
            width_px: 1080,
            height_px: 2400,
            density: 1.0,
            density_dpi: 160,
        }))
    }

    fn bubble(host: &Arc<HeadlessWindowHost>, snap_to_edge: bool) -> Bubble {
        Bubble::show(
            host.clone(),
            BubbleSkin::Plasma.build(),
            BubbleOptions {
                snap_to_edge,
                ..BubbleOptions::default()
            },
        )
    }

    // density 1.0: dismiss target centre is (540, 2400 - 56 - 32) = (540, 2312)
    const TARGET: Point = Point::new(540.0, 2312.0);

    #[tokio::test(start_paused = true)]
    async fn renders_continuously_while_attached() {
        let host = host();
        let _bubble = bubble(&host, false);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let id = host.attached(OverlayKind::Bubble)[0];
        assert!(host.window(id).expect("window").renders >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_fires_without_showing_the_target() {
        let host = host();
        let bubble = bubble(&host, false);
        let now = Instant::now();

        assert_eq!(bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), now)), None);
        let outcome = bubble.handle_touch(TouchEvent::up(Point::new(27.0, 226.0), now));

        assert_eq!(outcome, Some(BubbleOutcome::Tap));
        assert_eq!(host.attach_count(OverlayKind::DismissTarget), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_on_target_dismisses_and_removes_target() {
        let host = host();
        let bubble = bubble(&host, false);
        let now = Instant::now();

        bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), now));
        bubble.handle_touch(TouchEvent::moved(Point::new(200.0, 900.0), now));
        assert!(bubble.is_dismiss_target_shown());
        bubble.handle_touch(TouchEvent::moved(TARGET.offset(10.0, -10.0), now));
        let outcome = bubble.handle_touch(TouchEvent::up(TARGET.offset(10.0, -10.0), now));

        assert_eq!(outcome, Some(BubbleOutcome::Dismiss));
        assert!(!host.is_attached(OverlayKind::DismissTarget));
        assert_eq!(host.detach_count(OverlayKind::DismissTarget), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_away_from_target_keeps_released_position() {
        let host = host();
        let bubble = bubble(&host, false);
        let now = Instant::now();

        bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), now));
        bubble.handle_touch(TouchEvent::moved(Point::new(300.0, 1024.0), now));
        let outcome = bubble.handle_touch(TouchEvent::up(Point::new(300.0, 1024.0), now));

        assert_eq!(outcome, None);
        assert!(bubble.is_attached());
        assert!(!host.is_attached(OverlayKind::DismissTarget));
        let released = INITIAL_POSITION.offset(276.0, 800.0);
        assert_eq!(bubble.position(), released);
        assert_eq!(host.position(OverlayKind::Bubble), Some(released));
    }

    #[tokio::test(start_paused = true)]
    async fn snap_to_edge_slides_to_nearest_side() {
        let host = host();
        let bubble = bubble(&host, true);
        let now = Instant::now();

        bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), now));
        bubble.handle_touch(TouchEvent::moved(Point::new(900.0, 1024.0), now));
        bubble.handle_touch(TouchEvent::up(Point::new(900.0, 1024.0), now));

        tokio::time::sleep(Duration::from_millis(300)).await;
        // 1080 - 48 - 12
        assert_eq!(bubble.position(), Point::new(1020.0, 1000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_shakes_without_changing_state() {
        let host = host();
        let bubble = bubble(&host, false);
        let start = Instant::now();

        bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), start));
        tokio::time::sleep(Duration::from_millis(700)).await;
        let scene = host.last_scene(OverlayKind::Bubble).expect("rendered");
        assert_ne!(scene.translation, Point::default());

        let outcome = bubble.handle_touch(TouchEvent::up(Point::new(24.0, 224.0), Instant::now()));
        assert_eq!(outcome, Some(BubbleOutcome::Tap));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_mid_drag_is_quiet_and_idempotent() {
        let host = host();
        let mut bubble = bubble(&host, false);
        let now = Instant::now();

        bubble.handle_touch(TouchEvent::down(Point::new(24.0, 224.0), now));
        bubble.handle_touch(TouchEvent::moved(Point::new(300.0, 1024.0), now));
        host.fail_detach(true);
        bubble.teardown();
        bubble.teardown();

        assert!(!bubble.is_attached());
        assert_eq!(
            bubble.handle_touch(TouchEvent::up(Point::new(300.0, 1024.0), now)),
            None
        );
    }
}
