use crate::geometry::Point;
use std::time::Duration;
use tokio::time::Instant;

/// Movement (dp) a press may wander before it becomes a drag.
pub const TAP_SLOP_DP: f32 = 10.0;
/// Distance (dp) from the dismiss target centre at which a release dismisses.
pub const SNAP_THRESHOLD_DP: f32 = 90.0;
pub const LONG_PRESS: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// A touch on the bubble, in raw screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub raw: Point,
    pub at: Instant,
}

impl TouchEvent {
    pub fn down(raw: Point, at: Instant) -> Self {
        Self {
            phase: TouchPhase::Down,
            raw,
            at,
        }
    }

    pub fn moved(raw: Point, at: Instant) -> Self {
        Self {
            phase: TouchPhase::Move,
            raw,
            at,
        }
    }

    pub fn up(raw: Point, at: Instant) -> Self {
        Self {
            phase: TouchPhase::Up,
            raw,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureUpdate {
    None,
    /// Movement crossed the tap slop; the dismiss target should appear.
    DragStarted { window: Point, armed: bool },
    Dragged { window: Point, armed_changed: Option<bool> },
    Tap,
    Dismiss,
    /// Released away from the target; the window stays at `window`.
    DragCancelled { window: Point },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Pressed {
        origin: Point,
        window_origin: Point,
        at: Instant,
        long_press_fired: bool,
    },
    Dragging {
        origin: Point,
        window_origin: Point,
        armed: bool,
    },
}

/// Classifies raw touches into tap, drag and dismiss outcomes.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    slop_px: f32,
    snap_threshold_px: f32,
    target_center: Point,
    state: State,
}

impl GestureTracker {
    pub fn new(density: f32, target_center: Point) -> Self {
        Self {
            slop_px: TAP_SLOP_DP * density,
            snap_threshold_px: SNAP_THRESHOLD_DP * density,
            target_center,
            state: State::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, State::Dragging { .. })
    }

    pub fn is_near_target(&self, raw: Point) -> bool {
        raw.distance_to(self.target_center) < self.snap_threshold_px
    }

    /// `window` is the bubble's current top-left position.
    pub fn handle(&mut self, event: TouchEvent, window: Point) -> GestureUpdate {
        match (event.phase, self.state) {
            (TouchPhase::Down, _) => {
                self.state = State::Pressed {
                    origin: event.raw,
                    window_origin: window,
                    at: event.at,
                    long_press_fired: false,
                };
                GestureUpdate::None
            }
            (
                TouchPhase::Move,
                State::Pressed {
                    origin,
                    window_origin,
                    ..
                },
            ) => {
                let dx = event.raw.x - origin.x;
                let dy = event.raw.y - origin.y;
                if dx.abs() <= self.slop_px && dy.abs() <= self.slop_px {
                    return GestureUpdate::None;
                }
                let armed = self.is_near_target(event.raw);
                self.state = State::Dragging {
                    origin,
                    window_origin,
                    armed,
                };
                GestureUpdate::DragStarted {
                    window: window_origin.offset(dx, dy),
                    armed,
                }
            }
            (
                TouchPhase::Move,
                State::Dragging {
                    origin,
                    window_origin,
                    armed,
                },
            ) => {
                let near = self.is_near_target(event.raw);
                self.state = State::Dragging {
                    origin,
                    window_origin,
                    armed: near,
                };
                GestureUpdate::Dragged {
                    window: window_origin.offset(event.raw.x - origin.x, event.raw.y - origin.y),
                    armed_changed: (near != armed).then_some(near),
                }
            }
            (TouchPhase::Up, State::Pressed { .. }) => {
                self.state = State::Idle;
                GestureUpdate::Tap
            }
            (
                TouchPhase::Up,
                State::Dragging {
                    origin,
                    window_origin,
                    ..
                },
            ) => {
                self.state = State::Idle;
                if self.is_near_target(event.raw) {
                    GestureUpdate::Dismiss
                } else {
                    GestureUpdate::DragCancelled {
                        window: window_origin
                            .offset(event.raw.x - origin.x, event.raw.y - origin.y),
                    }
                }
            }
            (TouchPhase::Cancel, State::Dragging { .. }) => {
                self.state = State::Idle;
                GestureUpdate::DragCancelled { window }
            }
            (TouchPhase::Cancel, _) => {
                self.state = State::Idle;
                GestureUpdate::None
            }
            (TouchPhase::Move | TouchPhase::Up, State::Idle) => GestureUpdate::None,
        }
    }

    /// Returns `true` once per press held still for [`LONG_PRESS`].
    pub fn poll_long_press(&mut self, now: Instant) -> bool {
        if let State::Pressed {
            at,
            long_press_fired,
            ..
        } = &mut self.state
            && !*long_press_fired
            && now.saturating_duration_since(*at) >= LONG_PRESS
        {
            *long_press_fired = true;
            return true;
        }
        false
    }
}
