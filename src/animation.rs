use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Redraw cadence of every animated overlay (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub const SHAKE_DURATION: Duration = Duration::from_millis(400);
const SHAKE_KEYFRAMES: [f32; 6] = [0.0, -15.0, 15.0, -10.0, 10.0, 0.0];

pub const FADE_IN_DURATION: Duration = Duration::from_millis(250);
pub const SLIDE_IN_DURATION: Duration = Duration::from_millis(320);
pub const EDGE_SNAP_DURATION: Duration = Duration::from_millis(200);

/// Periodic redraw task. The task is aborted when the loop is stopped or dropped,
/// so no periodic work outlives the overlay that owns it.
#[derive(Debug)]
pub struct RedrawLoop {
    handle: Option<JoinHandle<()>>,
}

impl RedrawLoop {
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RedrawLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Calls `frame(now, elapsed)` every `interval` until it returns `false`.
///
/// `elapsed` is measured from the moment the loop was spawned and is the only
/// time input renderers should use.
pub fn spawn_redraw<F>(interval: Duration, mut frame: F) -> RedrawLoop
where
    F: FnMut(Instant, Duration) -> bool + Send + 'static,
{
    let started = Instant::now();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let now = ticker.tick().await;
            if !frame(now, now.saturating_duration_since(started)) {
                break;
            }
        }
    });
    RedrawLoop {
        handle: Some(handle),
    }
}

/// Fraction of `duration` covered by `since`, clamped to `0.0..=1.0`.
pub fn progress(since: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (since.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
}

pub fn decelerate(t: f32) -> f32 {
    let inverse = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inverse * inverse
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Horizontal shake offset in dp, `None` once the shake has finished.
pub fn shake_offset(since: Duration) -> Option<f32> {
    if since >= SHAKE_DURATION {
        return None;
    }
    let segments = (SHAKE_KEYFRAMES.len() - 1) as f32;
    let position = progress(since, SHAKE_DURATION) * segments;
    let index = (position.floor() as usize).min(SHAKE_KEYFRAMES.len() - 2);
    let local = position - index as f32;
    Some(lerp(
        SHAKE_KEYFRAMES[index],
        SHAKE_KEYFRAMES[index + 1],
        local,
    ))
}

/// `(opacity, scale)` for an overlay fading and growing in.
pub fn fade_in(since: Duration) -> (f32, f32) {
    let t = decelerate(progress(since, FADE_IN_DURATION));
    (t, lerp(0.6, 1.0, t))
}

#[cfg(test)]
mod tests {
    use super::{
        SHAKE_DURATION, decelerate, fade_in, progress, shake_offset, spawn_redraw,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn approx(actual: Option<f32>, expected: f32) -> bool {
        actual.is_some_and(|value| (value - expected).abs() < 0.01)
    }

    #[test]
    fn shake_hits_keyframes_and_ends() {
        assert!(approx(shake_offset(Duration::ZERO), 0.0));
        assert!(approx(shake_offset(Duration::from_millis(80)), -15.0));
        assert!(approx(shake_offset(Duration::from_millis(160)), 15.0));
        assert_eq!(shake_offset(SHAKE_DURATION), None);
    }

    #[test]
    fn fade_in_starts_small_and_transparent() {
        assert_eq!(fade_in(Duration::ZERO), (0.0, 0.6));
        let (opacity, scale) = fade_in(Duration::from_secs(1));
        assert_eq!(opacity, 1.0);
        assert!((scale - 1.0).abs() < f32::EPSILON * 4.0);
    }

    #[test]
    fn progress_clamps() {
        assert_eq!(progress(Duration::from_secs(2), Duration::from_secs(1)), 1.0);
        assert_eq!(progress(Duration::ZERO, Duration::ZERO), 1.0);
        assert_eq!(decelerate(1.0), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn redraw_stops_when_frame_returns_false() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let redraw = spawn_redraw(Duration::from_millis(16), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst) < 2
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(frames.load(Ordering::SeqCst), 3);
        assert!(!redraw.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_cancels_periodic_work() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let mut redraw = spawn_redraw(Duration::from_millis(16), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        redraw.stop();
        let seen = frames.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(frames.load(Ordering::SeqCst), seen);
    }
}
