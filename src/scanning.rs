use crate::animation::{FRAME_INTERVAL, RedrawLoop, spawn_redraw};
use crate::geometry::Point;
use crate::overlay::{Gravity, OverlayKind, OverlaySlot, WindowHost, WindowSpec};
use crate::skins::Skin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Full-screen, touch-transparent feedback shown while a scan is in flight.
pub struct ScanningOverlay {
    host: Arc<dyn WindowHost>,
    skin: Arc<dyn Skin>,
    frame_interval: Duration,
    slot: Arc<Mutex<OverlaySlot>>,
    redraw: Option<RedrawLoop>,
}

impl std::fmt::Debug for ScanningOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanningOverlay")
            .field("skin", &self.skin.name())
            .field("shown", &self.is_shown())
            .finish()
    }
}

impl ScanningOverlay {
    pub fn new(host: Arc<dyn WindowHost>, skin: Arc<dyn Skin>) -> Self {
        Self::with_frame_interval(host, skin, FRAME_INTERVAL)
    }

    pub fn with_frame_interval(
        host: Arc<dyn WindowHost>,
        skin: Arc<dyn Skin>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            host,
            skin,
            frame_interval,
            slot: Arc::new(Mutex::new(OverlaySlot::new(OverlayKind::Scanning))),
            redraw: None,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_attached()
    }

    /// Attaches the overlay and starts animating. A no-op while already shown.
    pub fn show(&mut self) {
        if self.is_shown() {
            return;
        }
        let metrics = self.host.display_metrics();
        let spec = WindowSpec {
            kind: OverlayKind::Scanning,
            size: metrics.size(),
            position: Point::default(),
            gravity: Gravity::Fill,
            focusable: false,
            touchable: false,
        };
        let attached = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attach(self.host.as_ref(), &spec);
        if !attached {
            return;
        }

        let host = self.host.clone();
        let skin = self.skin.clone();
        let slot = self.slot.clone();
        self.redraw = Some(spawn_redraw(self.frame_interval, move |_, elapsed| {
            let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !slot.is_attached() {
                return false;
            }
            let scene = skin.draw(elapsed, metrics.size(), metrics.density);
            slot.render(host.as_ref(), &scene);
            true
        }));
    }

    /// Cancels the redraw timer, then removes the window. Idempotent.
    pub fn hide(&mut self) {
        if let Some(mut redraw) = self.redraw.take() {
            redraw.stop();
        }
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detach(self.host.as_ref());
    }
}

impl Drop for ScanningOverlay {
    fn drop(&mut self) {
        self.hide();
    }
}

#[cfg(test)]
mod tests {
    use super::ScanningOverlay;
    use crate::headless::HeadlessWindowHost;
    use crate::overlay::OverlayKind;
    use crate::skins::ScanningSkin;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn animates_while_shown_and_stops_after_hide() {
        let host = Arc::new(HeadlessWindowHost::default());
        let mut overlay = ScanningOverlay::new(host.clone(), ScanningSkin::Sonar.build());

        overlay.show();
        overlay.show();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(host.attach_count(OverlayKind::Scanning), 1);
        let id = host.attached(OverlayKind::Scanning)[0];
        let spec = host.window(id).expect("window").spec;
        assert!(!spec.touchable);
        assert!(host.window(id).expect("window").renders > 0);

        overlay.hide();
        overlay.hide();
        assert!(!host.is_attached(OverlayKind::Scanning));
        assert_eq!(host.detach_count(OverlayKind::Scanning), 1);
        assert!(overlay.redraw.is_none());
    }

    #[tokio::test]
    async fn attach_failure_skips_feedback() {
        let host = Arc::new(HeadlessWindowHost::default());
        host.fail_attach(true);
        let mut overlay = ScanningOverlay::new(host.clone(), ScanningSkin::Sweep.build());

        overlay.show();
        assert!(!overlay.is_shown());
        assert!(overlay.redraw.is_none());
    }
}
