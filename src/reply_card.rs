use crate::animation::{
    FRAME_INTERVAL, RedrawLoop, SLIDE_IN_DURATION, decelerate, progress, spawn_redraw,
};
use crate::geometry::{DisplayMetrics, Point, Size};
use crate::overlay::{Gravity, OverlayKind, OverlaySlot, WindowHost, WindowSpec};
use crate::replies::ReplySuggestion;
use crate::scene::{Paint, Scene, Shape, rgb};
use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const AUTO_DISMISS_DELAY: Duration = Duration::from_millis(600);

pub const CARD_TITLE: &str = "AI Reply Suggestions";
pub const CLOSE_LABEL: &str = "✕";
pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "✓";

const WIDTH_FRACTION: f32 = 0.92;
const BOTTOM_MARGIN_DP: f32 = 32.0;
const SLIDE_DISTANCE_DP: f32 = 300.0;
const PADDING_DP: f32 = 16.0;
const HEADER_DP: f32 = 28.0;
const DIVIDER_DP: f32 = 17.0;
const ROW_DP: f32 = 44.0;
const ROW_GAP_DP: f32 = 8.0;

pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;
}

/// The desktop system clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
        clipboard
            .set_text(text.to_string())
            .context("failed to write reply to clipboard")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Closed,
    Copied,
}

type DismissCallback = Box<dyn FnOnce(DismissReason) + Send>;

struct CardState {
    slot: OverlaySlot,
    replies: Vec<ReplySuggestion>,
    copied: Vec<bool>,
    slide: f32,
    dismissed: bool,
    on_dismiss: Option<DismissCallback>,
}

fn lock(state: &Mutex<CardState>) -> MutexGuard<'_, CardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bottom-anchored card listing reply suggestions with per-row copy actions.
///
/// Copying any row ends the card: the row confirms with a checkmark and the card
/// removes itself after [`AUTO_DISMISS_DELAY`]. `on_dismiss` fires exactly once,
/// for either a copy or the close button.
pub struct ReplyCard {
    host: Arc<dyn WindowHost>,
    clipboard: Arc<dyn Clipboard>,
    state: Arc<Mutex<CardState>>,
    auto_dismiss: Duration,
    timer: Option<JoinHandle<()>>,
    slide_in: Option<RedrawLoop>,
}

impl std::fmt::Debug for ReplyCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ReplyCard")
            .field("replies", &state.replies)
            .field("dismissed", &state.dismissed)
            .finish()
    }
}

impl ReplyCard {
    /// Attaches the card. Must run inside a tokio runtime.
    pub fn show(
        host: Arc<dyn WindowHost>,
        clipboard: Arc<dyn Clipboard>,
        replies: Vec<ReplySuggestion>,
        auto_dismiss: Duration,
        on_dismiss: impl FnOnce(DismissReason) + Send + 'static,
    ) -> Self {
        let metrics = host.display_metrics();
        let mut slot = OverlaySlot::new(OverlayKind::ReplyCard);
        slot.attach(
            host.as_ref(),
            &WindowSpec {
                kind: OverlayKind::ReplyCard,
                size: card_size(&metrics, replies.len()),
                position: Point::new(0.0, metrics.dp(BOTTOM_MARGIN_DP)),
                gravity: Gravity::BottomCenter,
                focusable: false,
                touchable: true,
            },
        );
        let attached = slot.is_attached();

        let state = Arc::new(Mutex::new(CardState {
            slot,
            copied: vec![false; replies.len()],
            replies,
            slide: 0.0,
            dismissed: false,
            on_dismiss: Some(Box::new(on_dismiss)),
        }));

        let slide_in = attached.then(|| {
            let host = host.clone();
            let state = state.clone();
            spawn_redraw(FRAME_INTERVAL, move |_, elapsed| {
                let mut state = lock(&state);
                if state.dismissed {
                    return false;
                }
                state.slide = decelerate(progress(elapsed, SLIDE_IN_DURATION));
                state.render(host.as_ref());
                state.slide < 1.0
            })
        });

        Self {
            host,
            clipboard,
            state,
            auto_dismiss,
            timer: None,
            slide_in,
        }
    }

    pub fn is_shown(&self) -> bool {
        let state = lock(&self.state);
        !state.dismissed && state.slot.is_attached()
    }

    pub fn replies(&self) -> Vec<ReplySuggestion> {
        lock(&self.state).replies.clone()
    }

    /// Copies row `index` and schedules the card's removal.
    pub fn copy(&mut self, index: usize) -> Result<()> {
        let text = {
            let state = lock(&self.state);
            if state.dismissed {
                return Ok(());
            }
            state
                .replies
                .get(index)
                .map(|reply| reply.text.clone())
                .with_context(|| format!("no reply at row {index}"))?
        };

        self.clipboard.set_text(&text)?;

        {
            let mut state = lock(&self.state);
            state.copied[index] = true;
            state.render(self.host.as_ref());
        }

        if self.timer.is_none() {
            let host = self.host.clone();
            let state = self.state.clone();
            let delay = self.auto_dismiss;
            self.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                dismiss(&state, host.as_ref(), Some(DismissReason::Copied));
            }));
        }
        Ok(())
    }

    /// Close button: removes the card immediately without copying.
    pub fn close(&mut self) {
        self.cancel_timers();
        dismiss(&self.state, self.host.as_ref(), Some(DismissReason::Closed));
    }

    /// Removes the card without notifying the owner. Used on service teardown.
    pub fn teardown(&mut self) {
        self.cancel_timers();
        dismiss(&self.state, self.host.as_ref(), None);
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(mut slide_in) = self.slide_in.take() {
            slide_in.stop();
        }
    }
}

impl Drop for ReplyCard {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn dismiss(state: &Mutex<CardState>, host: &dyn WindowHost, reason: Option<DismissReason>) {
    let callback = {
        let mut state = lock(state);
        if state.dismissed {
            return;
        }
        state.dismissed = true;
        state.slot.detach(host);
        state.on_dismiss.take()
    };
    match (reason, callback) {
        (Some(reason), Some(callback)) => {
            debug!("reply card dismissed: {reason:?}");
            callback(reason);
        }
        (None, _) => debug!("reply card torn down"),
        (Some(_), None) => warn!("reply card dismissed without a listener"),
    }
}

fn card_size(metrics: &DisplayMetrics, rows: usize) -> Size {
    let height = PADDING_DP * 2.0
        + HEADER_DP
        + DIVIDER_DP
        + rows as f32 * (ROW_DP + ROW_GAP_DP);
    Size::new(
        metrics.width_px as f32 * WIDTH_FRACTION,
        metrics.dp(height),
    )
}

impl CardState {
    fn render(&self, host: &dyn WindowHost) {
        let metrics = host.display_metrics();
        let scene = self.scene(&metrics);
        self.slot.render(host, &scene);
    }

    fn scene(&self, metrics: &DisplayMetrics) -> Scene {
        let dp = |v: f32| metrics.dp(v);
        let size = card_size(metrics, self.replies.len());
        let muted = rgb(0x8888aa, 255);

        let mut scene = Scene {
            translation: Point::new(0.0, dp(SLIDE_DISTANCE_DP) * (1.0 - self.slide)),
            ..Scene::default()
        };
        scene.push(Shape::Rect {
            origin: Point::default(),
            width: size.width,
            height: size.height,
            corner_radius: dp(20.0),
            paint: Paint::Fill(rgb(0x13131a, 255)),
        });

        let mut y = dp(12.0);
        scene
            .push(Shape::Text {
                anchor: Point::new(dp(PADDING_DP), y + dp(14.0)),
                text: CARD_TITLE.to_string(),
                size: dp(14.0),
                color: muted,
            })
            .push(Shape::Text {
                anchor: Point::new(size.width - dp(PADDING_DP), y + dp(14.0)),
                text: CLOSE_LABEL.to_string(),
                size: dp(16.0),
                color: muted,
            });
        y += dp(HEADER_DP) + dp(8.0);
        scene.push(Shape::Rect {
            origin: Point::new(dp(PADDING_DP), y),
            width: size.width - dp(PADDING_DP) * 2.0,
            height: dp(1.0),
            corner_radius: 0.0,
            paint: Paint::Fill(rgb(0x2a2a3d, 255)),
        });
        y += dp(DIVIDER_DP - 8.0);

        for (reply, copied) in self.replies.iter().zip(&self.copied) {
            let (label, color) = if *copied {
                (COPIED_LABEL, rgb(0x34d399, 255))
            } else {
                (COPY_LABEL, rgb(0x4f8ef7, 255))
            };
            scene
                .push(Shape::Rect {
                    origin: Point::new(dp(PADDING_DP), y),
                    width: size.width - dp(PADDING_DP) * 2.0,
                    height: dp(ROW_DP),
                    corner_radius: dp(12.0),
                    paint: Paint::Fill(rgb(0x1c1c28, 255)),
                })
                .push(Shape::Text {
                    anchor: Point::new(dp(PADDING_DP + 12.0), y + dp(27.0)),
                    text: reply.text.clone(),
                    size: dp(15.0),
                    color: rgb(0xf0f0ff, 255),
                })
                .push(Shape::Text {
                    anchor: Point::new(size.width - dp(PADDING_DP + 12.0), y + dp(27.0)),
                    text: label.to_string(),
                    size: dp(13.0),
                    color,
                });
            y += dp(ROW_DP + ROW_GAP_DP);
        }
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::{AUTO_DISMISS_DELAY, COPIED_LABEL, DismissReason, ReplyCard};
    use crate::headless::{HeadlessWindowHost, MemoryClipboard};
    use crate::overlay::OverlayKind;
    use crate::replies::ReplySuggestion;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn suggestions() -> Vec<ReplySuggestion> {
        ReplySuggestion::from_texts(["Sure!", "Can't today", "Later?"])
    }

    fn card(
        host: &Arc<HeadlessWindowHost>,
        clipboard: &Arc<MemoryClipboard>,
    ) -> (ReplyCard, Arc<Mutex<Vec<DismissReason>>>) {
        let dismissals = Arc::new(Mutex::new(Vec::new()));
        let sink = dismissals.clone();
        let card = ReplyCard::show(
            host.clone(),
            clipboard.clone(),
            suggestions(),
            AUTO_DISMISS_DELAY,
            move |reason| sink.lock().expect("lock").push(reason),
        );
        (card, dismissals)
    }

    #[tokio::test(start_paused = true)]
    async fn lists_replies_in_order() {
        let host = Arc::new(HeadlessWindowHost::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let (_card, _) = card(&host, &clipboard);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let scene = host.last_scene(OverlayKind::ReplyCard).expect("rendered");
        let texts = scene.texts().collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                "AI Reply Suggestions",
                "✕",
                "Sure!",
                "Copy",
                "Can't today",
                "Copy",
                "Later?",
                "Copy"
            ]
        );
        assert_eq!(scene.translation.y, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn copy_confirms_then_dismisses_once() {
        let host = Arc::new(HeadlessWindowHost::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let (mut card, dismissals) = card(&host, &clipboard);

        card.copy(1).expect("copy");
        card.copy(1).expect("copy again");
        card.copy(2).expect("copy another");
        assert_eq!(clipboard.history(), vec!["Can't today", "Can't today", "Later?"]);

        let scene = host.last_scene(OverlayKind::ReplyCard).expect("rendered");
        assert!(scene.texts().any(|text| text == COPIED_LABEL));
        assert!(card.is_shown());

        tokio::time::sleep(AUTO_DISMISS_DELAY + Duration::from_millis(10)).await;
        assert!(!card.is_shown());
        assert_eq!(host.detach_count(OverlayKind::ReplyCard), 1);
        assert_eq!(*dismissals.lock().expect("lock"), vec![DismissReason::Copied]);

        card.copy(0).expect("copy after dismissal is ignored");
        card.close();
        assert_eq!(dismissals.lock().expect("lock").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_dismisses_immediately_without_copying() {
        let host = Arc::new(HeadlessWindowHost::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let (mut card, dismissals) = card(&host, &clipboard);

        card.close();

        assert!(!host.is_attached(OverlayKind::ReplyCard));
        assert!(clipboard.history().is_empty());
        assert_eq!(*dismissals.lock().expect("lock"), vec![DismissReason::Closed]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_does_not_notify() {
        let host = Arc::new(HeadlessWindowHost::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let (card, dismissals) = card(&host, &clipboard);

        drop(card);

        assert!(!host.is_attached(OverlayKind::ReplyCard));
        assert!(dismissals.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn copying_a_missing_row_is_an_error() {
        let host = Arc::new(HeadlessWindowHost::default());
        let clipboard = Arc::new(MemoryClipboard::default());
        let (mut card, _) = card(&host, &clipboard);

        assert!(card.copy(7).is_err());
        assert!(card.is_shown());
    }
}
