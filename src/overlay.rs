use crate::geometry::{DisplayMetrics, Point, Size};
use crate::scene::Scene;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Bubble,
    DismissTarget,
    Scanning,
    ReplyCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    /// `position` is the top-left corner in screen pixels.
    TopStart,
    /// Horizontally centred; `position.y` is the margin above the bottom edge.
    BottomCenter,
    /// Covers the whole display; `position` is ignored.
    Fill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub kind: OverlayKind,
    pub size: Size,
    pub position: Point,
    pub gravity: Gravity,
    pub focusable: bool,
    /// `false` lets touches fall through to whatever app is underneath.
    pub touchable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("overlay permission not granted")]
    PermissionDenied,
    #[error("window {0:?} is not attached")]
    NotAttached(WindowId),
    #[error("window manager error: {0}")]
    Platform(String),
}

/// The always-on-top window manager the overlays are drawn into.
pub trait WindowHost: Send + Sync {
    fn display_metrics(&self) -> DisplayMetrics;
    fn attach(&self, spec: &WindowSpec) -> Result<WindowId, WindowError>;
    fn reposition(&self, id: WindowId, position: Point) -> Result<(), WindowError>;
    fn render(&self, id: WindowId, scene: &Scene) -> Result<(), WindowError>;
    fn detach(&self, id: WindowId) -> Result<(), WindowError>;
}

/// Holds at most one attached window of a given kind.
///
/// Every window-manager call made through a slot is best-effort: failures are
/// logged and swallowed, and the handle is cleared before removal is attempted
/// so a second detach is a no-op.
#[derive(Debug)]
pub struct OverlaySlot {
    kind: OverlayKind,
    id: Option<WindowId>,
    // Set while renders keep failing; only the first failure of a run warns.
    render_failing: AtomicBool,
}

impl OverlaySlot {
    pub fn new(kind: OverlayKind) -> Self {
        Self {
            kind,
            id: None,
            render_failing: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> OverlayKind {
        self.kind
    }

    pub fn id(&self) -> Option<WindowId> {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.id.is_some()
    }

    /// Attaches a new window, detaching the current one first. Returns whether
    /// the new window is on screen.
    pub fn attach(&mut self, host: &dyn WindowHost, spec: &WindowSpec) -> bool {
        debug_assert_eq!(spec.kind, self.kind);
        self.detach(host);
        match host.attach(spec) {
            Ok(id) => {
                self.id = Some(id);
                self.render_failing.store(false, Ordering::Relaxed);
                true
            }
            Err(err) => {
                warn!("failed to attach {:?} overlay: {err}", self.kind);
                false
            }
        }
    }

    /// Returns whether a window was held (and removal attempted).
    pub fn detach(&mut self, host: &dyn WindowHost) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        if let Err(err) = host.detach(id) {
            warn!("failed to detach {:?} overlay: {err}", self.kind);
        }
        true
    }

    pub fn render(&self, host: &dyn WindowHost, scene: &Scene) {
        let Some(id) = self.id else {
            return;
        };
        match host.render(id, scene) {
            Ok(()) => {
                if self.render_failing.swap(false, Ordering::Relaxed) {
                    debug!("{:?} overlay rendering again", self.kind);
                }
            }
            Err(err) => {
                if self.render_failing.swap(true, Ordering::Relaxed) {
                    debug!("failed to render {:?} overlay: {err}", self.kind);
                } else {
                    warn!("failed to render {:?} overlay: {err}", self.kind);
                }
            }
        }
    }

    pub fn reposition(&self, host: &dyn WindowHost, position: Point) {
        if let Some(id) = self.id
            && let Err(err) = host.reposition(id, position)
        {
            warn!("failed to move {:?} overlay: {err}", self.kind);
        }
    }
}
