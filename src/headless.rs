use crate::geometry::{DisplayMetrics, Point};
use crate::overlay::{OverlayKind, WindowError, WindowHost, WindowId, WindowSpec};
use crate::reply_card::Clipboard;
use crate::scene::Scene;
use anyhow::Result;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    pub spec: WindowSpec,
    pub position: Point,
    pub last_scene: Option<Scene>,
    pub renders: u64,
}

#[derive(Debug, Default)]
struct HostState {
    next_id: u64,
    windows: BTreeMap<WindowId, HeadlessWindow>,
    attaches: HashMap<OverlayKind, usize>,
    detaches: HashMap<OverlayKind, usize>,
}

/// A window host that keeps overlays in memory instead of on a screen.
///
/// Backs the terminal front-end and the test suite; it records every attach,
/// move, render and detach so callers can inspect what would be visible.
#[derive(Debug, Default)]
pub struct HeadlessWindowHost {
    metrics: DisplayMetrics,
    state: Mutex<HostState>,
    fail_attach: AtomicBool,
    fail_detach: AtomicBool,
    fail_render: AtomicBool,
}

impl HeadlessWindowHost {
    pub fn new(metrics: DisplayMetrics) -> Self {
        Self {
            metrics,
            ..Self::default()
        }
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_detach(&self, fail: bool) {
        self.fail_detach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_render(&self, fail: bool) {
        self.fail_render.store(fail, Ordering::SeqCst);
    }

    pub fn attached(&self, kind: OverlayKind) -> Vec<WindowId> {
        self.with_state(|state| {
            state
                .windows
                .iter()
                .filter(|(_, window)| window.spec.kind == kind)
                .map(|(id, _)| *id)
                .collect()
        })
    }

    pub fn is_attached(&self, kind: OverlayKind) -> bool {
        !self.attached(kind).is_empty()
    }

    pub fn window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.with_state(|state| state.windows.get(&id).cloned())
    }

    /// Most recent scene of the (single) attached window of `kind`.
    pub fn last_scene(&self, kind: OverlayKind) -> Option<Scene> {
        self.with_state(|state| {
            state
                .windows
                .values()
                .find(|window| window.spec.kind == kind)
                .and_then(|window| window.last_scene.clone())
        })
    }

    pub fn position(&self, kind: OverlayKind) -> Option<Point> {
        self.with_state(|state| {
            state
                .windows
                .values()
                .find(|window| window.spec.kind == kind)
                .map(|window| window.position)
        })
    }

    pub fn attach_count(&self, kind: OverlayKind) -> usize {
        self.with_state(|state| state.attaches.get(&kind).copied().unwrap_or(0))
    }

    pub fn detach_count(&self, kind: OverlayKind) -> usize {
        self.with_state(|state| state.detaches.get(&kind).copied().unwrap_or(0))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }
}

impl WindowHost for HeadlessWindowHost {
    fn display_metrics(&self) -> DisplayMetrics {
        self.metrics
    }

    fn attach(&self, spec: &WindowSpec) -> Result<WindowId, WindowError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(WindowError::PermissionDenied);
        }
        let id = self.with_state(|state| {
            state.next_id += 1;
            let id = WindowId(state.next_id);
            state.windows.insert(
                id,
                HeadlessWindow {
                    spec: spec.clone(),
                    position: spec.position,
                    last_scene: None,
                    renders: 0,
                },
            );
            *state.attaches.entry(spec.kind).or_default() += 1;
            id
        });
        debug!("attached {:?} overlay as {id:?}", spec.kind);
        Ok(id)
    }

    fn reposition(&self, id: WindowId, position: Point) -> Result<(), WindowError> {
        self.with_state(|state| match state.windows.get_mut(&id) {
            Some(window) => {
                window.position = position;
                Ok(())
            }
            None => Err(WindowError::NotAttached(id)),
        })
    }

    fn render(&self, id: WindowId, scene: &Scene) -> Result<(), WindowError> {
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(WindowError::Platform("render refused".to_string()));
        }
        self.with_state(|state| match state.windows.get_mut(&id) {
            Some(window) => {
                window.last_scene = Some(scene.clone());
                window.renders += 1;
                Ok(())
            }
            None => Err(WindowError::NotAttached(id)),
        })
    }

    fn detach(&self, id: WindowId) -> Result<(), WindowError> {
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(WindowError::Platform("detach refused".to_string()));
        }
        let removed = self.with_state(|state| {
            let removed = state.windows.remove(&id);
            if let Some(window) = &removed {
                *state.detaches.entry(window.spec.kind).or_default() += 1;
            }
            removed
        });
        match removed {
            Some(window) => {
                debug!("detached {:?} overlay {id:?}", window.spec.kind);
                Ok(())
            }
            None => Err(WindowError::NotAttached(id)),
        }
    }
}

/// Clipboard that remembers everything written to it.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    history: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn contents(&self) -> Option<String> {
        self.history().pop()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}
