//! Rendering engine interface.
//!
//! The bridge drives an [`Engine`] from its worker thread only. The engine is created on that
//! thread by an [`EngineFactory`] and never leaves it, so implementations do not need to be
//! `Send`. Two implementations exist:
//!
//! - [`ultralight::UltralightEngine`]: binds the Ultralight SDK libraries at runtime.
//! - [`headless::HeadlessEngine`]: software engine with deterministic output, used by tests and
//!   demos.

pub mod headless;
pub mod ultralight;

use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::input::{KeyEvent, MouseEvent, ScrollEvent};
use crate::messages::NativeRouter;
use crate::queue::MessageQueue;
use crate::vfs::FileProvider;
use std::sync::Arc;

/// Engine-level view identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawView(pub usize);

/// Engine-level pixel surface identifier, tied to one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSurface(pub usize);

/// Identifies a page's script context. Replaced on every navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptContext(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewHandles {
    pub view: RawView,
    pub surface: RawSurface,
}

/// Region of a surface that changed since the last clear. Edges are exclusive on the right
/// and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl DirtyBounds {
    pub fn full(width: u32, height: u32) -> Self {
        Self { left: 0, top: 0, right: width as i32, bottom: height as i32 }
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * 4`.
    pub row_bytes: u32,
    pub dirty: DirtyBounds,
}

/// Services the bridge hands to the engine at creation time.
#[derive(Clone)]
pub struct EngineHooks {
    /// Backing store for `file:///` loads.
    pub files: Arc<dyn FileProvider>,
    /// Receives calls to the native page function.
    pub native: Arc<NativeRouter>,
}

impl std::fmt::Debug for EngineHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHooks")
            .field("files", &"Arc<dyn FileProvider>")
            .field("native", &self.native)
            .finish()
    }
}

/// Creates the engine on the worker thread.
pub type EngineFactory =
    Arc<dyn Fn(&BridgeConfig, EngineHooks) -> Result<Box<dyn Engine>, BridgeError> + Send + Sync>;

/// Core engine interface. All calls happen on the worker thread.
pub trait Engine {
    fn name(&self) -> &str;

    /// Creates an offscreen, CPU-rendered view.
    fn create_view(&mut self, width: u32, height: u32) -> Result<ViewHandles, BridgeError>;

    fn destroy_view(&mut self, handles: ViewHandles);

    fn load_html(&mut self, view: RawView, html: &str);

    fn load_url(&mut self, view: RawView, url: &str);

    fn focus(&mut self, view: RawView);

    /// Runs `script` in the page. Returns the result as a string if the engine produced one.
    fn evaluate_script(&mut self, view: RawView, script: &str) -> Option<String>;

    fn fire_mouse(&mut self, view: RawView, event: &MouseEvent);

    fn fire_scroll(&mut self, view: RawView, event: &ScrollEvent);

    fn fire_key(&mut self, view: RawView, event: &KeyEvent);

    /// Advances timers, network and layout for every view.
    fn update(&mut self);

    fn refresh_display(&mut self, display_id: u32);

    /// Paints every view that needs it.
    fn render(&mut self);

    fn surface_info(&self, surface: RawSurface) -> Option<SurfaceInfo>;

    /// Locks the surface pixels for the duration of `f`. Returns false if the surface could not
    /// be locked, in which case `f` is not called.
    fn with_pixels(&mut self, surface: RawSurface, f: &mut dyn FnMut(&[u8])) -> bool;

    fn clear_dirty_bounds(&mut self, surface: RawSurface);

    /// Current script context of the page, if one exists yet.
    fn script_context(&mut self, view: RawView) -> Option<ScriptContext>;

    /// Installs [`NATIVE_FUNCTION`](crate::messages::NATIVE_FUNCTION) and its namespace alias
    /// into the current page.
    fn install_native_function(&mut self, view: RawView) -> bool;

    /// Routes console output of `view` into `sink`.
    fn set_console_sink(&mut self, view: RawView, sink: Arc<MessageQueue>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_bounds_emptiness() {
        assert!(DirtyBounds::default().is_empty());
        assert!(!DirtyBounds::full(4, 4).is_empty());
        assert!(DirtyBounds { left: 3, top: 0, right: 3, bottom: 10 }.is_empty());
    }
}
