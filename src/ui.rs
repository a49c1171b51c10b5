//! Host-side view wrapper for a game loop.
//!
//! An [`HtmlView`] owns an RGBA texture and forwards one [`InputSample`] per frame: mouse and
//! wheel only while the cursor is inside the view's screen bounds, keyboard only while the
//! view has focus. Clicking a view focuses it. A view with empty bounds is hidden; it still
//! drains its messages but gets no input and no pixel copies.

use crate::bridge::Bridge;
use crate::errors::BridgeError;
use crate::input::{KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind, ScrollEvent, ScrollEventKind};
use crate::messages::NATIVE_FUNCTION;
use crate::pixels::{rgba_len, PixelUpdate};
use crate::slot::{PendingContent, ViewHandle};
use crate::vfs::normalize;
use crate::viewport::Viewport;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Pixels scrolled per wheel notch.
const WHEEL_PIXELS: f32 = 100.0;

/// Windows virtual key codes for common keys.
pub mod vk {
    pub const BACK: i32 = 0x08;
    pub const TAB: i32 = 0x09;
    pub const RETURN: i32 = 0x0D;
    pub const SHIFT: i32 = 0x10;
    pub const CONTROL: i32 = 0x11;
    pub const MENU: i32 = 0x12;
    pub const ESCAPE: i32 = 0x1B;
    pub const SPACE: i32 = 0x20;
    pub const PRIOR: i32 = 0x21;
    pub const NEXT: i32 = 0x22;
    pub const END: i32 = 0x23;
    pub const HOME: i32 = 0x24;
    pub const LEFT: i32 = 0x25;
    pub const UP: i32 = 0x26;
    pub const RIGHT: i32 = 0x27;
    pub const DOWN: i32 = 0x28;
    pub const INSERT: i32 = 0x2D;
    pub const DELETE: i32 = 0x2E;
    /// `A`; letters follow in order.
    pub const A: i32 = 0x41;
    /// `0`; digits follow in order.
    pub const DIGIT0: i32 = 0x30;
    pub const F1: i32 = 0x70;
}

/// Input state sampled by the host once per frame.
#[derive(Debug, Clone, Default)]
pub struct InputSample {
    /// Cursor position in screen coordinates.
    pub cursor: (i32, i32),
    pub left: bool,
    pub middle: bool,
    pub right: bool,
    /// Vertical wheel movement in notches, positive away from the user.
    pub wheel: f32,
    /// Modifiers held this frame.
    pub modifiers: Modifiers,
    /// Virtual keys that went down this frame.
    pub pressed: Vec<i32>,
    /// Virtual keys that went up this frame.
    pub released: Vec<i32>,
    /// Text typed this frame, already mapped by the OS layout.
    pub chars: String,
}

/// Decodes a page message: JSON for object and array payloads, a plain string otherwise.
/// Empty messages decode to `Null`.
pub fn parse_message(msg: &str) -> Result<serde_json::Value, serde_json::Error> {
    let msg = msg.trim();
    if msg.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    let structured = (msg.starts_with('{') && msg.ends_with('}')) || (msg.starts_with('[') && msg.ends_with(']'));
    if structured {
        serde_json::from_str(msg)
    } else {
        Ok(serde_json::Value::String(msg.to_owned()))
    }
}

/// Script that hands `json` to `window.bridge.receive` if the page defines it.
pub fn receive_script(json: &str) -> Result<String, serde_json::Error> {
    // Encoding the JSON text as a string literal escapes quotes, backslashes and newlines.
    let literal = serde_json::to_string(json)?;
    Ok(format!(
        "if(window.bridge&&typeof window.bridge.receive==='function')window.bridge.receive(JSON.parse({literal}));"
    ))
}

fn helper_script() -> String {
    format!(
        "if(typeof window.{f}==='function'){{window.bridge=window.bridge||{{}};\
         window.bridge.send=function(m){{window.{f}(typeof m==='string'?m:JSON.stringify(m));}};}}",
        f = NATIVE_FUNCTION
    )
}

type MessageHandler = Box<dyn FnMut(&str) + Send>;

pub struct HtmlView {
    bridge: Arc<Bridge>,
    handle: Option<ViewHandle>,
    width: u32,
    height: u32,
    bounds: Viewport,
    texture: Vec<u8>,
    cursor: Option<(i32, i32)>,
    buttons: [bool; 3],
    ready: bool,
    helper_injected: bool,
    on_message: Option<MessageHandler>,
}

impl std::fmt::Debug for HtmlView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlView")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bounds", &self.bounds)
            .field("ready", &self.ready)
            .finish()
    }
}

impl HtmlView {
    fn wrap(bridge: Arc<Bridge>, handle: ViewHandle, width: u32, height: u32) -> Self {
        log::debug!("ui: wrapped {handle} ({width}x{height})");
        Self {
            bridge,
            handle: Some(handle),
            width,
            height,
            bounds: Viewport::new(0, 0, width, height),
            texture: vec![0; rgba_len(width, height)],
            cursor: None,
            buttons: [false; 3],
            ready: false,
            helper_injected: false,
            on_message: None,
        }
    }

    /// Creates a view showing `html`, in a single worker round trip.
    pub fn from_html(bridge: Arc<Bridge>, width: u32, height: u32, html: &str) -> Result<Self, BridgeError> {
        let handle = bridge.create_view_with_html(width, height, html)?;
        Ok(Self::wrap(bridge, handle, width, height))
    }

    /// Creates a view that loads `html` over the next ticks. See [`HtmlView::is_ready`].
    pub fn from_html_async(bridge: Arc<Bridge>, width: u32, height: u32, html: &str) -> Result<Self, BridgeError> {
        let handle = bridge.create_view_async(width, height, PendingContent::Html(html.to_owned()))?;
        Ok(Self::wrap(bridge, handle, width, height))
    }

    /// Creates a view showing the HTML file at `path`.
    pub fn from_file<P: AsRef<Path>>(bridge: Arc<Bridge>, width: u32, height: u32, path: P) -> Result<Self, BridgeError> {
        let html = std::fs::read_to_string(path.as_ref())?;
        Self::from_html(bridge, width, height, &html)
    }

    pub fn from_url(bridge: Arc<Bridge>, width: u32, height: u32, url: &str) -> Result<Self, BridgeError> {
        let url = url::Url::parse(url)?;
        let handle = bridge.create_view_with_url(width, height, url.as_str())?;
        Ok(Self::wrap(bridge, handle, width, height))
    }

    /// Registers every file under `dir` in the VFS and opens `main_file` (relative to `dir`).
    pub fn from_dir<P: AsRef<Path>>(
        bridge: Arc<Bridge>,
        width: u32,
        height: u32,
        dir: P,
        main_file: &str,
    ) -> Result<Self, BridgeError> {
        let url = Self::register_tree(&bridge, dir.as_ref(), main_file)?;
        let handle = bridge.create_view_with_url(width, height, &url)?;
        Ok(Self::wrap(bridge, handle, width, height))
    }

    /// Deferred-load counterpart of [`HtmlView::from_dir`].
    pub fn from_dir_async<P: AsRef<Path>>(
        bridge: Arc<Bridge>,
        width: u32,
        height: u32,
        dir: P,
        main_file: &str,
    ) -> Result<Self, BridgeError> {
        let url = Self::register_tree(&bridge, dir.as_ref(), main_file)?;
        let handle = bridge.create_view_async(width, height, PendingContent::Url(url))?;
        Ok(Self::wrap(bridge, handle, width, height))
    }

    fn register_tree(bridge: &Bridge, dir: &Path, main_file: &str) -> Result<String, BridgeError> {
        let count = bridge.vfs().register_dir(dir)?;
        log::info!("ui: registered {count} files from {}", dir.display());
        let main = normalize(main_file);
        if main.is_empty() {
            return Err(BridgeError::InvalidArgument("empty main file".into()));
        }
        Ok(format!("file:///{main}"))
    }

    pub fn handle(&self) -> Option<ViewHandle> {
        self.handle
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// RGBA pixels of the last copied frame, `width * height * 4` bytes.
    pub fn texture(&self) -> &[u8] {
        &self.texture
    }

    pub fn bounds(&self) -> Viewport {
        self.bounds
    }

    /// Screen rectangle used for mouse routing. `(0, 0, 0, 0)` hides the view. Any other bounds
    /// with a zero width or height route input from the whole screen, in screen coordinates.
    pub fn set_bounds(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.bounds = Viewport::new(x, y, width, height);
    }

    pub fn is_hidden(&self) -> bool {
        self.bounds.is_hidden()
    }

    /// Called with every message the page sends. Use [`parse_message`] to decode it.
    pub fn on_message<F: FnMut(&str) + Send + 'static>(&mut self, handler: F) {
        self.on_message = Some(Box::new(handler));
    }

    /// Gives this view keyboard focus, taking it from any other view.
    pub fn set_focus(&self) {
        if let Some(handle) = self.handle {
            self.bridge.set_focus(Some(handle));
        }
    }

    pub fn has_focus(&self) -> bool {
        self.handle.is_some_and(|h| self.bridge.has_focus(h))
    }

    /// Ticks the bridge, then runs [`HtmlView::update_no_tick`]. With several views, call
    /// [`Bridge::tick`] once per frame and `update_no_tick` on each view instead.
    ///
    /// Returns true when the texture changed.
    pub fn update(&mut self, input: &InputSample) -> Result<bool, BridgeError> {
        if self.handle.is_none() {
            return Ok(false);
        }
        self.bridge.tick()?;
        self.update_no_tick(input)
    }

    pub fn update_no_tick(&mut self, input: &InputSample) -> Result<bool, BridgeError> {
        let Some(handle) = self.handle else {
            return Ok(false);
        };

        while let Some(msg) = self.bridge.next_message(handle) {
            match self.on_message.as_mut() {
                Some(handler) => handler(&msg),
                None => log::debug!("ui: {handle} message without handler: {msg}"),
            }
        }

        if !self.ready && self.bridge.is_ready(handle) {
            self.ready = true;
        }
        if self.ready && !self.helper_injected {
            self.helper_injected = self.bridge.eval_js(handle, &helper_script());
        }

        if self.is_hidden() {
            return Ok(false);
        }
        if self.ready {
            self.forward_input(handle, input);
        }

        Ok(match self.bridge.copy_pixels(handle, &mut self.texture) {
            PixelUpdate::Updated => true,
            PixelUpdate::NoUpdate => false,
            PixelUpdate::Rejected => {
                log::debug!("ui: {handle} pixel copy rejected");
                false
            }
        })
    }

    fn forward_input(&mut self, handle: ViewHandle, input: &InputSample) {
        let (cx, cy) = input.cursor;
        if self.bounds.contains(cx, cy) {
            let (x, y) = self.bounds.to_local(cx, cy);

            if input.left && !self.buttons[0] {
                self.bridge.set_focus(Some(handle));
            }

            if self.cursor != Some((x, y)) {
                self.cursor = Some((x, y));
                self.bridge.fire_mouse(handle, MouseEvent::new(MouseEventKind::Moved, x, y, MouseButton::None));
            }

            let states = [
                (input.left, MouseButton::Left),
                (input.middle, MouseButton::Middle),
                (input.right, MouseButton::Right),
            ];
            for (i, (down, button)) in states.into_iter().enumerate() {
                if down == self.buttons[i] {
                    continue;
                }
                self.buttons[i] = down;
                let kind = if down { MouseEventKind::Down } else { MouseEventKind::Up };
                self.bridge.fire_mouse(handle, MouseEvent::new(kind, x, y, button));
            }

            if input.wheel != 0.0 {
                let dy = (input.wheel * WHEEL_PIXELS) as i32;
                self.bridge.fire_scroll(handle, ScrollEvent { kind: ScrollEventKind::ByPixel, dx: 0, dy });
            }
        }

        if self.bridge.has_focus(handle) {
            self.forward_keyboard(handle, input);
        }
    }

    fn forward_keyboard(&self, handle: ViewHandle, input: &InputSample) {
        let max = self.bridge.config().queues.key_text_len;
        for &key in &input.pressed {
            let event = KeyEvent::new(KeyEventKind::RawKeyDown, key, input.modifiers, "", max);
            self.bridge.fire_key(handle, event);
        }
        let mut buf = [0u8; 4];
        for c in input.chars.chars() {
            let event = KeyEvent::new(KeyEventKind::Char, 0, Modifiers::empty(), c.encode_utf8(&mut buf), max);
            self.bridge.fire_key(handle, event);
        }
        for &key in &input.released {
            let event = KeyEvent::new(KeyEventKind::KeyUp, key, input.modifiers, "", max);
            self.bridge.fire_key(handle, event);
        }
    }

    /// Queues `script` for the next tick.
    pub fn eval(&self, script: &str) -> bool {
        self.handle.is_some_and(|h| self.bridge.eval_js(h, script))
    }

    /// Sends `data` to the page's `window.bridge.receive` handler as JSON.
    pub fn send<T: Serialize>(&self, data: &T) -> Result<(), BridgeError> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let json = serde_json::to_string(data)?;
        if !self.bridge.eval_js(handle, &receive_script(&json)?) {
            log::warn!("ui: {handle} script queue full, message dropped");
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_some_and(|h| self.bridge.is_ready(h))
    }

    /// Destroys the view. Later calls on this wrapper do nothing.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        match self.handle.take() {
            Some(handle) => self.bridge.destroy_view(handle),
            None => Ok(()),
        }
    }

    pub async fn close_async(&mut self) -> Result<(), BridgeError> {
        match self.handle.take() {
            Some(handle) => self.bridge.destroy_view_async(handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for HtmlView {
    fn drop(&mut self) {
        let Some(handle) = self.handle else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            log::warn!("ui: {handle} dropped inside a runtime without close_async; view leaks until shutdown");
            return;
        }
        if let Err(e) = self.close() {
            log::debug!("ui: closing {handle} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::engine::headless::{self, HeadlessOptions, HeadlessProbe, ProbeEvent};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn bridge() -> (Arc<Bridge>, HeadlessProbe) {
        let probe = HeadlessProbe::default();
        let config = BridgeConfig::builder()
            .settle_passes(1)
            .settle_interval(Duration::ZERO)
            .build()
            .unwrap();
        let factory = headless::factory(HeadlessOptions::default(), probe.clone());
        let bridge = Bridge::start_with_factory(config, factory).unwrap();
        (Arc::new(bridge), probe)
    }

    fn mouse_events(probe: &HeadlessProbe) -> Vec<MouseEvent> {
        probe
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProbeEvent::Mouse { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parse_message_variants() {
        assert_eq!(parse_message("").unwrap(), serde_json::Value::Null);
        assert_eq!(parse_message("  hello ").unwrap(), json!("hello"));
        assert_eq!(parse_message(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(parse_message("[1,2]").unwrap(), json!([1, 2]));
        assert!(parse_message("{broken}").is_err());
    }

    #[test]
    fn receive_script_escapes_payload() {
        let script = receive_script(r#"{"a":"x\"y"}"#).unwrap();
        assert_eq!(
            script,
            r#"if(window.bridge&&typeof window.bridge.receive==='function')window.bridge.receive(JSON.parse("{\"a\":\"x\\\"y\"}"));"#
        );
    }

    #[test]
    fn texture_updates_only_on_change() {
        let (bridge, _) = bridge();
        let mut view = HtmlView::from_html(bridge.clone(), 32, 16, "<p>hi</p>").unwrap();
        let idle = InputSample::default();

        assert!(view.update(&idle).unwrap());
        assert!(view.texture().iter().any(|&b| b != 0));
        // The helper script injected on the first frame repaints once.
        assert!(view.update(&idle).unwrap());
        assert!(!view.update(&idle).unwrap());

        view.close().unwrap();
        assert_eq!(bridge.view_count(), 0);
        assert!(!view.update(&idle).unwrap());
    }

    #[test]
    fn mouse_is_routed_through_bounds() {
        let (bridge, probe) = bridge();
        let mut view = HtmlView::from_html(bridge.clone(), 64, 64, "<p>hi</p>").unwrap();
        view.set_bounds(100, 50, 64, 64);

        let outside = InputSample { cursor: (10, 10), left: true, ..Default::default() };
        view.update(&outside).unwrap();
        view.update(&outside).unwrap();
        assert!(mouse_events(&probe).is_empty());
        assert!(!view.has_focus());

        probe.clear_events();
        let click = InputSample { cursor: (110, 60), left: true, ..Default::default() };
        view.update(&click).unwrap();
        view.update(&InputSample { left: false, ..click.clone() }).unwrap();
        view.update(&InputSample::default()).unwrap();

        let events = mouse_events(&probe);
        assert_eq!(events[0], MouseEvent::new(MouseEventKind::Moved, 10, 10, MouseButton::None));
        assert_eq!(events[1], MouseEvent::new(MouseEventKind::Down, 10, 10, MouseButton::Left));
        assert_eq!(events[2], MouseEvent::new(MouseEventKind::Up, 10, 10, MouseButton::Left));
        assert!(view.has_focus());
    }

    #[test]
    fn zero_area_bounds_route_the_whole_screen() {
        let (bridge, probe) = bridge();
        let mut view = HtmlView::from_html(bridge.clone(), 64, 64, "<p>hi</p>").unwrap();
        view.set_bounds(10, 10, 0, 0);
        assert!(!view.is_hidden());

        view.update(&InputSample::default()).unwrap();
        view.update(&InputSample::default()).unwrap();
        probe.clear_events();
        let sample = InputSample { cursor: (3, 4), ..Default::default() };
        view.update(&sample).unwrap();
        view.update(&sample).unwrap();
        assert_eq!(
            mouse_events(&probe),
            vec![MouseEvent::new(MouseEventKind::Moved, 3, 4, MouseButton::None)]
        );
    }

    #[test]
    fn keyboard_follows_focus() {
        let (bridge, probe) = bridge();
        let mut a = HtmlView::from_html(bridge.clone(), 16, 16, "a").unwrap();
        let mut b = HtmlView::from_html(bridge.clone(), 16, 16, "b").unwrap();
        a.set_bounds(0, 0, 16, 16);
        b.set_bounds(100, 0, 16, 16);
        b.set_focus();

        let typing = InputSample { cursor: (500, 500), chars: "x".into(), ..Default::default() };
        bridge.tick().unwrap();
        a.update_no_tick(&typing).unwrap();
        b.update_no_tick(&typing).unwrap();
        bridge.tick().unwrap();

        let keys: Vec<_> = probe
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProbeEvent::Key { view, event, .. } => Some((view, event)),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].1.text, "x");
        assert_eq!(keys[0].1.kind, KeyEventKind::Char);
        assert!(b.has_focus());
        assert!(!a.has_focus());
    }

    #[test]
    fn hidden_view_still_drains_messages() {
        let (bridge, _) = bridge();
        let mut view = HtmlView::from_html(bridge.clone(), 16, 16, "<p>hi</p>").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        view.on_message(move |m| sink.lock().unwrap().push(m.to_owned()));
        view.set_bounds(0, 0, 0, 0);

        view.eval(r#"bridge.send("ping")"#);
        let idle = InputSample::default();
        assert!(!view.update(&idle).unwrap());
        assert!(!view.update(&idle).unwrap());

        assert_eq!(*seen.lock().unwrap(), vec!["ping".to_string()]);
    }

    #[test]
    fn from_dir_loads_main_file_through_vfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<img src=\"logo.png\">").unwrap();
        std::fs::write(dir.path().join("logo.png"), [1u8, 2, 3]).unwrap();

        let (bridge, probe) = bridge();
        let view = HtmlView::from_dir(bridge.clone(), 16, 16, dir.path(), "index.html").unwrap();
        assert_eq!(bridge.file_count(), 2);
        assert!(probe.events().iter().any(|e| matches!(
            e,
            ProbeEvent::LoadUrl { url, .. } if url == "file:///index.html"
        )));
        assert!(view.is_ready());
    }

    #[test]
    fn from_url_rejects_garbage() {
        let (bridge, _) = bridge();
        let err = HtmlView::from_url(bridge, 16, 16, "not a url").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidUrl(_)));
    }
}
