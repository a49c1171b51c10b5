//! Software engine without a real page renderer.
//!
//! Paints a deterministic BGRA pattern per view, understands a small set of script calls
//! (`console.log(...)`, the native message function, JSON literals) and resolves `file:///`
//! loads through the [`FileProvider`](crate::vfs::FileProvider). Every call is recorded in a
//! [`HeadlessProbe`] so tests can check what the worker did and in which order.

use crate::config::BridgeConfig;
use crate::engine::{
    DirtyBounds, Engine, EngineFactory, EngineHooks, RawSurface, RawView, ScriptContext,
    SurfaceInfo, ViewHandles,
};
use crate::errors::BridgeError;
use crate::input::{KeyEvent, MouseEvent, MouseEventKind, ScrollEvent};
use crate::messages::NATIVE_FUNCTION;
use crate::pixels::RawFrame;
use crate::queue::MessageQueue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Filler written into row padding.
pub const PADDING_BYTE: u8 = 0xEE;

#[derive(Debug, Clone, Default)]
pub struct HeadlessOptions {
    /// Engine creation fails with [`BridgeError::RendererCreation`].
    pub fail_init: bool,
    /// Every view creation fails.
    pub fail_create: bool,
    /// Time spent inside each `update()`.
    pub update_delay: Duration,
    /// Extra bytes at the end of each pixel row.
    pub row_padding: u32,
    /// Updates needed after a load before the page has a script context.
    pub script_context_delay: u32,
    /// Bytes withheld from the end of a locked pixel buffer.
    pub short_pixels: usize,
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    ViewCreated { view: RawView, width: u32, height: u32 },
    ViewDestroyed { view: RawView },
    Focus { view: RawView },
    LoadHtml { view: RawView, html: String },
    LoadUrl { view: RawView, url: String },
    FileOpened { path: String, found: bool },
    Mouse { view: RawView, event: MouseEvent },
    Scroll { view: RawView, event: ScrollEvent },
    Key { view: RawView, engine_kind: u32, event: KeyEvent },
    Script { view: RawView, script: String },
    BindingsInstalled { view: RawView },
    Update,
    RefreshDisplay,
    Render,
}

#[derive(Debug, Default)]
struct ProbeState {
    events: Vec<ProbeEvent>,
    update_spans: Vec<(Instant, Instant)>,
    frames: HashMap<RawView, RawFrame>,
    locks: usize,
    unlocks: usize,
    engines_created: usize,
    engines_dropped: usize,
}

/// Shared recorder for a [`HeadlessEngine`]. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl HeadlessProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: ProbeEvent) {
        self.lock().events.push(event);
    }

    pub fn events(&self) -> Vec<ProbeEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Start and end of every `update()` call.
    pub fn update_spans(&self) -> Vec<(Instant, Instant)> {
        self.lock().update_spans.clone()
    }

    /// Last frame painted for `view`.
    pub fn last_frame(&self, view: RawView) -> Option<RawFrame> {
        self.lock().frames.get(&view).cloned()
    }

    /// Pixel locks and unlocks seen so far.
    pub fn lock_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.locks, state.unlocks)
    }

    pub fn engines_created(&self) -> usize {
        self.lock().engines_created
    }

    pub fn engines_dropped(&self) -> usize {
        self.lock().engines_dropped
    }
}

/// Factory for the bridge.
pub fn factory(options: HeadlessOptions, probe: HeadlessProbe) -> EngineFactory {
    Arc::new(move |_config: &BridgeConfig, hooks: EngineHooks| -> Result<Box<dyn Engine>, BridgeError> {
        if options.fail_init {
            return Err(BridgeError::RendererCreation);
        }
        probe.lock().engines_created += 1;
        Ok(Box::new(HeadlessEngine::new(hooks, options.clone(), probe.clone())))
    })
}

#[derive(Debug)]
struct HeadlessView {
    width: u32,
    height: u32,
    row_bytes: u32,
    pixels: Vec<u8>,
    dirty: DirtyBounds,
    needs_paint: bool,
    generation: u32,
    document: String,
    scroll_y: i32,
    context: Option<ScriptContext>,
    /// Updates left before the script context appears.
    context_countdown: u32,
    native_installed: bool,
    console: Option<Arc<MessageQueue>>,
}

pub struct HeadlessEngine {
    hooks: EngineHooks,
    options: HeadlessOptions,
    probe: HeadlessProbe,
    views: HashMap<RawView, HeadlessView>,
    next_view: usize,
    next_context: usize,
}

impl HeadlessEngine {
    pub fn new(hooks: EngineHooks, options: HeadlessOptions, probe: HeadlessProbe) -> Self {
        Self {
            hooks,
            options,
            probe,
            views: HashMap::new(),
            next_view: 1,
            next_context: 1,
        }
    }

    fn new_context(&mut self) -> ScriptContext {
        let ctx = ScriptContext(self.next_context);
        self.next_context += 1;
        ctx
    }

    /// A load replaces the page and with it the script context.
    fn begin_document(&mut self, view: RawView, document: String) {
        let delay = self.options.script_context_delay;
        let context = (delay == 0).then(|| self.new_context());
        if let Some(v) = self.views.get_mut(&view) {
            v.document = document;
            v.context = context;
            v.context_countdown = delay;
            v.native_installed = false;
            v.scroll_y = 0;
            v.needs_paint = true;
        }
    }

    fn open_file(&self, path: &str) -> Option<Arc<[u8]>> {
        let bytes = self.hooks.files.open(path);
        self.probe.record(ProbeEvent::FileOpened { path: path.to_owned(), found: bytes.is_some() });
        bytes
    }

    /// Loads the sub-resources referenced through `src="..."` and `href="..."`.
    fn load_subresources(&self, base: &str, document: &str) {
        let dir = base.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        for attr in ["src=\"", "href=\""] {
            let mut rest = document;
            while let Some(start) = rest.find(attr) {
                rest = &rest[start + attr.len()..];
                let Some(end) = rest.find('"') else { break };
                let target = &rest[..end];
                rest = &rest[end..];

                if target.is_empty() || target.contains("://") || target.starts_with('#') {
                    continue;
                }
                let path = match target.strip_prefix('/') {
                    Some(abs) => abs.to_owned(),
                    None if dir.is_empty() => target.to_owned(),
                    None => format!("{dir}/{target}"),
                };
                self.open_file(&path);
            }
        }
    }

    fn paint(view: &mut HeadlessView) {
        let seed = view
            .document
            .bytes()
            .fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
        let row_bytes = view.row_bytes as usize;
        let packed = view.width as usize * 4;
        if row_bytes == 0 {
            return;
        }

        for (y, row) in view.pixels.chunks_exact_mut(row_bytes).enumerate() {
            let (px, padding) = row.split_at_mut(packed);
            for (x, p) in px.chunks_exact_mut(4).enumerate() {
                p[0] = (x as u32).wrapping_add(view.generation) as u8;
                p[1] = (y as i32).wrapping_add(view.scroll_y) as u8;
                p[2] = seed;
                p[3] = 0xFF;
            }
            padding.fill(PADDING_BYTE);
        }
        view.generation = view.generation.wrapping_add(1);
        view.dirty = DirtyBounds::full(view.width, view.height);
        view.needs_paint = false;
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        self.probe.lock().engines_dropped += 1;
    }
}

/// Splits `name(arg)` into its parts.
fn parse_call(script: &str) -> Option<(&str, &str)> {
    let script = script.trim().trim_end_matches(';').trim_end();
    let open = script.find('(')?;
    let args = script[open + 1..].strip_suffix(')')?;
    Some((script[..open].trim(), args.trim()))
}

/// Text form of a script argument: strings as-is, everything else as JSON.
fn argument_text(arg: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arg) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => arg.to_owned(),
    }
}

impl Engine for HeadlessEngine {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_view(&mut self, width: u32, height: u32) -> Result<ViewHandles, BridgeError> {
        if self.options.fail_create {
            return Err(BridgeError::ViewCreation);
        }
        let raw = RawView(self.next_view);
        self.next_view += 1;

        let row_bytes = width * 4 + self.options.row_padding;
        let context = self.new_context();
        self.views.insert(
            raw,
            HeadlessView {
                width,
                height,
                row_bytes,
                pixels: vec![0; row_bytes as usize * height as usize],
                dirty: DirtyBounds::default(),
                needs_paint: true,
                generation: 0,
                document: String::new(),
                scroll_y: 0,
                context: Some(context),
                context_countdown: 0,
                native_installed: false,
                console: None,
            },
        );
        self.probe.record(ProbeEvent::ViewCreated { view: raw, width, height });
        Ok(ViewHandles { view: raw, surface: RawSurface(raw.0) })
    }

    fn destroy_view(&mut self, handles: ViewHandles) {
        if self.views.remove(&handles.view).is_some() {
            self.probe.record(ProbeEvent::ViewDestroyed { view: handles.view });
        }
    }

    fn load_html(&mut self, view: RawView, html: &str) {
        self.probe.record(ProbeEvent::LoadHtml { view, html: html.to_owned() });
        self.begin_document(view, html.to_owned());
    }

    fn load_url(&mut self, view: RawView, url: &str) {
        self.probe.record(ProbeEvent::LoadUrl { view, url: url.to_owned() });
        let document = match url.strip_prefix("file:///") {
            Some(path) => match self.open_file(path) {
                Some(bytes) => {
                    let doc = String::from_utf8_lossy(&bytes).into_owned();
                    self.load_subresources(path, &doc);
                    doc
                }
                None => String::new(),
            },
            None => url.to_owned(),
        };
        self.begin_document(view, document);
    }

    fn focus(&mut self, view: RawView) {
        self.probe.record(ProbeEvent::Focus { view });
    }

    fn evaluate_script(&mut self, view: RawView, script: &str) -> Option<String> {
        self.probe.record(ProbeEvent::Script { view, script: script.to_owned() });
        let v = self.views.get_mut(&view)?;
        v.needs_paint = true;

        if let Some((name, arg)) = parse_call(script) {
            let name = name.trim_start_matches("window.");
            if name == "console.log" {
                if let Some(console) = &v.console {
                    console.push(&argument_text(arg));
                }
                return None;
            }
            if name == NATIVE_FUNCTION || name == "bridge.send" {
                if let (true, Some(ctx)) = (v.native_installed, v.context) {
                    self.hooks.native.dispatch(ctx, &argument_text(arg));
                }
                return None;
            }
            return None;
        }

        serde_json::from_str::<serde_json::Value>(script.trim())
            .ok()
            .map(|value| match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
    }

    fn fire_mouse(&mut self, view: RawView, event: &MouseEvent) {
        self.probe.record(ProbeEvent::Mouse { view, event: *event });
        if let Some(v) = self.views.get_mut(&view) {
            if event.kind != MouseEventKind::Moved {
                v.needs_paint = true;
            }
        }
    }

    fn fire_scroll(&mut self, view: RawView, event: &ScrollEvent) {
        self.probe.record(ProbeEvent::Scroll { view, event: *event });
        if let Some(v) = self.views.get_mut(&view) {
            v.scroll_y = v.scroll_y.wrapping_add(event.dy);
            v.needs_paint = true;
        }
    }

    fn fire_key(&mut self, view: RawView, event: &KeyEvent) {
        self.probe.record(ProbeEvent::Key {
            view,
            engine_kind: event.kind.engine_code(),
            event: event.clone(),
        });
        if let Some(v) = self.views.get_mut(&view) {
            v.needs_paint = true;
        }
    }

    fn update(&mut self) {
        let start = Instant::now();
        if !self.options.update_delay.is_zero() {
            std::thread::sleep(self.options.update_delay);
        }

        let mut pending = Vec::new();
        for (raw, v) in self.views.iter_mut() {
            if v.context.is_none() {
                v.context_countdown = v.context_countdown.saturating_sub(1);
                if v.context_countdown == 0 {
                    pending.push(*raw);
                }
            }
        }
        for raw in pending {
            let ctx = self.new_context();
            if let Some(v) = self.views.get_mut(&raw) {
                v.context = Some(ctx);
            }
        }

        let mut state = self.probe.lock();
        state.update_spans.push((start, Instant::now()));
        state.events.push(ProbeEvent::Update);
    }

    fn refresh_display(&mut self, _display_id: u32) {
        self.probe.record(ProbeEvent::RefreshDisplay);
    }

    fn render(&mut self) {
        for (raw, v) in self.views.iter_mut() {
            if v.needs_paint {
                Self::paint(v);
                let frame = RawFrame {
                    width: v.width,
                    height: v.height,
                    row_bytes: v.row_bytes,
                    bytes: v.pixels.clone(),
                };
                self.probe.lock().frames.insert(*raw, frame);
            }
        }
        self.probe.record(ProbeEvent::Render);
    }

    fn surface_info(&self, surface: RawSurface) -> Option<SurfaceInfo> {
        let v = self.views.get(&RawView(surface.0))?;
        Some(SurfaceInfo { width: v.width, height: v.height, row_bytes: v.row_bytes, dirty: v.dirty })
    }

    fn with_pixels(&mut self, surface: RawSurface, f: &mut dyn FnMut(&[u8])) -> bool {
        struct Unlock<'a>(&'a HeadlessProbe);
        impl Drop for Unlock<'_> {
            fn drop(&mut self) {
                self.0.lock().unlocks += 1;
            }
        }

        let Some(v) = self.views.get(&RawView(surface.0)) else {
            return false;
        };
        self.probe.lock().locks += 1;
        let _unlock = Unlock(&self.probe);
        let len = v.pixels.len().saturating_sub(self.options.short_pixels);
        f(&v.pixels[..len]);
        true
    }

    fn clear_dirty_bounds(&mut self, surface: RawSurface) {
        if let Some(v) = self.views.get_mut(&RawView(surface.0)) {
            v.dirty = DirtyBounds::default();
        }
    }

    fn script_context(&mut self, view: RawView) -> Option<ScriptContext> {
        self.views.get(&view)?.context
    }

    fn install_native_function(&mut self, view: RawView) -> bool {
        let Some(v) = self.views.get_mut(&view) else {
            return false;
        };
        if v.context.is_none() {
            return false;
        }
        v.native_installed = true;
        self.probe.record(ProbeEvent::BindingsInstalled { view });
        true
    }

    fn set_console_sink(&mut self, view: RawView, sink: Arc<MessageQueue>) {
        if let Some(v) = self.views.get_mut(&view) {
            v.console = Some(sink);
        }
    }
}
