//! Ultralight engine, bound at runtime through [`capi`].
//!
//! Views are CPU rendered into BGRA surfaces. The SDK has process-wide platform hooks (file
//! system, clipboard) and plain C callbacks, so the services they need are parked in statics
//! for as long as an engine is alive. Only one Ultralight renderer may exist per process.

pub mod capi;

use crate::config::BridgeConfig;
use crate::engine::{
    DirtyBounds, Engine, EngineFactory, EngineHooks, RawSurface, RawView, ScriptContext, SurfaceInfo, ViewHandles,
};
use crate::errors::BridgeError;
use crate::input::{KeyEvent, MouseEvent, ScrollEvent};
use crate::messages::{NativeRouter, NAMESPACE_SCRIPT};
use crate::queue::MessageQueue;
use crate::vfs::FileProvider;
use capi::{Capabilities, JSContextRef, JSObjectRef, JSValueRef, ULBuffer, ULClipboard, ULFileSystem, ULString, ULView};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, RwLock};

const NATIVE_FUNCTION_C: &[u8] = b"__bridgeSend\0";

static HOOKS: RwLock<Option<EngineHooks>> = RwLock::new(None);
static CLIPBOARD: Mutex<String> = Mutex::new(String::new());

fn files() -> Option<Arc<dyn FileProvider>> {
    let guard = HOOKS.read().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map(|h| h.files.clone())
}

fn native_router() -> Option<Arc<NativeRouter>> {
    let guard = HOOKS.read().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map(|h| h.native.clone())
}

fn set_hooks(hooks: Option<EngineHooks>) {
    *HOOKS.write().unwrap_or_else(|e| e.into_inner()) = hooks;
}

/// Engine factory used by [`Bridge::start`](crate::bridge::Bridge::start).
pub fn factory() -> EngineFactory {
    Arc::new(|config: &BridgeConfig, hooks: EngineHooks| -> Result<Box<dyn Engine>, BridgeError> {
        Ok(Box::new(UltralightEngine::new(config, hooks)?))
    })
}

struct ViewEntry {
    view: ULView,
    surface: capi::ULSurface,
    /// Target of the console callback. Boxed so the pointer handed to the SDK stays put.
    console: Option<Box<Arc<MessageQueue>>>,
}

pub struct UltralightEngine {
    api: &'static Capabilities,
    renderer: capi::ULRenderer,
    views: HashMap<RawView, ViewEntry>,
}

impl UltralightEngine {
    pub fn new(config: &BridgeConfig, hooks: EngineHooks) -> Result<Self, BridgeError> {
        let api = capi::load(&config.base_dir)?;
        set_hooks(Some(hooks));

        // SAFETY: all calls go through the resolved table; strings are released after use.
        let renderer = unsafe {
            if config.debug {
                let path = config.base_dir.join("ultralight.log");
                let s = api.string(&path.to_string_lossy());
                (api.enable_default_logger)(s);
                (api.destroy_string)(s);
            }
            (api.enable_platform_font_loader)();
            (api.platform_set_file_system)(ULFileSystem {
                file_exists: Some(fs_file_exists),
                get_file_mime_type: Some(fs_mime_type),
                get_file_charset: Some(fs_charset),
                open_file: Some(fs_open_file),
            });
            (api.platform_set_clipboard)(ULClipboard {
                clear: Some(clipboard_clear),
                read_plain_text: Some(clipboard_read),
                write_plain_text: Some(clipboard_write),
            });

            let cfg = (api.create_config)();
            let prefix = api.string("/");
            (api.config_set_resource_path_prefix)(cfg, prefix);
            (api.destroy_string)(prefix);
            let renderer = (api.create_renderer)(cfg);
            (api.destroy_config)(cfg);
            renderer
        };

        if renderer.is_null() {
            set_hooks(None);
            return Err(BridgeError::RendererCreation);
        }

        log::info!("ultralight {} renderer created", api.version());
        Ok(Self { api, renderer, views: HashMap::new() })
    }

    fn view(&self, view: RawView) -> Option<ULView> {
        self.views.get(&view).map(|e| e.view)
    }

    fn surface(&self, surface: RawSurface) -> Option<capi::ULSurface> {
        self.views.values().find(|e| e.surface as usize == surface.0).map(|e| e.surface)
    }
}

/// Holds a view's script context locked until dropped.
struct ContextLock<'a> {
    api: &'a Capabilities,
    view: ULView,
    ctx: JSContextRef,
}

impl<'a> ContextLock<'a> {
    fn acquire(api: &'a Capabilities, view: ULView) -> Self {
        // SAFETY: `view` is live; the matching unlock runs in Drop.
        let ctx = unsafe { (api.view_lock_js_context)(view) };
        Self { api, view, ctx }
    }
}

impl Drop for ContextLock<'_> {
    fn drop(&mut self) {
        // SAFETY: paired with the lock in `acquire`.
        unsafe { (self.api.view_unlock_js_context)(self.view) }
    }
}

struct PixelLock<'a> {
    api: &'a Capabilities,
    surface: capi::ULSurface,
}

impl Drop for PixelLock<'_> {
    fn drop(&mut self) {
        // SAFETY: only constructed after a successful lock.
        unsafe { (self.api.surface_unlock_pixels)(self.surface) }
    }
}

impl Engine for UltralightEngine {
    fn name(&self) -> &str {
        "ultralight"
    }

    fn create_view(&mut self, width: u32, height: u32) -> Result<ViewHandles, BridgeError> {
        let api = self.api;
        // SAFETY: the renderer is live for the lifetime of `self`.
        let (view, surface) = unsafe {
            let vc = (api.create_view_config)();
            (api.view_config_set_is_accelerated)(vc, false);
            (api.view_config_set_is_transparent)(vc, true);
            (api.view_config_set_initial_device_scale)(vc, 1.0);
            let view = (api.create_view)(self.renderer, width, height, vc, ptr::null_mut());
            (api.destroy_view_config)(vc);
            if view.is_null() {
                return Err(BridgeError::ViewCreation);
            }
            let surface = (api.view_get_surface)(view);
            if surface.is_null() {
                (api.destroy_view)(view);
                return Err(BridgeError::ViewCreation);
            }
            (view, surface)
        };

        let handles = ViewHandles { view: RawView(view as usize), surface: RawSurface(surface as usize) };
        self.views.insert(handles.view, ViewEntry { view, surface, console: None });
        log::debug!("ultralight: created {width}x{height} view {:?}", handles.view);
        Ok(handles)
    }

    fn destroy_view(&mut self, handles: ViewHandles) {
        let Some(entry) = self.views.remove(&handles.view) else {
            return;
        };
        // SAFETY: the callback is detached before the view and its user data go away.
        unsafe {
            (self.api.view_set_add_console_message_callback)(entry.view, None, ptr::null_mut());
            (self.api.destroy_view)(entry.view);
        }
        drop(entry.console);
    }

    fn load_html(&mut self, view: RawView, html: &str) {
        let Some(v) = self.view(view) else { return };
        let s = self.api.string(html);
        // SAFETY: `v` is live; the string is copied by the SDK.
        unsafe {
            (self.api.view_load_html)(v, s);
            (self.api.destroy_string)(s);
        }
    }

    fn load_url(&mut self, view: RawView, url: &str) {
        let Some(v) = self.view(view) else { return };
        let s = self.api.string(url);
        // SAFETY: as above.
        unsafe {
            (self.api.view_load_url)(v, s);
            (self.api.destroy_string)(s);
        }
    }

    fn focus(&mut self, view: RawView) {
        if let Some(v) = self.view(view) {
            // SAFETY: `v` is live.
            unsafe { (self.api.view_focus)(v) }
        }
    }

    fn evaluate_script(&mut self, view: RawView, script: &str) -> Option<String> {
        let v = self.view(view)?;
        let s = self.api.string(script);
        // SAFETY: the result string is owned by the view and read before the next call.
        let result = unsafe {
            let out = (self.api.view_evaluate_script)(v, s, ptr::null_mut());
            (self.api.destroy_string)(s);
            self.api.read_string(out)
        };
        Some(result)
    }

    fn fire_mouse(&mut self, view: RawView, event: &MouseEvent) {
        let Some(v) = self.view(view) else { return };
        // SAFETY: event objects are destroyed right after firing.
        unsafe {
            let e = (self.api.create_mouse_event)(event.kind as c_int, event.x, event.y, event.button as c_int);
            (self.api.view_fire_mouse_event)(v, e);
            (self.api.destroy_mouse_event)(e);
        }
    }

    fn fire_scroll(&mut self, view: RawView, event: &ScrollEvent) {
        let Some(v) = self.view(view) else { return };
        // SAFETY: as above.
        unsafe {
            let e = (self.api.create_scroll_event)(event.kind as c_int, event.dx, event.dy);
            (self.api.view_fire_scroll_event)(v, e);
            (self.api.destroy_scroll_event)(e);
        }
    }

    fn fire_key(&mut self, view: RawView, event: &KeyEvent) {
        let Some(v) = self.view(view) else { return };
        let api = self.api;
        let text = api.string(&event.text);
        // SAFETY: as above; both strings are released after the event.
        unsafe {
            let e = (api.create_key_event)(
                event.kind.engine_code() as c_uint,
                event.modifiers.bits() as c_uint,
                event.virtual_key,
                event.virtual_key,
                text,
                text,
                false,
                false,
                false,
            );
            (api.view_fire_key_event)(v, e);
            (api.destroy_key_event)(e);
            (api.destroy_string)(text);
        }
    }

    fn update(&mut self) {
        // SAFETY: renderer is live.
        unsafe { (self.api.update)(self.renderer) }
    }

    fn refresh_display(&mut self, display_id: u32) {
        // SAFETY: renderer is live.
        unsafe { (self.api.refresh_display)(self.renderer, display_id) }
    }

    fn render(&mut self) {
        // SAFETY: renderer is live.
        unsafe { (self.api.render)(self.renderer) }
    }

    fn surface_info(&self, surface: RawSurface) -> Option<SurfaceInfo> {
        let s = self.surface(surface)?;
        // SAFETY: `s` belongs to a live view.
        unsafe {
            let rect = (self.api.surface_get_dirty_bounds)(s);
            Some(SurfaceInfo {
                width: (self.api.surface_get_width)(s),
                height: (self.api.surface_get_height)(s),
                row_bytes: (self.api.surface_get_row_bytes)(s),
                dirty: DirtyBounds { left: rect.left, top: rect.top, right: rect.right, bottom: rect.bottom },
            })
        }
    }

    fn with_pixels(&mut self, surface: RawSurface, f: &mut dyn FnMut(&[u8])) -> bool {
        let Some(info) = self.surface_info(surface) else {
            return false;
        };
        let Some(s) = self.surface(surface) else {
            return false;
        };
        let len = info.row_bytes as usize * info.height as usize;
        // SAFETY: a locked surface exposes `row_bytes * height` readable bytes until unlocked.
        unsafe {
            let pixels = (self.api.surface_lock_pixels)(s);
            if pixels.is_null() {
                return false;
            }
            let _lock = PixelLock { api: self.api, surface: s };
            f(std::slice::from_raw_parts(pixels.cast::<u8>(), len));
        }
        true
    }

    fn clear_dirty_bounds(&mut self, surface: RawSurface) {
        if let Some(s) = self.surface(surface) {
            // SAFETY: `s` belongs to a live view.
            unsafe { (self.api.surface_clear_dirty_bounds)(s) }
        }
    }

    fn script_context(&mut self, view: RawView) -> Option<ScriptContext> {
        let v = self.view(view)?;
        let lock = ContextLock::acquire(self.api, v);
        if lock.ctx.is_null() {
            None
        } else {
            Some(ScriptContext(lock.ctx as usize))
        }
    }

    fn install_native_function(&mut self, view: RawView) -> bool {
        let Some(v) = self.view(view) else {
            return false;
        };
        let api = self.api;
        {
            let lock = ContextLock::acquire(api, v);
            if lock.ctx.is_null() {
                return false;
            }
            // SAFETY: the context stays locked while the property is set.
            unsafe {
                let global = (api.js_context_get_global_object)(lock.ctx);
                let name = (api.js_string_create_with_utf8_cstring)(NATIVE_FUNCTION_C.as_ptr().cast());
                let func = (api.js_object_make_function_with_callback)(lock.ctx, name, Some(native_send));
                (api.js_object_set_property)(lock.ctx, global, name, func as JSValueRef, 0, ptr::null_mut());
                (api.js_string_release)(name);
            }
        }
        self.evaluate_script(view, NAMESPACE_SCRIPT);
        true
    }

    fn set_console_sink(&mut self, view: RawView, sink: Arc<MessageQueue>) {
        let api = self.api;
        let Some(entry) = self.views.get_mut(&view) else { return };
        let mut boxed = Box::new(sink);
        let user_data = (&mut *boxed as *mut Arc<MessageQueue>).cast::<c_void>();
        // SAFETY: the box lives in the entry until the callback is detached in destroy_view.
        unsafe { (api.view_set_add_console_message_callback)(entry.view, Some(console_message), user_data) }
        entry.console = Some(boxed);
    }
}

impl Drop for UltralightEngine {
    fn drop(&mut self) {
        let handles: Vec<ViewHandles> = self
            .views
            .values()
            .map(|e| ViewHandles { view: RawView(e.view as usize), surface: RawSurface(e.surface as usize) })
            .collect();
        for h in handles {
            self.destroy_view(h);
        }
        // SAFETY: all views are gone; nothing references the renderer any more.
        unsafe { (self.api.destroy_renderer)(self.renderer) }
        set_hooks(None);
        log::info!("ultralight renderer destroyed");
    }
}

unsafe extern "C" fn console_message(
    user_data: *mut c_void,
    _caller: ULView,
    _source: c_int,
    _level: c_int,
    message: ULString,
    _line_number: c_uint,
    _column_number: c_uint,
    _source_id: ULString,
) {
    let Some(api) = capi::get() else { return };
    if user_data.is_null() {
        return;
    }
    let sink = &*(user_data as *const Arc<MessageQueue>);
    let text = api.read_string(message);
    sink.push(&text);
}

unsafe extern "C" fn native_send(
    ctx: JSContextRef,
    _function: JSObjectRef,
    _this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    _exception: *mut JSValueRef,
) -> JSValueRef {
    let Some(api) = capi::get() else {
        return ptr::null();
    };
    if argument_count < 1 || arguments.is_null() {
        return ptr::null();
    }
    let js = (api.js_value_to_string_copy)(ctx, *arguments, ptr::null_mut());
    if js.is_null() {
        return ptr::null();
    }
    let payload = api.read_js_string(js);
    (api.js_string_release)(js);

    if let Some(router) = native_router() {
        if !router.dispatch(ScriptContext(ctx as usize), &payload) {
            log::debug!("ultralight: dropped native message from unbound context");
        }
    }
    ptr::null()
}

unsafe fn path_of(path: ULString) -> Option<String> {
    capi::get().map(|api| api.read_string(path))
}

unsafe fn new_string(text: &str) -> ULString {
    match capi::get() {
        Some(api) => api.string(text),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn fs_file_exists(path: ULString) -> bool {
    match (path_of(path), files()) {
        (Some(p), Some(fs)) => fs.exists(&p),
        _ => false,
    }
}

unsafe extern "C" fn fs_mime_type(path: ULString) -> ULString {
    let mime = match (path_of(path), files()) {
        (Some(p), Some(fs)) => fs.mime_type(&p),
        _ => crate::vfs::mime::DEFAULT_MIME,
    };
    new_string(mime)
}

unsafe extern "C" fn fs_charset(path: ULString) -> ULString {
    let charset = match (path_of(path), files()) {
        (Some(p), Some(fs)) => fs.charset(&p),
        _ => "utf-8",
    };
    new_string(charset)
}

/// Null tells the SDK the file could not be opened.
unsafe extern "C" fn fs_open_file(path: ULString) -> ULBuffer {
    let (Some(api), Some(p), Some(fs)) = (capi::get(), path_of(path), files()) else {
        return ptr::null_mut();
    };
    match fs.open(&p) {
        Some(bytes) => (api.create_buffer_from_copy)(bytes.as_ptr().cast(), bytes.len()),
        None => {
            log::debug!("ultralight: file not found: {p}");
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn clipboard_clear() {
    CLIPBOARD.lock().unwrap_or_else(|e| e.into_inner()).clear();
}

unsafe extern "C" fn clipboard_read(result: ULString) {
    let Some(api) = capi::get() else { return };
    let text = CLIPBOARD.lock().unwrap_or_else(|e| e.into_inner()).replace('\0', "");
    let mut bytes = text.into_bytes();
    bytes.push(0);
    (api.string_assign_cstring)(result, bytes.as_ptr().cast::<c_char>());
}

unsafe extern "C" fn clipboard_write(text: ULString) {
    if let Some(text) = path_of(text) {
        *CLIPBOARD.lock().unwrap_or_else(|e| e.into_inner()) = text;
    }
}
