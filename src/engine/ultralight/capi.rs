//! Ultralight C API, resolved at runtime.
//!
//! The SDK ships four libraries (UltralightCore, WebCore, Ultralight, AppCore) that must be
//! loaded in that order from the base directory. Every symbol the bridge uses is resolved up
//! front; a missing one fails initialization. The table is loaded once per process and lives
//! until exit, so the function pointers it hands out never dangle.

use crate::errors::BridgeError;
use libloading::Library;
use std::ffi::{c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::sync::OnceLock;

pub type ULConfig = *mut c_void;
pub type ULRenderer = *mut c_void;
pub type ULSession = *mut c_void;
pub type ULViewConfig = *mut c_void;
pub type ULView = *mut c_void;
pub type ULString = *mut c_void;
pub type ULSurface = *mut c_void;
pub type ULBuffer = *mut c_void;
pub type ULMouseEvent = *mut c_void;
pub type ULScrollEvent = *mut c_void;
pub type ULKeyEvent = *mut c_void;

pub type JSContextRef = *const c_void;
pub type JSObjectRef = *mut c_void;
pub type JSValueRef = *const c_void;
pub type JSStringRef = *mut c_void;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ULIntRect {
    pub left: c_int,
    pub top: c_int,
    pub right: c_int,
    pub bottom: c_int,
}

pub type ULAddConsoleMessageCallback = Option<
    unsafe extern "C" fn(
        user_data: *mut c_void,
        caller: ULView,
        source: c_int,
        level: c_int,
        message: ULString,
        line_number: c_uint,
        column_number: c_uint,
        source_id: ULString,
    ),
>;

pub type JSObjectCallAsFunctionCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        function: JSObjectRef,
        this_object: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSValueRef,
>;

/// File system provider. Returned strings and buffers are owned by Ultralight.
#[repr(C)]
pub struct ULFileSystem {
    pub file_exists: Option<unsafe extern "C" fn(path: ULString) -> bool>,
    pub get_file_mime_type: Option<unsafe extern "C" fn(path: ULString) -> ULString>,
    pub get_file_charset: Option<unsafe extern "C" fn(path: ULString) -> ULString>,
    pub open_file: Option<unsafe extern "C" fn(path: ULString) -> ULBuffer>,
}

#[repr(C)]
pub struct ULClipboard {
    pub clear: Option<unsafe extern "C" fn()>,
    pub read_plain_text: Option<unsafe extern "C" fn(result: ULString)>,
    pub write_plain_text: Option<unsafe extern "C" fn(text: ULString)>,
}

/// Resolved function table.
pub struct Capabilities {
    // Strings
    pub create_string_utf8: unsafe extern "C" fn(*const c_char, usize) -> ULString,
    pub destroy_string: unsafe extern "C" fn(ULString),
    pub string_get_data: unsafe extern "C" fn(ULString) -> *mut c_char,
    pub string_get_length: unsafe extern "C" fn(ULString) -> usize,
    pub string_assign_cstring: unsafe extern "C" fn(ULString, *const c_char),
    pub create_buffer_from_copy: unsafe extern "C" fn(*const c_void, usize) -> ULBuffer,
    pub version_string: unsafe extern "C" fn() -> *const c_char,

    // Renderer
    pub create_config: unsafe extern "C" fn() -> ULConfig,
    pub destroy_config: unsafe extern "C" fn(ULConfig),
    pub config_set_resource_path_prefix: unsafe extern "C" fn(ULConfig, ULString),
    pub create_renderer: unsafe extern "C" fn(ULConfig) -> ULRenderer,
    pub destroy_renderer: unsafe extern "C" fn(ULRenderer),
    pub update: unsafe extern "C" fn(ULRenderer),
    pub refresh_display: unsafe extern "C" fn(ULRenderer, c_uint),
    pub render: unsafe extern "C" fn(ULRenderer),

    // Views
    pub create_view_config: unsafe extern "C" fn() -> ULViewConfig,
    pub destroy_view_config: unsafe extern "C" fn(ULViewConfig),
    pub view_config_set_is_accelerated: unsafe extern "C" fn(ULViewConfig, bool),
    pub view_config_set_is_transparent: unsafe extern "C" fn(ULViewConfig, bool),
    pub view_config_set_initial_device_scale: unsafe extern "C" fn(ULViewConfig, f64),
    pub create_view: unsafe extern "C" fn(ULRenderer, c_uint, c_uint, ULViewConfig, ULSession) -> ULView,
    pub destroy_view: unsafe extern "C" fn(ULView),
    pub view_load_html: unsafe extern "C" fn(ULView, ULString),
    pub view_load_url: unsafe extern "C" fn(ULView, ULString),
    pub view_get_surface: unsafe extern "C" fn(ULView) -> ULSurface,
    pub view_focus: unsafe extern "C" fn(ULView),
    pub view_evaluate_script: unsafe extern "C" fn(ULView, ULString, *mut ULString) -> ULString,
    pub view_set_add_console_message_callback:
        unsafe extern "C" fn(ULView, ULAddConsoleMessageCallback, *mut c_void),
    pub view_lock_js_context: unsafe extern "C" fn(ULView) -> JSContextRef,
    pub view_unlock_js_context: unsafe extern "C" fn(ULView),

    // Input
    pub create_mouse_event: unsafe extern "C" fn(c_int, c_int, c_int, c_int) -> ULMouseEvent,
    pub destroy_mouse_event: unsafe extern "C" fn(ULMouseEvent),
    pub view_fire_mouse_event: unsafe extern "C" fn(ULView, ULMouseEvent),
    pub create_scroll_event: unsafe extern "C" fn(c_int, c_int, c_int) -> ULScrollEvent,
    pub destroy_scroll_event: unsafe extern "C" fn(ULScrollEvent),
    pub view_fire_scroll_event: unsafe extern "C" fn(ULView, ULScrollEvent),
    pub create_key_event:
        unsafe extern "C" fn(c_uint, c_uint, c_int, c_int, ULString, ULString, bool, bool, bool) -> ULKeyEvent,
    pub destroy_key_event: unsafe extern "C" fn(ULKeyEvent),
    pub view_fire_key_event: unsafe extern "C" fn(ULView, ULKeyEvent),

    // Surfaces
    pub surface_lock_pixels: unsafe extern "C" fn(ULSurface) -> *mut c_void,
    pub surface_unlock_pixels: unsafe extern "C" fn(ULSurface),
    pub surface_get_width: unsafe extern "C" fn(ULSurface) -> c_uint,
    pub surface_get_height: unsafe extern "C" fn(ULSurface) -> c_uint,
    pub surface_get_row_bytes: unsafe extern "C" fn(ULSurface) -> c_uint,
    pub surface_get_dirty_bounds: unsafe extern "C" fn(ULSurface) -> ULIntRect,
    pub surface_clear_dirty_bounds: unsafe extern "C" fn(ULSurface),

    // Platform
    pub platform_set_file_system: unsafe extern "C" fn(ULFileSystem),
    pub platform_set_clipboard: unsafe extern "C" fn(ULClipboard),
    pub enable_platform_font_loader: unsafe extern "C" fn(),
    pub enable_default_logger: unsafe extern "C" fn(ULString),

    // JavaScriptCore
    pub js_context_get_global_object: unsafe extern "C" fn(JSContextRef) -> JSObjectRef,
    pub js_string_create_with_utf8_cstring: unsafe extern "C" fn(*const c_char) -> JSStringRef,
    pub js_string_release: unsafe extern "C" fn(JSStringRef),
    pub js_string_get_maximum_utf8_cstring_size: unsafe extern "C" fn(JSStringRef) -> usize,
    pub js_string_get_utf8_cstring: unsafe extern "C" fn(JSStringRef, *mut c_char, usize) -> usize,
    pub js_object_make_function_with_callback:
        unsafe extern "C" fn(JSContextRef, JSStringRef, JSObjectCallAsFunctionCallback) -> JSObjectRef,
    pub js_object_set_property:
        unsafe extern "C" fn(JSContextRef, JSObjectRef, JSStringRef, JSValueRef, c_uint, *mut JSValueRef),
    pub js_value_to_string_copy: unsafe extern "C" fn(JSContextRef, JSValueRef, *mut JSValueRef) -> JSStringRef,

    // Keeps the libraries mapped. Dropped last, in reverse load order.
    _libraries: Vec<Library>,
}

static CAPI: OnceLock<Capabilities> = OnceLock::new();

/// The loaded table, if [`load`] succeeded before.
pub fn get() -> Option<&'static Capabilities> {
    CAPI.get()
}

/// Loads the SDK from `base_dir`, or returns the table loaded earlier.
pub fn load(base_dir: &Path) -> Result<&'static Capabilities, BridgeError> {
    if let Some(api) = CAPI.get() {
        return Ok(api);
    }
    let api = Capabilities::load(base_dir)?;
    Ok(CAPI.get_or_init(|| api))
}

fn open_library(base_dir: &Path, name: &str) -> Result<Library, BridgeError> {
    let path = base_dir.join(libloading::library_filename(name));
    log::debug!("ultralight: loading {}", path.display());
    // SAFETY: the SDK libraries run no unsound initialization code on load.
    unsafe { Library::new(&path) }.map_err(|e| BridgeError::LibraryLoad { path, reason: e.to_string() })
}

/// Copies a function pointer out of `lib`.
///
/// # Safety
/// `T` must match the symbol's real signature, and the pointer must not outlive `lib`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, BridgeError> {
    let mut raw = Vec::with_capacity(name.len() + 1);
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);
    lib.get::<T>(&raw)
        .map(|sym| *sym)
        .map_err(|_| {
            log::error!("ultralight: missing symbol {name}");
            BridgeError::SymbolMissing(name.to_owned())
        })
}

impl Capabilities {
    fn load(base_dir: &Path) -> Result<Self, BridgeError> {
        let core = open_library(base_dir, "UltralightCore")?;
        let webcore = open_library(base_dir, "WebCore")?;
        let ul = open_library(base_dir, "Ultralight")?;
        let appcore = open_library(base_dir, "AppCore")?;

        // SAFETY: every signature below matches the Ultralight 1.4 C headers.
        let api = unsafe {
            Capabilities {
                create_string_utf8: symbol(&ul, "ulCreateStringUTF8")?,
                destroy_string: symbol(&ul, "ulDestroyString")?,
                string_get_data: symbol(&ul, "ulStringGetData")?,
                string_get_length: symbol(&ul, "ulStringGetLength")?,
                string_assign_cstring: symbol(&ul, "ulStringAssignCString")?,
                create_buffer_from_copy: symbol(&ul, "ulCreateBufferFromCopy")?,
                version_string: symbol(&ul, "ulVersionString")?,

                create_config: symbol(&ul, "ulCreateConfig")?,
                destroy_config: symbol(&ul, "ulDestroyConfig")?,
                config_set_resource_path_prefix: symbol(&ul, "ulConfigSetResourcePathPrefix")?,
                create_renderer: symbol(&ul, "ulCreateRenderer")?,
                destroy_renderer: symbol(&ul, "ulDestroyRenderer")?,
                update: symbol(&ul, "ulUpdate")?,
                refresh_display: symbol(&ul, "ulRefreshDisplay")?,
                render: symbol(&ul, "ulRender")?,

                create_view_config: symbol(&ul, "ulCreateViewConfig")?,
                destroy_view_config: symbol(&ul, "ulDestroyViewConfig")?,
                view_config_set_is_accelerated: symbol(&ul, "ulViewConfigSetIsAccelerated")?,
                view_config_set_is_transparent: symbol(&ul, "ulViewConfigSetIsTransparent")?,
                view_config_set_initial_device_scale: symbol(&ul, "ulViewConfigSetInitialDeviceScale")?,
                create_view: symbol(&ul, "ulCreateView")?,
                destroy_view: symbol(&ul, "ulDestroyView")?,
                view_load_html: symbol(&ul, "ulViewLoadHTML")?,
                view_load_url: symbol(&ul, "ulViewLoadURL")?,
                view_get_surface: symbol(&ul, "ulViewGetSurface")?,
                view_focus: symbol(&ul, "ulViewFocus")?,
                view_evaluate_script: symbol(&ul, "ulViewEvaluateScript")?,
                view_set_add_console_message_callback: symbol(&ul, "ulViewSetAddConsoleMessageCallback")?,
                view_lock_js_context: symbol(&ul, "ulViewLockJSContext")?,
                view_unlock_js_context: symbol(&ul, "ulViewUnlockJSContext")?,

                create_mouse_event: symbol(&ul, "ulCreateMouseEvent")?,
                destroy_mouse_event: symbol(&ul, "ulDestroyMouseEvent")?,
                view_fire_mouse_event: symbol(&ul, "ulViewFireMouseEvent")?,
                create_scroll_event: symbol(&ul, "ulCreateScrollEvent")?,
                destroy_scroll_event: symbol(&ul, "ulDestroyScrollEvent")?,
                view_fire_scroll_event: symbol(&ul, "ulViewFireScrollEvent")?,
                create_key_event: symbol(&ul, "ulCreateKeyEvent")?,
                destroy_key_event: symbol(&ul, "ulDestroyKeyEvent")?,
                view_fire_key_event: symbol(&ul, "ulViewFireKeyEvent")?,

                surface_lock_pixels: symbol(&ul, "ulSurfaceLockPixels")?,
                surface_unlock_pixels: symbol(&ul, "ulSurfaceUnlockPixels")?,
                surface_get_width: symbol(&ul, "ulSurfaceGetWidth")?,
                surface_get_height: symbol(&ul, "ulSurfaceGetHeight")?,
                surface_get_row_bytes: symbol(&ul, "ulSurfaceGetRowBytes")?,
                surface_get_dirty_bounds: symbol(&ul, "ulSurfaceGetDirtyBounds")?,
                surface_clear_dirty_bounds: symbol(&ul, "ulSurfaceClearDirtyBounds")?,

                platform_set_file_system: symbol(&ul, "ulPlatformSetFileSystem")?,
                platform_set_clipboard: symbol(&ul, "ulPlatformSetClipboard")?,
                enable_platform_font_loader: symbol(&appcore, "ulEnablePlatformFontLoader")?,
                enable_default_logger: symbol(&appcore, "ulEnableDefaultLogger")?,

                js_context_get_global_object: symbol(&webcore, "JSContextGetGlobalObject")?,
                js_string_create_with_utf8_cstring: symbol(&webcore, "JSStringCreateWithUTF8CString")?,
                js_string_release: symbol(&webcore, "JSStringRelease")?,
                js_string_get_maximum_utf8_cstring_size: symbol(&webcore, "JSStringGetMaximumUTF8CStringSize")?,
                js_string_get_utf8_cstring: symbol(&webcore, "JSStringGetUTF8CString")?,
                js_object_make_function_with_callback: symbol(&webcore, "JSObjectMakeFunctionWithCallback")?,
                js_object_set_property: symbol(&webcore, "JSObjectSetProperty")?,
                js_value_to_string_copy: symbol(&webcore, "JSValueToStringCopy")?,

                _libraries: vec![appcore, ul, webcore, core],
            }
        };
        Ok(api)
    }

    /// Creates an engine string. Must be released with `destroy_string`.
    pub fn string(&self, text: &str) -> ULString {
        // SAFETY: pointer and length describe a valid UTF-8 buffer for the duration of the call.
        unsafe { (self.create_string_utf8)(text.as_ptr().cast(), text.len()) }
    }

    /// Copies an engine string. Null strings read as empty.
    ///
    /// # Safety
    /// `s` must be null or a live `ULString`.
    pub unsafe fn read_string(&self, s: ULString) -> String {
        if s.is_null() {
            return String::new();
        }
        let data = (self.string_get_data)(s);
        let len = (self.string_get_length)(s);
        if data.is_null() || len == 0 {
            return String::new();
        }
        let bytes = std::slice::from_raw_parts(data.cast::<u8>(), len);
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Copies a JavaScriptCore string.
    ///
    /// # Safety
    /// `s` must be a live `JSStringRef`.
    pub unsafe fn read_js_string(&self, s: JSStringRef) -> String {
        let max = (self.js_string_get_maximum_utf8_cstring_size)(s);
        if max == 0 {
            return String::new();
        }
        let mut buf = vec![0u8; max];
        let written = (self.js_string_get_utf8_cstring)(s, buf.as_mut_ptr().cast(), max);
        // The count includes the terminating NUL.
        buf.truncate(written.saturating_sub(1));
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn version(&self) -> String {
        // SAFETY: returns a static NUL-terminated string.
        unsafe {
            let v = (self.version_string)();
            if v.is_null() {
                return String::from("unknown");
            }
            std::ffi::CStr::from_ptr(v).to_string_lossy().into_owned()
        }
    }
}
