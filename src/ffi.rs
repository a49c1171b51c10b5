//! C ABI over a process-wide [`Bridge`].
//!
//! View ids are non-negative; negative returns are [`ResultCode`] values. String outputs are
//! NUL terminated and cut at a character boundary to fit the caller's buffer.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::errors::{BridgeError, ResultCode};
use crate::input::{KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind, ScrollEvent, ScrollEventKind};
use crate::queue::truncate_utf8;
use crate::slot::{PendingContent, ViewHandle};
use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, RwLock};

static BRIDGE: RwLock<Option<Arc<Bridge>>> = RwLock::new(None);
/// Held for the whole of init and destroy so a second caller never starts another worker.
static LIFECYCLE: Mutex<()> = Mutex::new(());

fn bridge() -> Option<Arc<Bridge>> {
    BRIDGE.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn install(bridge: Bridge) {
    *BRIDGE.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(bridge));
}

fn take() -> Option<Arc<Bridge>> {
    BRIDGE.write().unwrap_or_else(|e| e.into_inner()).take()
}

/// Starts and installs a bridge unless one is already installed.
fn init_with(start: impl FnOnce() -> Result<Bridge, BridgeError>) -> i32 {
    let _guard = LIFECYCLE.lock().unwrap_or_else(|e| e.into_inner());
    if bridge().is_some() {
        return ResultCode::Ok.code();
    }
    match start() {
        Ok(bridge) => {
            install(bridge);
            ResultCode::Ok.code()
        }
        Err(e) => {
            log::error!("ffi: init failed: {e}");
            ResultCode::from(&e).code()
        }
    }
}

/// # Safety
/// `p` must be null or point to a NUL-terminated string.
unsafe fn str_arg<'a>(p: *const c_char) -> Option<Cow<'a, str>> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy())
    }
}

fn live_view(bridge: &Bridge, id: i32) -> Option<ViewHandle> {
    ViewHandle::from_raw(id).filter(|h| bridge.dimensions(*h).is_some())
}

fn view_or_code(result: Result<ViewHandle, BridgeError>) -> i32 {
    match result {
        Ok(handle) => handle.as_raw(),
        Err(e) => ResultCode::from(&e).code(),
    }
}

/// Writes `text` into `buf` with a terminating NUL. Returns the bytes written, without the NUL.
///
/// # Safety
/// `buf` must be valid for `size` bytes.
unsafe fn write_cstr(text: &str, buf: *mut c_char, size: i32) -> i32 {
    let cut = truncate_utf8(text, size as usize - 1);
    std::ptr::copy_nonoverlapping(cut.as_ptr(), buf.cast::<u8>(), cut.len());
    *buf.add(cut.len()) = 0;
    cut.len() as i32
}

/// Starts the worker and loads the engine from `base_dir` (current directory when null).
/// Calling it again while initialized does nothing.
///
/// # Safety
/// `base_dir` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_init(base_dir: *const c_char, debug: i32) -> i32 {
    let base_dir = str_arg(base_dir).map(|s| s.into_owned()).unwrap_or_else(|| ".".into());
    let config = match BridgeConfig::builder().base_dir(base_dir).debug(debug != 0).build() {
        Ok(config) => config,
        Err(e) => {
            log::error!("ffi: invalid configuration: {e}");
            return ResultCode::InvalidArgument.code();
        }
    };
    init_with(|| Bridge::start(config))
}

#[no_mangle]
pub extern "C" fn bridge_create_view(width: i32, height: i32) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    if width <= 0 || height <= 0 {
        return ResultCode::InvalidArgument.code();
    }
    view_or_code(bridge.create_view(width as u32, height as u32))
}

/// Creates a view that loads `content` over the next ticks. `is_url` selects how `content` is
/// read.
///
/// # Safety
/// `content` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_create_view_async(width: i32, height: i32, content: *const c_char, is_url: i32) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let Some(content) = str_arg(content) else {
        return ResultCode::InvalidArgument.code();
    };
    if width <= 0 || height <= 0 {
        return ResultCode::InvalidArgument.code();
    }
    let content = if is_url != 0 {
        PendingContent::Url(content.into_owned())
    } else {
        PendingContent::Html(content.into_owned())
    };
    view_or_code(bridge.create_view_async(width as u32, height as u32, content))
}

/// # Safety
/// `html` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_create_view_with_html(width: i32, height: i32, html: *const c_char) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let Some(html) = str_arg(html) else {
        return ResultCode::InvalidArgument.code();
    };
    if width <= 0 || height <= 0 {
        return ResultCode::InvalidArgument.code();
    }
    view_or_code(bridge.create_view_with_html(width as u32, height as u32, &html))
}

/// # Safety
/// `url` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_create_view_with_url(width: i32, height: i32, url: *const c_char) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let Some(url) = str_arg(url) else {
        return ResultCode::InvalidArgument.code();
    };
    if width <= 0 || height <= 0 {
        return ResultCode::InvalidArgument.code();
    }
    view_or_code(bridge.create_view_with_url(width as u32, height as u32, &url))
}

#[no_mangle]
pub extern "C" fn bridge_destroy_view(view_id: i32) {
    let (Some(bridge), Some(handle)) = (bridge(), ViewHandle::from_raw(view_id)) else {
        return;
    };
    if let Err(e) = bridge.destroy_view(handle) {
        log::warn!("ffi: destroy {handle} failed: {e}");
    }
}

/// # Safety
/// `html` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_load_html(view_id: i32, html: *const c_char) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let (Some(handle), Some(html)) = (ViewHandle::from_raw(view_id), str_arg(html)) else {
        return ResultCode::InvalidArgument.code();
    };
    Bridge::code_of(&bridge.load_html(handle, &html))
}

/// # Safety
/// `url` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_load_url(view_id: i32, url: *const c_char) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let (Some(handle), Some(url)) = (ViewHandle::from_raw(view_id), str_arg(url)) else {
        return ResultCode::InvalidArgument.code();
    };
    Bridge::code_of(&bridge.load_url(handle, &url))
}

#[no_mangle]
pub extern "C" fn bridge_tick() -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    Bridge::code_of(&bridge.tick())
}

/// Copies the view as RGBA into `dst` when it changed. Returns 1 when copied, 0 when nothing
/// changed and -1 when rejected.
///
/// # Safety
/// `dst` must be valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_copy_pixels(view_id: i32, dst: *mut u8, len: usize) -> i32 {
    let (Some(bridge), Some(handle)) = (bridge(), ViewHandle::from_raw(view_id)) else {
        return crate::pixels::PixelUpdate::Rejected.code();
    };
    if dst.is_null() {
        return crate::pixels::PixelUpdate::Rejected.code();
    }
    let dst = std::slice::from_raw_parts_mut(dst, len);
    bridge.copy_pixels(handle, dst).code()
}

#[no_mangle]
pub extern "C" fn bridge_view_get_width(view_id: i32) -> u32 {
    bridge()
        .and_then(|b| ViewHandle::from_raw(view_id).and_then(|h| b.dimensions(h)))
        .map_or(0, |(w, _)| w)
}

#[no_mangle]
pub extern "C" fn bridge_view_get_height(view_id: i32) -> u32 {
    bridge()
        .and_then(|b| ViewHandle::from_raw(view_id).and_then(|h| b.dimensions(h)))
        .map_or(0, |(_, h)| h)
}

/// Queues a mouse event. Returns 1 when queued, 0 when dropped or invalid.
#[no_mangle]
pub extern "C" fn bridge_view_fire_mouse(view_id: i32, kind: i32, x: i32, y: i32, button: i32) -> i32 {
    let Some(bridge) = bridge() else { return 0 };
    let (Some(handle), Some(kind), Some(button)) =
        (live_view(&bridge, view_id), MouseEventKind::from_code(kind), MouseButton::from_code(button))
    else {
        return 0;
    };
    bridge.fire_mouse(handle, MouseEvent::new(kind, x, y, button)) as i32
}

#[no_mangle]
pub extern "C" fn bridge_view_fire_scroll(view_id: i32, kind: i32, dx: i32, dy: i32) -> i32 {
    let Some(bridge) = bridge() else { return 0 };
    let (Some(handle), Some(kind)) = (live_view(&bridge, view_id), ScrollEventKind::from_code(kind)) else {
        return 0;
    };
    bridge.fire_scroll(handle, ScrollEvent { kind, dx, dy }) as i32
}

/// # Safety
/// `text` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_fire_key(view_id: i32, kind: i32, virtual_key: i32, modifiers: u32, text: *const c_char) -> i32 {
    let Some(bridge) = bridge() else { return 0 };
    let (Some(handle), Some(kind)) = (live_view(&bridge, view_id), KeyEventKind::from_code(kind)) else {
        return 0;
    };
    let text = str_arg(text).unwrap_or_default();
    let mods = Modifiers::from_bits_truncate(modifiers);
    let event = KeyEvent::new(kind, virtual_key, mods, &text, bridge.config().queues.key_text_len);
    bridge.fire_key(handle, event) as i32
}

/// # Safety
/// `script` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_eval_js(view_id: i32, script: *const c_char) -> i32 {
    let Some(bridge) = bridge() else { return 0 };
    let (Some(handle), Some(script)) = (ViewHandle::from_raw(view_id), str_arg(script)) else {
        return 0;
    };
    bridge.eval_js(handle, &script) as i32
}

/// Pops the next native message into `buf`. Returns its length, or 0 when there is none.
///
/// # Safety
/// `buf` must be valid for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_get_message(view_id: i32, buf: *mut c_char, size: i32) -> i32 {
    if buf.is_null() || size <= 0 {
        return 0;
    }
    let msg = bridge().and_then(|b| ViewHandle::from_raw(view_id).and_then(|h| b.next_message(h)));
    match msg {
        Some(msg) => write_cstr(&msg, buf, size),
        None => 0,
    }
}

/// Console counterpart of [`bridge_view_get_message`].
///
/// # Safety
/// `buf` must be valid for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_view_get_console_message(view_id: i32, buf: *mut c_char, size: i32) -> i32 {
    if buf.is_null() || size <= 0 {
        return 0;
    }
    let msg = bridge().and_then(|b| ViewHandle::from_raw(view_id).and_then(|h| b.next_console_message(h)));
    match msg {
        Some(msg) => write_cstr(&msg, buf, size),
        None => 0,
    }
}

#[no_mangle]
pub extern "C" fn bridge_view_is_ready(view_id: i32) -> i32 {
    bridge().is_some_and(|b| ViewHandle::from_raw(view_id).is_some_and(|h| b.is_ready(h))) as i32
}

/// # Safety
/// `path` must be a NUL-terminated string and `data` valid for `len` bytes (or null with a
/// zero length).
#[no_mangle]
pub unsafe extern "C" fn bridge_vfs_register(path: *const c_char, data: *const u8, len: usize) -> i32 {
    let Some(bridge) = bridge() else {
        return ResultCode::NotInitialized.code();
    };
    let Some(path) = str_arg(path) else {
        return ResultCode::InvalidArgument.code();
    };
    let bytes: &[u8] = match (data.is_null(), len) {
        (_, 0) => &[],
        (true, _) => return ResultCode::InvalidArgument.code(),
        (false, len) => std::slice::from_raw_parts(data, len),
    };
    Bridge::code_of(&bridge.register_file(&path, bytes))
}

#[no_mangle]
pub extern "C" fn bridge_vfs_clear() {
    if let Some(bridge) = bridge() {
        bridge.clear_files();
    }
}

#[no_mangle]
pub extern "C" fn bridge_vfs_count() -> i32 {
    bridge().map_or(0, |b| b.file_count() as i32)
}

/// Destroys every view and stops the worker. `bridge_init` may be called again afterwards.
#[no_mangle]
pub extern "C" fn bridge_destroy() {
    let _guard = LIFECYCLE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(bridge) = take() {
        bridge.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::headless::{self, HeadlessOptions, HeadlessProbe};
    use crate::pixels::rgba_len;
    use std::ffi::CString;
    use std::time::Duration;

    // One test: the bridge behind the ABI is process-wide.
    #[test]
    fn c_abi_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();

        unsafe {
            // No SDK in the directory
            assert_eq!(bridge_init(base.as_ptr(), 0), ResultCode::LibraryLoad.code());
            assert_eq!(bridge_create_view(8, 8), ResultCode::NotInitialized.code());
            assert_eq!(bridge_tick(), ResultCode::NotInitialized.code());

            let config = BridgeConfig::builder()
                .settle_passes(1)
                .settle_interval(Duration::ZERO)
                .build()
                .unwrap();
            // Racing initializers start exactly one worker.
            let probe = HeadlessProbe::default();
            let racers: Vec<_> = (0..4)
                .map(|_| {
                    let (config, probe) = (config.clone(), probe.clone());
                    std::thread::spawn(move || {
                        init_with(|| {
                            let factory = headless::factory(HeadlessOptions::default(), probe);
                            Bridge::start_with_factory(config, factory)
                        })
                    })
                })
                .collect();
            for racer in racers {
                assert_eq!(racer.join().unwrap(), 0);
            }
            assert_eq!(probe.engines_created(), 1);

            assert_eq!(bridge_create_view(0, 8), ResultCode::InvalidArgument.code());
            let html = CString::new("<p>hi</p>").unwrap();
            let id = bridge_create_view_with_html(8, 4, html.as_ptr());
            assert!(id >= 0);
            assert_eq!(bridge_view_get_width(id), 8);
            assert_eq!(bridge_view_get_height(id), 4);
            assert_eq!(bridge_view_is_ready(id), 1);

            let send = CString::new(r#"bridge.send("héllo")"#).unwrap();
            assert_eq!(bridge_view_eval_js(id, send.as_ptr()), 1);
            assert_eq!(bridge_view_fire_mouse(id, 9, 0, 0, 0), 0);
            assert_eq!(bridge_view_fire_mouse(id, 1, 2, 2, 1), 1);
            assert_eq!(bridge_tick(), 0);

            // "h" plus the two-byte "é" do not fit in three bytes with the NUL.
            let mut buf = [0 as c_char; 3];
            assert_eq!(bridge_view_get_message(id, buf.as_mut_ptr(), 3), 1);
            assert_eq!(CStr::from_ptr(buf.as_ptr()).to_str().unwrap(), "h");
            assert_eq!(bridge_view_get_message(id, buf.as_mut_ptr(), 3), 0);

            let mut pixels = vec![0u8; rgba_len(8, 4)];
            assert_eq!(bridge_view_copy_pixels(id, pixels.as_mut_ptr(), pixels.len()), 1);
            assert_eq!(bridge_view_copy_pixels(id, pixels.as_mut_ptr(), pixels.len()), 0);
            assert_eq!(bridge_view_copy_pixels(id, pixels.as_mut_ptr(), 10), -1);

            let path = CString::new("ui/a.css").unwrap();
            assert_eq!(bridge_vfs_register(path.as_ptr(), b"x".as_ptr(), 1), 0);
            assert_eq!(bridge_vfs_count(), 1);
            bridge_vfs_clear();
            assert_eq!(bridge_vfs_count(), 0);

            bridge_destroy_view(id);
            assert_eq!(bridge_view_get_width(id), 0);
            bridge_destroy();
            assert_eq!(bridge_tick(), ResultCode::NotInitialized.code());
        }
    }
}
