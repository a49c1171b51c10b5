//! The bridge: the calling thread's handle to the worker.
//!
//! Commands are sent through a single-slot mailbox and answered through a oneshot channel. A
//! gate around the mailbox keeps exactly one command in flight, whichever thread sends it.
//! Input, scripts and message polling never go through the mailbox; they touch the shared slot
//! queues directly and never block on the worker.
//!
//! The blocking methods must not be called from inside an async runtime. Async callers use
//! [`Bridge::start_async`], [`Bridge::tick_async`] and friends.

use crate::command::{Command, Envelope, Reply};
use crate::config::BridgeConfig;
use crate::engine::{headless, ultralight, EngineFactory, EngineHooks};
use crate::errors::{BridgeError, ResultCode};
use crate::input::{KeyEvent, MouseEvent, ScrollEvent};
use crate::logging;
use crate::messages::NativeRouter;
use crate::pixels::{rgba_len, PixelUpdate, RawFrame};
use crate::slot::{shared_slots, PendingContent, SharedSlots, SlotShared, ViewHandle};
use crate::tick::TickReport;
use crate::vfs::Vfs;
use crate::worker::{self, WorkerContext};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

pub struct Bridge {
    config: BridgeConfig,
    tx: mpsc::Sender<Envelope>,
    /// One command in flight at a time.
    gate: tokio::sync::Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    slots: SharedSlots,
    vfs: Arc<Vfs>,
    /// Handle index of the view with keyboard focus, -1 for none.
    focused: AtomicI64,
    /// Reused for raw pixel transfers.
    scratch: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("max_views", &self.config.max_views)
            .field("views", &self.view_count())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

fn unexpected(reply: Reply) -> BridgeError {
    match reply {
        Reply::Failed(code) => code.into_error(),
        other => BridgeError::InvalidArgument(format!("unexpected worker reply {other:?}")),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Bridge {
    /// Starts the worker with the Ultralight engine from `config.base_dir`.
    pub fn start(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::start_with_factory(config, ultralight::factory())
    }

    /// Starts the worker with the software engine.
    pub fn start_headless(config: BridgeConfig) -> Result<Self, BridgeError> {
        let factory = headless::factory(Default::default(), Default::default());
        Self::start_with_factory(config, factory)
    }

    /// Starts the worker and initializes the engine. On failure the worker is stopped again.
    pub fn start_with_factory(config: BridgeConfig, factory: EngineFactory) -> Result<Self, BridgeError> {
        let bridge = Self::spawn(config, factory)?;
        match bridge.submit(Command::Init) {
            Ok(Reply::Done) => Ok(bridge),
            Ok(reply) => {
                let err = match reply {
                    Reply::Failed(code) => BridgeError::InitFailed(code),
                    other => unexpected(other),
                };
                bridge.shutdown();
                Err(err)
            }
            Err(e) => {
                bridge.shutdown();
                Err(e)
            }
        }
    }

    /// Same as [`Bridge::start_with_factory`], for use inside an async runtime.
    pub async fn start_async(config: BridgeConfig, factory: EngineFactory) -> Result<Self, BridgeError> {
        let bridge = Self::spawn(config, factory)?;
        match bridge.submit_async(Command::Init).await {
            Ok(Reply::Done) => Ok(bridge),
            Ok(reply) => {
                let err = match reply {
                    Reply::Failed(code) => BridgeError::InitFailed(code),
                    other => unexpected(other),
                };
                bridge.shutdown_async().await;
                Err(err)
            }
            Err(e) => {
                bridge.shutdown_async().await;
                Err(e)
            }
        }
    }

    fn spawn(config: BridgeConfig, factory: EngineFactory) -> Result<Self, BridgeError> {
        logging::init(&config);

        let vfs = Vfs::new(&config.base_dir, config.vfs_capacity);
        let vfs = Arc::new(if config.trace_vfs_access { vfs.with_access_log() } else { vfs });
        let slots = shared_slots(&config);
        let hooks = EngineHooks {
            files: vfs.clone(),
            native: Arc::new(NativeRouter::new(config.max_views)),
        };
        let (tx, rx) = mpsc::channel(1);

        let worker_config = config.clone();
        let worker_slots = slots.clone();
        let handle = std::thread::Builder::new()
            .name("webview-bridge".into())
            .spawn(move || {
                let ctx = WorkerContext::new(worker_config, factory, hooks, worker_slots);
                worker::run(ctx, rx);
            })
            .map_err(BridgeError::WorkerSpawn)?;

        log::info!("bridge: worker started (max {} views)", config.max_views);
        Ok(Self {
            config,
            tx,
            gate: tokio::sync::Mutex::new(()),
            worker: Mutex::new(Some(handle)),
            slots,
            vfs,
            focused: AtomicI64::new(-1),
            scratch: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Sends `command` and blocks until the worker executed it.
    pub fn submit(&self, command: Command) -> Result<Reply, BridgeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::WorkerGone);
        }
        let _gate = self.gate.blocking_lock();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(Envelope { command, reply: reply_tx })
            .map_err(|_| BridgeError::WorkerGone)?;
        reply_rx.blocking_recv().map_err(|_| BridgeError::WorkerGone)
    }

    /// Sends `command` and waits for the worker without blocking the runtime.
    pub async fn submit_async(&self, command: Command) -> Result<Reply, BridgeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::WorkerGone);
        }
        let _gate = self.gate.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { command, reply: reply_tx })
            .await
            .map_err(|_| BridgeError::WorkerGone)?;
        reply_rx.await.map_err(|_| BridgeError::WorkerGone)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn created(reply: Reply) -> Result<ViewHandle, BridgeError> {
        match reply {
            Reply::Created(handle) => Ok(handle),
            other => Err(unexpected(other)),
        }
    }

    fn done(reply: Reply) -> Result<(), BridgeError> {
        match reply {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    // ---------- View lifecycle ----------

    /// Creates an empty view. Returns once the view is primed and ready to drive.
    pub fn create_view(&self, width: u32, height: u32) -> Result<ViewHandle, BridgeError> {
        Self::created(self.submit(Command::CreateView { width, height })?)
    }

    /// Creates a view that loads `content` over the next ticks. Returns immediately; poll
    /// [`Bridge::is_ready`] to find out when loading finished.
    pub fn create_view_async(&self, width: u32, height: u32, content: PendingContent) -> Result<ViewHandle, BridgeError> {
        Self::created(self.submit(Command::CreateViewAsync { width, height, content })?)
    }

    /// Creates a view and starts loading `html` in one round trip. The first paint happens on
    /// the next tick.
    pub fn create_view_with_html(&self, width: u32, height: u32, html: &str) -> Result<ViewHandle, BridgeError> {
        let content = PendingContent::Html(html.to_owned());
        Self::created(self.submit(Command::CreateWithContent { width, height, content })?)
    }

    /// URL counterpart of [`Bridge::create_view_with_html`].
    pub fn create_view_with_url(&self, width: u32, height: u32, url: &str) -> Result<ViewHandle, BridgeError> {
        let content = PendingContent::Url(url.to_owned());
        Self::created(self.submit(Command::CreateWithContent { width, height, content })?)
    }

    /// Destroys a view. Destroying a free handle does nothing.
    pub fn destroy_view(&self, view: ViewHandle) -> Result<(), BridgeError> {
        self.drop_focus_of(view);
        Self::done(self.submit(Command::DestroyView { view })?)
    }

    pub async fn destroy_view_async(&self, view: ViewHandle) -> Result<(), BridgeError> {
        self.drop_focus_of(view);
        Self::done(self.submit_async(Command::DestroyView { view }).await?)
    }

    /// Navigates `view` to `html`. Blocks through the settle window.
    pub fn load_html(&self, view: ViewHandle, html: &str) -> Result<(), BridgeError> {
        let content = PendingContent::Html(html.to_owned());
        Self::done(self.submit(Command::Load { view, content })?)
    }

    pub fn load_url(&self, view: ViewHandle, url: &str) -> Result<(), BridgeError> {
        let content = PendingContent::Url(url.to_owned());
        Self::done(self.submit(Command::Load { view, content })?)
    }

    // ---------- Per frame ----------

    /// Advances every view by one tick.
    pub fn tick(&self) -> Result<TickReport, BridgeError> {
        match self.submit(Command::Tick)? {
            Reply::Tick(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub async fn tick_async(&self) -> Result<TickReport, BridgeError> {
        match self.submit_async(Command::Tick).await? {
            Reply::Tick(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    /// Runs `script` right away and returns its result, if any.
    pub fn evaluate(&self, view: ViewHandle, script: &str) -> Result<Option<String>, BridgeError> {
        match self.submit(Command::Evaluate { view, script: script.to_owned() })? {
            Reply::Evaluated(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    fn shared(&self, view: ViewHandle) -> Option<&Arc<SlotShared>> {
        self.slots.get(view.index())
    }

    /// Queues `script` for the next tick. Returns false if it was dropped.
    pub fn eval_js(&self, view: ViewHandle, script: &str) -> bool {
        self.shared(view).is_some_and(|s| s.push_script(script))
    }

    pub fn fire_mouse(&self, view: ViewHandle, event: MouseEvent) -> bool {
        self.shared(view).is_some_and(|s| s.push_mouse(event))
    }

    pub fn fire_scroll(&self, view: ViewHandle, event: ScrollEvent) -> bool {
        self.shared(view).is_some_and(|s| s.push_scroll(event))
    }

    pub fn fire_key(&self, view: ViewHandle, event: KeyEvent) -> bool {
        self.shared(view).is_some_and(|s| s.push_key(event))
    }

    /// Next native message sent by the page.
    pub fn next_message(&self, view: ViewHandle) -> Option<String> {
        self.shared(view).filter(|s| s.is_used())?.messages.pop()
    }

    /// Next console line printed by the page.
    pub fn next_console_message(&self, view: ViewHandle) -> Option<String> {
        self.shared(view).filter(|s| s.is_used())?.console.pop()
    }

    pub fn is_ready(&self, view: ViewHandle) -> bool {
        self.shared(view).is_some_and(|s| s.is_ready())
    }

    /// Width and height of a live view.
    pub fn dimensions(&self, view: ViewHandle) -> Option<(u32, u32)> {
        self.shared(view).filter(|s| s.is_used()).map(|s| s.dimensions())
    }

    pub fn view_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_used()).count()
    }

    /// Copies the view's pixels into `dst` as tightly packed RGBA, if they changed since the
    /// last copy. `dst` must hold at least `width * height * 4` bytes.
    pub fn copy_pixels(&self, view: ViewHandle, dst: &mut [u8]) -> PixelUpdate {
        let Some((width, height)) = self.dimensions(view) else {
            return PixelUpdate::Rejected;
        };
        if dst.len() < rgba_len(width, height) {
            return PixelUpdate::Rejected;
        }

        let scratch = std::mem::take(&mut *lock(&self.scratch));
        let reply = self.submit(Command::CopyPixels { view, min_len: dst.len(), scratch });
        self.finish_copy(reply, dst)
    }

    pub async fn copy_pixels_async(&self, view: ViewHandle, dst: &mut [u8]) -> PixelUpdate {
        let Some((width, height)) = self.dimensions(view) else {
            return PixelUpdate::Rejected;
        };
        if dst.len() < rgba_len(width, height) {
            return PixelUpdate::Rejected;
        }

        let scratch = std::mem::take(&mut *lock(&self.scratch));
        let reply = self.submit_async(Command::CopyPixels { view, min_len: dst.len(), scratch }).await;
        self.finish_copy(reply, dst)
    }

    fn finish_copy(&self, reply: Result<Reply, BridgeError>, dst: &mut [u8]) -> PixelUpdate {
        match reply {
            Ok(Reply::Pixels { update, frame }) => {
                let update = match update {
                    PixelUpdate::Updated if !frame.write_rgba(dst) => PixelUpdate::Rejected,
                    other => other,
                };
                let RawFrame { bytes, .. } = frame;
                *lock(&self.scratch) = bytes;
                update
            }
            Ok(_) | Err(_) => PixelUpdate::Rejected,
        }
    }

    // ---------- Focus ----------

    /// Gives `view` keyboard focus, or clears focus with `None`.
    pub fn set_focus(&self, view: Option<ViewHandle>) {
        let id = view.map(|v| v.index() as i64).unwrap_or(-1);
        self.focused.store(id, Ordering::Release);
    }

    pub fn focused(&self) -> Option<ViewHandle> {
        usize::try_from(self.focused.load(Ordering::Acquire)).ok().map(ViewHandle::new)
    }

    pub fn has_focus(&self, view: ViewHandle) -> bool {
        self.focused() == Some(view)
    }

    fn drop_focus_of(&self, view: ViewHandle) {
        let _ = self.focused.compare_exchange(view.index() as i64, -1, Ordering::AcqRel, Ordering::Acquire);
    }

    // ---------- Files ----------

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    /// Registers a file in the VFS. Files must be registered before a page references them.
    pub fn register_file(&self, path: &str, bytes: &[u8]) -> Result<(), BridgeError> {
        self.vfs.register(path, bytes)
    }

    pub fn clear_files(&self) {
        self.vfs.clear();
    }

    pub fn file_count(&self) -> usize {
        self.vfs.count()
    }

    // ---------- Shutdown ----------

    /// Destroys all views, releases the engine and joins the worker. Further calls fail with
    /// [`BridgeError::WorkerGone`].
    pub fn shutdown(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.submit(Command::Quit) {
            log::debug!("bridge: quit not delivered: {e}");
        }
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                log::error!("bridge: worker thread panicked");
            }
        }
        log::info!("bridge: shut down");
    }

    /// Async counterpart of [`Bridge::shutdown`]. The worker is not joined; it exits on its own
    /// right after answering `Quit`.
    pub async fn shutdown_async(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.submit_async(Command::Quit).await {
            log::debug!("bridge: quit not delivered: {e}");
        }
        self.closed.store(true, Ordering::Release);
        lock(&self.worker).take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Result code for the C ABI.
    pub fn code_of<T>(result: &Result<T, BridgeError>) -> i32 {
        match result {
            Ok(_) => ResultCode::Ok.code(),
            Err(e) => ResultCode::from(e).code(),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            // Blocking here would stall the runtime. Closing the mailbox (when `self.tx` drops)
            // stops the worker, which then tears down its views by itself.
            self.closed.store(true, Ordering::Release);
            lock(&self.worker).take();
            return;
        }
        self.shutdown();
    }
}
