//! The worker thread.
//!
//! The worker owns the engine and the worker half of the slot table. It runs one command at a
//! time and publishes the result before taking the next one, so engine calls never overlap and
//! always happen on this thread.

use crate::command::{Command, Envelope, Reply};
use crate::config::BridgeConfig;
use crate::engine::{Engine, EngineFactory, EngineHooks, RawView};
use crate::errors::ResultCode;
use crate::messages::NativeRouter;
use crate::pixels::{rgba_len, PixelUpdate, RawFrame};
use crate::slot::{
    LoadPhase, PendingContent, PhaseAction, SharedSlots, SlotTable, ViewHandle, ViewSlot,
};
use crate::tick::TickReport;
use tokio::sync::mpsc;

pub(crate) struct WorkerContext {
    config: BridgeConfig,
    factory: EngineFactory,
    hooks: EngineHooks,
    engine: Option<Box<dyn Engine>>,
    /// Set once `Init` succeeded. The engine may still be `None` afterwards if it was released
    /// while idle.
    initialized: bool,
    init_failure: Option<ResultCode>,
    table: SlotTable,
}

impl WorkerContext {
    pub fn new(config: BridgeConfig, factory: EngineFactory, hooks: EngineHooks, slots: SharedSlots) -> Self {
        Self {
            config,
            factory,
            hooks,
            engine: None,
            initialized: false,
            init_failure: None,
            table: SlotTable::new(slots),
        }
    }

    /// Executes one command. Returns the reply and whether the worker should keep running.
    pub fn execute(&mut self, command: Command) -> (Reply, bool) {
        log::trace!("worker: executing {}", command.name());
        let reply = match command {
            Command::Init => self.init(),
            Command::CreateView { width, height } => self.create_view(width, height),
            Command::CreateViewAsync { width, height, content } => {
                self.create_view_async(width, height, content)
            }
            Command::CreateWithContent { width, height, content } => {
                self.create_with_content(width, height, content)
            }
            Command::DestroyView { view } => self.destroy_view(view),
            Command::Load { view, content } => self.load(view, content),
            Command::Tick => self.tick(),
            Command::Evaluate { view, script } => self.evaluate(view, &script),
            Command::CopyPixels { view, min_len, scratch } => self.copy_pixels(view, min_len, scratch),
            Command::Quit => {
                self.shutdown();
                return (Reply::Done, false);
            }
        };
        (reply, true)
    }

    fn init(&mut self) -> Reply {
        if self.initialized {
            return Reply::Done;
        }
        if let Some(code) = self.init_failure {
            return Reply::Failed(code);
        }
        match (self.factory)(&self.config, self.hooks.clone()) {
            Ok(engine) => {
                log::info!("worker: engine '{}' initialized", engine.name());
                self.engine = Some(engine);
                self.initialized = true;
                Reply::Done
            }
            Err(e) => {
                let code = ResultCode::from(&e);
                log::error!("worker: engine initialization failed: {e}");
                self.init_failure = Some(code);
                Reply::Failed(code)
            }
        }
    }

    /// Makes sure an engine exists, re-creating it if it was released while idle.
    fn ensure_engine(&mut self) -> Result<(), ResultCode> {
        if self.init_failure.is_some() || !self.initialized {
            return Err(ResultCode::NotInitialized);
        }
        if self.engine.is_some() {
            return Ok(());
        }

        log::debug!("worker: re-creating released engine");
        match (self.factory)(&self.config, self.hooks.clone()) {
            Ok(engine) => {
                self.engine = Some(engine);
                Ok(())
            }
            Err(e) => {
                log::error!("worker: engine re-creation failed: {e}");
                self.init_failure = Some(ResultCode::from(&e));
                Err(ResultCode::NotInitialized)
            }
        }
    }

    /// Allocates a slot and an engine view. The slot is published with `phase`.
    fn allocate_view(&mut self, width: u32, height: u32, phase: LoadPhase) -> Result<(usize, RawView), ResultCode> {
        if width == 0 || height == 0 {
            return Err(ResultCode::InvalidArgument);
        }
        self.ensure_engine()?;
        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(ResultCode::NotInitialized);
        };
        let Some(index) = self.table.free_index() else {
            log::warn!("worker: no free view slot ({} in use)", self.table.capacity());
            return Err(ResultCode::NoFreeSlot);
        };

        let handles = engine.create_view(width, height).map_err(|e| {
            log::error!("worker: view creation failed: {e}");
            ResultCode::ViewCreation
        })?;

        let mut slot = ViewSlot::new(handles, width, height);
        slot.phase = phase;
        self.table.occupy(index, slot);

        engine.set_console_sink(handles.view, self.table.shared(index).console.clone());
        engine.focus(handles.view);
        log::debug!("worker: created view {index} ({width}x{height})");
        Ok((index, handles.view))
    }

    fn create_view(&mut self, width: u32, height: u32) -> Reply {
        let (index, _) = match self.allocate_view(width, height, LoadPhase::Ready) {
            Ok(v) => v,
            Err(code) => return Reply::Failed(code),
        };
        let Some(engine) = self.engine.as_deref_mut() else {
            return Reply::Failed(ResultCode::NotInitialized);
        };

        for _ in 0..self.config.prime_passes {
            engine.update();
        }
        engine.render();
        install_bindings(engine, &self.hooks.native, &mut self.table, index);
        Reply::Created(ViewHandle::new(index))
    }

    fn create_view_async(&mut self, width: u32, height: u32, content: PendingContent) -> Reply {
        let phase = LoadPhase::Priming { ticks_remaining: self.config.priming_ticks };
        match self.allocate_view(width, height, phase) {
            Ok((index, _)) => {
                if let Some(slot) = self.table.get_mut(index) {
                    slot.pending = Some(content);
                }
                Reply::Created(ViewHandle::new(index))
            }
            Err(code) => Reply::Failed(code),
        }
    }

    fn create_with_content(&mut self, width: u32, height: u32, content: PendingContent) -> Reply {
        let (index, view) = match self.allocate_view(width, height, LoadPhase::Ready) {
            Ok(v) => v,
            Err(code) => return Reply::Failed(code),
        };
        let Some(engine) = self.engine.as_deref_mut() else {
            return Reply::Failed(ResultCode::NotInitialized);
        };

        submit_content(engine, view, &content);
        engine.update();
        if !install_bindings(engine, &self.hooks.native, &mut self.table, index) {
            log::debug!("worker: bindings for view {index} deferred to next tick");
        }
        Reply::Created(ViewHandle::new(index))
    }

    fn destroy_view(&mut self, view: ViewHandle) -> Reply {
        let index = view.index();
        let Some(slot) = self.table.vacate(index) else {
            // Free or out of range: nothing to do.
            return Reply::Done;
        };
        self.hooks.native.unbind(index);

        if let Some(engine) = self.engine.as_deref_mut() {
            engine.destroy_view(slot.handles);
        }
        log::debug!("worker: destroyed view {index}, {} remaining", self.table.count());

        if self.config.release_engine_when_idle && self.table.count() == 0 {
            if let Some(engine) = self.engine.take() {
                log::info!("worker: last view closed, releasing engine '{}'", engine.name());
            }
        }
        Reply::Done
    }

    fn load(&mut self, view: ViewHandle, content: PendingContent) -> Reply {
        let index = view.index();
        if self.init_failure.is_some() || !self.initialized {
            return Reply::Failed(ResultCode::NotInitialized);
        }
        // A used slot implies a live engine, so a stale handle never revives a released one.
        let (Some(engine), Some(slot)) = (self.engine.as_deref_mut(), self.table.get_mut(index)) else {
            return Reply::Failed(ResultCode::InvalidHandle);
        };

        // Still priming: the new content simply replaces what was waiting.
        if matches!(slot.phase, LoadPhase::Priming { .. }) {
            slot.pending = Some(content);
            return Reply::Done;
        }

        slot.bindings_installed = false;
        slot.context = None;
        let raw = slot.handles.view;
        self.hooks.native.unbind(index);

        submit_content(engine, raw, &content);
        for _ in 0..self.config.settle_passes {
            engine.update();
            if !self.config.settle_interval.is_zero() {
                std::thread::sleep(self.config.settle_interval);
            }
        }
        engine.render();
        install_bindings(engine, &self.hooks.native, &mut self.table, index);
        Reply::Done
    }

    fn tick(&mut self) -> Reply {
        if self.init_failure.is_some() || !self.initialized {
            return Reply::Failed(ResultCode::NotInitialized);
        }
        let mut report = TickReport { views: self.table.count(), ..TickReport::default() };
        let Some(engine) = self.engine.as_deref_mut() else {
            // Released while idle, nothing to drive.
            return Reply::Tick(report);
        };
        let native = &self.hooks.native;
        let content_ticks = self.config.content_ticks;
        let used = self.table.used_indices();

        // 1. Load phases
        for &index in &used {
            let Some(slot) = self.table.get_mut(index) else { continue };
            let action = slot.phase.advance(content_ticks);
            let phase = slot.phase;
            let view = slot.handles.view;
            self.table.shared(index).set_phase(phase);

            match action {
                PhaseAction::None => {}
                PhaseAction::SubmitContent => {
                    engine.render();
                    let pending = self.table.get_mut(index).and_then(|s| s.pending.take());
                    if let Some(content) = pending {
                        submit_content(engine, view, &content);
                    }
                    report.content_submitted += 1;
                }
                PhaseAction::InstallBindings => {
                    engine.render();
                    install_bindings(engine, native, &mut self.table, index);
                    report.became_ready += 1;
                    log::debug!("worker: view {index} ready");
                }
            }
        }

        // 2. Retry bindings that did not take
        for &index in &used {
            let needs_retry = self
                .table
                .get(index)
                .is_some_and(|s| s.phase.is_ready() && !s.bindings_installed);
            if needs_retry && install_bindings(engine, native, &mut self.table, index) {
                report.bindings_retried += 1;
            }
        }

        // 3. Queued input, per view in slot order
        for &index in &used {
            let Some(slot) = self.table.get(index) else { continue };
            let (view, width, height) = (slot.handles.view, slot.width, slot.height);
            let input = self.table.shared(index).drain_input();
            report.events_dispatched += input.len();

            for event in &input.mouse {
                engine.fire_mouse(view, &event.clamped(width, height));
            }
            for event in &input.scroll {
                engine.fire_scroll(view, event);
            }
            for event in &input.keys {
                engine.fire_key(view, event);
            }
            for script in &input.scripts {
                engine.evaluate_script(view, script);
            }
        }

        // 4. One engine cycle for all views
        engine.update();
        engine.refresh_display(0);
        engine.render();
        Reply::Tick(report)
    }

    fn evaluate(&mut self, view: ViewHandle, script: &str) -> Reply {
        if self.init_failure.is_some() || !self.initialized {
            return Reply::Failed(ResultCode::NotInitialized);
        }
        let (Some(engine), Some(slot)) = (self.engine.as_deref_mut(), self.table.get(view.index())) else {
            return Reply::Failed(ResultCode::InvalidHandle);
        };
        Reply::Evaluated(engine.evaluate_script(slot.handles.view, script))
    }

    fn copy_pixels(&mut self, view: ViewHandle, min_len: usize, mut scratch: Vec<u8>) -> Reply {
        let empty = |update, bytes| Reply::Pixels {
            update,
            frame: RawFrame { width: 0, height: 0, row_bytes: 0, bytes },
        };

        let (Some(engine), Some(slot)) = (self.engine.as_deref_mut(), self.table.get(view.index())) else {
            return empty(PixelUpdate::Rejected, scratch);
        };
        let surface = slot.handles.surface;
        let Some(info) = engine.surface_info(surface) else {
            return empty(PixelUpdate::Rejected, scratch);
        };
        if min_len < rgba_len(info.width, info.height) {
            return empty(PixelUpdate::Rejected, scratch);
        }
        if info.dirty.is_empty() {
            return empty(PixelUpdate::NoUpdate, scratch);
        }

        let needed = info.row_bytes as usize * info.height as usize;
        scratch.clear();
        let mut short = false;
        let locked = engine.with_pixels(surface, &mut |pixels| match pixels.get(..needed) {
            Some(rows) => scratch.extend_from_slice(rows),
            None => short = true,
        });
        if !locked {
            log::warn!("worker: could not lock surface of view {view}");
            return empty(PixelUpdate::Rejected, scratch);
        }
        if short {
            // Dirty region stays set so the next copy retries.
            log::warn!("worker: surface of view {view} is shorter than {needed} bytes");
            return empty(PixelUpdate::Rejected, scratch);
        }
        engine.clear_dirty_bounds(surface);

        Reply::Pixels {
            update: PixelUpdate::Updated,
            frame: RawFrame { width: info.width, height: info.height, row_bytes: info.row_bytes, bytes: scratch },
        }
    }

    /// Destroys every view and drops the engine.
    pub fn shutdown(&mut self) {
        for index in self.table.used_indices() {
            if let Some(slot) = self.table.vacate(index) {
                self.hooks.native.unbind(index);
                if let Some(engine) = self.engine.as_deref_mut() {
                    engine.destroy_view(slot.handles);
                }
            }
        }
        if let Some(engine) = self.engine.take() {
            log::info!("worker: shutting down engine '{}'", engine.name());
        }
    }
}

fn submit_content(engine: &mut dyn Engine, view: RawView, content: &PendingContent) {
    match content {
        PendingContent::Html(html) => engine.load_html(view, html),
        PendingContent::Url(url) => engine.load_url(view, url),
    }
}

/// Installs the native message function in the view's current page and binds the page's
/// script context to the view's inbox.
fn install_bindings(engine: &mut dyn Engine, native: &NativeRouter, table: &mut SlotTable, index: usize) -> bool {
    let inbox = table.shared(index).messages.clone();
    let Some(slot) = table.get_mut(index) else {
        return false;
    };
    let view = slot.handles.view;

    let Some(context) = engine.script_context(view) else {
        log::debug!("worker: view {index} has no script context yet");
        return false;
    };
    if !engine.install_native_function(view) {
        log::debug!("worker: installing native function failed for view {index}");
        return false;
    }

    native.bind(index, context, inbox);
    slot.context = Some(context);
    slot.bindings_installed = true;
    true
}

/// Worker main loop. Runs until `Quit` or until every sender is gone.
pub(crate) fn run(mut ctx: WorkerContext, mut rx: mpsc::Receiver<Envelope>) {
    log::debug!("worker: started");
    while let Some(Envelope { command, reply }) = rx.blocking_recv() {
        let (result, keep_running) = ctx.execute(command);
        if reply.send(result).is_err() {
            log::debug!("worker: caller went away before the reply");
        }
        if !keep_running {
            log::debug!("worker: stopped");
            return;
        }
    }
    ctx.shutdown();
    log::debug!("worker: channel closed, stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::headless::{self, HeadlessOptions, HeadlessProbe, ProbeEvent};
    use crate::input::{KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind};
    use crate::slot::shared_slots;
    use crate::vfs::Vfs;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(options: HeadlessOptions, config: BridgeConfig) -> (WorkerContext, HeadlessProbe, SharedSlots) {
        let probe = HeadlessProbe::default();
        let slots = shared_slots(&config);
        let hooks = EngineHooks {
            files: Arc::new(Vfs::new(&config.base_dir, config.vfs_capacity)),
            native: Arc::new(NativeRouter::new(config.max_views)),
        };
        let factory = headless::factory(options, probe.clone());
        let ctx = WorkerContext::new(config, factory, hooks, slots.clone());
        (ctx, probe, slots)
    }

    fn fast_config() -> BridgeConfig {
        BridgeConfig::builder()
            .settle_passes(2)
            .settle_interval(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn created(reply: Reply) -> ViewHandle {
        match reply {
            Reply::Created(handle) => handle,
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn commands_before_init_fail() {
        let (mut ctx, _, _) = context(HeadlessOptions::default(), fast_config());
        let (reply, _) = ctx.execute(Command::Tick);
        assert_eq!(reply.code(), ResultCode::NotInitialized);
    }

    #[test]
    fn failed_init_poisons_every_command() {
        let options = HeadlessOptions { fail_init: true, ..Default::default() };
        let (mut ctx, _, _) = context(options, fast_config());
        let (reply, _) = ctx.execute(Command::Init);
        assert_eq!(reply.code(), ResultCode::RendererCreation);

        for cmd in [
            Command::CreateView { width: 4, height: 4 },
            Command::Tick,
            Command::Evaluate { view: ViewHandle::new(0), script: "1".into() },
        ] {
            assert_eq!(ctx.execute(cmd).0.code(), ResultCode::NotInitialized);
        }
    }

    #[test]
    fn sync_create_is_ready_with_bindings() {
        let (mut ctx, probe, slots) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 32, height: 16 }).0);

        assert!(slots[handle.index()].is_ready());
        assert_eq!(slots[handle.index()].dimensions(), (32, 16));
        assert!(ctx.table.get(handle.index()).unwrap().bindings_installed);
        assert!(probe.events().iter().any(|e| matches!(e, ProbeEvent::BindingsInstalled { .. })));
    }

    #[test]
    fn full_table_reports_no_free_slot() {
        let config = BridgeConfig::builder().max_views(1).build().unwrap();
        let (mut ctx, _, _) = context(HeadlessOptions::default(), config);
        ctx.execute(Command::Init);
        created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        let (reply, _) = ctx.execute(Command::CreateView { width: 4, height: 4 });
        assert_eq!(reply.code(), ResultCode::NoFreeSlot);
        assert!(ResultCode::NoFreeSlot.code() < 0);
    }

    #[test]
    fn zero_sized_views_are_rejected() {
        let (mut ctx, _, _) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let (reply, _) = ctx.execute(Command::CreateView { width: 0, height: 4 });
        assert_eq!(reply.code(), ResultCode::InvalidArgument);
    }

    #[test]
    fn engine_view_failure_leaves_slot_free() {
        let options = HeadlessOptions { fail_create: true, ..Default::default() };
        let (mut ctx, _, slots) = context(options, fast_config());
        ctx.execute(Command::Init);
        let (reply, _) = ctx.execute(Command::CreateView { width: 4, height: 4 });
        assert_eq!(reply.code(), ResultCode::ViewCreation);
        assert!(!slots[0].is_used());
    }

    #[test]
    fn double_destroy_is_a_no_op() {
        let (mut ctx, probe, slots) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);

        assert!(matches!(ctx.execute(Command::DestroyView { view: handle }).0, Reply::Done));
        assert!(matches!(ctx.execute(Command::DestroyView { view: handle }).0, Reply::Done));
        assert!(matches!(ctx.execute(Command::DestroyView { view: ViewHandle::new(99) }).0, Reply::Done));
        assert!(!slots[handle.index()].is_used());

        let destroyed = probe
            .events()
            .iter()
            .filter(|e| matches!(e, ProbeEvent::ViewDestroyed { .. }))
            .count();
        assert_eq!(destroyed, 1);
    }

    #[test]
    fn tick_drains_queues_in_order_and_clamps_mouse() {
        let (mut ctx, probe, slots) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 10, height: 10 }).0);
        let shared = &slots[handle.index()];

        shared.push_mouse(MouseEvent::new(MouseEventKind::Moved, 50, -3, MouseButton::None));
        shared.push_mouse(MouseEvent::new(MouseEventKind::Down, 2, 3, MouseButton::Left));
        shared.push_key(KeyEvent::new(KeyEventKind::RawKeyDown, 13, Modifiers::empty(), "", 31));
        shared.push_script("console.log(\"hi\")");
        probe.clear_events();

        let Reply::Tick(report) = ctx.execute(Command::Tick).0 else { panic!("expected tick") };
        assert_eq!(report.events_dispatched, 4);

        let events = probe.events();
        let mouse: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProbeEvent::Mouse { event, .. } => Some((event.x, event.y)),
                _ => None,
            })
            .collect();
        assert_eq!(mouse, vec![(9, 0), (2, 3)]);
        assert!(events.iter().any(|e| matches!(e, ProbeEvent::Key { engine_kind: 2, .. })));
        assert_eq!(shared.console.pop().as_deref(), Some("hi"));

        // Exactly one engine cycle per tick, after all input
        let updates = events.iter().filter(|e| matches!(e, ProbeEvent::Update)).count();
        assert_eq!(updates, 1);
        assert!(matches!(events.last(), Some(ProbeEvent::Render)));
    }

    #[test]
    fn navigation_reinstalls_bindings() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        let first = ctx.table.get(handle.index()).unwrap().context;

        probe.clear_events();
        let content = PendingContent::Html("<p>next</p>".into());
        assert!(matches!(ctx.execute(Command::Load { view: handle, content }).0, Reply::Done));

        let slot = ctx.table.get(handle.index()).unwrap();
        assert!(slot.bindings_installed);
        assert_ne!(slot.context, first);
        let updates = probe.events().iter().filter(|e| matches!(e, ProbeEvent::Update)).count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn load_on_free_slot_is_invalid_handle() {
        let (mut ctx, _, _) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        let content = PendingContent::Url("file:///x.html".into());
        let (reply, _) = ctx.execute(Command::Load { view: ViewHandle::new(3), content });
        assert_eq!(reply.code(), ResultCode::InvalidHandle);
    }

    #[test]
    fn idle_engine_is_released_and_recreated() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default(), BridgeConfig::default());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        ctx.execute(Command::DestroyView { view: handle });
        assert!(ctx.engine.is_none());
        assert_eq!(probe.engines_dropped(), 1);

        // Ticking while idle does not bring the engine back
        assert!(matches!(ctx.execute(Command::Tick).0, Reply::Tick(_)));
        assert!(ctx.engine.is_none());

        created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        assert_eq!(probe.engines_created(), 2);
    }

    #[test]
    fn idle_release_can_be_turned_off() {
        let config = BridgeConfig::builder().release_engine_when_idle(false).build().unwrap();
        let (mut ctx, probe, _) = context(HeadlessOptions::default(), config);
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        ctx.execute(Command::DestroyView { view: handle });
        assert!(ctx.engine.is_some());
        assert_eq!(probe.engines_dropped(), 0);
    }

    #[test]
    fn short_surface_keeps_the_frame_dirty() {
        let options = HeadlessOptions { short_pixels: 4, ..Default::default() };
        let (mut ctx, probe, _) = context(options, fast_config());
        ctx.execute(Command::Init);
        let handle = created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        let copy = |ctx: &mut WorkerContext| {
            let command = Command::CopyPixels { view: handle, min_len: rgba_len(4, 4), scratch: Vec::new() };
            match ctx.execute(command).0 {
                Reply::Pixels { update, .. } => update,
                other => panic!("unexpected reply {other:?}"),
            }
        };

        assert_eq!(copy(&mut ctx), PixelUpdate::Rejected);
        assert_eq!(copy(&mut ctx), PixelUpdate::Rejected);
        let (locks, unlocks) = probe.lock_counts();
        assert_eq!((locks, unlocks), (2, 2));
    }

    #[test]
    fn quit_stops_the_loop_and_destroys_views() {
        let (mut ctx, probe, slots) = context(HeadlessOptions::default(), fast_config());
        ctx.execute(Command::Init);
        created(ctx.execute(Command::CreateView { width: 4, height: 4 }).0);
        let (reply, keep_running) = ctx.execute(Command::Quit);
        assert!(matches!(reply, Reply::Done));
        assert!(!keep_running);
        assert!(!slots[0].is_used());
        assert_eq!(probe.engines_dropped(), 1);
    }
}
