//! View slot table.
//!
//! Each live view occupies one slot of a fixed-size table. A slot has two halves:
//!
//! - [`ViewSlot`] is owned by the worker and holds the engine handles, the load phase and the
//!   binding state. The calling thread never sees it.
//! - [`SlotShared`] is shared with the calling thread: the input queues it fills between ticks,
//!   the message queues it polls, and a few atomics for cheap status queries.

use crate::config::BridgeConfig;
use crate::engine::{ScriptContext, ViewHandles};
use crate::input::{KeyEvent, MouseEvent, ScrollEvent};
use crate::queue::{BoundedQueue, MessageQueue, OversizePolicy};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Index of a view in the slot table. Handles of destroyed views may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(usize);

impl ViewHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Handle from a C ABI id. Negative ids are never valid.
    pub fn from_raw(id: i32) -> Option<Self> {
        usize::try_from(id).ok().map(Self)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl std::fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Content waiting for an async view to finish priming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingContent {
    Html(String),
    Url(String),
}

/// Load phase of a view. Only moves forward: Priming, then ContentPending, then Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Ready,
    Priming { ticks_remaining: u32 },
    ContentPending { ticks_remaining: u32 },
}

/// Work the worker must do after a phase step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    None,
    /// Priming finished: render once and submit the pending content.
    SubmitContent,
    /// Content settled: render once and install the page bindings.
    InstallBindings,
}

impl LoadPhase {
    pub fn code(self) -> u8 {
        match self {
            LoadPhase::Ready => 0,
            LoadPhase::Priming { .. } => 1,
            LoadPhase::ContentPending { .. } => 2,
        }
    }

    pub fn is_ready(self) -> bool {
        self == LoadPhase::Ready
    }

    /// Advances by one tick.
    pub fn advance(&mut self, content_ticks: u32) -> PhaseAction {
        match *self {
            LoadPhase::Ready => PhaseAction::None,
            LoadPhase::Priming { ticks_remaining } => {
                if ticks_remaining > 1 {
                    *self = LoadPhase::Priming { ticks_remaining: ticks_remaining - 1 };
                    PhaseAction::None
                } else {
                    *self = LoadPhase::ContentPending { ticks_remaining: content_ticks };
                    PhaseAction::SubmitContent
                }
            }
            LoadPhase::ContentPending { ticks_remaining } => {
                if ticks_remaining > 1 {
                    *self = LoadPhase::ContentPending { ticks_remaining: ticks_remaining - 1 };
                    PhaseAction::None
                } else {
                    *self = LoadPhase::Ready;
                    PhaseAction::InstallBindings
                }
            }
        }
    }
}

/// Worker-side state of an occupied slot.
#[derive(Debug)]
pub struct ViewSlot {
    pub handles: ViewHandles,
    pub width: u32,
    pub height: u32,
    pub phase: LoadPhase,
    pub pending: Option<PendingContent>,
    pub bindings_installed: bool,
    pub context: Option<ScriptContext>,
}

impl ViewSlot {
    pub fn new(handles: ViewHandles, width: u32, height: u32) -> Self {
        Self {
            handles,
            width,
            height,
            phase: LoadPhase::Ready,
            pending: None,
            bindings_installed: false,
            context: None,
        }
    }
}

/// Input drained from a slot in one tick, in enqueue order per kind.
#[derive(Debug, Default)]
pub struct DrainedInput {
    pub mouse: Vec<MouseEvent>,
    pub scroll: Vec<ScrollEvent>,
    pub keys: Vec<KeyEvent>,
    pub scripts: Vec<String>,
}

impl DrainedInput {
    pub fn len(&self) -> usize {
        self.mouse.len() + self.scroll.len() + self.keys.len() + self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Part of a slot visible to the calling thread.
#[derive(Debug)]
pub struct SlotShared {
    used: AtomicBool,
    phase: AtomicU8,
    width: AtomicU32,
    height: AtomicU32,
    mouse: Mutex<BoundedQueue<MouseEvent>>,
    scroll: Mutex<BoundedQueue<ScrollEvent>>,
    keys: Mutex<BoundedQueue<KeyEvent>>,
    scripts: Mutex<BoundedQueue<String>>,
    script_len: usize,
    key_text_len: usize,
    /// Native messages sent by the page.
    pub messages: Arc<MessageQueue>,
    /// Console output of the page.
    pub console: Arc<MessageQueue>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SlotShared {
    pub fn new(config: &BridgeConfig) -> Self {
        let q = &config.queues;
        Self {
            used: AtomicBool::new(false),
            phase: AtomicU8::new(LoadPhase::Ready.code()),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            mouse: Mutex::new(BoundedQueue::new(q.mouse)),
            scroll: Mutex::new(BoundedQueue::new(q.scroll)),
            keys: Mutex::new(BoundedQueue::new(q.key)),
            scripts: Mutex::new(BoundedQueue::new(q.script)),
            script_len: q.script_len,
            key_text_len: q.key_text_len,
            messages: Arc::new(MessageQueue::new(
                q.messages,
                q.message_len,
                q.message_overflow,
                OversizePolicy::Reject,
            )),
            console: Arc::new(MessageQueue::new(
                q.console,
                q.console_len,
                q.console_overflow,
                OversizePolicy::Truncate,
            )),
        }
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.is_used() && self.phase.load(Ordering::Acquire) == LoadPhase::Ready.code()
    }

    pub fn phase_code(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    /// Width and height, or `(0, 0)` for a free slot.
    pub fn dimensions(&self) -> (u32, u32) {
        if !self.is_used() {
            return (0, 0);
        }
        (self.width.load(Ordering::Acquire), self.height.load(Ordering::Acquire))
    }

    pub fn push_mouse(&self, event: MouseEvent) -> bool {
        self.is_used() && lock(&self.mouse).push(event)
    }

    pub fn push_scroll(&self, event: ScrollEvent) -> bool {
        self.is_used() && lock(&self.scroll).push(event)
    }

    pub fn push_key(&self, mut event: KeyEvent) -> bool {
        if !self.is_used() {
            return false;
        }
        if event.text.len() > self.key_text_len {
            event.text = crate::queue::truncate_utf8(&event.text, self.key_text_len).to_owned();
        }
        lock(&self.keys).push(event)
    }

    /// Queues a script for the next tick. Over-long scripts are refused.
    pub fn push_script(&self, script: &str) -> bool {
        if !self.is_used() || script.len() > self.script_len {
            return false;
        }
        lock(&self.scripts).push(script.to_owned())
    }

    pub fn key_text_len(&self) -> usize {
        self.key_text_len
    }

    /// Takes everything queued since the last tick.
    pub fn drain_input(&self) -> DrainedInput {
        DrainedInput {
            mouse: lock(&self.mouse).drain(),
            scroll: lock(&self.scroll).drain(),
            keys: lock(&self.keys).drain(),
            scripts: lock(&self.scripts).drain(),
        }
    }

    /// Marks the slot occupied. Leftovers of a previous occupant are dropped first.
    pub(crate) fn activate(&self, width: u32, height: u32, phase: LoadPhase) {
        self.clear_queues();
        self.width.store(width, Ordering::Release);
        self.height.store(height, Ordering::Release);
        self.phase.store(phase.code(), Ordering::Release);
        self.used.store(true, Ordering::Release);
    }

    pub(crate) fn set_phase(&self, phase: LoadPhase) {
        self.phase.store(phase.code(), Ordering::Release);
    }

    /// Marks the slot free and drops everything queued.
    pub(crate) fn release(&self) {
        self.used.store(false, Ordering::Release);
        self.phase.store(LoadPhase::Ready.code(), Ordering::Release);
        self.width.store(0, Ordering::Release);
        self.height.store(0, Ordering::Release);
        self.clear_queues();
    }

    fn clear_queues(&self) {
        lock(&self.mouse).clear();
        lock(&self.scroll).clear();
        lock(&self.keys).clear();
        lock(&self.scripts).clear();
        self.messages.clear();
        self.console.clear();
    }
}

/// Shared halves of every slot, indexed by handle.
pub type SharedSlots = Arc<Vec<Arc<SlotShared>>>;

pub fn shared_slots(config: &BridgeConfig) -> SharedSlots {
    Arc::new((0..config.max_views).map(|_| Arc::new(SlotShared::new(config))).collect())
}

/// Worker-side table.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Option<ViewSlot>>,
    shared: SharedSlots,
}

impl SlotTable {
    pub fn new(shared: SharedSlots) -> Self {
        let slots = (0..shared.len()).map(|_| None).collect();
        Self { slots, shared }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lowest free index.
    pub fn free_index(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Occupies `index` and publishes the slot to the calling thread.
    pub fn occupy(&mut self, index: usize, slot: ViewSlot) {
        self.shared[index].activate(slot.width, slot.height, slot.phase);
        self.slots[index] = Some(slot);
    }

    /// Frees `index`, returning its worker state.
    pub fn vacate(&mut self, index: usize) -> Option<ViewSlot> {
        let slot = self.slots.get_mut(index)?.take()?;
        self.shared[index].release();
        Some(slot)
    }

    pub fn get(&self, index: usize) -> Option<&ViewSlot> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ViewSlot> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn shared(&self, index: usize) -> &Arc<SlotShared> {
        &self.shared[index]
    }

    /// Indices of occupied slots, ascending.
    pub fn used_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RawSurface, RawView};
    use crate::input::{KeyEventKind, Modifiers, MouseButton, MouseEventKind};

    fn handles(n: usize) -> ViewHandles {
        ViewHandles { view: RawView(n), surface: RawSurface(n) }
    }

    #[test]
    fn async_phase_timeline() {
        let mut phase = LoadPhase::Priming { ticks_remaining: 2 };
        let actions: Vec<_> = (0..6).map(|_| phase.advance(3)).collect();
        assert_eq!(
            actions,
            vec![
                PhaseAction::None,
                PhaseAction::SubmitContent,
                PhaseAction::None,
                PhaseAction::None,
                PhaseAction::InstallBindings,
                PhaseAction::None,
            ]
        );
        assert!(phase.is_ready());
    }

    #[test]
    fn phase_codes() {
        assert_eq!(LoadPhase::Ready.code(), 0);
        assert_eq!(LoadPhase::Priming { ticks_remaining: 1 }.code(), 1);
        assert_eq!(LoadPhase::ContentPending { ticks_remaining: 1 }.code(), 2);
    }

    #[test]
    fn free_slots_refuse_input() {
        let shared = SlotShared::new(&BridgeConfig::default());
        let ev = MouseEvent::new(MouseEventKind::Moved, 1, 1, MouseButton::None);
        assert!(!shared.push_mouse(ev));
        assert!(!shared.push_script("1"));
        assert_eq!(shared.dimensions(), (0, 0));
        assert!(!shared.is_ready());

        shared.activate(10, 20, LoadPhase::Ready);
        assert!(shared.push_mouse(ev));
        assert_eq!(shared.dimensions(), (10, 20));
        assert!(shared.is_ready());
    }

    #[test]
    fn key_text_and_script_limits() {
        let cfg = BridgeConfig::default();
        let shared = SlotShared::new(&cfg);
        shared.activate(1, 1, LoadPhase::Ready);

        let key = KeyEvent {
            kind: KeyEventKind::Char,
            virtual_key: 65,
            modifiers: Modifiers::SHIFT,
            text: "A".repeat(64),
        };
        assert!(shared.push_key(key));
        assert!(!shared.push_script(&"x".repeat(cfg.queues.script_len + 1)));
        assert!(shared.push_script(&"x".repeat(cfg.queues.script_len)));

        let drained = shared.drain_input();
        assert_eq!(drained.keys[0].text.len(), cfg.queues.key_text_len);
        assert_eq!(drained.scripts.len(), 1);
        assert!(shared.drain_input().is_empty());
    }

    #[test]
    fn table_allocates_lowest_free_and_reuses() {
        let cfg = BridgeConfig::builder().max_views(2).build().unwrap();
        let mut table = SlotTable::new(shared_slots(&cfg));

        assert_eq!(table.free_index(), Some(0));
        table.occupy(0, ViewSlot::new(handles(1), 8, 8));
        table.occupy(1, ViewSlot::new(handles(2), 8, 8));
        assert_eq!(table.free_index(), None);
        assert_eq!(table.used_indices(), vec![0, 1]);

        table.shared(0).messages.push("left over");
        assert!(table.vacate(0).is_some());
        assert!(table.vacate(0).is_none());
        assert!(!table.shared(0).is_used());
        assert!(table.shared(0).messages.is_empty());
        assert_eq!(table.free_index(), Some(0));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn handle_from_raw() {
        assert_eq!(ViewHandle::from_raw(-1), None);
        assert_eq!(ViewHandle::from_raw(3).map(ViewHandle::index), Some(3));
        assert_eq!(ViewHandle::new(5).to_string(), "view#5");
    }
}
