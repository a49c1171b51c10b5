//! Page to host messages.
//!
//! Script calls a global native function (see [`NATIVE_FUNCTION`]) with one argument. The
//! engine reports the call together with the script context it came from, and the
//! [`NativeRouter`] finds the view slot owning that context and queues the payload on the
//! view's inbox. Console output takes a separate path straight into the console queue.

use crate::engine::ScriptContext;
use crate::queue::MessageQueue;
use std::sync::{Arc, RwLock};

/// Global function installed in every page.
pub const NATIVE_FUNCTION: &str = "__bridgeSend";

/// Exposes the native function as `window.bridge.send`.
pub const NAMESPACE_SCRIPT: &str =
    "window.bridge=window.bridge||{};window.bridge.send=window.__bridgeSend;";

#[derive(Debug)]
struct Route {
    context: ScriptContext,
    inbox: Arc<MessageQueue>,
}

/// Maps script contexts to view inboxes.
///
/// A navigation replaces the page's script context, so every (re)install of the native
/// function rebinds the slot to its current context.
#[derive(Debug)]
pub struct NativeRouter {
    routes: RwLock<Vec<Option<Route>>>,
}

impl NativeRouter {
    pub fn new(slots: usize) -> Self {
        let routes = (0..slots).map(|_| None).collect();
        Self { routes: RwLock::new(routes) }
    }

    /// Binds `slot` to `context`. Any other slot still holding `context` is unbound.
    pub fn bind(&self, slot: usize, context: ScriptContext, inbox: Arc<MessageQueue>) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if slot >= routes.len() {
            return;
        }
        for (idx, route) in routes.iter_mut().enumerate() {
            if idx != slot && route.as_ref().is_some_and(|r| r.context == context) {
                *route = None;
            }
        }
        routes[slot] = Some(Route { context, inbox });
    }

    pub fn unbind(&self, slot: usize) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if let Some(route) = routes.get_mut(slot) {
            *route = None;
        }
    }

    /// Slot currently bound to `context`.
    pub fn slot_for(&self, context: ScriptContext) -> Option<usize> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.context == context))
    }

    /// Queues `payload` on the inbox bound to `context`. Returns false when no view owns the
    /// context or the inbox refused the message.
    pub fn dispatch(&self, context: ScriptContext, payload: &str) -> bool {
        let inbox = {
            let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
            routes
                .iter()
                .flatten()
                .find(|r| r.context == context)
                .map(|r| r.inbox.clone())
        };

        match inbox {
            Some(inbox) => inbox.push(payload),
            None => {
                log::debug!("native message for unknown script context {:?}", context);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{OverflowPolicy, OversizePolicy};

    fn inbox() -> Arc<MessageQueue> {
        Arc::new(MessageQueue::new(4, 64, OverflowPolicy::RejectNewest, OversizePolicy::Reject))
    }

    #[test]
    fn dispatch_reaches_bound_slot() {
        let router = NativeRouter::new(4);
        let a = inbox();
        let b = inbox();
        router.bind(0, ScriptContext(10), a.clone());
        router.bind(2, ScriptContext(20), b.clone());

        assert!(router.dispatch(ScriptContext(20), "hello"));
        assert_eq!(b.pop().as_deref(), Some("hello"));
        assert!(a.is_empty());
        assert!(!router.dispatch(ScriptContext(99), "lost"));
    }

    #[test]
    fn rebinding_replaces_stale_context() {
        let router = NativeRouter::new(2);
        let a = inbox();
        router.bind(0, ScriptContext(1), a.clone());
        router.bind(0, ScriptContext(2), a.clone());
        assert_eq!(router.slot_for(ScriptContext(1)), None);
        assert_eq!(router.slot_for(ScriptContext(2)), Some(0));

        // A recycled context moves to the slot that bound it last
        router.bind(1, ScriptContext(2), inbox());
        assert_eq!(router.slot_for(ScriptContext(2)), Some(1));

        router.unbind(1);
        assert!(!router.dispatch(ScriptContext(2), "x"));
    }
}
