/// Outcome of one tick across all views.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Occupied slots when the tick ran.
    pub views: usize,
    /// Views that submitted their pending content this tick.
    pub content_submitted: usize,
    /// Views that became ready this tick.
    pub became_ready: usize,
    /// Views whose bindings were installed by the retry step.
    pub bindings_retried: usize,
    /// Input events and scripts dispatched to the engine.
    pub events_dispatched: usize,
}

impl TickReport {
    /// True if the tick changed the load state of any view.
    pub fn any_transition(&self) -> bool {
        self.content_submitted > 0 || self.became_ready > 0
    }
}
