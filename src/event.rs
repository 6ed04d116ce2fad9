//! Scheduler wake-up bus.
//!
//! State-changing scheduler operations publish a [`BusEvent`] here so the
//! job-sender and command-sender loops wake without polling. Receivers treat
//! a wake-up as level-triggered: they re-check scheduler state, so a lagged
//! or coalesced event is harmless.

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// Tasks may be waiting for placement; the job sender should poll.
    TasksAvailable,
    /// A worker command queue became non-empty.
    CommandsAvailable,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Publish an event. A send error only means nobody is listening yet.
    pub fn notify(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}
