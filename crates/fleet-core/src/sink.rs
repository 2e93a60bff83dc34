use parking_lot::Mutex;

use crate::error::FleetError;
use crate::event::ViolationEvent;

/// Where detected events go: a bus topic, a table insert, a spool.
/// Implementations must not block; a full downstream is an error.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ViolationEvent) -> Result<(), FleetError>;
}

/// Keeps everything in memory. Used by tests and the `check` command.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ViolationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViolationEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<ViolationEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &ViolationEvent) -> Result<(), FleetError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
