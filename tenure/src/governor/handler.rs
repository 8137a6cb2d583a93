use std::fmt;
use std::sync::{Arc, Weak};

use crate::label::HandlerLabel;
use crate::tier::CostTier;

/// Component that can release memory on request.
///
/// Caches register with a [`MemoryGovernor`](super::MemoryGovernor) and are
/// asked to free memory when the tenured pool is under pressure or a caller
/// requests it explicitly.
pub trait MemoryHandler: Send + Sync {
    /// Frees roughly `tier` units of memory and returns how many items were
    /// released.
    fn free_memory(&self, tier: CostTier) -> usize;

    /// Name used in logs and metrics.
    fn label(&self) -> HandlerLabel {
        HandlerLabel::ANONYMOUS
    }
}

/// Registration handle returned by
/// [`MemoryGovernor::add_handler`](super::MemoryGovernor::add_handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Outcome of one pass over the registered handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relief {
    /// Handlers asked to free memory.
    pub handlers_invoked: usize,
    /// Sum of the counts they reported.
    pub released: usize,
}

struct Slot {
    id: HandlerId,
    handler: Weak<dyn MemoryHandler>,
}

/// Weakly held handlers in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    slots: Vec<Slot>,
}

impl HandlerRegistry {
    pub(crate) fn add(&mut self, handler: Weak<dyn MemoryHandler>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.slots.push(Slot { id, handler });
        id
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.id != id);
        self.slots.len() != before
    }

    /// Live handlers in registration order; dead registrations are pruned.
    pub(crate) fn live(&mut self) -> Vec<Arc<dyn MemoryHandler>> {
        let mut live = Vec::with_capacity(self.slots.len());
        self.slots.retain(|slot| match slot.handler.upgrade() {
            Some(handler) => {
                live.push(handler);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn len(&mut self) -> usize {
        self.slots.retain(|slot| slot.handler.strong_count() > 0);
        self.slots.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("next_id", &self.next_id)
            .field("slots", &self.slots.len())
            .finish()
    }
}
