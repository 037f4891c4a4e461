// Single-slot handoff between the async input side and the control thread
//
// The writer swaps in a freshly allocated snapshot; the reader loads the
// current one without locking or allocating. Writes between two reads
// coalesce, only the newest is seen.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;

pub struct RealtimeBuffer<T> {
    slot: ArcSwap<T>,
    fresh: AtomicBool,
}

impl<T: Copy> RealtimeBuffer<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: ArcSwap::from_pointee(initial),
            fresh: AtomicBool::new(false),
        }
    }

    /// Publish a new value (non-realtime side)
    pub fn write(&self, value: T) {
        self.slot.store(Arc::new(value));
        self.fresh.store(true, Ordering::Release);
    }

    /// Latest published value
    pub fn read(&self) -> T {
        **self.slot.load()
    }

    /// Latest value if anything was written since the previous call
    pub fn take_fresh(&self) -> Option<T> {
        if self.fresh.swap(false, Ordering::Acquire) {
            Some(self.read())
        } else {
            None
        }
    }
}
