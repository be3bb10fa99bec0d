use std::sync::atomic::{AtomicU64, Ordering};

/// Message-id supplier injected into the bus.
///
/// Ids must be unique within the process for the lifetime of any
/// concurrently in-flight message; the default supplier is monotonic.
pub trait MsgIdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Monotonic id supplier backed by an atomic counter.
#[derive(Debug)]
pub struct MonotonicMsgId(AtomicU64);

impl MonotonicMsgId {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self(AtomicU64::new(first))
    }
}

impl Default for MonotonicMsgId {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgIdGenerator for MonotonicMsgId {
    fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
