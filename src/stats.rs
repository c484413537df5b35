use std::sync::atomic::{AtomicU64, Ordering};

/// Counters published by the pipeline stages.
///
/// Protocol violations on receive are counted under their `dropped_*`
/// reason; `dropped_count` records backpressure drops (a downstream queue
/// refusing an element).
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub dropped_version: AtomicU64,
    pub dropped_seqnum: AtomicU64,
    pub dropped_noeom: AtomicU64,
    pub dropped_nosom: AtomicU64,
    pub dropped_wrongto: AtomicU64,
    pub dropped_overflow: AtomicU64,
    pub dropped_count: AtomicU64,
    pub message_count: AtomicU64,
    pub successful_actions: AtomicU64,
    pub failed_actions: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            dropped_version: self.dropped_version.load(Ordering::Relaxed),
            dropped_seqnum: self.dropped_seqnum.load(Ordering::Relaxed),
            dropped_noeom: self.dropped_noeom.load(Ordering::Relaxed),
            dropped_nosom: self.dropped_nosom.load(Ordering::Relaxed),
            dropped_wrongto: self.dropped_wrongto.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_count: self.dropped_count.load(Ordering::Relaxed),
            message_count: self.message_count.load(Ordering::Relaxed),
            successful_actions: self.successful_actions.load(Ordering::Relaxed),
            failed_actions: self.failed_actions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub dropped_version: u64,
    pub dropped_seqnum: u64,
    pub dropped_noeom: u64,
    pub dropped_nosom: u64,
    pub dropped_wrongto: u64,
    pub dropped_overflow: u64,
    pub dropped_count: u64,
    pub message_count: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
}
