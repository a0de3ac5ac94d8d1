use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Processor health counters, exposed verbatim as the "Processor health"
/// projection in §6: `{is_running, last_processed_at, total_processed,
/// total_failed, average_processing_time_ms}`.
///
/// `total_processed` counts every terminal outcome the Processor itself
/// produced (COMPLETED or FAILED); EXPIRED transitions made by the
/// sweeper are not attempts and are not counted here.
#[derive(Clone, Default)]
pub struct Counters {
    is_running: Arc<AtomicBool>,
    last_processed_at_ms: Arc<AtomicI64>,
    total_processed: Arc<AtomicU64>,
    total_failed: Arc<AtomicU64>,
    sum_processing_time_ms: Arc<AtomicU64>,
}

/// Snapshot returned to callers of the Processor health query (§6).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessorHealth {
    pub is_running: bool,
    pub last_processed_at_ms: Option<i64>,
    pub total_processed: u64,
    pub total_failed: u64,
    pub average_processing_time_ms: f64,
}

impl Counters {
    pub fn set_running(&self, running: bool) {
        self.is_running.store(running, Ordering::Relaxed);
    }

    /// Records a COMPLETED outcome, including the wall-clock time spent
    /// across all of this intent's Allocator attempts.
    pub fn record_success(&self, elapsed: Duration, now_ms: i64) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.sum_processing_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.last_processed_at_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Records a FAILED outcome (non-retryable Allocator result, or
    /// attempts exhausted).
    pub fn record_failure(&self, elapsed: Duration, now_ms: i64) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.total_failed.fetch_add(1, Ordering::Relaxed);
        self.sum_processing_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.last_processed_at_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProcessorHealth {
        let total_processed = self.total_processed.load(Ordering::Relaxed);
        let sum_ms = self.sum_processing_time_ms.load(Ordering::Relaxed);
        let average_processing_time_ms = if total_processed == 0 {
            0.0
        } else {
            sum_ms as f64 / total_processed as f64
        };

        let last = self.last_processed_at_ms.load(Ordering::Relaxed);

        ProcessorHealth {
            is_running: self.is_running.load(Ordering::Relaxed),
            last_processed_at_ms: if last == 0 { None } else { Some(last) },
            total_processed,
            total_failed: self.total_failed.load(Ordering::Relaxed),
            average_processing_time_ms,
        }
    }
}
