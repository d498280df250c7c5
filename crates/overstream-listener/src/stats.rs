use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Coarse state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerHealth {
    /// Not started, or stopped.
    Stopped,
    /// Running with at least one live acceptor worker.
    Running,
    /// Running, but every acceptor worker has failed. The channel identity
    /// is still held by the keep-alive pair; no new client will be accepted.
    Degraded,
}

/// Point-in-time counters of a listener.
///
/// Totals accumulate across restarts; `live_workers` reflects the current
/// run only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub accepted: u64,
    pub active_handlers: u64,
    pub transient_faults: u64,
    pub live_workers: usize,
    pub failed_workers: u64,
    pub handler_panics: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    accepted: AtomicU64,
    active_handlers: AtomicU64,
    transient_faults: AtomicU64,
    live_workers: AtomicUsize,
    failed_workers: AtomicU64,
    handler_panics: AtomicU64,
}

impl Counters {
    /// Count an accepted connection and return its id (starting at 1).
    pub(crate) fn connection_accepted(&self) -> u64 {
        self.active_handlers.fetch_add(1, Ordering::Relaxed);
        self.accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn handler_finished(&self, panicked: bool) {
        self.active_handlers.fetch_sub(1, Ordering::Relaxed);
        if panicked {
            self.handler_panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn transient_fault(&self) {
        self.transient_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn workers_started(&self, count: usize) {
        self.live_workers.store(count, Ordering::Release);
    }

    /// Record a worker exit and return how many workers are still live.
    pub(crate) fn worker_exited(&self, failed: bool) -> usize {
        if failed {
            self.failed_workers.fetch_add(1, Ordering::Relaxed);
        }
        self.live_workers
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1)
    }

    pub(crate) fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            active_handlers: self.active_handlers.load(Ordering::Relaxed),
            transient_faults: self.transient_faults.load(Ordering::Relaxed),
            live_workers: self.live_workers(),
            failed_workers: self.failed_workers.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_start_at_one() {
        let counters = Counters::default();
        assert_eq!(counters.connection_accepted(), 1);
        assert_eq!(counters.connection_accepted(), 2);

        counters.handler_finished(false);
        counters.handler_finished(true);
        let stats = counters.snapshot();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.active_handlers, 0);
        assert_eq!(stats.handler_panics, 1);
    }

    #[test]
    fn last_failed_worker_reports_zero_live() {
        let counters = Counters::default();
        counters.workers_started(2);
        assert_eq!(counters.worker_exited(true), 1);
        assert_eq!(counters.worker_exited(true), 0);

        let stats = counters.snapshot();
        assert_eq!(stats.live_workers, 0);
        assert_eq!(stats.failed_workers, 2);
    }

    #[test]
    fn health_serializes_lowercase() {
        let json = serde_json::to_string(&ListenerHealth::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
