use crate::queue::TaskQueue;
use serde::Serialize;
use std::io::{stderr, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};

/// Run counters, updated with relaxed atomics on the hot path and read as
/// snapshots by the progress reporter (or any other subscriber).
#[derive(Default)]
pub struct Metrics {
    pub tasks_enqueued: AtomicU64,
    pub tasks_processed: AtomicU64,
    pub subdomains_found: AtomicU64,
    pub http_requests: AtomicU64,
    pub dns_requests: AtomicU64,
    pub errors: AtomicU64,
    pub wildcard_rejected: AtomicU64,
    pub dropped_full: AtomicU64,
    pub active_workers: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self, queue_len: usize, elapsed_secs: u64) -> Snapshot {
        Snapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            subdomains_found: self.subdomains_found.load(Ordering::Relaxed),
            http_requests: self.http_requests.load(Ordering::Relaxed),
            dns_requests: self.dns_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            wildcard_rejected: self.wildcard_rejected.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            queue_len: queue_len as u64,
            elapsed_secs,
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Snapshot {
    pub tasks_enqueued: u64,
    pub tasks_processed: u64,
    pub subdomains_found: u64,
    pub http_requests: u64,
    pub dns_requests: u64,
    pub errors: u64,
    pub wildcard_rejected: u64,
    pub dropped_full: u64,
    pub active_workers: u64,
    pub queue_len: u64,
    pub elapsed_secs: u64,
}

impl Snapshot {
    pub fn stat_line(&self, rate: f64) -> String {
        format!(
            "[stat] enq={} done={} subs={} http={} dns={} err={} drop={} q={} w={} rate/s={:.0} elapsed={}s",
            self.tasks_enqueued,
            self.tasks_processed,
            self.subdomains_found,
            self.http_requests,
            self.dns_requests,
            self.errors,
            self.dropped_full,
            self.queue_len,
            self.active_workers,
            rate,
            self.elapsed_secs,
        )
    }
}

/// Periodic single-line progress report on stderr. Runs until aborted.
pub fn spawn_reporter(m: Arc<Metrics>, tasks: Arc<TaskQueue>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut last_done = 0u64;
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tick.tick().await;
            let snap = m.snapshot(tasks.len(), start.elapsed().as_secs());
            let d_done = snap.tasks_processed.saturating_sub(last_done);
            last_done = snap.tasks_processed;
            let rate = d_done as f64 / interval_secs.max(1) as f64;
            let mut err = stderr();
            let _ = write!(err, "\r{}", snap.stat_line(rate));
            let _ = err.flush();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reads_counters() {
        let m = Metrics::new();
        m.tasks_enqueued.fetch_add(5, Ordering::Relaxed);
        m.tasks_processed.fetch_add(3, Ordering::Relaxed);
        m.errors.fetch_add(1, Ordering::Relaxed);
        let snap = m.snapshot(7, 12);
        assert_eq!(snap.tasks_enqueued, 5);
        assert_eq!(snap.tasks_processed, 3);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.queue_len, 7);
        let line = snap.stat_line(1.5);
        assert!(line.contains("enq=5"));
        assert!(line.contains("done=3"));
    }
}
