//! Crawl workers: dequeue, fetch, resolve, emit, fan out.
//!
//! Workers are symmetric and stateless; the only shared mutable state they
//! touch is behind the queues, the dedup filter and the metrics atomics,
//! none of which is held across I/O.

use crate::domain;
use crate::fetch::{unix_millis, Fetch};
use crate::metrics::Metrics;
use crate::output::JsonlWriter;
use crate::queue::{CrawlResult, ResultQueue, Task, TaskQueue};
use crate::resolve::{DnsLogRecord, Resolve};
use crate::scheduler::Admission;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

pub struct Worker {
    pub id: usize,
    pub tasks: Arc<TaskQueue>,
    pub results: Arc<ResultQueue>,
    pub fetcher: Arc<dyn Fetch>,
    pub resolver: Arc<dyn Resolve>,
    pub admission: Arc<Admission>,
    pub metrics: Arc<Metrics>,
    pub dns_log: Option<Arc<JsonlWriter>>,
    pub protocols: Vec<String>,
    pub max_depth: i32,
    pub cancelled: Arc<AtomicBool>,
}

impl Worker {
    /// Loop until the task queue is closed and drained, or cancellation is
    /// observed.
    pub async fn run(self) {
        while let Some(task) = self.tasks.dequeue().await {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            self.process(task).await;
        }
    }

    async fn process(&self, task: Task) {
        Metrics::incr(&self.metrics.active_workers);

        // admission already enforced this; recheck is cheap
        if domain::depth(&task.domain, &task.root) > self.max_depth {
            self.finish_task();
            return;
        }

        let fetched = self
            .fetcher
            .fetch(&task.domain, &task.root, &self.protocols)
            .await;

        // fan out through the same admission gate the scheduler seeds with;
        // a child counts as discovered once it passes the dedup filter
        let mut discovered = Vec::with_capacity(fetched.subdomains.len());
        for child in &fetched.subdomains {
            let outcome = self.admission.admit(child, Some(&task.root)).await;
            if outcome.discovered() {
                discovered.push(child.clone());
            }
        }
        self.metrics
            .subdomains_found
            .fetch_add(discovered.len() as u64, Ordering::Relaxed);

        // best-effort enrichment; DNS failures never touch the error field
        Metrics::incr(&self.metrics.dns_requests);
        let request_at = unix_millis();
        let started = Instant::now();
        let (ips, dns_err) = self.resolver.resolve(&task.domain).await;
        if let Some(log) = &self.dns_log {
            let _ = log.log(&DnsLogRecord {
                domain: &task.domain,
                types: ["A", "AAAA"],
                ips: &ips,
                error: dns_err.as_deref().unwrap_or(""),
                rtt_ms: started.elapsed().as_millis() as i64,
                request_at,
            });
        }

        if !fetched.error.is_empty() {
            Metrics::incr(&self.metrics.errors);
        }

        let result = CrawlResult {
            domain: fetched.domain,
            root: fetched.root,
            subdomains: discovered,
            ips,
            title: fetched.title,
            content_length: fetched.content_length,
            status_code: fetched.status_code,
            error: fetched.error,
        };
        // dropped silently when the result queue is already closed
        let _ = self.results.send(result).await;

        self.finish_task();
    }

    fn finish_task(&self) {
        Metrics::incr(&self.metrics.tasks_processed);
        self.admission.task_done();
        self.metrics.active_workers.fetch_sub(1, Ordering::Relaxed);
    }
}
