//! Bounded, closable queues between the scheduler, workers and the sink.
//!
//! Task admission is a non-blocking offer: a full or closed queue rejects
//! the candidate and the caller drops it (the dedup filter has already
//! recorded it, so it will not come back). Results use a blocking send so a
//! momentarily busy sink backpressures workers instead of losing output.

use serde::Serialize;

/// One unit of crawl work. Created at admission, destroyed after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub domain: String,
    pub root: String,
    pub depth: i32,
}

/// One line of output per processed task. Field order is the wire order.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub domain: String,
    pub root: String,
    pub subdomains: Vec<String>,
    pub ips: Vec<String>,
    pub title: String,
    pub content_length: i64,
    pub status_code: u16,
    pub error: String,
}

pub struct TaskQueue {
    tx: async_channel::Sender<Task>,
    rx: async_channel::Receiver<Task>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        TaskQueue { tx, rx }
    }

    /// Non-blocking offer; false when the queue is full or closed.
    pub fn offer(&self, task: Task) -> bool {
        self.tx.try_send(task).is_ok()
    }

    /// Blocking receive; `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Task> {
        self.rx.recv().await.ok()
    }

    /// Idempotent; wakes all blocked receivers.
    pub fn close(&self) {
        self.tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub struct ResultQueue {
    tx: async_channel::Sender<CrawlResult>,
    rx: async_channel::Receiver<CrawlResult>,
}

impl ResultQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        ResultQueue { tx, rx }
    }

    /// Blocking send; false once the queue is closed (shutdown), in which
    /// case the result is dropped.
    pub async fn send(&self, result: CrawlResult) -> bool {
        self.tx.send(result).await.is_ok()
    }

    pub async fn recv(&self) -> Option<CrawlResult> {
        self.rx.recv().await.ok()
    }

    pub fn close(&self) {
        self.tx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
