//! Lifecycle owner: builds every component, seeds the frontier, runs the
//! worker pool and the sink, and coordinates shutdown.
//!
//! Termination uses an outstanding-work counter instead of settle timers:
//! every successful queue offer increments it, every finished task
//! decrements it, and the task queue closes the moment it reaches zero.
//! Workers observe closed-and-drained and exit; the result queue closes
//! after the workers are joined, and the sink drains out behind them.

use crate::dedup::BloomFilter;
use crate::domain::{self, Scope};
use crate::expand;
use crate::fetch::{Fetch, HttpFetcher};
use crate::metrics::{spawn_reporter, Metrics};
use crate::options::Options;
use crate::output::{JsonLinesWriter, JsonlWriter, ResultWriter};
use crate::queue::{ResultQueue, Task, TaskQueue};
use crate::resolve::{Resolve, UdpResolver, WildcardDetector};
use crate::worker::Worker;
use anyhow::{bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// Not a syntactically valid hostname.
    Invalid,
    /// No configured root covers the hostname.
    OutOfScope,
    /// Already in the dedup filter.
    Duplicate,
    /// Beyond the configured depth bound.
    TooDeep,
    /// Resolves entirely into the root's wildcard IP set.
    Wildcard,
    /// Fresh, but the queue would not take it; permanently dropped.
    QueueFull,
}

impl AdmitOutcome {
    /// Whether the candidate was a first sighting of an in-scope hostname,
    /// which is what a result's `subdomains` list reports.
    pub fn discovered(&self) -> bool {
        matches!(
            self,
            AdmitOutcome::Admitted
                | AdmitOutcome::TooDeep
                | AdmitOutcome::Wildcard
                | AdmitOutcome::QueueFull
        )
    }
}

/// The single admission gate. Seeds and worker-discovered children go
/// through the same call; nothing else writes to the task queue or the
/// dedup filter.
pub struct Admission {
    scope: Scope,
    wildcard: WildcardDetector,
    dedup: Arc<BloomFilter>,
    resolver: Arc<dyn Resolve>,
    tasks: Arc<TaskQueue>,
    metrics: Arc<Metrics>,
    max_depth: i32,
    outstanding: AtomicI64,
}

impl Admission {
    pub fn new(
        scope: Scope,
        wildcard: WildcardDetector,
        dedup: Arc<BloomFilter>,
        resolver: Arc<dyn Resolve>,
        tasks: Arc<TaskQueue>,
        metrics: Arc<Metrics>,
        max_depth: i32,
    ) -> Self {
        Admission {
            scope,
            wildcard,
            dedup,
            resolver,
            tasks,
            metrics,
            max_depth,
            outstanding: AtomicI64::new(0),
        }
    }

    pub async fn admit(&self, candidate: &str, root_hint: Option<&str>) -> AdmitOutcome {
        let Some(h) = domain::normalize(candidate) else {
            return AdmitOutcome::Invalid;
        };
        if !domain::is_valid_hostname(&h) {
            return AdmitOutcome::Invalid;
        }
        let root = match root_hint {
            Some(r) if domain::depth(&h, r) >= 0 => r.to_string(),
            _ => match self.scope.match_root(&h) {
                Some(r) => r.to_string(),
                None => return AdmitOutcome::OutOfScope,
            },
        };
        // dedup before the wildcard probe so duplicates never cost a resolve;
        // a queue-full drop later stays recorded here on purpose
        if self.dedup.test_and_add(h.as_bytes()) {
            return AdmitOutcome::Duplicate;
        }
        let depth = domain::depth(&h, &root);
        if depth > self.max_depth {
            return AdmitOutcome::TooDeep;
        }
        if self.wildcard.has(&root)
            && self.wildcard.rejects(&h, &root, self.resolver.as_ref()).await
        {
            Metrics::incr(&self.metrics.wildcard_rejected);
            return AdmitOutcome::Wildcard;
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let task = Task {
            domain: h,
            root,
            depth,
        };
        if self.tasks.offer(task) {
            Metrics::incr(&self.metrics.tasks_enqueued);
            AdmitOutcome::Admitted
        } else {
            Metrics::incr(&self.metrics.dropped_full);
            self.task_done();
            AdmitOutcome::QueueFull
        }
    }

    /// Called once per admitted task after processing (and for offer
    /// failures). Closing at zero is what lets the workers drain and exit.
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tasks.close();
        }
    }

    /// Nothing was admitted at all: close immediately so workers don't wait.
    pub fn close_if_idle(&self) {
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            self.tasks.close();
        }
    }
}

pub struct Crawler {
    opt: Options,
    fetcher: Arc<dyn Fetch>,
    resolver: Arc<dyn Resolve>,
    writer: Arc<dyn ResultWriter>,
    dns_log: Option<Arc<JsonlWriter>>,
    metrics: Arc<Metrics>,
    tasks: Arc<TaskQueue>,
    results: Arc<ResultQueue>,
    dedup: Arc<BloomFilter>,
    cancelled: Arc<AtomicBool>,
}

impl Crawler {
    pub fn new(
        opt: Options,
        fetcher: Arc<dyn Fetch>,
        resolver: Arc<dyn Resolve>,
        writer: Arc<dyn ResultWriter>,
        dns_log: Option<Arc<JsonlWriter>>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let capacity = opt.queue_capacity();
        let dedup = match &opt.bloom_file {
            Some(path) if path.exists() => {
                let bf = BloomFilter::load(path)
                    .with_context(|| format!("load bloom filter {}", path.display()))?;
                if !opt.silent {
                    eprintln!("[bloom] resumed dedup set from {}", path.display());
                }
                Arc::new(bf)
            }
            _ => Arc::new(BloomFilter::with_estimates(opt.bloom_size, opt.bloom_fp)),
        };
        Ok(Crawler {
            opt,
            fetcher,
            resolver,
            writer,
            dns_log,
            metrics,
            tasks: Arc::new(TaskQueue::new(capacity)),
            results: Arc::new(ResultQueue::new(capacity)),
            dedup,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Cooperative shutdown: reject further enqueues and let in-flight
    /// fetches finish within their own timeout.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.tasks.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn run(&self, seeds: &[String]) -> Result<()> {
        let started = std::time::Instant::now();
        let scope = Scope::new(seeds);
        if scope.roots().is_empty() {
            bail!("no usable root domains in seed list");
        }

        let wildcard =
            WildcardDetector::detect(scope.roots(), self.resolver.as_ref(), 3).await;
        if !self.opt.silent {
            for (root, ips) in wildcard.roots_with_wildcards() {
                eprintln!(
                    "[wildcard] {} answers random labels, recorded {} ip(s)",
                    root,
                    ips.len()
                );
            }
        }

        let admission = Arc::new(Admission::new(
            scope,
            wildcard,
            self.dedup.clone(),
            self.resolver.clone(),
            self.tasks.clone(),
            self.metrics.clone(),
            self.opt.max_depth,
        ));

        let sink = {
            let results = self.results.clone();
            let writer = self.writer.clone();
            let tasks = self.tasks.clone();
            let cancelled = self.cancelled.clone();
            tokio::spawn(async move {
                while let Some(result) = results.recv().await {
                    if let Err(e) = writer.write(&result) {
                        eprintln!("[sink] write failed, shutting down: {:#}", e);
                        cancelled.store(true, Ordering::SeqCst);
                        tasks.close();
                        results.close();
                        break;
                    }
                }
            })
        };

        let reporter = if self.opt.progress {
            Some(spawn_reporter(
                self.metrics.clone(),
                self.tasks.clone(),
                self.opt.progress_interval,
            ))
        } else {
            None
        };

        for seed in seeds {
            let Some(h) = domain::normalize(seed) else {
                if !self.opt.silent {
                    eprintln!("[seed] skipping malformed seed {:?}", seed);
                }
                continue;
            };
            let hosts = if self.opt.expand_sld {
                expand::expand_seed(&h)
            } else {
                vec![h]
            };
            for host in hosts {
                admission.admit(&host, None).await;
            }
        }
        admission.close_if_idle();

        let mut workers = FuturesUnordered::new();
        for id in 0..self.opt.workers {
            let w = Worker {
                id,
                tasks: self.tasks.clone(),
                results: self.results.clone(),
                fetcher: self.fetcher.clone(),
                resolver: self.resolver.clone(),
                admission: admission.clone(),
                metrics: self.metrics.clone(),
                dns_log: self.dns_log.clone(),
                protocols: self.opt.protocols.clone(),
                max_depth: self.opt.max_depth,
                cancelled: self.cancelled.clone(),
            };
            workers.push(tokio::spawn(w.run()));
        }
        while let Some(joined) = workers.next().await {
            if let Err(e) = joined {
                eprintln!("[worker] join error: {}", e);
            }
        }

        self.results.close();
        if let Err(e) = sink.await {
            eprintln!("[sink] join error: {}", e);
        }
        if let Some(r) = reporter {
            r.abort();
        }

        self.writer.close()?;
        if let Some(path) = &self.opt.bloom_file {
            self.dedup
                .save(path)
                .with_context(|| format!("save bloom filter {}", path.display()))?;
            if !self.opt.silent {
                eprintln!("[bloom] dedup set saved to {}", path.display());
            }
        }
        if self.opt.progress {
            let snap = self
                .metrics
                .snapshot(self.tasks.len(), started.elapsed().as_secs());
            eprintln!("\n{}", snap.stat_line(0.0));
        }
        Ok(())
    }
}

/// Build the real components from configuration and crawl to completion.
/// Returns whether the run ended through an interrupt.
pub async fn run(opt: Options, seeds: Vec<String>) -> Result<bool> {
    let metrics = Metrics::new();
    let http_log = match &opt.http_log {
        Some(p) => Some(Arc::new(JsonlWriter::create(p)?)),
        None => None,
    };
    let dns_log = match &opt.dns_log {
        Some(p) => Some(Arc::new(JsonlWriter::create(p)?)),
        None => None,
    };
    let fetcher = Arc::new(HttpFetcher::new(
        opt.http_timeout,
        opt.max_response_size,
        &opt.user_agent,
        metrics.clone(),
        http_log,
    )?);
    let resolver = Arc::new(UdpResolver::new(opt.resolvers.clone(), opt.dns_timeout));
    let writer = Arc::new(JsonLinesWriter::create(&opt.output, opt.gzip)?);

    let crawler = Arc::new(Crawler::new(
        opt, fetcher, resolver, writer, dns_log, metrics,
    )?);

    let watcher = {
        let crawler = crawler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n[signal] interrupt received, shutting down");
                crawler.cancel();
            }
        })
    };

    let outcome = crawler.run(&seeds).await;
    watcher.abort();
    outcome?;
    Ok(crawler.is_cancelled())
}
