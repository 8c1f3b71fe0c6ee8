use super::interrupt::InterruptHandle;
use crate::communication::{IngressQueue, TransformBus};
use crate::error::RelayResult;
use crate::tf::{TransformKind, TransformSample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lock-free counters for one relay direction
#[derive(Debug, Default)]
pub struct RelayStats {
    pub ticks: AtomicU64,
    pub forwarded: AtomicU64,
    pub looped: AtomicU64,
    pub publish_failures: AtomicU64,
    pub dropped_on_failure: AtomicU64,
    pub discarded_on_shutdown: AtomicU64,
}

impl RelayStats {
    /// Get current counters (for monitoring/debugging)
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            looped: self.looped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            dropped_on_failure: self.dropped_on_failure.load(Ordering::Relaxed),
            discarded_on_shutdown: self.discarded_on_shutdown.load(Ordering::Relaxed),
            evicted: 0,
        }
    }
}

/// Plain copy of [`RelayStats`] plus the queue's eviction count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub ticks: u64,
    pub forwarded: u64,
    pub looped: u64,
    pub publish_failures: u64,
    pub dropped_on_failure: u64,
    pub discarded_on_shutdown: u64,
    pub evicted: u64,
}

/// A drained set split by kind, with loop-prevented samples removed
#[derive(Debug, Default, PartialEq)]
pub struct Batches {
    pub dynamic: Vec<TransformSample>,
    pub static_: Vec<TransformSample>,
    pub looped: usize,
}

/// Filter, re-tag and partition drained samples
///
/// Samples already attributed to the target bus are dropped. Everything else
/// is prefixed with `source_tag` and sorted into its kind's batch, keeping
/// arrival order within each batch.
pub fn partition(samples: Vec<TransformSample>, target_authority: &str, source_tag: &str) -> Batches {
    let mut batches = Batches::default();
    for sample in samples {
        if sample.authority() == target_authority {
            log::trace!(
                "skip relaying {} -> {}: authority '{}' belongs to the target bus",
                sample.parent_frame(),
                sample.child_frame(),
                sample.authority()
            );
            batches.looped += 1;
            continue;
        }
        let sample = sample.prefix_authority(source_tag);
        match sample.kind() {
            TransformKind::Dynamic => batches.dynamic.push(sample),
            TransformKind::Static => batches.static_.push(sample),
        }
    }
    batches
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub drained: usize,
    pub forwarded: usize,
    pub looped: usize,
    pub failed_batches: usize,
}

/// One relay direction: drains its queue every tick and forwards to the target
pub struct RelayWorker {
    name: String,
    source_tag: String,
    queue: Arc<IngressQueue>,
    target: Arc<dyn TransformBus>,
    interval: Duration,
    interrupt: InterruptHandle,
    stats: Arc<RelayStats>,
}

impl RelayWorker {
    pub fn new(
        name: &str,
        source_tag: &str,
        queue: Arc<IngressQueue>,
        target: Arc<dyn TransformBus>,
        interval: Duration,
        interrupt: InterruptHandle,
    ) -> Self {
        Self {
            name: name.to_string(),
            source_tag: source_tag.to_string(),
            queue,
            target,
            interval,
            interrupt,
            stats: Arc::new(RelayStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared counters, readable while the worker runs
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Drain, filter, partition and publish once
    pub fn tick(&mut self) -> TickReport {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let drained = self.queue.drain_all();
        let mut report = TickReport {
            drained: drained.len(),
            ..Default::default()
        };
        if drained.is_empty() {
            return report;
        }

        let batches = partition(drained, self.target.authority_name(), &self.source_tag);
        report.looped = batches.looped;
        self.stats
            .looped
            .fetch_add(batches.looped as u64, Ordering::Relaxed);

        for (batch, kind) in [
            (batches.dynamic, TransformKind::Dynamic),
            (batches.static_, TransformKind::Static),
        ] {
            if batch.is_empty() {
                continue;
            }
            let count = batch.len();
            match self.target.publish(batch, kind) {
                Ok(()) => {
                    report.forwarded += count;
                    self.stats
                        .forwarded
                        .fetch_add(count as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed_batches += 1;
                    self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .dropped_on_failure
                        .fetch_add(count as u64, Ordering::Relaxed);
                    log::warn!(
                        "[{}] dropping {} {} samples, publish to '{}' failed: {}",
                        self.name,
                        count,
                        kind,
                        self.target.authority_name(),
                        e
                    );
                }
            }
        }

        log::trace!(
            "[{}] tick: drained {}, forwarded {}, looped {}",
            self.name,
            report.drained,
            report.forwarded,
            report.looped
        );
        report
    }

    /// Tick on a fixed schedule until interrupted
    ///
    /// Deadlines advance from the previous deadline, not from "now", so time
    /// spent inside a tick does not accumulate as drift. If the worker falls a
    /// whole period behind, the schedule is re-anchored instead of bursting.
    pub fn run(mut self) -> RelayStatsSnapshot {
        log::debug!("[{}] relay worker started ({:?} ticks)", self.name, self.interval);

        let mut deadline = Instant::now();
        loop {
            deadline += self.interval;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else if now.duration_since(deadline) > self.interval {
                log::debug!(
                    "[{}] fell {:?} behind schedule, re-anchoring",
                    self.name,
                    now.duration_since(deadline)
                );
                deadline = now;
            }

            self.tick();

            if self.interrupt.is_interrupted() {
                break;
            }
        }

        let discarded = self.queue.clear();
        self.stats
            .discarded_on_shutdown
            .fetch_add(discarded as u64, Ordering::Relaxed);
        if discarded > 0 {
            log::debug!("[{}] discarded {} queued samples on shutdown", self.name, discarded);
        }

        let mut snapshot = self.stats.snapshot();
        snapshot.evicted = self.queue.evicted();
        log::debug!("[{}] relay worker stopped: {:?}", self.name, snapshot);
        snapshot
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> RelayResult<JoinHandle<RelayStatsSnapshot>> {
        let thread_name = format!("relay-{}", self.name);
        Ok(thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run())?)
    }
}
