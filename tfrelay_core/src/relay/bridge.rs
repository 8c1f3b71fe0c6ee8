use super::config::BridgeConfig;
use super::interrupt::{InterruptHandle, InterruptReason};
use super::worker::{RelayStats, RelayStatsSnapshot, RelayWorker};
use crate::communication::{IngressQueue, SampleHandler, TransformBus};
use crate::error::{RelayError, RelayResult};
use crate::tf::TransformSample;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Bridge lifecycle, strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Created,
    Running,
    Interrupted,
    ShutDown,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Created => write!(f, "Created"),
            BridgeState::Running => write!(f, "Running"),
            BridgeState::Interrupted => write!(f, "Interrupted"),
            BridgeState::ShutDown => write!(f, "ShutDown"),
        }
    }
}

/// Final report returned by [`BridgeController::join`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub reason: InterruptReason,
    pub a_to_b: RelayStatsSnapshot,
    pub b_to_a: RelayStatsSnapshot,
}

impl BridgeOutcome {
    pub fn exit_code(&self) -> i32 {
        self.reason.exit_code()
    }
}

struct RunningWorker {
    name: String,
    stats: Arc<RelayStats>,
    handle: JoinHandle<RelayStatsSnapshot>,
}

/// Owns both relay directions between bus A and bus B
///
/// Each bus pushes what it receives into its own [`IngressQueue`]; the
/// A->B worker drains A's queue into B and the B->A worker the reverse.
/// Callbacks only ever capture their queue, never the controller.
pub struct BridgeController {
    bus_a: Arc<dyn TransformBus>,
    bus_b: Arc<dyn TransformBus>,
    config: BridgeConfig,
    queue_a: Arc<IngressQueue>,
    queue_b: Arc<IngressQueue>,
    interrupt: InterruptHandle,
    // Created, Running or ShutDown; Interrupted is derived from the flag
    phase: Mutex<BridgeState>,
    workers: Vec<RunningWorker>,
}

impl BridgeController {
    pub fn new(
        bus_a: Arc<dyn TransformBus>,
        bus_b: Arc<dyn TransformBus>,
        config: BridgeConfig,
    ) -> RelayResult<Self> {
        config.validate()?;
        let queue_a = Arc::new(IngressQueue::new(config.queue_capacity)?);
        let queue_b = Arc::new(IngressQueue::new(config.queue_capacity)?);

        Ok(Self {
            bus_a,
            bus_b,
            config,
            queue_a,
            queue_b,
            interrupt: InterruptHandle::new(),
            phase: Mutex::new(BridgeState::Created),
            workers: Vec::with_capacity(2),
        })
    }

    pub fn state(&self) -> BridgeState {
        let phase = *self.phase.lock();
        if phase == BridgeState::Running && self.interrupt.is_interrupted() {
            BridgeState::Interrupted
        } else {
            phase
        }
    }

    /// Handle that stops this bridge when raised (signal handlers, tests)
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Subscribe both buses and spawn both relay workers
    pub fn start(&mut self) -> RelayResult<()> {
        let state = self.state();
        if state != BridgeState::Created {
            return Err(RelayError::InvalidState(format!(
                "cannot start bridge in state {}",
                state
            )));
        }

        self.bus_a.subscribe(enqueue_into(&self.queue_a))?;
        if let Err(e) = self.bus_b.subscribe(enqueue_into(&self.queue_b)) {
            // Bus A already holds a handler and cannot unsubscribe
            log::error!(
                "Failed to subscribe bus '{}': {}",
                self.bus_b.authority_name(),
                e
            );
            self.shutdown_buses();
            *self.phase.lock() = BridgeState::ShutDown;
            return Err(e);
        }
        for bus in [&self.bus_a, &self.bus_b] {
            let interrupt = self.interrupt.clone();
            let authority = bus.authority_name().to_string();
            bus.on_host_shutdown(Arc::new(move || {
                interrupt.interrupt(InterruptReason::External(authority.clone()));
            }));
        }

        let interval = self.config.tick_interval();
        let a_to_b = RelayWorker::new(
            &format!("{}->{}", self.bus_a.authority_name(), self.bus_b.authority_name()),
            &self.config.tag_a,
            Arc::clone(&self.queue_a),
            Arc::clone(&self.bus_b),
            interval,
            self.interrupt.clone(),
        );
        let b_to_a = RelayWorker::new(
            &format!("{}->{}", self.bus_b.authority_name(), self.bus_a.authority_name()),
            &self.config.tag_b,
            Arc::clone(&self.queue_b),
            Arc::clone(&self.bus_a),
            interval,
            self.interrupt.clone(),
        );

        *self.phase.lock() = BridgeState::Running;
        for worker in [a_to_b, b_to_a] {
            let name = worker.name().to_string();
            let stats = worker.stats();
            match worker.spawn() {
                Ok(handle) => self.workers.push(RunningWorker { name, stats, handle }),
                Err(e) => {
                    log::error!("Failed to start relay worker {}: {}", name, e);
                    self.interrupt.interrupt(InterruptReason::Local);
                    self.join()?;
                    return Err(e);
                }
            }
        }

        log::info!(
            "Bridge running: {} <-> {} (tick {:?}, queue capacity {})",
            self.bus_a.authority_name(),
            self.bus_b.authority_name(),
            interval,
            self.config.queue_capacity
        );
        Ok(())
    }

    /// Ask both workers to stop after their current tick
    ///
    /// Does not block. Calling it again once interrupted is a no-op.
    pub fn interrupt(&self) -> RelayResult<()> {
        match self.state() {
            BridgeState::Created => Err(RelayError::InvalidState(
                "cannot interrupt a bridge that was never started".to_string(),
            )),
            BridgeState::Running => {
                self.interrupt.interrupt(InterruptReason::Local);
                Ok(())
            }
            BridgeState::Interrupted | BridgeState::ShutDown => Ok(()),
        }
    }

    /// Live counters of both directions, A->B first
    pub fn stats(&self) -> Vec<(String, RelayStatsSnapshot)> {
        self.workers
            .iter()
            .map(|w| (w.name.clone(), w.stats.snapshot()))
            .collect()
    }

    /// Wait for both workers, then shut down bus A and bus B in that order
    pub fn join(&mut self) -> RelayResult<BridgeOutcome> {
        let state = self.state();
        if state != BridgeState::Interrupted {
            return Err(RelayError::InvalidState(format!(
                "cannot join bridge in state {}",
                state
            )));
        }

        let mut finals = Vec::with_capacity(2);
        for worker in self.workers.drain(..) {
            match worker.handle.join() {
                Ok(snapshot) => finals.push(snapshot),
                Err(_) => {
                    log::error!("Relay worker {} panicked", worker.name);
                    finals.push(worker.stats.snapshot());
                }
            }
        }

        self.shutdown_buses();
        *self.phase.lock() = BridgeState::ShutDown;

        let reason = self.interrupt.reason().unwrap_or(InterruptReason::Local);
        let mut finals = finals.into_iter();
        let outcome = BridgeOutcome {
            reason,
            a_to_b: finals.next().unwrap_or_default(),
            b_to_a: finals.next().unwrap_or_default(),
        };
        log::info!("Bridge shut down ({})", outcome.reason);
        Ok(outcome)
    }

    fn shutdown_buses(&self) {
        for bus in [&self.bus_a, &self.bus_b] {
            if let Err(e) = bus.shutdown() {
                log::warn!("Failed to shut down bus '{}': {}", bus.authority_name(), e);
            }
        }
    }

    /// Block until interrupted, then [`join`](Self::join)
    pub fn wait(&mut self) -> RelayResult<BridgeOutcome> {
        match self.state() {
            BridgeState::Running | BridgeState::Interrupted => {
                self.interrupt.wait();
                self.join()
            }
            state => Err(RelayError::InvalidState(format!(
                "cannot wait on bridge in state {}",
                state
            ))),
        }
    }
}

impl Drop for BridgeController {
    fn drop(&mut self) {
        if self.state() == BridgeState::Running {
            self.interrupt.interrupt(InterruptReason::Local);
        }
        if self.state() == BridgeState::Interrupted {
            let _ = self.join();
        }
    }
}

fn enqueue_into(queue: &Arc<IngressQueue>) -> SampleHandler {
    let queue = Arc::clone(queue);
    Arc::new(move |sample: TransformSample| queue.push(sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::HostShutdownHook;
    use crate::tf::{TransformKind, TransformSample};
    use std::time::{Duration, Instant};

    /// Bus double: records publishes and lets the test inject deliveries
    #[derive(Default)]
    struct ScriptedBus {
        authority: String,
        handlers: Mutex<Vec<SampleHandler>>,
        hooks: Mutex<Vec<HostShutdownHook>>,
        published: Mutex<Vec<(TransformKind, Vec<TransformSample>)>>,
        shutdown_log: Option<Arc<Mutex<Vec<String>>>>,
        refuse_subscribe: bool,
    }

    impl fmt::Debug for ScriptedBus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ScriptedBus")
                .field("authority", &self.authority)
                .finish()
        }
    }

    impl ScriptedBus {
        fn new(authority: &str, shutdown_log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                authority: authority.to_string(),
                shutdown_log: Some(Arc::clone(shutdown_log)),
                ..Default::default()
            })
        }

        fn deliver(&self, sample: TransformSample) {
            for handler in self.handlers.lock().iter() {
                handler(sample.clone());
            }
        }

        fn host_shutdown(&self) {
            for hook in self.hooks.lock().iter() {
                hook();
            }
        }

        fn published_count(&self) -> usize {
            self.published.lock().iter().map(|(_, s)| s.len()).sum()
        }
    }

    impl TransformBus for ScriptedBus {
        fn subscribe(&self, handler: SampleHandler) -> RelayResult<()> {
            if self.refuse_subscribe {
                return Err(RelayError::BusClosed(self.authority.clone()));
            }
            self.handlers.lock().push(handler);
            Ok(())
        }

        fn authority_name(&self) -> &str {
            &self.authority
        }

        fn publish(&self, samples: Vec<TransformSample>, kind: TransformKind) -> RelayResult<()> {
            self.published.lock().push((kind, samples));
            Ok(())
        }

        fn shutdown(&self) -> RelayResult<()> {
            if let Some(log) = &self.shutdown_log {
                log.lock().push(self.authority.clone());
            }
            Ok(())
        }

        fn on_host_shutdown(&self, hook: HostShutdownHook) {
            self.hooks.lock().push(hook);
        }
    }

    fn fast_config() -> BridgeConfig {
        BridgeConfig::default()
            .with_tags("busA", "busB")
            .with_tick_interval(Duration::from_millis(2))
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_lifecycle_transitions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = ScriptedBus::new("busB", &log);
        let mut bridge = BridgeController::new(a, b, fast_config()).unwrap();

        assert_eq!(bridge.state(), BridgeState::Created);
        assert!(matches!(bridge.interrupt(), Err(RelayError::InvalidState(_))));
        assert!(matches!(bridge.join(), Err(RelayError::InvalidState(_))));

        bridge.start().unwrap();
        assert_eq!(bridge.state(), BridgeState::Running);
        assert!(matches!(bridge.start(), Err(RelayError::InvalidState(_))));
        assert!(matches!(bridge.join(), Err(RelayError::InvalidState(_))));

        bridge.interrupt().unwrap();
        bridge.interrupt().unwrap();
        assert_eq!(bridge.state(), BridgeState::Interrupted);

        let outcome = bridge.join().unwrap();
        assert_eq!(outcome.reason, InterruptReason::Local);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(bridge.state(), BridgeState::ShutDown);
        assert!(matches!(bridge.start(), Err(RelayError::InvalidState(_))));
    }

    #[test]
    fn test_buses_shut_down_a_then_b() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = ScriptedBus::new("busB", &log);
        let mut bridge = BridgeController::new(a, b, fast_config()).unwrap();
        bridge.start().unwrap();
        bridge.interrupt().unwrap();
        bridge.join().unwrap();

        assert_eq!(*log.lock(), vec!["busA".to_string(), "busB".to_string()]);
    }

    #[test]
    fn test_relays_both_directions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = ScriptedBus::new("busB", &log);
        let mut bridge =
            BridgeController::new(a.clone(), b.clone(), fast_config()).unwrap();
        bridge.start().unwrap();

        a.deliver(
            TransformSample::new("odom", "base", "robotA", TransformKind::Dynamic)
                .unwrap()
                .with_timestamp_us(1_000_000),
        );
        b.deliver(TransformSample::new("map", "odom", "slam", TransformKind::Static).unwrap());

        assert!(wait_until(|| b.published_count() == 1 && a.published_count() == 1));

        let to_b = b.published.lock();
        assert_eq!(to_b[0].0, TransformKind::Dynamic);
        assert_eq!(to_b[0].1[0].authority(), "busA:robotA");
        assert_eq!(to_b[0].1[0].timestamp_us(), 1_000_000);
        drop(to_b);

        let to_a = a.published.lock();
        assert_eq!(to_a[0].0, TransformKind::Static);
        assert_eq!(to_a[0].1[0].authority(), "busB:slam");
        drop(to_a);

        bridge.interrupt().unwrap();
        let outcome = bridge.join().unwrap();
        assert_eq!(outcome.a_to_b.forwarded, 1);
        assert_eq!(outcome.b_to_a.forwarded, 1);
    }

    #[test]
    fn test_external_shutdown_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = ScriptedBus::new("busB", &log);
        let mut bridge =
            BridgeController::new(a.clone(), b.clone(), fast_config()).unwrap();
        bridge.start().unwrap();

        b.host_shutdown();
        let outcome = bridge.wait().unwrap();
        assert_eq!(outcome.reason, InterruptReason::External("busB".to_string()));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(bridge.state(), BridgeState::ShutDown);
    }

    #[test]
    fn test_failed_subscribe_is_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = Arc::new(ScriptedBus {
            authority: "busB".to_string(),
            shutdown_log: Some(Arc::clone(&log)),
            refuse_subscribe: true,
            ..Default::default()
        });
        let mut bridge = BridgeController::new(a.clone(), b, fast_config()).unwrap();

        assert!(matches!(bridge.start(), Err(RelayError::BusClosed(_))));
        assert_eq!(bridge.state(), BridgeState::ShutDown);
        assert!(matches!(bridge.start(), Err(RelayError::InvalidState(_))));
        assert_eq!(a.handlers.lock().len(), 1);
        assert_eq!(*log.lock(), vec!["busA".to_string(), "busB".to_string()]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ScriptedBus::new("busA", &log);
        let b = ScriptedBus::new("busB", &log);
        let result = BridgeController::new(a, b, fast_config().with_queue_capacity(0));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
