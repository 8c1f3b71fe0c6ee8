//! In-process transform bus
//!
//! Handles attached to the same named segment see every sample published by
//! the *other* handles of that segment. Each handle owns a delivery thread
//! fed by a bounded channel, so subscribers never run on the publisher's
//! thread.

use super::traits::{HostShutdownHook, SampleHandler, TransformBus};
use crate::error::{RelayError, RelayResult};
use crate::tf::{TransformKind, TransformSample};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};

/// Per-handle inbox size
const LOCAL_INBOX_CAPACITY: usize = 4096;

static SEGMENTS: OnceLock<Mutex<HashMap<String, Weak<LocalSegment>>>> = OnceLock::new();
static NEXT_MEMBER_ID: AtomicU64 = AtomicU64::new(1);

enum Delivery {
    Sample(TransformSample),
    HostShutdown,
    Stop,
}

struct Member {
    id: u64,
    inbox: Sender<Delivery>,
}

/// A named in-process bus segment
pub struct LocalSegment {
    name: String,
    members: RwLock<Vec<Member>>,
}

impl LocalSegment {
    /// Get (or create) the process-wide segment called `name`
    ///
    /// The segment lives as long as any handle or caller holds it.
    pub fn named(name: &str) -> Arc<LocalSegment> {
        let registry = SEGMENTS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut segments = registry.lock();
        if let Some(existing) = segments.get(name).and_then(Weak::upgrade) {
            return existing;
        }
        let segment = Arc::new(LocalSegment {
            name: name.to_string(),
            members: RwLock::new(Vec::new()),
        });
        segments.insert(name.to_string(), Arc::downgrade(&segment));
        segment
    }

    /// Create a private segment not reachable by name
    pub fn isolated(name: &str) -> Arc<LocalSegment> {
        Arc::new(LocalSegment {
            name: name.to_string(),
            members: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attached handles
    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    /// Attach a new handle publishing as `authority`
    pub fn attach(self: &Arc<Self>, authority: &str) -> RelayResult<LocalBus> {
        LocalBus::attach(Arc::clone(self), authority)
    }

    /// Ask every attached handle to report a host shutdown
    pub fn request_host_shutdown(&self) {
        log::info!("Segment '{}': host shutdown requested", self.name);
        for member in self.members.read().iter() {
            let _ = member.inbox.try_send(Delivery::HostShutdown);
        }
    }

    fn join(&self, member: Member) {
        self.members.write().push(member);
    }

    fn leave(&self, id: u64) {
        self.members.write().retain(|m| m.id != id);
    }

    /// Fan a batch out to every member except `from`
    ///
    /// Returns the number of deliveries dropped because an inbox was full.
    fn fan_out(&self, from: u64, samples: &[TransformSample]) -> u64 {
        let mut dropped = 0;
        for member in self.members.read().iter().filter(|m| m.id != from) {
            for sample in samples {
                match member.inbox.try_send(Delivery::Sample(sample.clone())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    // Member is leaving
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
        dropped
    }
}

impl fmt::Debug for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSegment")
            .field("name", &self.name)
            .field("members", &self.member_count())
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    handlers: Vec<SampleHandler>,
    host_hooks: Vec<HostShutdownHook>,
}

/// Handle to an in-process segment
pub struct LocalBus {
    segment: Arc<LocalSegment>,
    id: u64,
    authority: String,
    inbox: Sender<Delivery>,
    listeners: Arc<RwLock<Listeners>>,
    delivery_thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl LocalBus {
    fn attach(segment: Arc<LocalSegment>, authority: &str) -> RelayResult<Self> {
        if authority.is_empty() {
            return Err(RelayError::transport_init(format!(
                "segment '{}': authority name must not be empty",
                segment.name
            )));
        }

        let id = NEXT_MEMBER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::bounded(LOCAL_INBOX_CAPACITY);
        let listeners = Arc::new(RwLock::new(Listeners::default()));

        let thread_name = format!("local-bus-{}-{}", segment.name, authority);
        let delivery_thread = thread::Builder::new()
            .name(thread_name)
            .spawn({
                let listeners = Arc::clone(&listeners);
                move || deliver_loop(rx, listeners)
            })
            .map_err(|e| {
                RelayError::transport_init(format!("failed to spawn delivery thread: {}", e))
            })?;

        segment.join(Member {
            id,
            inbox: tx.clone(),
        });

        log::debug!(
            "Segment '{}': attached '{}' (member {})",
            segment.name,
            authority,
            id
        );

        Ok(Self {
            segment,
            id,
            authority: authority.to_string(),
            inbox: tx,
            listeners,
            delivery_thread: Mutex::new(Some(delivery_thread)),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn segment(&self) -> &Arc<LocalSegment> {
        &self.segment
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Samples handed to the segment by this handle
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliveries lost because a receiver's inbox was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> RelayResult<()> {
        if self.is_closed() {
            Err(RelayError::BusClosed(self.authority.clone()))
        } else {
            Ok(())
        }
    }
}

fn deliver_loop(rx: Receiver<Delivery>, listeners: Arc<RwLock<Listeners>>) {
    while let Ok(delivery) = rx.recv() {
        match delivery {
            Delivery::Sample(sample) => {
                let handlers = listeners.read().handlers.clone();
                for handler in &handlers {
                    handler(sample.clone());
                }
            }
            Delivery::HostShutdown => {
                let hooks = listeners.read().host_hooks.clone();
                for hook in &hooks {
                    hook();
                }
            }
            Delivery::Stop => break,
        }
    }
}

impl TransformBus for LocalBus {
    fn subscribe(&self, handler: SampleHandler) -> RelayResult<()> {
        self.ensure_open()?;
        self.listeners.write().handlers.push(handler);
        Ok(())
    }

    fn authority_name(&self) -> &str {
        &self.authority
    }

    fn publish(&self, samples: Vec<TransformSample>, kind: TransformKind) -> RelayResult<()> {
        self.ensure_open()?;
        if samples.is_empty() {
            return Ok(());
        }

        let count = samples.len() as u64;
        let dropped = self.segment.fan_out(self.id, &samples);
        self.published.fetch_add(count, Ordering::Relaxed);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            log::trace!(
                "Segment '{}': {} {} deliveries dropped (inbox full)",
                self.segment.name,
                dropped,
                kind
            );
        }
        Ok(())
    }

    fn shutdown(&self) -> RelayResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.segment.leave(self.id);
        let _ = self.inbox.send(Delivery::Stop);

        if let Some(handle) = self.delivery_thread.lock().take() {
            // Never join ourselves, e.g. when a handler shuts the bus down
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        log::debug!(
            "Segment '{}': '{}' shut down",
            self.segment.name,
            self.authority
        );
        Ok(())
    }

    fn on_host_shutdown(&self, hook: HostShutdownHook) {
        self.listeners.write().host_hooks.push(hook);
    }
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBus")
            .field("segment", &self.segment.name)
            .field("authority", &self.authority)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for LocalBus {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
