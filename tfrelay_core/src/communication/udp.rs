/// UDP transform bus
///
/// Each handle binds a local socket and sends every published batch to a
/// fixed list of peers. No discovery: peers are configured explicitly.
/// A background thread receives frames and hands each sample to the
/// subscribed handlers.
use super::traits::{HostShutdownHook, SampleHandler, TransformBus};
use super::wire::{encode_batch, Frame, FrameBody};
use crate::error::{RelayError, RelayResult};
use crate::tf::{TransformKind, TransformSample};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const UDP_BUFFER_SIZE: usize = 65536; // 64KB (max UDP packet)
/// How often the receive thread checks for shutdown
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique and, via the pid, host-unique instance id
fn next_origin_id() -> u64 {
    (u64::from(std::process::id()) << 32) | NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
struct Listeners {
    handlers: Vec<SampleHandler>,
    host_hooks: Vec<HostShutdownHook>,
}

/// Lock-free counters for monitoring a UDP bus
#[derive(Debug, Default)]
pub struct UdpBusMetrics {
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub samples_received: AtomicU64,
    pub decode_failures: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Point-to-point UDP transform bus
pub struct UdpBus {
    authority: String,
    origin: u64,
    socket: Arc<UdpSocket>,
    peers: Vec<SocketAddr>,
    listeners: Arc<RwLock<Listeners>>,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<UdpBusMetrics>,
}

impl UdpBus {
    /// Bind to `bind` and exchange frames with `peers`
    pub fn bind(authority: &str, bind: SocketAddr, peers: Vec<SocketAddr>) -> RelayResult<Self> {
        if authority.is_empty() {
            return Err(RelayError::transport_init("UDP bus authority must not be empty"));
        }

        let socket = UdpSocket::bind(bind).map_err(|e| {
            RelayError::transport_init(format!("failed to bind UDP socket {}: {}", bind, e))
        })?;
        socket.set_read_timeout(Some(RECV_POLL_INTERVAL)).map_err(|e| {
            RelayError::transport_init(format!("failed to set read timeout: {}", e))
        })?;

        let bus = Self {
            authority: authority.to_string(),
            origin: next_origin_id(),
            socket: Arc::new(socket),
            peers,
            listeners: Arc::new(RwLock::new(Listeners::default())),
            running: Arc::new(AtomicBool::new(true)),
            receiver: Mutex::new(None),
            metrics: Arc::new(UdpBusMetrics::default()),
        };
        bus.spawn_receiver()?;

        log::info!(
            "UDP bus '{}' bound to {} ({} peers)",
            bus.authority,
            bus.local_addr()?,
            bus.peers.len()
        );
        Ok(bus)
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> RelayResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    pub fn metrics(&self) -> &UdpBusMetrics {
        &self.metrics
    }

    /// Tell every peer that this host is going down
    pub fn announce_shutdown(&self) -> RelayResult<()> {
        let bytes = Frame::new(self.origin, FrameBody::Shutdown).encode()?;
        self.send_to_peers(&bytes)
    }

    fn send_to_peers(&self, bytes: &[u8]) -> RelayResult<()> {
        let mut first_error = None;
        for peer in &self.peers {
            match self.socket.send_to(bytes, peer) {
                Ok(_) => {
                    self.metrics.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                    if first_error.is_none() {
                        first_error = Some(RelayError::publish(format!(
                            "send to {} failed: {}",
                            peer, e
                        )));
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_receiver(&self) -> RelayResult<()> {
        let socket = Arc::clone(&self.socket);
        let listeners = Arc::clone(&self.listeners);
        let running = Arc::clone(&self.running);
        let metrics = Arc::clone(&self.metrics);
        let origin = self.origin;
        let authority = self.authority.clone();

        let handle = thread::Builder::new()
            .name(format!("udp-bus-{}", authority))
            .spawn(move || {
                let mut buffer = vec![0u8; UDP_BUFFER_SIZE];

                while running.load(Ordering::Acquire) {
                    let size = match socket.recv_from(&mut buffer) {
                        Ok((size, _src_addr)) => size,
                        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                            continue;
                        }
                        Err(e) => {
                            log::warn!("UDP bus '{}': receive error: {}", authority, e);
                            continue;
                        }
                    };

                    let frame = match Frame::decode(&buffer[..size]) {
                        Ok(frame) => frame,
                        Err(e) => {
                            metrics.decode_failures.fetch_add(1, Ordering::Relaxed);
                            log::debug!("UDP bus '{}': dropping datagram: {}", authority, e);
                            continue;
                        }
                    };

                    // Our own traffic looped back (e.g. we are our own peer)
                    if frame.origin == origin {
                        continue;
                    }
                    metrics.frames_received.fetch_add(1, Ordering::Relaxed);

                    match frame.body {
                        FrameBody::Transforms { samples, .. } => {
                            let handlers = listeners.read().handlers.clone();
                            for sample in samples {
                                if let Err(e) = sample.validate() {
                                    metrics.decode_failures.fetch_add(1, Ordering::Relaxed);
                                    log::debug!("UDP bus '{}': {}", authority, e);
                                    continue;
                                }
                                metrics.samples_received.fetch_add(1, Ordering::Relaxed);
                                for handler in &handlers {
                                    handler(sample.clone());
                                }
                            }
                        }
                        FrameBody::Shutdown => {
                            log::info!(
                                "UDP bus '{}': peer {:#x} requested shutdown",
                                authority,
                                frame.origin
                            );
                            let hooks = listeners.read().host_hooks.clone();
                            for hook in &hooks {
                                hook();
                            }
                        }
                    }
                }
            })
            .map_err(|e| {
                RelayError::transport_init(format!("failed to spawn UDP receiver: {}", e))
            })?;

        *self.receiver.lock() = Some(handle);
        Ok(())
    }

    fn ensure_open(&self) -> RelayResult<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RelayError::BusClosed(self.authority.clone()))
        }
    }
}

impl TransformBus for UdpBus {
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
        // A failing peer must not cut the batch short for the others
        let mut first_error = None;
        for frame in encode_batch(self.origin, kind, samples)? {
            if let Err(e) = self.send_to_peers(&frame) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shutdown(&self) -> RelayResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(handle) = self.receiver.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        log::debug!("UDP bus '{}' shut down", self.authority);
        Ok(())
    }

    fn on_host_shutdown(&self, hook: HostShutdownHook) {
        self.listeners.write().host_hooks.push(hook);
    }
}

impl fmt::Debug for UdpBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpBus")
            .field("authority", &self.authority)
            .field("origin", &format_args!("{:#x}", self.origin))
            .field("local_addr", &self.socket.local_addr().ok())
            .field("peers", &self.peers)
            .finish()
    }
}

impl Drop for UdpBus {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
