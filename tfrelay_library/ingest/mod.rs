//! Pose ingest over UDP
//!
//! Pose producers send one `bincode`-encoded [`PoseDatagram`] per pose. The
//! listener maps each through a [`PoseMapper`] and publishes the result as a
//! DYNAMIC batch on the target bus.

use crate::mapping::{PoseMapper, PoseMessage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tfrelay_core::{timestamp_now_us, RelayError, RelayResult, TransformBus, TransformKind};

/// Socket read timeout; bounds how long `stop` waits for the thread
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

const MAX_DATAGRAM_BYTES: usize = 65_536;

/// One pose as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseDatagram {
    pub scope: String,
    pub pose: PoseMessage,
    /// Creation time at the producer, microseconds since the Unix epoch
    pub create_time_us: u64,
}

impl PoseDatagram {
    pub fn new(scope: &str, pose: PoseMessage) -> Self {
        Self {
            scope: scope.to_string(),
            pose,
            create_time_us: timestamp_now_us(),
        }
    }

    pub fn encode(&self) -> RelayResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| RelayError::publish(format!("failed to encode pose: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> RelayResult<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| RelayError::InvalidSample(format!("failed to decode pose: {}", e)))
    }
}

/// Counters for the ingest listener
#[derive(Debug, Default)]
pub struct PoseIngestMetrics {
    pub received: AtomicU64,
    pub published: AtomicU64,
    pub unmapped: AtomicU64,
    pub decode_failures: AtomicU64,
    pub publish_failures: AtomicU64,
}

/// Background UDP listener turning poses into transforms
pub struct PoseIngest {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<PoseIngestMetrics>,
}

impl PoseIngest {
    /// Bind `listen` and start forwarding mapped poses to `target`
    pub fn spawn(
        listen: SocketAddr,
        mapper: PoseMapper,
        target: Arc<dyn TransformBus>,
    ) -> RelayResult<Self> {
        if mapper.is_empty() {
            log::warn!("pose ingest on {} has no message mappings, every pose is dropped", listen);
        }

        let socket = UdpSocket::bind(listen).map_err(|e| {
            RelayError::transport_init(format!("failed to bind pose listener {}: {}", listen, e))
        })?;
        socket.set_read_timeout(Some(RECV_POLL_INTERVAL)).map_err(|e| {
            RelayError::transport_init(format!("failed to set read timeout: {}", e))
        })?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PoseIngestMetrics::default());

        let handle = thread::Builder::new()
            .name("pose-ingest".to_string())
            .spawn({
                let running = Arc::clone(&running);
                let metrics = Arc::clone(&metrics);
                move || receive_loop(socket, mapper, target, running, metrics)
            })
            .map_err(|e| {
                RelayError::transport_init(format!("failed to spawn pose listener: {}", e))
            })?;

        log::info!("Pose ingest listening on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            receiver: Mutex::new(Some(handle)),
            metrics,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &PoseIngestMetrics {
        &self.metrics
    }

    /// Stop the listener and wait for its thread. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.receiver.lock().take() {
            let _ = handle.join();
        }
        log::debug!("Pose ingest on {} stopped", self.local_addr);
    }
}

impl Drop for PoseIngest {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: UdpSocket,
    mapper: PoseMapper,
    target: Arc<dyn TransformBus>,
    running: Arc<AtomicBool>,
    metrics: Arc<PoseIngestMetrics>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_BYTES];

    while running.load(Ordering::Acquire) {
        let size = match socket.recv_from(&mut buffer) {
            Ok((size, _)) => size,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                log::warn!("pose ingest: receive error: {}", e);
                continue;
            }
        };
        metrics.received.fetch_add(1, Ordering::Relaxed);

        let datagram = match PoseDatagram::decode(&buffer[..size]) {
            Ok(datagram) => datagram,
            Err(e) => {
                metrics.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::debug!("pose ingest: {}", e);
                continue;
            }
        };

        let Some(sample) = mapper.map(&datagram.scope, &datagram.pose, datagram.create_time_us)
        else {
            metrics.unmapped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        match target.publish(vec![sample], TransformKind::Dynamic) {
            Ok(()) => {
                metrics.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("pose ingest: publish failed: {}", e);
            }
        }
    }
}

/// Sends poses to a [`PoseIngest`] listener
pub struct PoseSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl PoseSender {
    pub fn connect(target: SocketAddr) -> RelayResult<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).map_err(|e| {
            RelayError::transport_init(format!("failed to bind pose sender: {}", e))
        })?;
        Ok(Self { socket, target })
    }

    pub fn send(&self, datagram: &PoseDatagram) -> RelayResult<()> {
        let bytes = datagram.encode()?;
        self.socket
            .send_to(&bytes, self.target)
            .map_err(|e| RelayError::publish(format!("send to {} failed: {}", self.target, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{PoseMapping, Scope};
    use std::time::Instant;
    use tfrelay_core::communication::LocalSegment;
    use tfrelay_core::TransformSample;

    fn mapper() -> PoseMapper {
        PoseMapper::new(vec![PoseMapping {
            parent: "map".to_string(),
            child: "base".to_string(),
            authority: "slam".to_string(),
            scope: Scope::parse("/nav/"),
        }])
    }

    fn pose() -> PoseMessage {
        PoseMessage::new([2.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_datagram_decode_rejects_garbage() {
        assert!(PoseDatagram::decode(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn test_poses_become_dynamic_transforms() {
        let segment = LocalSegment::isolated("pose-ingest");
        let observer = segment.attach("observer").unwrap();
        let received: Arc<Mutex<Vec<TransformSample>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        observer
            .subscribe(Arc::new(move |s: TransformSample| sink.lock().push(s)))
            .unwrap();

        let ingest = PoseIngest::spawn(
            "127.0.0.1:0".parse().unwrap(),
            mapper(),
            Arc::new(segment.attach("tfrelay").unwrap()),
        )
        .unwrap();
        let sender = PoseSender::connect(ingest.local_addr()).unwrap();

        let mut datagram = PoseDatagram::new("/nav/slampose/", pose());
        datagram.create_time_us = 7_000_000;
        sender.send(&datagram).unwrap();
        sender.send(&PoseDatagram::new("/arm/", pose())).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline
            && (received.lock().is_empty() || ingest.metrics().unmapped.load(Ordering::Relaxed) == 0)
        {
            thread::sleep(Duration::from_millis(5));
        }

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind(), TransformKind::Dynamic);
        assert_eq!(received[0].authority(), "slam");
        assert_eq!(received[0].timestamp_us(), 7_000_000);
        assert_eq!(ingest.metrics().unmapped.load(Ordering::Relaxed), 1);
        drop(received);

        ingest.stop();
        ingest.stop();
    }
}
