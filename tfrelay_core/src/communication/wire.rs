//! Datagram framing for [`UdpBus`](super::udp::UdpBus)
//!
//! Frames are bincode-encoded. A transform batch larger than one datagram is
//! split into several frames, each carrying a contiguous run of the batch so
//! FIFO order survives the split.

use crate::error::{RelayError, RelayResult};
use crate::tf::{TransformKind, TransformSample};
use serde::{Deserialize, Serialize};

/// Frame magic ("TFRL")
pub const FRAME_MAGIC: u32 = 0x5446_524C;
/// Wire format version
pub const FRAME_VERSION: u8 = 1;
/// Maximum encoded frame size (fits a UDP datagram)
pub const MAX_FRAME_BYTES: usize = 60_000;
/// Room reserved for the frame header and the sample vector length
const FRAME_OVERHEAD_BYTES: usize = 64;

/// Payload of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameBody {
    /// A run of samples from one published batch
    Transforms {
        kind: TransformKind,
        samples: Vec<TransformSample>,
    },
    /// The sender's host asked the bus to stop
    Shutdown,
}

/// One datagram on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub magic: u32,
    pub version: u8,
    /// Instance id of the sending handle
    pub origin: u64,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(origin: u64, body: FrameBody) -> Self {
        Self {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
            origin,
            body,
        }
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> RelayResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| RelayError::publish(format!("failed to encode frame: {}", e)))
    }

    /// Decode frame from bytes, rejecting foreign or incompatible datagrams
    pub fn decode(data: &[u8]) -> RelayResult<Self> {
        let frame: Frame = bincode::deserialize(data)
            .map_err(|e| RelayError::InvalidSample(format!("undecodable frame: {}", e)))?;
        if frame.magic != FRAME_MAGIC {
            return Err(RelayError::InvalidSample(format!(
                "bad frame magic {:#010x}",
                frame.magic
            )));
        }
        if frame.version != FRAME_VERSION {
            return Err(RelayError::InvalidSample(format!(
                "unsupported frame version {}",
                frame.version
            )));
        }
        Ok(frame)
    }
}

/// Split a batch into encoded frames no larger than [`MAX_FRAME_BYTES`]
///
/// A single sample that cannot fit a frame on its own is an error.
pub fn encode_batch(
    origin: u64,
    kind: TransformKind,
    samples: Vec<TransformSample>,
) -> RelayResult<Vec<Vec<u8>>> {
    let budget = MAX_FRAME_BYTES - FRAME_OVERHEAD_BYTES;
    let mut frames = Vec::new();
    let mut current: Vec<TransformSample> = Vec::new();
    let mut current_bytes = 0usize;

    for sample in samples {
        let size = bincode::serialized_size(&sample)
            .map_err(|e| RelayError::publish(format!("failed to size sample: {}", e)))?
            as usize;
        if size > budget {
            return Err(RelayError::publish(format!(
                "sample {} -> {} is {} bytes, larger than a frame",
                sample.parent_frame(),
                sample.child_frame(),
                size
            )));
        }
        if current_bytes + size > budget && !current.is_empty() {
            let run = std::mem::take(&mut current);
            frames.push(Frame::new(origin, FrameBody::Transforms { kind, samples: run }).encode()?);
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(sample);
    }

    if !current.is_empty() {
        frames.push(Frame::new(origin, FrameBody::Transforms { kind, samples: current }).encode()?);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: u64, child: &str) -> TransformSample {
        TransformSample::new("map", child, "robot", TransformKind::Dynamic)
            .unwrap()
            .with_timestamp_us(i)
    }

    #[test]
    fn test_large_batch_is_split_in_order() {
        let child = "c".repeat(200);
        let samples: Vec<_> = (0..1000).map(|i| sample(i, &child)).collect();

        let frames = encode_batch(7, TransformKind::Dynamic, samples).unwrap();
        assert!(frames.len() > 1);

        let mut stamps = Vec::new();
        for bytes in &frames {
            assert!(bytes.len() <= MAX_FRAME_BYTES);
            let frame = Frame::decode(bytes).unwrap();
            assert_eq!(frame.origin, 7);
            match frame.body {
                FrameBody::Transforms { kind, samples } => {
                    assert_eq!(kind, TransformKind::Dynamic);
                    stamps.extend(samples.iter().map(|s| s.timestamp_us()));
                }
                FrameBody::Shutdown => panic!("unexpected shutdown frame"),
            }
        }
        assert_eq!(stamps, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversized_sample_rejected() {
        let child = "c".repeat(MAX_FRAME_BYTES);
        let result = encode_batch(1, TransformKind::Static, vec![sample(0, &child)]);
        assert!(matches!(result, Err(RelayError::TransportPublish(_))));
    }

    #[test]
    fn test_foreign_datagram_rejected() {
        let mut frame = Frame::new(1, FrameBody::Shutdown);
        frame.magic = 0xdead_beef;
        let bytes = bincode::serialize(&frame).unwrap();
        assert!(Frame::decode(&bytes).is_err());
        assert!(Frame::decode(b"garbage").is_err());
    }
}
