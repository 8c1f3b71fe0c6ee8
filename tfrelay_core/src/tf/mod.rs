//! Transform samples carried across the bridge
//!
//! The relay never computes geometry. A sample is an opaque, timestamped
//! parent → child pose plus the bookkeeping the bridge needs: who published
//! it (`authority`) and whether it is a static or a dynamic transform.

mod sample;

pub use sample::{TransformKind, TransformSample, IDENTITY_ROTATION};

/// Get current timestamp in microseconds
pub fn timestamp_now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
