use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity rotation as (w, x, y, z)
pub const IDENTITY_ROTATION: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

/// Minimum quaternion norm accepted before normalization
const MIN_QUAT_NORM: f64 = 1e-9;

/// Whether a transform persists or is continuously republished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Persists indefinitely, delivered once or rarely
    Static,
    /// Continuously republished, expires per the receiver's retention policy
    Dynamic,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Static => write!(f, "STATIC"),
            TransformKind::Dynamic => write!(f, "DYNAMIC"),
        }
    }
}

/// A timestamped parent → child pose
///
/// Translation is `[x, y, z]`, rotation is a unit quaternion `[w, x, y, z]`,
/// timestamps are microseconds on the originating bus's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSample {
    parent_frame: String,
    child_frame: String,
    translation: [f64; 3],
    rotation: [f64; 4],
    timestamp_us: u64,
    authority: String,
    kind: TransformKind,
}

impl TransformSample {
    /// Create a sample with identity pose and a zero timestamp
    ///
    /// Frames and authority must be non-empty.
    pub fn new(
        parent_frame: impl Into<String>,
        child_frame: impl Into<String>,
        authority: impl Into<String>,
        kind: TransformKind,
    ) -> RelayResult<Self> {
        let sample = Self {
            parent_frame: parent_frame.into(),
            child_frame: child_frame.into(),
            translation: [0.0; 3],
            rotation: IDENTITY_ROTATION,
            timestamp_us: 0,
            authority: authority.into(),
            kind,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Set the translation `[x, y, z]`
    pub fn with_translation(mut self, translation: [f64; 3]) -> Self {
        self.translation = translation;
        self
    }

    /// Set the rotation `[w, x, y, z]`, normalizing it
    pub fn with_rotation(mut self, rotation: [f64; 4]) -> RelayResult<Self> {
        self.rotation = normalize_quaternion(rotation)?;
        Ok(self)
    }

    /// Set the timestamp in microseconds
    pub fn with_timestamp_us(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Check the construction invariants
    ///
    /// Used on samples that did not go through [`TransformSample::new`],
    /// e.g. ones decoded off the wire.
    pub fn validate(&self) -> RelayResult<()> {
        if self.parent_frame.is_empty() {
            return Err(RelayError::InvalidSample("empty parent frame".into()));
        }
        if self.child_frame.is_empty() {
            return Err(RelayError::InvalidSample(format!(
                "empty child frame (parent '{}')",
                self.parent_frame
            )));
        }
        if self.authority.is_empty() {
            return Err(RelayError::InvalidSample(format!(
                "empty authority for {} -> {}",
                self.parent_frame, self.child_frame
            )));
        }
        Ok(())
    }

    pub fn parent_frame(&self) -> &str {
        &self.parent_frame
    }

    pub fn child_frame(&self) -> &str {
        &self.child_frame
    }

    pub fn translation(&self) -> [f64; 3] {
        self.translation
    }

    pub fn rotation(&self) -> [f64; 4] {
        self.rotation
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == TransformKind::Static
    }

    /// Re-attribute the sample as it crosses the bridge: `tag:authority`
    pub fn prefix_authority(mut self, tag: &str) -> Self {
        self.authority = format!("{}:{}", tag, self.authority);
        self
    }

    /// Replace the authority outright (used by publishers stamping their name)
    pub fn with_authority(mut self, authority: impl Into<String>) -> RelayResult<Self> {
        let authority = authority.into();
        if authority.is_empty() {
            return Err(RelayError::InvalidSample("empty authority".into()));
        }
        self.authority = authority;
        Ok(self)
    }
}

impl fmt::Display for TransformSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.translation;
        let [qw, qx, qy, qz] = self.rotation;
        write!(
            f,
            "{} -> {} [{}] t=({:.3}, {:.3}, {:.3}) q=({:.3}, {:.3}, {:.3}, {:.3}) @{}us by '{}'",
            self.parent_frame,
            self.child_frame,
            self.kind,
            x,
            y,
            z,
            qw,
            qx,
            qy,
            qz,
            self.timestamp_us,
            self.authority
        )
    }
}

fn normalize_quaternion(q: [f64; 4]) -> RelayResult<[f64; 4]> {
    let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < MIN_QUAT_NORM {
        return Err(RelayError::InvalidSample(format!(
            "rotation {:?} is not a valid quaternion",
            q
        )));
    }
    Ok([q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(TransformSample::new("", "base", "a", TransformKind::Dynamic).is_err());
        assert!(TransformSample::new("odom", "", "a", TransformKind::Dynamic).is_err());
        assert!(TransformSample::new("odom", "base", "", TransformKind::Dynamic).is_err());
        assert!(TransformSample::new("odom", "base", "a", TransformKind::Dynamic).is_ok());
    }

    #[test]
    fn test_rotation_is_normalized() {
        let sample = TransformSample::new("odom", "base", "a", TransformKind::Static)
            .unwrap()
            .with_rotation([2.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(sample.rotation(), IDENTITY_ROTATION);
    }

    #[test]
    fn test_zero_rotation_rejected() {
        let result = TransformSample::new("odom", "base", "a", TransformKind::Static)
            .unwrap()
            .with_rotation([0.0; 4]);
        assert!(matches!(result, Err(RelayError::InvalidSample(_))));
    }

    #[test]
    fn test_prefix_authority() {
        let sample = TransformSample::new("odom", "base", "robotA", TransformKind::Dynamic)
            .unwrap()
            .prefix_authority("busA");
        assert_eq!(sample.authority(), "busA:robotA");
        assert_eq!(sample.parent_frame(), "odom");
        assert_eq!(sample.kind(), TransformKind::Dynamic);
    }
}
