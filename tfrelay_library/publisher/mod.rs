//! One-shot publisher for fixed transforms

use crate::config::StaticTransform;
use std::sync::Arc;
use tfrelay_core::{timestamp_now_us, RelayResult, TransformBus, TransformKind, TransformSample};

/// Publishes configured fixed transforms on a bus under its authority
pub struct StaticPublisher {
    bus: Arc<dyn TransformBus>,
}

impl StaticPublisher {
    pub fn new(bus: Arc<dyn TransformBus>) -> Self {
        Self { bus }
    }

    /// Stamp every transform with the bus authority and `timestamp_us`
    pub fn samples(
        &self,
        transforms: &[StaticTransform],
        timestamp_us: u64,
    ) -> RelayResult<Vec<TransformSample>> {
        transforms
            .iter()
            .map(|t| {
                TransformSample::new(
                    t.parent.as_str(),
                    t.child.as_str(),
                    self.bus.authority_name(),
                    TransformKind::Static,
                )?
                .with_translation(t.translation)
                .with_rotation(t.rotation)
                .map(|s| s.with_timestamp_us(timestamp_us))
            })
            .collect()
    }

    /// Publish all transforms once as a single STATIC batch
    ///
    /// Returns how many were sent; an empty list sends nothing.
    pub fn publish(&self, transforms: &[StaticTransform]) -> RelayResult<usize> {
        if transforms.is_empty() {
            log::error!("no transforms to publish");
            return Ok(0);
        }

        let samples = self.samples(transforms, timestamp_now_us())?;
        for sample in &samples {
            log::debug!("publishing static transform: {}", sample);
        }
        let count = samples.len();
        self.bus.publish(samples, TransformKind::Static)?;
        log::info!(
            "published {} static transforms as '{}'",
            count,
            self.bus.authority_name()
        );
        Ok(count)
    }
}
