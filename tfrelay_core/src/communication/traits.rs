//! Common traits for all transform bus implementations
//!
//! This module defines the abstraction layer that lets the relay engine talk
//! to any publish/subscribe transport (in-process segments, UDP, ...) through
//! the same contract.

use crate::error::RelayResult;
use crate::tf::{TransformKind, TransformSample};
use std::fmt::Debug;
use std::sync::Arc;

/// Delivery callback for incoming samples
///
/// Invoked once per sample from a bus-owned thread, possibly concurrently
/// with itself.
pub type SampleHandler = Arc<dyn Fn(TransformSample) + Send + Sync>;

/// Hook fired when the bus's host runtime asks it to stop
pub type HostShutdownHook = Arc<dyn Fn() + Send + Sync>;

/// A handle to one side's publish/subscribe transport
pub trait TransformBus: Send + Sync + Debug {
    /// Register a delivery callback for incoming samples
    fn subscribe(&self, handler: SampleHandler) -> RelayResult<()>;

    /// Name this handle publishes under. Stable for the handle's lifetime.
    fn authority_name(&self) -> &str;

    /// Publish a batch tagged with `kind`
    ///
    /// Best-effort and bounded in time. Ownership of the batch passes to the
    /// bus.
    fn publish(&self, samples: Vec<TransformSample>, kind: TransformKind) -> RelayResult<()>;

    /// Stop delivery and release transport resources
    ///
    /// Idempotent. After return no handler is invoked any more and
    /// `publish` must not be called again.
    fn shutdown(&self) -> RelayResult<()>;

    /// Register a hook for shutdown requests coming from the host runtime
    ///
    /// Buses without such a notion never call it.
    fn on_host_shutdown(&self, _hook: HostShutdownHook) {}
}

/// Transport type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusTransport {
    /// In-process segment shared by handles of the same name
    #[default]
    Local,
    /// UDP datagrams exchanged with a fixed set of peers
    Udp,
}
