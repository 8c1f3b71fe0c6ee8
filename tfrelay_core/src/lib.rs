//! # TFRELAY Core
//!
//! Relay engine for coordinate-frame transforms between two publish/subscribe
//! buses.
//!
//! Every transform a bus delivers is queued per direction, drained on a fixed
//! tick, re-attributed with the source side's tag and published on the
//! opposite bus. This crate provides the building blocks:
//!
//! - **tf**: the `TransformSample` value and its STATIC/DYNAMIC kind
//! - **communication**: the `TransformBus` contract, bounded ingress queues
//!   and the in-process and UDP buses
//! - **relay**: relay workers, the bridge controller and shutdown wiring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tfrelay_core::communication::BusConfig;
//! use tfrelay_core::relay::{BridgeConfig, BridgeController};
//!
//! let a = BusConfig::local("rsb-side", "rsb").build().unwrap();
//! let b = BusConfig::udp("ros-side", "0.0.0.0:7400", &["10.0.0.2:7400"]).build().unwrap();
//! let mut bridge = BridgeController::new(a, b, BridgeConfig::default()).unwrap();
//! bridge.start().unwrap();
//! ```

pub mod communication;
pub mod error;
pub mod relay;
pub mod tf;

// Re-export commonly used types for easy access
pub use communication::{BusConfig, IngressQueue, TransformBus};
pub use error::{RelayError, RelayResult};
pub use relay::{BridgeConfig, BridgeController, InterruptHandle, InterruptReason};
pub use tf::{timestamp_now_us, TransformKind, TransformSample};
