//! # Relay engine
//!
//! Two [`RelayWorker`]s, one per direction, drain bounded ingress queues on a
//! fixed tick and republish onto the opposite bus. [`BridgeController`] owns
//! both and drives the `Created -> Running -> Interrupted -> ShutDown`
//! lifecycle.
//!
//! ## Usage Patterns
//!
//! ```rust,no_run
//! use tfrelay_core::communication::LocalSegment;
//! use tfrelay_core::relay::{BridgeConfig, BridgeController, ShutdownHook};
//! use std::sync::Arc;
//!
//! let rsb = LocalSegment::named("rsb").attach("rsb-side").unwrap();
//! let ros = LocalSegment::named("ros").attach("ros-side").unwrap();
//! let mut bridge = BridgeController::new(
//!     Arc::new(rsb),
//!     Arc::new(ros),
//!     BridgeConfig::default().with_tags("rct", "ros"),
//! )
//! .unwrap();
//! let _hook = ShutdownHook::install(bridge.interrupt_handle()).unwrap();
//! bridge.start().unwrap();
//! let outcome = bridge.wait().unwrap();
//! std::process::exit(outcome.exit_code());
//! ```

pub mod bridge;
pub mod config;
pub mod interrupt;
pub mod shutdown;
pub mod worker;

pub use bridge::{BridgeController, BridgeOutcome, BridgeState};
pub use config::{BridgeConfig, DEFAULT_TICK_INTERVAL_MS};
pub use interrupt::{InterruptHandle, InterruptReason};
pub use shutdown::ShutdownHook;
pub use worker::{partition, Batches, RelayStats, RelayStatsSnapshot, RelayWorker, TickReport};
