//! # Communication layer for TFRELAY
//!
//! Everything the relay needs to talk to a publish/subscribe transport:
//!
//! - **TransformBus**: the contract every bus handle implements
//! - **IngressQueue**: bounded drop-oldest buffer between a bus and a relay worker
//! - **LocalBus**: in-process segment, handles of one segment see each other
//! - **UdpBus**: datagram transport with a fixed peer list
//!
//! ## Usage Patterns
//!
//! **In-process (tests, single-process deployments):**
//! ```rust,no_run
//! use tfrelay_core::communication::LocalSegment;
//! let segment = LocalSegment::named("robot");
//! let bus = segment.attach("rsb-side").unwrap();
//! ```
//!
//! **From a config file:**
//! ```rust,no_run
//! use tfrelay_core::communication::{BusConfig, TransformBus};
//! let bus = BusConfig::udp("ros-side", "0.0.0.0:7400", &["10.0.0.2:7400"]).build().unwrap();
//! println!("publishing as {}", bus.authority_name());
//! ```

pub mod config;
pub mod ingress;
pub mod local;
pub mod traits;
pub mod udp;
pub mod wire;

// Re-export commonly used types for convenience
pub use config::{load_config_file, BusConfig, BusPairConfig};
pub use ingress::{IngressQueue, DEFAULT_QUEUE_CAPACITY};
pub use local::{LocalBus, LocalSegment};
pub use traits::{BusTransport, HostShutdownHook, SampleHandler, TransformBus};
pub use udp::{UdpBus, UdpBusMetrics};
