//! # TFRELAY Library
//!
//! Everything around the relay engine that deals with configured frames and
//! pose producers.
//!
//! ## Structure
//!
//! ```text
//! tfrelay_library/
//! ── config/      # Static transform and message mapping declarations
//! ── publisher/   # One-shot static transform publisher
//! ── mapping/     # Pose scope -> transform mapping
//! ── ingest/      # UDP pose listener
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfrelay_core::communication::LocalSegment;
//! use tfrelay_library::{PoseMapper, StaticConfig, StaticPublisher};
//!
//! let config = StaticConfig::load("frames.toml").unwrap();
//! let bus = Arc::new(LocalSegment::named("rsb").attach("tfrelay").unwrap());
//!
//! StaticPublisher::new(bus).publish(&config.transforms).unwrap();
//! let mapper = PoseMapper::new(config.mappings.clone());
//! ```

pub mod config;
pub mod ingest;
pub mod mapping;
pub mod publisher;

pub use config::{StaticConfig, StaticTransform};
pub use ingest::{PoseDatagram, PoseIngest, PoseSender};
pub use mapping::{PoseMapper, PoseMapping, PoseMessage, Scope};
pub use publisher::StaticPublisher;
