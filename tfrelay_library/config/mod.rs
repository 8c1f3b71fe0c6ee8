//! Static transform and pose mapping declarations
//!
//! One file (TOML or YAML, picked by extension) describes everything the
//! bridge process needs besides its CLI flags:
//!
//! ```toml
//! [[transforms]]
//! parent = "base_link"
//! child = "laser"
//! translation = { x = 0.2, y = 0.0, z = 0.3 }
//! rotation = { yaw = 0.0, pitch = 0.0, roll = 1.5708 }
//!
//! [[messages]]
//! parent = "map"
//! child = "base_link"
//! authority = "slam"
//! scope = "/nav/slampose/"
//!
//! [bridge]
//! tag_a = "rct"
//! tag_b = "ros"
//!
//! [buses.a]
//! authority = "rsb-side"
//!
//! [buses.b]
//! authority = "ros-side"
//! transport = "udp"
//! bind = "0.0.0.0:7400"
//! peers = ["10.0.0.2:7400"]
//! ```
//!
//! Every declaration is checked when the file is loaded, so a bad entry
//! fails startup before any bus is opened.

mod rotation;

pub use rotation::{normalize_quaternion, ypr_to_quaternion};

use crate::mapping::{PoseMapping, Scope};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tfrelay_core::communication::{load_config_file, BusPairConfig};
use tfrelay_core::relay::BridgeConfig;
use tfrelay_core::{RelayError, RelayResult};

/// `translation` table of a transform declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationDecl {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// `rotation` table of a transform declaration
///
/// Exactly one complete representation must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationDecl {
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub qw: Option<f64>,
    pub qx: Option<f64>,
    pub qy: Option<f64>,
    pub qz: Option<f64>,
}

/// One `[[transforms]]` entry as written in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformDecl {
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub child: String,
    #[serde(default)]
    pub translation: TranslationDecl,
    #[serde(default)]
    pub rotation: RotationDecl,
}

/// One `[[messages]]` entry as written in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDecl {
    pub parent: Option<String>,
    pub child: Option<String>,
    pub authority: Option<String>,
    pub scope: Option<String>,
}

/// Raw file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfigFile {
    pub transforms: Vec<TransformDecl>,
    pub messages: Vec<MessageDecl>,
    pub bridge: Option<BridgeConfig>,
    pub buses: Option<BusPairConfig>,
}

/// A validated fixed transform, not yet attributed or stamped
#[derive(Debug, Clone, PartialEq)]
pub struct StaticTransform {
    pub parent: String,
    pub child: String,
    pub translation: [f64; 3],
    /// Unit quaternion (w, x, y, z)
    pub rotation: [f64; 4],
}

/// Validated configuration
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    pub transforms: Vec<StaticTransform>,
    pub mappings: Vec<PoseMapping>,
    pub bridge: Option<BridgeConfig>,
    pub buses: Option<BusPairConfig>,
}

impl StaticConfig {
    /// Load and validate a config file (format by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        let path = path.as_ref();
        log::debug!("reading config file: {}", path.display());
        let raw: StaticConfigFile = load_config_file(path)?;
        Self::from_raw(raw)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> RelayResult<Self> {
        Self::from_raw(tfrelay_core::communication::config::from_toml(contents)?)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> RelayResult<Self> {
        Self::from_raw(tfrelay_core::communication::config::from_yaml(contents)?)
    }

    pub fn from_raw(raw: StaticConfigFile) -> RelayResult<Self> {
        let transforms = raw
            .transforms
            .iter()
            .enumerate()
            .map(|(index, decl)| decl.resolve(index))
            .collect::<RelayResult<Vec<_>>>()?;
        let mappings = raw
            .messages
            .iter()
            .enumerate()
            .map(|(index, decl)| decl.resolve(index))
            .collect::<RelayResult<Vec<_>>>()?;

        if let Some(bridge) = &raw.bridge {
            bridge.validate()?;
        }

        log::debug!(
            "parsed {} static transforms and {} message mappings",
            transforms.len(),
            mappings.len()
        );
        Ok(Self {
            transforms,
            mappings,
            bridge: raw.bridge,
            buses: raw.buses,
        })
    }

    /// Bridge settings from the file, or the defaults
    pub fn bridge_or_default(&self) -> BridgeConfig {
        self.bridge.clone().unwrap_or_default()
    }
}

impl TransformDecl {
    /// Validate and convert entry number `index`
    pub fn resolve(&self, index: usize) -> RelayResult<StaticTransform> {
        let fail = |what: &str| {
            RelayError::parse(format!(
                "transform #{} ({} -> {}): {}",
                index, self.parent, self.child, what
            ))
        };

        if self.parent.is_empty() || self.child.is_empty() {
            return Err(fail("parent and child are required"));
        }

        let translation = match (self.translation.x, self.translation.y, self.translation.z) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => {
                return Err(fail(
                    "incomplete translation, required: translation.x, translation.y, translation.z",
                ))
            }
        };

        let r = &self.rotation;
        let has_any_ypr = r.yaw.is_some() || r.pitch.is_some() || r.roll.is_some();
        let has_any_quat = r.qw.is_some() || r.qx.is_some() || r.qy.is_some() || r.qz.is_some();

        let rotation = match ((r.yaw, r.pitch, r.roll), (r.qw, r.qx, r.qy, r.qz)) {
            ((Some(yaw), Some(pitch), Some(roll)), _) if !has_any_quat => {
                ypr_to_quaternion(yaw, pitch, roll)
            }
            (_, (Some(w), Some(x), Some(y), Some(z))) if !has_any_ypr => {
                normalize_quaternion([w, x, y, z])
                    .ok_or_else(|| fail("rotation quaternion has zero length"))?
            }
            _ if has_any_ypr && has_any_quat => {
                return Err(fail(
                    "mixed rotation declarations, use either yaw/pitch/roll or a quaternion",
                ))
            }
            _ => {
                return Err(fail(
                    "incomplete rotation, required: (rotation.yaw, rotation.pitch, rotation.roll) \
                     or (rotation.qw, rotation.qx, rotation.qy, rotation.qz)",
                ))
            }
        };

        if translation.iter().chain(rotation.iter()).any(|v| !v.is_finite()) {
            return Err(fail("non-finite value"));
        }

        Ok(StaticTransform {
            parent: self.parent.clone(),
            child: self.child.clone(),
            translation,
            rotation,
        })
    }
}

impl MessageDecl {
    /// Validate and convert entry number `index`
    pub fn resolve(&self, index: usize) -> RelayResult<PoseMapping> {
        let field = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| RelayError::parse(format!("message #{}: missing '{}'", index, name)))
        };

        Ok(PoseMapping {
            parent: field(&self.parent, "parent")?,
            child: field(&self.child, "child")?,
            authority: field(&self.authority, "authority")?,
            scope: Scope::parse(&field(&self.scope, "scope")?),
        })
    }
}
