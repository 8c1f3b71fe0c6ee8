//! Pose channel to transform mapping
//!
//! Pose producers publish on `/`-separated scopes. A [`PoseMapping`] binds a
//! scope (and everything below it) to a frame pair and an authority, so each
//! incoming pose becomes one DYNAMIC transform.

use serde::{Deserialize, Serialize};
use std::fmt;
use tfrelay_core::{RelayResult, TransformKind, TransformSample};

/// A `/`-separated channel name, stored component-wise
///
/// `/nav/slampose/`, `/nav/slampose` and `nav//slampose` are the same scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    components: Vec<String>,
}

impl Scope {
    pub fn parse(scope: &str) -> Self {
        Self {
            components: scope
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether `other` lies strictly below this scope
    pub fn is_super_scope_of(&self, other: &Scope) -> bool {
        self.components.len() < other.components.len()
            && other.components.starts_with(&self.components)
    }

    /// Equal to `other` or a super-scope of it
    pub fn covers(&self, other: &Scope) -> bool {
        self == other || self.is_super_scope_of(other)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for component in &self.components {
            write!(f, "{}/", component)?;
        }
        Ok(())
    }
}

/// Pose payload: translation plus (w, x, y, z) rotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

impl PoseMessage {
    pub fn new(translation: [f64; 3], rotation: [f64; 4]) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

/// Binds a pose scope to a frame pair and authority
#[derive(Debug, Clone, PartialEq)]
pub struct PoseMapping {
    pub parent: String,
    pub child: String,
    pub authority: String,
    pub scope: Scope,
}

impl PoseMapping {
    /// Build the DYNAMIC sample for one pose
    pub fn to_sample(&self, pose: &PoseMessage, create_time_us: u64) -> RelayResult<TransformSample> {
        TransformSample::new(
            self.parent.as_str(),
            self.child.as_str(),
            self.authority.as_str(),
            TransformKind::Dynamic,
        )?
        .with_translation(pose.translation)
        .with_rotation(pose.rotation)
        .map(|sample| sample.with_timestamp_us(create_time_us))
    }
}

/// Resolves incoming scopes against the configured mappings
#[derive(Debug, Clone, Default)]
pub struct PoseMapper {
    mappings: Vec<PoseMapping>,
}

impl PoseMapper {
    pub fn new(mappings: Vec<PoseMapping>) -> Self {
        Self { mappings }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn mappings(&self) -> &[PoseMapping] {
        &self.mappings
    }

    /// First mapping, in declaration order, covering `scope`
    pub fn resolve(&self, scope: &Scope) -> Option<&PoseMapping> {
        self.mappings.iter().find(|m| m.scope.covers(scope))
    }

    /// Convert one pose received on `scope`
    ///
    /// Returns `None` (and logs) for unknown scopes and unusable poses.
    pub fn map(&self, scope: &str, pose: &PoseMessage, create_time_us: u64) -> Option<TransformSample> {
        let scope = Scope::parse(scope);
        let Some(mapping) = self.resolve(&scope) else {
            log::error!("No known message configuration for scope: {}", scope);
            return None;
        };

        match mapping.to_sample(pose, create_time_us) {
            Ok(sample) => Some(sample),
            Err(e) => {
                log::warn!("Dropping pose on {}: {}", scope, e);
                None
            }
        }
    }
}
