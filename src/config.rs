//! Configuration
//!
//! A [`Config`] groups everything a harness needs to stage one run: which
//! device to open, how the pipeline is shaped, and what the run computes.
//! It round-trips through JSON so runs can be reproduced from a file.

use crate::constants::{
    DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_DRAM_CAPACITY_BYTES, DEFAULT_RELATIVE_TOLERANCE, DEFAULT_SCALAR,
    DEFAULT_STAGING_DEPTH, DEFAULT_TILE_COUNT,
};
use crate::tile::TileLayout;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device selection
    pub device: DeviceConfig,

    /// Pipeline shape
    pub pipeline: PipelineConfig,

    /// What a run computes and how it is checked
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: u32,
    pub dram_capacity_bytes: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            dram_capacity_bytes: DEFAULT_DRAM_CAPACITY_BYTES,
        }
    }
}

/// Shape of the pipeline built by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile geometry shared by every buffer in a run
    pub tile: TileLayout,

    /// Slots per staging buffer
    pub staging_depth: usize,

    /// Abort a blocked reserve/wait after this many milliseconds
    ///
    /// `None` blocks indefinitely.
    pub stall_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile: TileLayout::default(),
            staging_depth: DEFAULT_STAGING_DEPTH,
            stall_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Stall deadline as a duration
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    /// Builder: set staging depth
    pub fn with_staging_depth(mut self, depth: usize) -> Self {
        self.staging_depth = depth;
        self
    }

    /// Builder: set tile geometry
    pub fn with_tile(mut self, tile: TileLayout) -> Self {
        self.tile = tile;
        self
    }

    /// Builder: set stall deadline
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.tile.validate()?;
        if self.staging_depth == 0 {
            return Err(PipelineError::InvalidConfig(
                "staging depth must be at least 1".to_string(),
            ));
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "stall timeout must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Acceptance bound for verification
///
/// An element passes when `|expected - actual| <= absolute + relative * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub absolute: f32,
    pub relative: f32,
}

impl Tolerance {
    /// Purely absolute bound
    pub fn absolute(bound: f32) -> Self {
        Self {
            absolute: bound,
            relative: 0.0,
        }
    }

    /// Largest accepted deviation from `expected`
    pub fn bound_for(&self, expected: f32) -> f32 {
        self.absolute + self.relative * expected.abs()
    }

    /// Whether `actual` is acceptably close to `expected`
    pub fn accepts(&self, expected: f32, actual: f32) -> bool {
        (expected - actual).abs() <= self.bound_for(expected)
    }

    /// Same bound scaled by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            absolute: self.absolute * factor,
            relative: self.relative * factor,
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            absolute: DEFAULT_ABSOLUTE_TOLERANCE,
            relative: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

/// Per-run workload settings used by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Tiles in the source tensor
    pub tile_count: usize,

    /// Scalar added to every element
    pub scalar: f32,

    /// Verification bound
    pub tolerance: Tolerance,

    /// Seed for source generation (`None` draws from entropy)
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tile_count: DEFAULT_TILE_COUNT,
            scalar: DEFAULT_SCALAR,
            tolerance: Tolerance::default(),
            seed: None,
        }
    }
}

impl Config {
    /// Load config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section for unusable values
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.device.dram_capacity_bytes == 0 {
            return Err(PipelineError::InvalidConfig("device DRAM capacity must be non-zero".to_string()));
        }
        if !self.run.scalar.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "scalar operand {} is not finite",
                self.run.scalar
            )));
        }
        let tol = self.run.tolerance;
        if !(tol.absolute >= 0.0 && tol.relative >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "tolerance must be non-negative (absolute {}, relative {})",
                tol.absolute, tol.relative
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.tile, TileLayout::new(32, 32));
        assert_eq!(config.pipeline.staging_depth, 2);
        assert_eq!(config.pipeline.stall_timeout(), None);
        assert_eq!(config.run.tile_count, 64);
        assert_eq!(config.run.scalar, 1.0);
        assert_eq!(config.run.tolerance.absolute, 0.05);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tolerance() {
        let tol = Tolerance::absolute(0.05);
        assert!(tol.accepts(1.5, 1.54));
        assert!(!tol.accepts(1.5, 1.56));

        let rel = Tolerance {
            absolute: 0.0,
            relative: 0.01,
        };
        assert!(rel.accepts(100.0, 100.9));
        assert!(!rel.accepts(100.0, 101.5));
        assert_eq!(rel.scaled(2.0).relative, 0.02);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.pipeline.staging_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.scalar = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.tolerance.absolute = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.stall_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "run": { "tile_count": 8 } }"#).unwrap();
        assert_eq!(config.run.tile_count, 8);
        assert_eq!(config.run.scalar, 1.0);
        assert_eq!(config.pipeline.staging_depth, 2);
    }

    #[test]
    fn test_builders() {
        let pipeline = PipelineConfig::default()
            .with_staging_depth(4)
            .with_tile(TileLayout::new(8, 8))
            .with_stall_timeout(Duration::from_millis(250));
        assert_eq!(pipeline.staging_depth, 4);
        assert_eq!(pipeline.tile.element_count(), 64);
        assert_eq!(pipeline.stall_timeout(), Some(Duration::from_millis(250)));
    }
}
