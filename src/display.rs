//! Display Trait Implementations
//!
//! Human-readable output for run results and pipeline types.

use crate::{
    pipeline::{RunState, RunSummary},
    staging::StagingStats,
    tile::TileLayout,
    units::{UnitKind, UnitReport},
    verify::{Mismatch, VerificationReport},
};
use std::fmt;

// Note: PipelineError Display is provided by thiserror::Error derive

impl fmt::Display for TileLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Created => "created",
            RunState::Configured => "configured",
            RunState::Launched => "launched",
            RunState::Joined => "joined",
            RunState::Passed => "passed",
            RunState::Failed => "failed",
        };
        f.pad(name)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for UnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} {} tiles in {:?}", self.unit, self.tiles, self.elapsed)
    }
}

impl fmt::Display for StagingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed={} popped={} producer_waits={} consumer_waits={} high_water={}",
            self.pushed, self.popped, self.producer_waits, self.consumer_waits, self.high_water
        )
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run [{}]: {} tiles (+{}) in {:?} ({:.1} tiles/s)",
            self.state,
            self.tiles(),
            self.params.scalar,
            self.elapsed,
            self.tiles_per_second()
        )?;
        for unit in &self.units {
            writeln!(f, "  {}", unit)?;
        }
        writeln!(f, "  c_0  {}", self.input_stats)?;
        write!(f, "  c_16 {}", self.output_stats)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mismatch at index {}: {} != {}", self.index, self.expected, self.actual)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "{} elements verified", self.checked)
        } else {
            write!(
                f,
                "{} of {} elements out of tolerance (max error {:.4})",
                self.mismatches.len(),
                self.checked,
                self.max_error()
            )
        }
    }
}
