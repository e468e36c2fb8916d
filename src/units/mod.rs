//! Pipeline Units
//!
//! Three units run concurrently and meet only at the staging buffers:
//!
//! ```text
//! source ──▶ InputUnit ──▶ c_0 ──▶ ComputeUnit ──▶ c_16 ──▶ OutputUnit ──▶ destination
//! ```
//!
//! Every unit walks tile indices `0..tile_count` in order, so tile `i` of the
//! source lands in tile `i` of the destination.

mod compute;
mod input;
mod output;

pub use compute::{ComputeUnit, ScalarAddOp, TileRegisters};
pub use input::InputUnit;
pub use output::OutputUnit;

use crate::Result;
use std::time::Duration;

/// Which of the three units a value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Reads tiles from the source buffer into `c_0`
    Input,
    /// Drains `c_0`, transforms, fills `c_16`
    Compute,
    /// Drains `c_16` into the destination buffer
    Output,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Input => "input",
            UnitKind::Compute => "compute",
            UnitKind::Output => "output",
        }
    }
}

/// What a unit did over a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: UnitKind,
    /// Tiles processed
    pub tiles: usize,
    /// Wall time from first step to completion
    pub elapsed: Duration,
}

/// A unit scheduled on its own execution context
///
/// `run` processes every tile of the run and returns once the last one is
/// handed off, or with the first error it hit.
pub trait PipelineUnit: Send {
    fn kind(&self) -> UnitKind;

    fn run(&mut self) -> Result<UnitReport>;
}
