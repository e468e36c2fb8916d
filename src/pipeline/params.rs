//! Run parameters and the per-unit argument views derived from them

use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Everything the three units need to know about one run
///
/// The units never see this struct whole: each gets its own argument view
/// when the run is launched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Tiles to process
    pub tile_count: usize,
    /// Device address of the source tensor buffer
    pub src_address: u64,
    /// Device address of the destination tensor buffer
    pub dst_address: u64,
    /// Value added to every element
    pub scalar: f32,
}

impl RunParameters {
    pub fn new(tile_count: usize, src_address: u64, dst_address: u64, scalar: f32) -> Self {
        Self {
            tile_count,
            src_address,
            dst_address,
            scalar,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scalar.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "scalar operand {} is not finite",
                self.scalar
            )));
        }
        if self.src_address == self.dst_address {
            return Err(PipelineError::AliasedBuffers(self.src_address));
        }
        Ok(())
    }

    /// Arguments handed to the Input Unit
    pub fn input_args(&self) -> InputArgs {
        InputArgs {
            src_address: self.src_address,
            tile_count: self.tile_count,
        }
    }

    /// Arguments handed to the Compute Unit
    pub fn compute_args(&self) -> ComputeArgs {
        ComputeArgs {
            tile_count: self.tile_count,
            scalar: self.scalar,
        }
    }

    /// Arguments handed to the Output Unit
    pub fn output_args(&self) -> OutputArgs {
        OutputArgs {
            dst_address: self.dst_address,
            tile_count: self.tile_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputArgs {
    pub src_address: u64,
    pub tile_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeArgs {
    pub tile_count: usize,
    pub scalar: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputArgs {
    pub dst_address: u64,
    pub tile_count: usize,
}
