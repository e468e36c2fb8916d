//! Compute Unit
//!
//! Pulls a tile out of `c_0`, widens it into a working register set, applies
//! the scalar addition in f32, narrows back to bf16 and hands the result to
//! `c_16`.
//!
//! ## Step order per tile
//!
//! 1. wait for one occupied input slot
//! 2. copy the tile into the register set
//! 3. add the scalar to every lane
//! 4. reserve one output slot
//! 5. pack the registers into the output slot
//! 6. pop the input slot
//! 7. push the output slot
//!
//! The input slot is held until the output slot is filled, so a full output
//! buffer back-pressures the Input Unit through `c_0`.

use crate::pipeline::ComputeArgs;
use crate::staging::StagingBuffer;
use crate::tile::Element;
use crate::units::{PipelineUnit, UnitKind, UnitReport};
use crate::{PipelineError, Result};
use std::time::Instant;

/// Element-wise `x + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarAddOp {
    pub offset: f32,
}

impl ScalarAddOp {
    pub fn new(offset: f32) -> Self {
        Self { offset }
    }

    /// Apply to every lane of the register set
    pub fn apply(&self, regs: &mut TileRegisters) {
        for lane in regs.lanes_mut() {
            *lane += self.offset;
        }
    }

    /// Apply to a single element with the same widen/narrow rounding as
    /// the register path
    pub fn apply_element(&self, x: Element) -> Element {
        Element::from_f32(x.to_f32() + self.offset)
    }

    pub fn name(&self) -> &str {
        "ScalarAdd"
    }
}

/// f32 working registers holding one tile
#[derive(Debug, Clone)]
pub struct TileRegisters {
    lanes: Box<[f32]>,
}

impl TileRegisters {
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes: vec![0.0; lanes].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn lanes(&self) -> &[f32] {
        &self.lanes
    }

    pub fn lanes_mut(&mut self) -> &mut [f32] {
        &mut self.lanes
    }

    /// Widen a bf16 tile into the registers
    pub fn copy_tile(&mut self, tile: &[Element]) {
        debug_assert_eq!(tile.len(), self.lanes.len());
        for (lane, x) in self.lanes.iter_mut().zip(tile) {
            *lane = x.to_f32();
        }
    }

    /// Narrow the registers into a bf16 tile (round to nearest even)
    pub fn pack_tile(&self, tile: &mut [Element]) {
        debug_assert_eq!(tile.len(), self.lanes.len());
        for (x, lane) in tile.iter_mut().zip(self.lanes.iter()) {
            *x = Element::from_f32(*lane);
        }
    }
}

/// Transforms tiles between the two staging buffers
pub struct ComputeUnit<'a> {
    args: ComputeArgs,
    op: ScalarAddOp,
    input: &'a StagingBuffer,
    output: &'a StagingBuffer,
    regs: TileRegisters,
}

impl<'a> ComputeUnit<'a> {
    pub fn new(args: ComputeArgs, input: &'a StagingBuffer, output: &'a StagingBuffer) -> Result<Self> {
        if input.tile_elements() != output.tile_elements() {
            return Err(PipelineError::TileSizeMismatch {
                expected: input.tile_elements() * crate::constants::ELEMENT_SIZE_BYTES,
                actual: output.tile_elements() * crate::constants::ELEMENT_SIZE_BYTES,
            });
        }
        Ok(Self {
            args,
            op: ScalarAddOp::new(args.scalar),
            input,
            output,
            regs: TileRegisters::new(input.tile_elements()),
        })
    }

    pub fn op(&self) -> &ScalarAddOp {
        &self.op
    }
}

impl PipelineUnit for ComputeUnit<'_> {
    fn kind(&self) -> UnitKind {
        UnitKind::Compute
    }

    fn run(&mut self) -> Result<UnitReport> {
        let started = Instant::now();
        tracing::debug!(
            op = self.op.name(),
            scalar = self.op.offset,
            tiles = self.args.tile_count,
            "compute unit started"
        );

        for i in 0..self.args.tile_count {
            let src = self.input.wait(1)?;
            self.regs.copy_tile(&src.slot(0)[..]);
            drop(src);

            self.op.apply(&mut self.regs);

            let dst = self.output.reserve(1)?;
            self.regs.pack_tile(&mut dst.slot(0)[..]);
            drop(dst);

            self.input.pop(1)?;
            self.output.push(1)?;
            tracing::trace!(tile = i, "tile transformed");
        }

        let report = UnitReport {
            unit: UnitKind::Compute,
            tiles: self.args.tile_count,
            elapsed: started.elapsed(),
        };
        tracing::debug!(tiles = report.tiles, elapsed_us = report.elapsed.as_micros() as u64, "compute unit done");
        Ok(report)
    }
}
