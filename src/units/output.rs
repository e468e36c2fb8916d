//! Output Unit: output staging buffer → destination tensor

use crate::constants::ELEMENT_SIZE_BYTES;
use crate::memory::TileAccessor;
use crate::pipeline::OutputArgs;
use crate::staging::StagingBuffer;
use crate::units::{PipelineUnit, UnitKind, UnitReport};
use crate::{PipelineError, Result};
use std::time::Instant;

/// Drains transformed tiles into the destination buffer in index order
pub struct OutputUnit<'a> {
    args: OutputArgs,
    destination: TileAccessor,
    staging: &'a StagingBuffer,
}

impl<'a> OutputUnit<'a> {
    pub fn new(args: OutputArgs, destination: TileAccessor, staging: &'a StagingBuffer) -> Result<Self> {
        if args.tile_count > destination.tile_count() {
            return Err(PipelineError::InvalidConfig(format!(
                "run of {} tiles exceeds destination buffer {:#x} with {} tiles",
                args.tile_count,
                destination.address(),
                destination.tile_count()
            )));
        }
        if destination.tile_elements() != staging.tile_elements() {
            return Err(PipelineError::TileSizeMismatch {
                expected: staging.tile_elements() * ELEMENT_SIZE_BYTES,
                actual: destination.tile_elements() * ELEMENT_SIZE_BYTES,
            });
        }
        Ok(Self {
            args,
            destination,
            staging,
        })
    }
}

impl PipelineUnit for OutputUnit<'_> {
    fn kind(&self) -> UnitKind {
        UnitKind::Output
    }

    fn run(&mut self) -> Result<UnitReport> {
        let started = Instant::now();
        tracing::debug!(
            dst = self.args.dst_address,
            tiles = self.args.tile_count,
            buffer = %self.staging.index(),
            "output unit started"
        );

        for i in 0..self.args.tile_count {
            let window = self.staging.wait(1)?;
            self.destination.issue_write(i, &window.slot(0)[..]);
            self.destination.write_barrier()?;
            drop(window);
            self.staging.pop(1)?;
            tracing::trace!(tile = i, "tile stored");
        }

        let report = UnitReport {
            unit: UnitKind::Output,
            tiles: self.args.tile_count,
            elapsed: started.elapsed(),
        };
        tracing::debug!(tiles = report.tiles, elapsed_us = report.elapsed.as_micros() as u64, "output unit done");
        Ok(report)
    }
}
