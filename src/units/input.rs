//! Input Unit: source tensor → input staging buffer

use crate::memory::TileAccessor;
use crate::pipeline::InputArgs;
use crate::staging::StagingBuffer;
use crate::units::{PipelineUnit, UnitKind, UnitReport};
use crate::{PipelineError, Result};
use std::time::Instant;

/// Streams source tiles into the input staging buffer in index order
pub struct InputUnit<'a> {
    args: InputArgs,
    source: TileAccessor,
    staging: &'a StagingBuffer,
}

impl<'a> InputUnit<'a> {
    pub fn new(args: InputArgs, source: TileAccessor, staging: &'a StagingBuffer) -> Result<Self> {
        if args.tile_count > source.tile_count() {
            return Err(PipelineError::InvalidConfig(format!(
                "run of {} tiles exceeds source buffer {:#x} with {} tiles",
                args.tile_count,
                source.address(),
                source.tile_count()
            )));
        }
        if source.tile_elements() != staging.tile_elements() {
            return Err(PipelineError::TileSizeMismatch {
                expected: staging.tile_elements() * crate::constants::ELEMENT_SIZE_BYTES,
                actual: source.tile_elements() * crate::constants::ELEMENT_SIZE_BYTES,
            });
        }
        Ok(Self { args, source, staging })
    }
}

impl PipelineUnit for InputUnit<'_> {
    fn kind(&self) -> UnitKind {
        UnitKind::Input
    }

    fn run(&mut self) -> Result<UnitReport> {
        let started = Instant::now();
        tracing::debug!(
            src = self.args.src_address,
            tiles = self.args.tile_count,
            buffer = %self.staging.index(),
            "input unit started"
        );

        for i in 0..self.args.tile_count {
            let window = self.staging.reserve(1)?;
            self.source.issue_read(i, &mut window.slot(0)[..]);
            self.source.read_barrier()?;
            drop(window);
            self.staging.push(1)?;
            tracing::trace!(tile = i, "tile fetched");
        }

        let report = UnitReport {
            unit: UnitKind::Input,
            tiles: self.args.tile_count,
            elapsed: started.elapsed(),
        };
        tracing::debug!(tiles = report.tiles, elapsed_us = report.elapsed.as_micros() as u64, "input unit done");
        Ok(report)
    }
}
