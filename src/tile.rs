//! Tile geometry
//!
//! A tile is a row-major `width × height` block of bfloat16 elements, densely
//! packed with no padding. Every tensor buffer is a sequence of tiles in index
//! order, one tile per page.

use crate::constants::{ELEMENT_SIZE_BYTES, TILE_HEIGHT, TILE_WIDTH};
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Element type stored in tiles
pub type Element = half::bf16;

/// Fixed tile geometry for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileLayout {
    /// Elements per row
    pub width: usize,
    /// Rows per tile
    pub height: usize,
}

impl TileLayout {
    /// Create a layout
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Elements in one tile
    pub const fn element_count(&self) -> usize {
        self.width * self.height
    }

    /// Bytes in one tile (also the page size of every tensor buffer)
    pub const fn size_bytes(&self) -> usize {
        self.element_count() * ELEMENT_SIZE_BYTES
    }

    /// Element range covered by tile `index` in a flat tensor
    pub fn element_range(&self, index: usize) -> Range<usize> {
        let n = self.element_count();
        index * n..(index + 1) * n
    }

    /// Reject degenerate geometries
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "tile layout {}x{} has no elements",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::new(TILE_WIDTH, TILE_HEIGHT)
    }
}
