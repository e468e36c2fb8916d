//! Tile Accessor
//!
//! Addresses a paged storage one tile at a time. Transfers are issued, then
//! completed by a barrier; a fault in any issued transfer surfaces at the
//! next barrier of the same direction.

use crate::constants::ELEMENT_SIZE_BYTES;
use crate::memory::TileStorage;
use crate::tile::Element;
use crate::{ErrorKind, PipelineError, Result};
use std::sync::Arc;

#[derive(Default)]
struct Pending {
    issued: usize,
    fault: Option<PipelineError>,
}

impl Pending {
    fn record(&mut self, outcome: Result<()>) {
        self.issued += 1;
        if let Err(err) = outcome {
            self.fault.get_or_insert(err);
        }
    }

    fn complete(&mut self) -> Result<usize> {
        let issued = std::mem::take(&mut self.issued);
        match self.fault.take() {
            Some(err) => Err(err),
            None => Ok(issued),
        }
    }
}

/// Tile-granular view over a [`TileStorage`]
pub struct TileAccessor {
    storage: Arc<dyn TileStorage>,
    tile_size_bytes: usize,
    reads: Pending,
    writes: Pending,
}

impl TileAccessor {
    /// Bind an accessor to `storage` for tiles of `tile_size_bytes`
    ///
    /// The storage's page size must equal the tile size.
    pub fn new(storage: Arc<dyn TileStorage>, tile_size_bytes: usize) -> Result<Self> {
        if storage.page_size() != tile_size_bytes {
            return Err(PipelineError::TileSizeMismatch {
                expected: tile_size_bytes,
                actual: storage.page_size(),
            });
        }
        Ok(Self {
            storage,
            tile_size_bytes,
            reads: Pending::default(),
            writes: Pending::default(),
        })
    }

    /// Base address of the underlying storage
    pub fn address(&self) -> u64 {
        self.storage.address()
    }

    /// Tiles addressable through this accessor
    pub fn tile_count(&self) -> usize {
        self.storage.page_count()
    }

    /// Elements per tile
    pub fn tile_elements(&self) -> usize {
        self.tile_size_bytes / ELEMENT_SIZE_BYTES
    }

    /// Start reading tile `index` into `dst`
    pub fn issue_read(&mut self, index: usize, dst: &mut [Element]) {
        let outcome = self
            .storage
            .read_page(index, dst)
            .map_err(|err| as_storage_fault(err, index, true));
        self.reads.record(outcome);
    }

    /// Block until every issued read has landed
    ///
    /// Returns the number of reads completed, or the first fault.
    pub fn read_barrier(&mut self) -> Result<usize> {
        self.reads.complete()
    }

    /// Start writing `src` to tile `index`
    pub fn issue_write(&mut self, index: usize, src: &[Element]) {
        let outcome = self
            .storage
            .write_page(index, src)
            .map_err(|err| as_storage_fault(err, index, false));
        self.writes.record(outcome);
    }

    /// Block until every issued write has landed
    ///
    /// Returns the number of writes completed, or the first fault.
    pub fn write_barrier(&mut self) -> Result<usize> {
        self.writes.complete()
    }
}

fn as_storage_fault(err: PipelineError, index: usize, read: bool) -> PipelineError {
    if err.kind() == ErrorKind::StorageIo {
        return err;
    }
    let reason = err.to_string();
    if read {
        PipelineError::StorageRead { index, reason }
    } else {
        PipelineError::StorageWrite { index, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{TensorBuffer, TensorBufferConfig};

    fn storage(pages: usize) -> Arc<dyn TileStorage> {
        Arc::new(TensorBuffer::new(0x4000, TensorBufferConfig::for_tiles(pages, 8)).unwrap())
    }

    #[test]
    fn test_page_size_must_match_tile() {
        assert!(matches!(
            TileAccessor::new(storage(2), 16),
            Err(PipelineError::TileSizeMismatch { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn test_write_then_read() {
        let mem = storage(2);
        let mut writer = TileAccessor::new(mem.clone(), 8).unwrap();
        let mut reader = TileAccessor::new(mem, 8).unwrap();
        assert_eq!(writer.tile_elements(), 4);
        assert_eq!(reader.tile_count(), 2);

        let tile: Vec<Element> = (0..4).map(|i| Element::from_f32(i as f32 + 1.0)).collect();
        writer.issue_write(1, &tile);
        assert_eq!(writer.write_barrier(), Ok(1));

        let mut out = vec![Element::ZERO; 4];
        reader.issue_read(1, &mut out);
        assert_eq!(reader.read_barrier(), Ok(1));
        assert_eq!(out, tile);
    }

    #[test]
    fn test_fault_surfaces_at_barrier() {
        let mut reader = TileAccessor::new(storage(1), 8).unwrap();
        let mut out = vec![Element::ZERO; 4];
        reader.issue_read(5, &mut out);
        reader.issue_read(0, &mut out);
        assert_eq!(
            reader.read_barrier(),
            Err(PipelineError::TileOutOfRange { index: 5, tile_count: 1 })
        );
        // The fault is consumed by the barrier that reported it
        assert_eq!(reader.read_barrier(), Ok(0));
    }
}
