//! Tensor Buffers
//!
//! A tensor buffer is a contiguous device-memory region of tile-sized pages.
//! Handles are cheap to clone; all clones refer to the same memory.

use crate::constants::ELEMENT_SIZE_BYTES;
use crate::memory::TileStorage;
use crate::tile::Element;
use crate::{PipelineError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Size and paging of a tensor buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorBufferConfig {
    /// Total size in bytes
    pub size: usize,
    /// Bytes per page (one tile)
    pub page_size: usize,
}

impl TensorBufferConfig {
    /// Config for `tile_count` pages of `page_size` bytes
    pub fn for_tiles(tile_count: usize, page_size: usize) -> Self {
        Self {
            size: tile_count * page_size,
            page_size,
        }
    }

    /// Check that the region splits into whole pages of whole elements
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(PipelineError::Allocation("page size must be non-zero".to_string()));
        }
        if self.page_size % ELEMENT_SIZE_BYTES != 0 {
            return Err(PipelineError::Allocation(format!(
                "page size {} is not a multiple of the {}-byte element size",
                self.page_size, ELEMENT_SIZE_BYTES
            )));
        }
        if self.size % self.page_size != 0 {
            return Err(PipelineError::Allocation(format!(
                "buffer size {} is not a multiple of page size {}",
                self.size, self.page_size
            )));
        }
        Ok(())
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.size / self.page_size
    }
}

struct TensorBufferInner {
    address: u64,
    page_size: usize,
    page_count: usize,
    data: RwLock<Box<[Element]>>,
}

/// Handle to a device-resident tensor buffer
#[derive(Clone)]
pub struct TensorBuffer {
    inner: Arc<TensorBufferInner>,
}

impl TensorBuffer {
    /// Create a zero-filled buffer at `address`
    ///
    /// Only the device allocator hands out addresses, so this is crate-private.
    pub(crate) fn new(address: u64, config: TensorBufferConfig) -> Result<Self> {
        config.validate()?;
        let elements = config.size / ELEMENT_SIZE_BYTES;
        Ok(Self {
            inner: Arc::new(TensorBufferInner {
                address,
                page_size: config.page_size,
                page_count: config.page_count(),
                data: RwLock::new(vec![Element::ZERO; elements].into_boxed_slice()),
            }),
        })
    }

    /// Device address of the first page
    pub fn address(&self) -> u64 {
        self.inner.address
    }

    /// Number of tile-sized pages
    pub fn tile_count(&self) -> usize {
        self.inner.page_count
    }

    /// Total size in bytes
    pub fn size_bytes(&self) -> usize {
        self.inner.page_size * self.inner.page_count
    }

    /// Total number of elements
    pub fn element_count(&self) -> usize {
        self.size_bytes() / ELEMENT_SIZE_BYTES
    }

    fn page_elements(&self) -> usize {
        self.inner.page_size / ELEMENT_SIZE_BYTES
    }

    /// True when both handles refer to the same memory
    pub fn same_buffer(&self, other: &TensorBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Upload the whole buffer from host memory
    pub fn write_from_host(&self, src: &[Element]) -> Result<()> {
        let mut data = self.inner.data.write();
        if src.len() != data.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "host upload of {} elements into buffer {:#x} holding {} elements",
                src.len(),
                self.inner.address,
                data.len()
            )));
        }
        data.copy_from_slice(src);
        Ok(())
    }

    /// Upload the whole buffer from raw little-endian bytes
    pub fn write_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.size_bytes() {
            return Err(PipelineError::InvalidConfig(format!(
                "host upload of {} bytes into buffer {:#x} of {} bytes",
                bytes.len(),
                self.inner.address,
                self.size_bytes()
            )));
        }
        let elements: Vec<Element> = bytemuck::pod_collect_to_vec(bytes);
        self.write_from_host(&elements)
    }

    /// Download the whole buffer to host memory
    pub fn read_to_host(&self) -> Vec<Element> {
        self.inner.data.read().to_vec()
    }

    /// Download the whole buffer as raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.inner.data.read()[..]).to_vec()
    }

    fn check_page(&self, index: usize, len: usize) -> Result<()> {
        if index >= self.inner.page_count {
            return Err(PipelineError::TileOutOfRange {
                index,
                tile_count: self.inner.page_count,
            });
        }
        if len != self.page_elements() {
            return Err(PipelineError::TileSizeMismatch {
                expected: self.inner.page_size,
                actual: len * ELEMENT_SIZE_BYTES,
            });
        }
        Ok(())
    }
}

impl TileStorage for TensorBuffer {
    fn address(&self) -> u64 {
        self.inner.address
    }

    fn page_size(&self) -> usize {
        self.inner.page_size
    }

    fn page_count(&self) -> usize {
        self.inner.page_count
    }

    fn read_page(&self, index: usize, dst: &mut [Element]) -> Result<()> {
        self.check_page(index, dst.len())?;
        let n = self.page_elements();
        let data = self.inner.data.read();
        dst.copy_from_slice(&data[index * n..(index + 1) * n]);
        Ok(())
    }

    fn write_page(&self, index: usize, src: &[Element]) -> Result<()> {
        self.check_page(index, src.len())?;
        let n = self.page_elements();
        let mut data = self.inner.data.write();
        data[index * n..(index + 1) * n].copy_from_slice(src);
        Ok(())
    }
}

impl std::fmt::Debug for TensorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorBuffer")
            .field("address", &format_args!("{:#x}", self.inner.address))
            .field("page_size", &self.inner.page_size)
            .field("page_count", &self.inner.page_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pages: usize, page_size: usize) -> TensorBuffer {
        TensorBuffer::new(0x1000, TensorBufferConfig::for_tiles(pages, page_size)).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(TensorBufferConfig { size: 16, page_size: 0 }.validate().is_err());
        assert!(TensorBufferConfig { size: 16, page_size: 3 }.validate().is_err());
        assert!(TensorBufferConfig { size: 18, page_size: 4 }.validate().is_err());
        assert!(TensorBufferConfig { size: 0, page_size: 8 }.validate().is_ok());
        assert_eq!(TensorBufferConfig::for_tiles(4, 8).page_count(), 4);
    }

    #[test]
    fn test_page_round_trip() {
        let buf = buffer(3, 8);
        let page: Vec<Element> = (0..4).map(|i| Element::from_f32(i as f32)).collect();
        buf.write_page(2, &page).unwrap();

        let mut out = vec![Element::ZERO; 4];
        buf.read_page(2, &mut out).unwrap();
        assert_eq!(out, page);

        buf.read_page(0, &mut out).unwrap();
        assert!(out.iter().all(|v| *v == Element::ZERO));
    }

    #[test]
    fn test_page_bounds() {
        let buf = buffer(2, 8);
        let mut out = vec![Element::ZERO; 4];
        assert_eq!(
            buf.read_page(2, &mut out),
            Err(PipelineError::TileOutOfRange { index: 2, tile_count: 2 })
        );

        let mut short = vec![Element::ZERO; 3];
        assert_eq!(
            buf.read_page(0, &mut short),
            Err(PipelineError::TileSizeMismatch { expected: 8, actual: 6 })
        );
    }

    #[test]
    fn test_host_transfers() {
        let buf = buffer(2, 4);
        let host: Vec<Element> = (0..4).map(|i| Element::from_f32(i as f32 * 0.5)).collect();
        buf.write_from_host(&host).unwrap();
        assert_eq!(buf.read_to_host(), host);

        let bytes = buf.to_bytes();
        assert_eq!(bytes.len(), 8);

        let other = buffer(2, 4);
        other.write_from_bytes(&bytes).unwrap();
        assert_eq!(other.read_to_host(), host);

        assert!(buf.write_from_host(&host[..3]).is_err());
        assert!(buf.write_from_bytes(&bytes[..6]).is_err());
    }

    #[test]
    fn test_clones_share_memory() {
        let buf = buffer(1, 4);
        let alias = buf.clone();
        assert!(buf.same_buffer(&alias));
        assert!(!buf.same_buffer(&buffer(1, 4)));
    }
}
