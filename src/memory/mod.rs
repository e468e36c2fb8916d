//! Device Memory Abstractions
//!
//! Tensors live in device memory as contiguous sequences of tile-sized pages.
//!
//! # Architecture
//!
//! ```text
//! TileAccessor (per unit)
//!   ├─ issue_read / read_barrier     → Input Unit
//!   └─ issue_write / write_barrier   → Output Unit
//!          │
//!          ▼
//! dyn TileStorage
//!   └─ TensorBuffer {                → DRAM-resident tiles
//!        address, page_size,
//!        data: RwLock<[bf16]>,
//!      }
//! ```
//!
//! `TileStorage` is the seam between the units and memory: the device hands
//! out [`TensorBuffer`]s, and anything else implementing the trait (remote
//! memory, fault-injecting test doubles) plugs into the same units.

mod accessor;
mod tensor;

pub use accessor::TileAccessor;
pub use tensor::{TensorBuffer, TensorBufferConfig};

use crate::tile::Element;
use crate::Result;

/// Paged storage addressed one tile at a time
///
/// Each page holds exactly one tile. Implementors must be safe to share
/// between the unit threads; a given page is only ever touched by one unit.
pub trait TileStorage: Send + Sync {
    /// Base device address of the region
    fn address(&self) -> u64;

    /// Bytes per page
    fn page_size(&self) -> usize;

    /// Number of pages in the region
    fn page_count(&self) -> usize;

    /// Copy page `index` into `dst`
    ///
    /// `dst` must hold exactly one page worth of elements.
    fn read_page(&self, index: usize, dst: &mut [Element]) -> Result<()>;

    /// Copy `src` into page `index`
    ///
    /// `src` must hold exactly one page worth of elements.
    fn write_page(&self, index: usize, src: &[Element]) -> Result<()>;
}
