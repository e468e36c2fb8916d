//! Constants and Default Values
//!
//! Defaults reproduce the demonstrated configuration: 64 tiles of 32×32
//! bfloat16 elements streamed through two double-buffered staging queues.

/// Tile width in elements
pub const TILE_WIDTH: usize = 32;

/// Tile height in elements
pub const TILE_HEIGHT: usize = 32;

/// Elements in a default tile (1,024)
pub const ELEMENTS_PER_TILE: usize = TILE_WIDTH * TILE_HEIGHT;

/// Bytes per stored element (bfloat16)
pub const ELEMENT_SIZE_BYTES: usize = std::mem::size_of::<half::bf16>();

/// Bytes in a default tile (2,048)
pub const TILE_SIZE_BYTES: usize = ELEMENTS_PER_TILE * ELEMENT_SIZE_BYTES;

/// Default staging buffer depth in tiles
///
/// Two slots give double buffering: one slot fills while the other drains.
pub const DEFAULT_STAGING_DEPTH: usize = 2;

/// Default number of tiles in a run
pub const DEFAULT_TILE_COUNT: usize = 64;

/// Default scalar operand
pub const DEFAULT_SCALAR: f32 = 1.0;

/// Default absolute verification tolerance
pub const DEFAULT_ABSOLUTE_TOLERANCE: f32 = 0.05;

/// Default relative verification tolerance: half a bfloat16 ulp (2^-8)
pub const DEFAULT_RELATIVE_TOLERANCE: f32 = 1.0 / 256.0;

/// Default device DRAM capacity (64 MiB)
pub const DEFAULT_DRAM_CAPACITY_BYTES: usize = 64 * 1024 * 1024;

/// First address handed out by the device allocator
///
/// Address 0 is never a valid buffer address.
pub const DRAM_BASE_ADDRESS: u64 = 0x1_0000;

/// Circular-buffer index of the input staging buffer
pub const INPUT_CB_INDEX: u8 = 0;

/// Circular-buffer index of the output staging buffer
pub const OUTPUT_CB_INDEX: u8 = 16;

/// How often a blocked staging wait re-checks cancellation and deadlines
pub const CANCEL_POLL_INTERVAL_MS: u64 = 5;
