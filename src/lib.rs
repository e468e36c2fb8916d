//! # Hologram Tile Pipeline - Streaming Element-wise Transforms over Tiled Tensors
//!
//! A single compute core runs three concurrent units connected by bounded
//! staging buffers. Tiles stream from a source tensor in device memory,
//! get a scalar added to every element, and land in a destination tensor
//! at the same tile index.
//!
//! ## Core Concept
//!
//! ```text
//! DRAM src ─▶ Input Unit ─▶ c_0 (depth 2) ─▶ Compute Unit ─▶ c_16 (depth 2) ─▶ Output Unit ─▶ DRAM dst
//!                 reserve/push        wait/pop   reserve/push       wait/pop
//! ```
//!
//! Double-buffered staging lets reading tile `i+1`, computing tile `i` and
//! writing tile `i-1` overlap. Slots are handed over strictly in FIFO order,
//! so ordering is preserved end to end.
//!
//! ## Quick Start
//!
//! ```
//! use hologram_tile_pipeline::config::{DeviceConfig, Tolerance};
//! use hologram_tile_pipeline::verify::{generate_source, source_rng, verify_scalar_add};
//! use hologram_tile_pipeline::{Device, PipelineConfig, RunParameters, TensorBufferConfig, TilePipeline};
//!
//! # fn main() -> hologram_tile_pipeline::Result<()> {
//! let device = Device::open(&DeviceConfig::default())?;
//! let config = PipelineConfig::default();
//! let tiles = 8;
//!
//! let buffer = TensorBufferConfig::for_tiles(tiles, config.tile.size_bytes());
//! let src = device.create_buffer(buffer)?;
//! let dst = device.create_buffer(buffer)?;
//!
//! let source = generate_source(&mut source_rng(Some(1)), src.element_count());
//! src.write_from_host(&source)?;
//!
//! let pipeline = TilePipeline::new(config)?;
//! let mut summary = pipeline.run(&device, RunParameters::new(tiles, src.address(), dst.address(), 1.0))?;
//!
//! let report = verify_scalar_add(&source, &dst.read_to_host(), 1.0, Tolerance::default())?;
//! assert!(report.passed());
//! summary.conclude(&report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **device** - DRAM arena and tensor buffer allocation
//! - **memory** - Tensor buffers, the `TileStorage` seam and tile accessors
//! - **staging** - Bounded SPSC slot rings between units
//! - **units** - Input, Compute and Output units
//! - **pipeline** - Orchestrator: configure, launch, join
//! - **verify** - Source generation and tolerance checks

// Error handling
mod error;
pub use error::{ErrorKind, PipelineError, Result};

// Display implementations
mod display;

// Constants and defaults
pub mod constants;
pub use constants::{DEFAULT_STAGING_DEPTH, TILE_HEIGHT, TILE_WIDTH};

// Core modules
pub mod config;
pub mod device;
pub mod memory;
pub mod staging;
pub mod tile;

// Pipeline modules
pub mod pipeline;
pub mod units;
pub mod verify;

// Re-exports for convenience
pub use config::{Config, PipelineConfig, Tolerance};
pub use device::Device;
pub use memory::{TensorBuffer, TensorBufferConfig, TileAccessor, TileStorage};
pub use pipeline::{ConfiguredRun, RunParameters, RunState, RunSummary, TilePipeline};
pub use staging::{BufferIndex, CancelToken, StagingBuffer, StagingStats};
pub use tile::{Element, TileLayout};
pub use units::{ScalarAddOp, UnitKind, UnitReport};
pub use verify::{Mismatch, VerificationReport};
