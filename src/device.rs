//! Device and DRAM allocator
//!
//! A [`Device`] owns a bounded DRAM arena. Tensor buffers are carved out of it
//! with a bump allocator, so base addresses are page-aligned and two live
//! buffers never overlap. Units find their buffers by address through
//! [`Device::buffer`].

use crate::config::DeviceConfig;
use crate::constants::DRAM_BASE_ADDRESS;
use crate::memory::{TensorBuffer, TensorBufferConfig};
use crate::{PipelineError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;

struct DramState {
    next_address: u64,
    used_bytes: usize,
    buffers: BTreeMap<u64, TensorBuffer>,
}

/// Handle to an opened device
pub struct Device {
    id: u32,
    capacity_bytes: usize,
    dram: Mutex<DramState>,
}

impl Device {
    /// Open the device described by `config`
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        if config.dram_capacity_bytes == 0 {
            return Err(PipelineError::Allocation(format!(
                "device {} reports no DRAM capacity",
                config.id
            )));
        }
        tracing::debug!(device = config.id, capacity = config.dram_capacity_bytes, "device opened");
        Ok(Self {
            id: config.id,
            capacity_bytes: config.dram_capacity_bytes,
            dram: Mutex::new(DramState {
                next_address: DRAM_BASE_ADDRESS,
                used_bytes: 0,
                buffers: BTreeMap::new(),
            }),
        })
    }

    /// Device id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// DRAM capacity in bytes
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Bytes held by live buffers
    pub fn used_bytes(&self) -> usize {
        self.dram.lock().used_bytes
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.dram.lock().buffers.len()
    }

    /// Allocate a zero-filled tensor buffer
    pub fn create_buffer(&self, config: TensorBufferConfig) -> Result<TensorBuffer> {
        config.validate()?;

        let mut dram = self.dram.lock();
        let available = self.capacity_bytes - dram.used_bytes;
        if config.size > available {
            return Err(PipelineError::Allocation(format!(
                "requested {} bytes on device {} with {} of {} bytes free",
                config.size, self.id, available, self.capacity_bytes
            )));
        }

        let page = config.page_size as u64;
        let address = dram.next_address.next_multiple_of(page);
        // Zero-sized buffers still claim one page so their address stays unique
        let span = config.size.max(config.page_size) as u64;
        let buffer = TensorBuffer::new(address, config)?;

        dram.next_address = address + span;
        dram.used_bytes += config.size;
        dram.buffers.insert(address, buffer.clone());

        tracing::debug!(
            device = self.id,
            address,
            size = config.size,
            page_size = config.page_size,
            "tensor buffer created"
        );
        Ok(buffer)
    }

    /// Resolve a device address to its buffer
    pub fn buffer(&self, address: u64) -> Result<TensorBuffer> {
        self.dram
            .lock()
            .buffers
            .get(&address)
            .cloned()
            .ok_or(PipelineError::UnknownAddress(address))
    }

    /// Free the buffer at `address`
    ///
    /// Outstanding handles keep their memory alive, but the address no
    /// longer resolves and its bytes return to the arena budget.
    pub fn release_buffer(&self, address: u64) -> Result<()> {
        let mut dram = self.dram.lock();
        let buffer = dram
            .buffers
            .remove(&address)
            .ok_or(PipelineError::UnknownAddress(address))?;
        dram.used_bytes -= buffer.size_bytes();
        Ok(())
    }

    /// Close the device, freeing every live buffer
    ///
    /// Returns how many buffers were still live.
    pub fn close(self) -> usize {
        let dram = self.dram.into_inner();
        let live = dram.buffers.len();
        tracing::debug!(device = self.id, live_buffers = live, "device closed");
        live
    }
}
