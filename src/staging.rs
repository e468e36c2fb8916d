//! Staging Buffers
//!
//! A staging buffer is a bounded ring of tile-sized slots shared by exactly
//! one producer and one consumer.
//!
//! ```text
//! producer                      ring (depth = 2)                consumer
//! reserve(1) ──▶ write slot ──▶ push(1) ──▶ [ ■ | □ ] ──▶ wait(1) ──▶ read slot ──▶ pop(1)
//! ```
//!
//! - `reserve` blocks until enough slots are free and hands out the slots at
//!   the write position; `push` publishes them to the consumer.
//! - `wait` blocks until enough slots are occupied and hands out the slots at
//!   the read position; `pop` returns them to the producer.
//!
//! Publication happens only at `push` and slot reuse only after `pop`, so a
//! tile is never read before it is complete and never overwritten before it
//! is consumed. Occupancy stays in `[0, depth]`.
//!
//! Blocking is unbounded by default. A [`CancelToken`] and an optional stall
//! deadline are checked on every reserve/wait, turning a hung partner into a
//! `Cancelled` or `Stalled` error instead of a deadlock.

use crate::constants::{CANCEL_POLL_INTERVAL_MS, INPUT_CB_INDEX, OUTPUT_CB_INDEX};
use crate::tile::Element;
use crate::{PipelineError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared by every buffer of a run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; blocked staging waits notice within one poll interval
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Circular-buffer index identifying a staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferIndex(pub u8);

impl BufferIndex {
    /// Input-side buffer (Input Unit → Compute Unit)
    pub const INPUT: BufferIndex = BufferIndex(INPUT_CB_INDEX);
    /// Output-side buffer (Compute Unit → Output Unit)
    pub const OUTPUT: BufferIndex = BufferIndex(OUTPUT_CB_INDEX);
}

impl fmt::Display for BufferIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c_{}", self.0)
    }
}

/// Counters describing how a buffer was used over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingStats {
    /// Slots published by the producer
    pub pushed: u64,
    /// Slots released by the consumer
    pub popped: u64,
    /// Reserves that had to block on a full ring
    pub producer_waits: u64,
    /// Waits that had to block on an empty ring
    pub consumer_waits: u64,
    /// Highest occupancy observed
    pub high_water: usize,
}

struct RingState {
    occupied: usize,
    write_pos: usize,
    read_pos: usize,
    reserved: usize,
    waited: usize,
    stats: StagingStats,
}

/// Bounded single-producer/single-consumer ring of tile slots
pub struct StagingBuffer {
    index: BufferIndex,
    depth: usize,
    tile_elements: usize,
    slots: Box<[Mutex<Box<[Element]>>]>,
    ring: Mutex<RingState>,
    space_freed: Condvar,
    data_ready: Condvar,
    stall_timeout: Option<Duration>,
    cancel: CancelToken,
}

impl StagingBuffer {
    /// Create a buffer of `depth` slots, each holding `tile_elements` elements
    pub fn new(index: BufferIndex, depth: usize, tile_elements: usize) -> Result<Self> {
        if depth == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "staging buffer {} needs at least one slot",
                index
            )));
        }
        if tile_elements == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "staging buffer {} slots must hold at least one element",
                index
            )));
        }
        let slots = (0..depth)
            .map(|_| Mutex::new(vec![Element::ZERO; tile_elements].into_boxed_slice()))
            .collect();
        Ok(Self {
            index,
            depth,
            tile_elements,
            slots,
            ring: Mutex::new(RingState {
                occupied: 0,
                write_pos: 0,
                read_pos: 0,
                reserved: 0,
                waited: 0,
                stats: StagingStats::default(),
            }),
            space_freed: Condvar::new(),
            data_ready: Condvar::new(),
            stall_timeout: None,
            cancel: CancelToken::new(),
        })
    }

    /// Builder: fail blocked reserve/wait calls after `timeout`
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Builder: share a cancellation token with other buffers of the run
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn index(&self) -> BufferIndex {
        self.index
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn tile_elements(&self) -> usize {
        self.tile_elements
    }

    /// Slots currently holding published, unpopped tiles
    pub fn occupancy(&self) -> usize {
        self.ring.lock().occupied
    }

    pub fn stats(&self) -> StagingStats {
        self.ring.lock().stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the run and wake both sides
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _ring = self.ring.lock();
        self.space_freed.notify_all();
        self.data_ready.notify_all();
    }

    /// Producer: block until `count` slots are free and claim them
    pub fn reserve(&self, count: usize) -> Result<SlotWindow<'_>> {
        self.check_count(count)?;
        let depth = self.depth;
        let ring = self.ring.lock();
        let (mut ring, blocked) = self.block_until(ring, &self.space_freed, |r| depth - r.occupied >= count)?;
        if blocked {
            ring.stats.producer_waits += 1;
        }
        ring.reserved = ring.reserved.max(count);
        Ok(SlotWindow {
            buffer: self,
            start: ring.write_pos,
            count,
        })
    }

    /// Producer: publish the `count` oldest reserved slots
    pub fn push(&self, count: usize) -> Result<()> {
        self.check_count(count)?;
        let mut ring = self.ring.lock();
        if count > ring.reserved {
            return Err(self.protocol(format!(
                "push of {} slots with only {} reserved",
                count, ring.reserved
            )));
        }
        ring.reserved -= count;
        ring.occupied += count;
        ring.write_pos = (ring.write_pos + count) % self.depth;
        ring.stats.pushed += count as u64;
        ring.stats.high_water = ring.stats.high_water.max(ring.occupied);
        drop(ring);
        self.data_ready.notify_all();
        Ok(())
    }

    /// Consumer: block until `count` slots are occupied and claim them
    pub fn wait(&self, count: usize) -> Result<SlotWindow<'_>> {
        self.check_count(count)?;
        let ring = self.ring.lock();
        let (mut ring, blocked) = self.block_until(ring, &self.data_ready, |r| r.occupied >= count)?;
        if blocked {
            ring.stats.consumer_waits += 1;
        }
        ring.waited = ring.waited.max(count);
        Ok(SlotWindow {
            buffer: self,
            start: ring.read_pos,
            count,
        })
    }

    /// Consumer: release the `count` oldest waited-on slots
    pub fn pop(&self, count: usize) -> Result<()> {
        self.check_count(count)?;
        let mut ring = self.ring.lock();
        if count > ring.waited {
            return Err(self.protocol(format!(
                "pop of {} slots with only {} waited on",
                count, ring.waited
            )));
        }
        ring.waited -= count;
        ring.occupied -= count;
        ring.read_pos = (ring.read_pos + count) % self.depth;
        ring.stats.popped += count as u64;
        drop(ring);
        self.space_freed.notify_all();
        Ok(())
    }

    fn check_count(&self, count: usize) -> Result<()> {
        if count == 0 || count > self.depth {
            return Err(PipelineError::InvalidSlotCount {
                buffer: self.index.to_string(),
                requested: count,
                depth: self.depth,
            });
        }
        Ok(())
    }

    fn protocol(&self, detail: String) -> PipelineError {
        PipelineError::Protocol {
            buffer: self.index.to_string(),
            detail,
        }
    }

    /// Park on `ready` until `is_ready` holds, the run is cancelled, or the stall deadline passes
    ///
    /// The flag in the returned tuple is true when the caller had to block.
    fn block_until<'a>(
        &'a self,
        mut ring: MutexGuard<'a, RingState>,
        ready: &Condvar,
        is_ready: impl Fn(&RingState) -> bool,
    ) -> Result<(MutexGuard<'a, RingState>, bool)> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(self.index.to_string()));
        }
        if is_ready(&ring) {
            return Ok((ring, false));
        }

        let started = Instant::now();
        let poll = Duration::from_millis(CANCEL_POLL_INTERVAL_MS);
        loop {
            let wait = match self.stall_timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        tracing::warn!(buffer = %self.index, waited_ms = elapsed.as_millis() as u64, "staging buffer stalled");
                        return Err(PipelineError::Stalled {
                            buffer: self.index.to_string(),
                            waited_ms: elapsed.as_millis() as u64,
                        });
                    }
                    poll.min(limit - elapsed)
                }
                None => poll,
            };

            ready.wait_for(&mut ring, wait);

            if self.cancel.is_cancelled() {
                tracing::debug!(buffer = %self.index, "staging wait cancelled");
                return Err(PipelineError::Cancelled(self.index.to_string()));
            }
            if is_ready(&ring) {
                return Ok((ring, true));
            }
        }
    }
}

impl fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("index", &self.index)
            .field("depth", &self.depth)
            .field("tile_elements", &self.tile_elements)
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

/// Slots claimed by a `reserve` or `wait`
///
/// The window only addresses slots; publishing or releasing them is done by
/// `push`/`pop` on the buffer.
pub struct SlotWindow<'a> {
    buffer: &'a StagingBuffer,
    start: usize,
    count: usize,
}

impl<'a> SlotWindow<'a> {
    /// Slots in the window
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Lock slot `k` of the window
    ///
    /// # Panics
    ///
    /// Panics if `k` is outside the window.
    pub fn slot(&self, k: usize) -> MutexGuard<'a, Box<[Element]>> {
        assert!(k < self.count, "slot {} outside window of {}", k, self.count);
        self.buffer.slots[(self.start + k) % self.buffer.depth].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(value: f32, n: usize) -> Vec<Element> {
        vec![Element::from_f32(value); n]
    }

    #[test]
    fn test_rejects_degenerate_buffers() {
        assert!(StagingBuffer::new(BufferIndex::INPUT, 0, 4).is_err());
        assert!(StagingBuffer::new(BufferIndex::INPUT, 2, 0).is_err());
    }

    #[test]
    fn test_single_tile_cycle() {
        let cb = StagingBuffer::new(BufferIndex::INPUT, 2, 4).unwrap();

        let window = cb.reserve(1).unwrap();
        window.slot(0).copy_from_slice(&tile(3.0, 4));
        drop(window);
        assert_eq!(cb.occupancy(), 0);
        cb.push(1).unwrap();
        assert_eq!(cb.occupancy(), 1);

        let window = cb.wait(1).unwrap();
        assert_eq!(&window.slot(0)[..], &tile(3.0, 4)[..]);
        drop(window);
        cb.pop(1).unwrap();
        assert_eq!(cb.occupancy(), 0);

        let stats = cb.stats();
        assert_eq!(stats.pushed, 1);
        assert_eq!(stats.popped, 1);
        assert_eq!(stats.high_water, 1);
    }

    #[test]
    fn test_ring_wraps_in_fifo_order() {
        let cb = StagingBuffer::new(BufferIndex::OUTPUT, 2, 1).unwrap();
        for i in 0..5 {
            cb.reserve(1).unwrap().slot(0)[0] = Element::from_f32(i as f32);
            cb.push(1).unwrap();
            assert_eq!(cb.wait(1).unwrap().slot(0)[0], Element::from_f32(i as f32));
            cb.pop(1).unwrap();
        }
    }

    #[test]
    fn test_multi_slot_windows() {
        let cb = StagingBuffer::new(BufferIndex::INPUT, 2, 1).unwrap();
        let window = cb.reserve(2).unwrap();
        assert_eq!(window.len(), 2);
        window.slot(0)[0] = Element::from_f32(1.0);
        window.slot(1)[0] = Element::from_f32(2.0);
        drop(window);
        cb.push(2).unwrap();
        assert_eq!(cb.occupancy(), 2);

        let window = cb.wait(2).unwrap();
        assert_eq!(window.slot(0)[0], Element::from_f32(1.0));
        assert_eq!(window.slot(1)[0], Element::from_f32(2.0));
        drop(window);
        cb.pop(2).unwrap();
        assert_eq!(cb.occupancy(), 0);
    }

    #[test]
    fn test_slot_count_bounds() {
        let cb = StagingBuffer::new(BufferIndex::INPUT, 2, 1).unwrap();
        assert!(matches!(
            cb.reserve(3),
            Err(PipelineError::InvalidSlotCount { requested: 3, depth: 2, .. })
        ));
        assert!(matches!(cb.wait(0), Err(PipelineError::InvalidSlotCount { .. })));
    }

    #[test]
    fn test_protocol_violations() {
        let cb = StagingBuffer::new(BufferIndex::INPUT, 2, 1).unwrap();
        assert!(matches!(cb.push(1), Err(PipelineError::Protocol { .. })));
        assert!(matches!(cb.pop(1), Err(PipelineError::Protocol { .. })));

        cb.reserve(1).unwrap();
        assert!(matches!(cb.push(2), Err(PipelineError::Protocol { .. })));
        cb.push(1).unwrap();
        assert!(matches!(cb.pop(1), Err(PipelineError::Protocol { .. })));
    }

    #[test]
    fn test_stall_timeout_on_empty_ring() {
        let cb = StagingBuffer::new(BufferIndex::OUTPUT, 2, 1)
            .unwrap()
            .with_stall_timeout(Some(Duration::from_millis(20)));
        match cb.wait(1) {
            Err(PipelineError::Stalled { buffer, waited_ms }) => {
                assert_eq!(buffer, "c_16");
                assert!(waited_ms >= 20);
            }
            other => panic!("expected stall, got {:?}", other.map(|w| w.len())),
        }
    }

    #[test]
    fn test_stall_timeout_on_full_ring() {
        let cb = StagingBuffer::new(BufferIndex::INPUT, 1, 1)
            .unwrap()
            .with_stall_timeout(Some(Duration::from_millis(20)));
        cb.reserve(1).unwrap();
        cb.push(1).unwrap();
        assert!(matches!(cb.reserve(1), Err(PipelineError::Stalled { .. })));
    }

    #[test]
    fn test_cancel_wakes_blocked_consumer() {
        let cb = StagingBuffer::new(BufferIndex::OUTPUT, 2, 1).unwrap();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| cb.wait(1).map(|w| w.len()));
            std::thread::sleep(Duration::from_millis(20));
            cb.cancel();
            assert_eq!(
                waiter.join().unwrap(),
                Err(PipelineError::Cancelled("c_16".to_string()))
            );
        });
        assert!(cb.is_cancelled());
    }

    #[test]
    fn test_shared_token_cancels_every_buffer() {
        let token = CancelToken::new();
        let a = StagingBuffer::new(BufferIndex::INPUT, 2, 1)
            .unwrap()
            .with_cancel_token(token.clone());
        let b = StagingBuffer::new(BufferIndex::OUTPUT, 2, 1)
            .unwrap()
            .with_cancel_token(token.clone());
        token.cancel();
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(matches!(a.reserve(1), Err(PipelineError::Cancelled(_))));
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const TILES: usize = 500;
        let cb = StagingBuffer::new(BufferIndex::INPUT, 2, 8).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..TILES {
                    let window = cb.reserve(1).unwrap();
                    window.slot(0).fill(Element::from_f32((i % 256) as f32));
                    drop(window);
                    cb.push(1).unwrap();
                }
            });

            for i in 0..TILES {
                let window = cb.wait(1).unwrap();
                let expected = Element::from_f32((i % 256) as f32);
                assert!(window.slot(0).iter().all(|v| *v == expected), "tile {} out of order", i);
                drop(window);
                cb.pop(1).unwrap();
                assert!(cb.occupancy() <= 2);
            }
        });

        let stats = cb.stats();
        assert_eq!(stats.pushed, TILES as u64);
        assert_eq!(stats.popped, TILES as u64);
        assert!(stats.high_water <= 2);
    }
}
