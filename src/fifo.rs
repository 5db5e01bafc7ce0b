//! Single-producer / single-consumer byte ring buffer.
//!
//! ```text
//!   storage (capacity = 2^k)
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!   │   │ r │ r │ r │ w │   │   │   │     used  = write - read
//!   └───┴───┴───┴───┴───┴───┴───┴───┘     avail = capacity - used
//!         ▲ read          ▲ write
//! ```
//!
//! Both indices are free-running `u32` counters that wrap; the storage slot
//! is `index & mask`.  Because the capacity divides 2^32 the difference
//! `write - read` (wrapping) is always the exact fill level, so a full buffer
//! and an empty one are never confused.
//!
//! Ownership rules:
//!
//! - The **write index** is advanced only by the producer side (the serial
//!   receive driver's reconciliation step, or a software writer on the
//!   transmit path).
//! - The **read index** is advanced only by the consumer.
//! - On the receive path the DMA engine stores bytes directly into the
//!   storage ahead of the write index; those bytes become visible only when
//!   reconciliation commits them.
//!
//! Storage is made of atomics so a buffer can be shared by `&'static`
//! reference between the driver, the consumer and the simulated DMA engine.

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::error::{Error, Result};

/// Smallest supported capacity.
pub const MIN_CAPACITY: usize = 2;
/// Largest supported capacity.
pub const MAX_CAPACITY: usize = 1 << 16;

pub struct Fifo {
    stor: Box<[AtomicU8]>,
    mask: u32,
    write: AtomicU32,
    read: AtomicU32,
}

impl Fifo {
    /// Allocate a buffer of `capacity` bytes.  The capacity must be a power
    /// of two between [`MIN_CAPACITY`] and [`MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() || !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(Error::FifoCapacity(capacity));
        }
        let stor = (0..capacity).map(|_| AtomicU8::new(0)).collect();
        Ok(Self {
            stor,
            mask: (capacity - 1) as u32,
            write: AtomicU32::new(0),
            read: AtomicU32::new(0),
        })
    }

    /// Allocate a buffer of `1 << order` bytes.
    pub fn with_order(order: u8) -> Result<Self> {
        if order >= 32 {
            return Err(Error::FifoCapacity(usize::MAX));
        }
        Self::new(1usize << order)
    }

    /// Allocate a buffer that lives for the rest of the program.  Buffers
    /// are handed to drivers by `'static` reference inside events.
    pub fn leak(capacity: usize) -> Result<&'static Self> {
        Ok(Box::leak(Box::new(Self::new(capacity)?)))
    }

    /// Reset both indices.  Storage contents are kept.
    pub fn reset(&self) {
        self.write.store(0, Ordering::Release);
        self.read.store(0, Ordering::Release);
    }

    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Free-running write index.
    pub fn write_index(&self) -> u32 {
        self.write.load(Ordering::Acquire)
    }

    /// Free-running read index.
    pub fn read_index(&self) -> u32 {
        self.read.load(Ordering::Acquire)
    }

    /// Bytes committed and not yet consumed.
    pub fn used_count(&self) -> u32 {
        self.write_index().wrapping_sub(self.read_index())
    }

    /// Free space.
    pub fn avail_count(&self) -> u32 {
        self.capacity().saturating_sub(self.used_count())
    }

    pub fn is_empty(&self) -> bool {
        self.used_count() == 0
    }

    /// Bytes between `position` and the write index, where `position` is a
    /// free-running producer position (e.g. how far the DMA engine got).
    pub fn pending_from(&self, position: u32) -> u32 {
        position.wrapping_sub(self.write_index())
    }

    /// Commit `n` bytes already stored ahead of the write index.
    pub fn inc_write_index(&self, n: u32) {
        debug_assert!(n <= self.avail_count(), "write index overrun");
        self.write.fetch_add(n, Ordering::AcqRel);
    }

    /// Release `n` consumed bytes.
    pub fn inc_read_index(&self, n: u32) {
        debug_assert!(n <= self.used_count(), "read index overrun");
        self.read.fetch_add(n, Ordering::AcqRel);
    }

    /// Store one byte at free-running `position`.  Used by the DMA side;
    /// does not move any index.
    pub fn store_at(&self, position: u32, byte: u8) {
        self.stor[(position & self.mask) as usize].store(byte, Ordering::Relaxed);
    }

    /// Copy out up to `buf.len()` committed bytes without consuming them.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.used_count() as usize);
        let start = self.read_index();
        for (i, slot) in buf.iter_mut().take(n).enumerate() {
            let pos = start.wrapping_add(i as u32) & self.mask;
            *slot = self.stor[pos as usize].load(Ordering::Relaxed);
        }
        n
    }

    /// Copy out and consume up to `buf.len()` bytes.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let n = self.peek(buf);
        self.inc_read_index(n as u32);
        n
    }

    /// Append as much of `data` as fits and commit it.  Returns the number
    /// of bytes accepted.
    pub fn write(&self, data: &[u8]) -> usize {
        let n = data.len().min(self.avail_count() as usize);
        let start = self.write_index();
        for (i, byte) in data.iter().take(n).enumerate() {
            self.store_at(start.wrapping_add(i as u32), *byte);
        }
        self.inc_write_index(n as u32);
        n
    }

    /// Committed bytes readable without wrapping around the end of storage.
    pub fn contiguous_used(&self) -> u32 {
        let to_end = self.capacity() - (self.read_index() & self.mask);
        self.used_count().min(to_end)
    }
}

impl fmt::Debug for Fifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fifo")
            .field("capacity", &self.capacity())
            .field("write", &self.write_index())
            .field("read", &self.read_index())
            .finish()
    }
}
