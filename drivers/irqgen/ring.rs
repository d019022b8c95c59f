//! Latency sample ring buffer
//!
//! Fixed-capacity FIFO shared between the interrupt handler (producer) and
//! the character device (consumer). Storage is allocated once at its final
//! size; a push into a full buffer drops the oldest unread sample.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::sync::IrqSpinLock;
use crate::{Error, Result};

/// One latency measurement, produced per handled interrupt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    /// Hardware line the interrupt arrived on
    pub line: u8,
    /// Interrupt latency in nanoseconds
    pub latency: u64,
    /// Monotonic time the interrupt was handled, in nanoseconds
    pub timestamp: u64,
}

/// Ring state guarded by the lock
struct Ring {
    /// `N + 1` slots; one always stays free so that full and empty differ
    slots: Box<[Sample]>,
    read_pos: usize,
    write_pos: usize,
    overruns: u64,
}

impl Ring {
    fn advance(&self, pos: usize) -> usize {
        (pos + 1) % self.slots.len()
    }

    fn len(&self) -> usize {
        (self.write_pos + self.slots.len() - self.read_pos) % self.slots.len()
    }
}

/// Bounded lossy FIFO of [`Sample`]s holding up to `N` entries
///
/// Both `push` and `pop` take the same [`IrqSpinLock`] for an O(1)
/// critical section, so either may be called from interrupt context.
pub struct RingBuffer<const N: usize> {
    inner: IrqSpinLock<Ring>,
}

impl<const N: usize> RingBuffer<N> {
    /// Allocate an empty buffer
    ///
    /// Fails with [`Error::OutOfMemory`] if the storage cannot be
    /// allocated, or [`Error::InvalidArgument`] for `N == 0`.
    pub fn try_new() -> Result<Self> {
        if N == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(N + 1)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize(N + 1, Sample::default());

        Ok(Self {
            inner: IrqSpinLock::new(Ring {
                slots: slots.into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
                overruns: 0,
            }),
        })
    }

    /// Append a sample, dropping the oldest unread one if full
    pub fn push(&self, sample: Sample) {
        let mut ring = self.inner.lock_irqsave();
        let pos = ring.write_pos;
        ring.slots[pos] = sample;
        ring.write_pos = ring.advance(pos);
        if ring.write_pos == ring.read_pos {
            ring.read_pos = ring.advance(ring.read_pos);
            ring.overruns += 1;
        }
    }

    /// Remove the oldest unread sample
    pub fn pop(&self) -> Option<Sample> {
        let mut ring = self.inner.lock_irqsave();
        if ring.read_pos == ring.write_pos {
            return None;
        }
        let pos = ring.read_pos;
        let sample = ring.slots[pos];
        ring.read_pos = ring.advance(pos);
        Some(sample)
    }

    /// Number of unread samples
    pub fn len(&self) -> usize {
        self.inner.lock_irqsave().len()
    }

    /// Whether there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of unread samples held
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Samples dropped because the buffer was full
    pub fn overruns(&self) -> u64 {
        self.inner.lock_irqsave().overruns
    }

    /// Discard every unread sample
    pub fn clear(&self) {
        let mut ring = self.inner.lock_irqsave();
        ring.read_pos = ring.write_pos;
    }
}
