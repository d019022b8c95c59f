//! Time utilities
//!
//! Monotonic time sources used to timestamp latency samples.

/// A monotonic nanosecond clock
///
/// Implementations must be callable from interrupt context: no blocking,
/// no allocation.
pub trait Clock: Send + Sync {
    /// Current monotonic time in nanoseconds
    fn now_ns(&self) -> u64;
}

/// Clock backed by the architecture's free-running counter
#[derive(Debug, Clone, Copy)]
pub struct CounterClock {
    /// Counter frequency in Hz
    frequency_hz: u64,
}

impl CounterClock {
    /// Create a clock for a counter running at `frequency_hz`
    ///
    /// Returns `None` for a zero frequency.
    pub const fn new(frequency_hz: u64) -> Option<Self> {
        if frequency_hz == 0 {
            None
        } else {
            Some(Self { frequency_hz })
        }
    }

    /// Counter frequency in Hz
    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    /// Convert a tick count to nanoseconds without intermediate overflow
    ///
    /// Saturates at `u64::MAX` rather than wrapping.
    pub fn ticks_to_ns(&self, ticks: u64) -> u64 {
        let ns = (ticks as u128 * 1_000_000_000) / self.frequency_hz as u128;
        u64::try_from(ns).unwrap_or(u64::MAX)
    }
}

impl Clock for CounterClock {
    fn now_ns(&self) -> u64 {
        self.ticks_to_ns(crate::arch::read_counter())
    }
}
