//! Utility functions and data structures
//!
//! This module contains time sources and small helpers used throughout
//! the driver.

pub mod time;

// Re-export commonly used utilities
pub use self::time::{Clock, CounterClock};

/// Write memory barrier
///
/// Orders register writes issued before it ahead of those issued after.
#[inline]
pub fn wmb() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::Release);
}
