//! Synchronization primitives
//!
//! This module provides synchronization primitives suitable for sharing
//! state between an interrupt handler and process context.

pub mod spinlock;

// Re-export for convenience
pub use spinlock::{IrqSpinLock, IrqSpinLockGuard};
