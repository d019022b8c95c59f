//! irqgen - driver for the IRQ Generator FPGA IP core
//!
//! The IRQ Generator is a memory-mapped peripheral that raises a
//! configurable number of interrupts on one of its lines. This crate binds
//! to it, services the interrupt line, records one latency sample per
//! handled interrupt in a bounded ring buffer, and serves those samples as
//! text lines through a character-device style read interface.
//!
//! The kernel services the driver depends on (register window mapping,
//! interrupt registration, device node publishing, a monotonic clock) are
//! traits; see [`drivers::Platform`]. The `emulators::irqgen` module,
//! built for tests and under the `sim` feature, provides an in-memory
//! implementation of all of them.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Core modules
pub mod config;
pub mod utils;

// Architecture-specific code
pub mod arch;

// Synchronization and interrupt plumbing
pub mod sync;
pub mod irq;

// Device drivers
pub mod drivers;

// Device emulators
#[cfg(any(test, feature = "sim"))]
pub mod emulators;

// Re-export key types for convenience
pub use config::{DeviceConfig, ModuleParams};
pub use drivers::irqgen::{IrqGen, IrqGenCdev, RingBuffer, Sample};
pub use drivers::{FileOperations, Platform};

/// Driver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Allocation of driver state failed
    OutOfMemory,
    /// The register window could not be mapped
    MapFailed,
    /// The interrupt line could not be requested
    IrqUnavailable,
    /// The consumer-facing device node could not be published
    PublishFailed,
    /// The character device is already open
    Busy,
    /// Release or read without a matching open
    NotOpen,
    /// Destination buffer below the minimum read size
    BufferTooSmall,
    /// Invalid argument
    InvalidArgument,
}

impl Error {
    /// Negative errno reported to the kernel for this error
    pub const fn errno(self) -> i32 {
        match self {
            Error::OutOfMemory => -errno::ENOMEM,
            Error::MapFailed => -errno::EFAULT,
            Error::IrqUnavailable => -errno::EBUSY,
            Error::PublishFailed => -errno::ENODEV,
            Error::Busy => -errno::EBUSY,
            Error::NotOpen => -errno::ECANCELED,
            Error::BufferTooSmall => -errno::ENOBUFS,
            Error::InvalidArgument => -errno::EINVAL,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::OutOfMemory => "allocation of driver state failed",
            Error::MapFailed => "register window mapping failed",
            Error::IrqUnavailable => "interrupt request failed",
            Error::PublishFailed => "device node publishing failed",
            Error::Busy => "device already open",
            Error::NotOpen => "device not open",
            Error::BufferTooSmall => "read buffer too small",
            Error::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

/// Linux errno values used by [`Error::errno`]
pub mod errno {
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOMEM: i32 = 12;
    pub const ENOBUFS: i32 = 105;
    pub const ECANCELED: i32 = 125;
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::Busy.errno(), -16);
        assert_eq!(Error::NotOpen.errno(), -125);
        assert_eq!(Error::BufferTooSmall.errno(), -105);
        assert_eq!(Error::MapFailed.errno(), -14);
        assert_eq!(Error::OutOfMemory.errno(), -12);
    }
}
