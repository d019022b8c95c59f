//! Device drivers module
//!
//! Interfaces between the driver and the platform it runs on: register
//! window mapping, device node publishing and the character-device file
//! operations, plus the IRQ Generator driver itself.

use alloc::sync::Arc;

use crate::irq::IrqController;
use crate::utils::Clock;
use crate::Result;

pub mod irqgen;
pub mod mmio;

pub use mmio::MmioRegion;

/// 32-bit register access within a mapped window
///
/// Offsets are in bytes from the window base and 4-byte aligned.
pub trait RegisterIo: Send + Sync {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset` with a single store
    fn write32(&self, offset: usize, value: u32);
}

impl<T: RegisterIo + ?Sized> RegisterIo for Arc<T> {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

/// Register window mapping services (ioremap / iounmap)
pub trait MmioMapper {
    /// Handle to a mapped window
    ///
    /// Clones share the same mapping; the mapping itself is released once,
    /// by passing one handle back to [`MmioMapper::iounmap`].
    type Io: RegisterIo + Clone + 'static;

    /// Map `size` bytes of device memory at physical address `phys`
    fn ioremap(&self, phys: u64, size: usize) -> Result<Self::Io>;

    /// Release a mapping made by `ioremap`
    fn iounmap(&self, io: Self::Io);
}

/// A published consumer-facing device node
#[derive(Debug, PartialEq, Eq)]
pub struct DevNode {
    major: u32,
    minor: u32,
    name: &'static str,
}

impl DevNode {
    /// Describe a node with the given device numbers
    pub const fn new(major: u32, minor: u32, name: &'static str) -> Self {
        Self { major, minor, name }
    }

    /// Major device number
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Minor device number
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Node name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Device node publishing services (chrdev region, cdev, class, device)
pub trait DevicePublisher {
    /// Make the consumer-facing node for `name` visible
    fn publish(&self, name: &'static str) -> Result<DevNode>;

    /// Remove a node made visible by `publish`
    fn unpublish(&self, node: DevNode);
}

/// Character device file operations
pub trait FileOperations {
    /// Open a session on the device
    fn open(&self) -> Result<()>;

    /// Close the open session
    fn release(&self) -> Result<()>;

    /// Read into `buf`, advancing `pos` by the number of bytes written
    fn read(&self, buf: &mut [u8], pos: &mut u64) -> Result<usize>;
}

/// Everything the driver needs from the system it is loaded into
pub trait Platform: MmioMapper + IrqController + DevicePublisher {
    /// Monotonic clock usable from interrupt context
    type Clock: Clock + Clone + 'static;

    /// The platform's monotonic clock
    fn clock(&self) -> Self::Clock;
}
