//! Memory-mapped register window
//!
//! Volatile 32-bit access to a device register window that the platform has
//! already mapped into the address space.

use core::ptr::NonNull;

use volatile::VolatilePtr;

use crate::drivers::RegisterIo;

/// A mapped register window
#[derive(Debug, Clone, Copy)]
pub struct MmioRegion {
    /// Virtual base address
    base: NonNull<u8>,
    /// Size of the window in bytes
    size: usize,
}

// The window is device memory; every access is a single volatile load or
// store, so sharing the handle between contexts is sound.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Wrap a mapped window
    ///
    /// Returns `None` for a null or misaligned base.
    ///
    /// # Safety
    /// `base` must point to `size` bytes of mapped device memory that stays
    /// mapped for as long as any copy of the returned handle is used.
    pub unsafe fn new(base: *mut u8, size: usize) -> Option<Self> {
        let base = NonNull::new(base)?;
        if base.as_ptr() as usize % core::mem::align_of::<u32>() != 0 {
            return None;
        }
        Some(Self { base, size })
    }

    /// Virtual base address
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Size of the window in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    fn register(&self, offset: usize) -> VolatilePtr<'_, u32> {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register offset {:#x} outside {:#x}-byte window",
            offset,
            self.size
        );
        // SAFETY: offset is in bounds and aligned, the window is mapped per
        // the contract of `new`.
        unsafe {
            let reg = NonNull::new_unchecked(self.base.as_ptr().add(offset).cast::<u32>());
            VolatilePtr::new(reg)
        }
    }
}

impl RegisterIo for MmioRegion {
    fn read32(&self, offset: usize) -> u32 {
        self.register(offset).read()
    }

    fn write32(&self, offset: usize, value: u32) {
        self.register(offset).write(value);
    }
}
