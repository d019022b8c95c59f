//! Interrupt handling interfaces
//!
//! The driver does not own an interrupt controller. It registers a handler
//! with whatever controller the platform provides and gets called back on
//! the requested line.

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::Result;

/// Interrupt number type
pub type IrqNumber = u32;

/// Outcome reported by a handler to the interrupt dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not raised by this device
    None,
    /// The interrupt was serviced
    Handled,
}

bitflags! {
    /// Interrupt request flags, same bit values as the kernel's IRQF_*
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        const TRIGGER_RISING = 0x0000_0001;
        const TRIGGER_FALLING = 0x0000_0002;
        const TRIGGER_HIGH = 0x0000_0004;
        const TRIGGER_LOW = 0x0000_0008;
        const SHARED = 0x0000_0080;
        const ONESHOT = 0x0000_2000;
    }
}

/// Opaque token identifying one interrupt registration
///
/// Returned by [`IrqController::request_irq`] and handed back to
/// [`IrqController::free_irq`].
#[derive(Debug, PartialEq, Eq)]
pub struct IrqCookie(usize);

impl IrqCookie {
    /// Wrap a controller-specific token
    pub const fn new(token: usize) -> Self {
        Self(token)
    }

    /// The controller-specific token
    pub fn token(&self) -> usize {
        self.0
    }
}

/// A handler invoked in interrupt context
///
/// `handle_irq` runs with the line masked and must not block, sleep or
/// allocate.
pub trait IrqHandler: Send + Sync {
    /// Service one interrupt on `irq`
    fn handle_irq(&self, irq: IrqNumber) -> IrqReturn;
}

/// Interrupt registration services
pub trait IrqController {
    /// Register `handler` on `irq`
    ///
    /// From the moment this returns `Ok`, the handler may be called on
    /// any CPU.
    fn request_irq(
        &self,
        irq: IrqNumber,
        flags: IrqFlags,
        name: &'static str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie>;

    /// Remove the registration made by `request_irq`
    ///
    /// When this returns the handler is not running and will not be called
    /// again.
    fn free_irq(&self, irq: IrqNumber, cookie: IrqCookie);
}
