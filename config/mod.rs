//! Configuration management
//!
//! Hardware layout constants for the IRQ Generator IP core, the per-device
//! configuration handed to the lifecycle manager, and the module load
//! parameters.

/// Driver name, also used as the device node name
pub const DRIVER_NAME: &str = "irqgen";

/// Physical base address of the IRQ Generator register window
pub const IRQGEN_REG_PHYS_BASE: u64 = 0x43C0_0000;

/// Size of the IRQ Generator register window
pub const IRQGEN_REG_PHYS_SIZE: usize = 0x1000;

/// Linux IRQ number of the first hardware interrupt line of the core
pub const IRQGEN_FIRST_IRQ: u32 = 45;

/// Largest value of the generate register AMOUNT field
pub const IRQGEN_MAX_AMOUNT: u32 = 0xFFF;

/// Largest value of the generate register DELAY field
pub const IRQGEN_MAX_DELAY: u32 = 0x3FFF;

/// Capacity of the latency sample ring buffer
pub const MAX_LATENCIES: usize = 1024;

/// Minimum destination buffer size accepted by a read
pub const MIN_READ_SIZE: usize = 60;

/// Device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Physical base address of the register window
    pub phys_base: u64,
    /// Size of the register window
    pub phys_size: usize,
    /// Interrupt number to request
    pub irq: u32,
    /// Hardware line this device services, recorded in every sample
    pub line: u8,
    /// Device node name
    pub name: &'static str,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            phys_base: IRQGEN_REG_PHYS_BASE,
            phys_size: IRQGEN_REG_PHYS_SIZE,
            irq: IRQGEN_FIRST_IRQ,
            line: 0,
            name: DRIVER_NAME,
        }
    }
}

/// Module load parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleParams {
    /// Amount of IRQs to generate at load time
    pub generate_irqs: u32,
    /// Delay between the IRQs generated at load time
    pub loadtime_irq_delay: u32,
}

impl ModuleParams {
    /// Create a parameter set
    pub const fn new(generate_irqs: u32, loadtime_irq_delay: u32) -> Self {
        Self {
            generate_irqs,
            loadtime_irq_delay,
        }
    }

    /// Clamp every parameter to the value the hardware accepts
    pub fn sanitize(mut self) -> Self {
        if self.generate_irqs > IRQGEN_MAX_AMOUNT {
            log::warn!(
                "generate_irqs parameter exceeded maximum value: capped at {}",
                IRQGEN_MAX_AMOUNT
            );
            self.generate_irqs = IRQGEN_MAX_AMOUNT;
        }

        if self.loadtime_irq_delay > IRQGEN_MAX_DELAY {
            log::warn!(
                "loadtime_irq_delay parameter exceeded maximum value: capped at {}",
                IRQGEN_MAX_DELAY
            );
            self.loadtime_irq_delay = IRQGEN_MAX_DELAY;
        }

        self
    }
}
