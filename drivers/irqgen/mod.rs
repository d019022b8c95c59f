//! IRQ Generator driver
//!
//! [`IrqGen`] is the loaded driver. `load` acquires, in order:
//!
//! 1. the sample ring and character device state
//! 2. the register window mapping
//! 3. the interrupt line, with [`IrqGenCore`] as handler
//! 4. the published device node
//! 5. the enabled generator, optionally asked for load-time interrupts
//!
//! Each acquired resource is held by a guard, so a failure at any step
//! releases exactly the earlier steps, newest first. Unloading releases
//! all of them in the mirror order.

use alloc::sync::Arc;

use crate::config::{DeviceConfig, ModuleParams, IRQGEN_MAX_AMOUNT, IRQGEN_MAX_DELAY};
use crate::drivers::irqgen::regs::REGISTER_FILE_SIZE;
use crate::drivers::{DevNode, Platform};
use crate::irq::{IrqCookie, IrqFlags, IrqHandler, IrqNumber};
use crate::{Error, Result};

pub mod cdev;
pub mod handler;
pub mod regs;
pub mod ring;

pub use cdev::IrqGenCdev;
pub use handler::{DeviceStats, IrqGenCore, SampleRing};
pub use regs::IrqGenRegisters;
pub use ring::{RingBuffer, Sample};

/// Human readable driver name
pub const DRIVER_LNAME: &str = "IRQ Generator";

/// Mapped register window, unmapped on drop
struct RegisterMapping<'p, P: Platform> {
    platform: &'p P,
    io: Option<P::Io>,
}

impl<'p, P: Platform> RegisterMapping<'p, P> {
    fn map(platform: &'p P, phys: u64, size: usize) -> Result<Self> {
        let io = platform.ioremap(phys, size).map_err(|err| {
            log::error!("ioremap() of {:#x} failed: {}", phys, err);
            Error::MapFailed
        })?;
        log::debug!("mapped {:#x} bytes at {:#x}", size, phys);
        Ok(Self {
            platform,
            io: Some(io),
        })
    }

    fn io(&self) -> Option<&P::Io> {
        self.io.as_ref()
    }
}

impl<P: Platform> Drop for RegisterMapping<'_, P> {
    fn drop(&mut self) {
        if let Some(io) = self.io.take() {
            self.platform.iounmap(io);
            log::debug!("register window unmapped");
        }
    }
}

/// Interrupt registration, freed on drop
struct IrqRegistration<'p, P: Platform> {
    platform: &'p P,
    irq: IrqNumber,
    cookie: Option<IrqCookie>,
}

impl<'p, P: Platform> IrqRegistration<'p, P> {
    fn request(
        platform: &'p P,
        irq: IrqNumber,
        name: &'static str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<Self> {
        log::debug!("request_irq({}, {:?}, {})", irq, IrqFlags::empty(), name);
        let cookie = platform
            .request_irq(irq, IrqFlags::empty(), name, handler)
            .map_err(|err| {
                log::error!(
                    "request_irq() failed with {} while requesting IRQ id {}",
                    err,
                    irq
                );
                Error::IrqUnavailable
            })?;
        Ok(Self {
            platform,
            irq,
            cookie: Some(cookie),
        })
    }
}

impl<P: Platform> Drop for IrqRegistration<'_, P> {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.take() {
            self.platform.free_irq(self.irq, cookie);
            log::debug!("IRQ {} freed", self.irq);
        }
    }
}

/// Published device node, unpublished on drop
struct PublishedNode<'p, P: Platform> {
    platform: &'p P,
    node: Option<DevNode>,
}

impl<'p, P: Platform> PublishedNode<'p, P> {
    fn publish(platform: &'p P, name: &'static str) -> Result<Self> {
        let node = platform.publish(name).map_err(|err| {
            log::error!("publishing device node '{}' failed: {}", name, err);
            Error::PublishFailed
        })?;
        log::debug!("published /dev/{} ({}:{})", node.name(), node.major(), node.minor());
        Ok(Self {
            platform,
            node: Some(node),
        })
    }
}

impl<P: Platform> Drop for PublishedNode<'_, P> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.platform.unpublish(node);
            log::debug!("device node unpublished");
        }
    }
}

/// A loaded IRQ Generator driver
pub struct IrqGen<'p, P: Platform> {
    config: DeviceConfig,
    params: ModuleParams,
    core: Arc<IrqGenCore<P::Io, P::Clock>>,
    cdev: IrqGenCdev,
    node: Option<PublishedNode<'p, P>>,
    irq: Option<IrqRegistration<'p, P>>,
    mapping: Option<RegisterMapping<'p, P>>,
}

impl<'p, P: Platform> IrqGen<'p, P> {
    /// Bring the device up
    ///
    /// `params` are clamped to the hardware maxima first. On error every
    /// resource acquired so far has been released again.
    pub fn load(platform: &'p P, config: DeviceConfig, params: ModuleParams) -> Result<Self> {
        log::info!("{} initializing", DRIVER_LNAME);

        Self::acquire(platform, config, params.sanitize()).map_err(|err| {
            log::error!("module initialization failed: {}", err);
            err
        })
    }

    fn acquire(platform: &'p P, config: DeviceConfig, params: ModuleParams) -> Result<Self> {
        if config.phys_size < REGISTER_FILE_SIZE {
            log::error!(
                "register window of {:#x} bytes is smaller than the {:#x}-byte register file",
                config.phys_size,
                REGISTER_FILE_SIZE
            );
            return Err(Error::InvalidArgument);
        }

        let samples = Arc::new(SampleRing::try_new().map_err(|err| {
            log::error!("allocation of driver state failed");
            err
        })?);
        let cdev = IrqGenCdev::new(Arc::clone(&samples));

        let mapping = RegisterMapping::map(platform, config.phys_base, config.phys_size)?;
        let io = mapping.io().cloned().ok_or(Error::MapFailed)?;

        let core = Arc::new(IrqGenCore::new(
            IrqGenRegisters::new(io),
            platform.clock(),
            config.line,
            samples,
        ));

        let handler: Arc<dyn IrqHandler> = core.clone();
        let irq = IrqRegistration::request(platform, config.irq, config.name, handler)?;

        let node = PublishedNode::publish(platform, config.name)?;

        core.regs().enable();

        let driver = Self {
            config,
            params,
            core,
            cdev,
            node: Some(node),
            irq: Some(irq),
            mapping: Some(mapping),
        };

        if params.generate_irqs > 0 {
            driver.generate(params.generate_irqs, driver.config.line, params.loadtime_irq_delay);
        }

        log::info!("{} loaded on IRQ {}", DRIVER_LNAME, driver.config.irq);
        Ok(driver)
    }

    /// Ask the generator for `amount` interrupts on `line`, `delay` apart
    ///
    /// Amount and delay are capped at the hardware maxima.
    pub fn generate(&self, amount: u32, line: u8, delay: u32) {
        let amount = amount.min(IRQGEN_MAX_AMOUNT);
        let delay = delay.min(IRQGEN_MAX_DELAY);
        log::info!(
            "Generating {} interrupts with IRQ delay {} on line {}",
            amount,
            delay,
            line
        );
        self.core.regs().write_generate(amount, line, delay);
    }

    /// The character device serving the samples
    pub fn cdev(&self) -> &IrqGenCdev {
        &self.cdev
    }

    /// Device configuration in use
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Module parameters after clamping
    pub fn params(&self) -> ModuleParams {
        self.params
    }

    /// Interrupts handled since load
    pub fn count_handled(&self) -> u32 {
        self.core.count_handled()
    }

    /// Snapshot of the device counters
    pub fn stats(&self) -> DeviceStats {
        self.core.stats()
    }

    /// Take the device down
    pub fn unload(self) {
        drop(self);
    }

    fn release(&mut self) {
        // Interrupts raised until the generator stops are still acked
        self.core.regs().disable(self.params.loadtime_irq_delay);
        self.core.deactivate();

        drop(self.node.take());
        drop(self.irq.take());

        // The handler can no longer run, so the counter is final
        let regs = self.core.regs();
        log::info!(
            "IRQ count: generated since reboot {}, handled since load {}",
            regs.read_irq_count(),
            self.core.count_handled()
        );
        log::info!("latency for last handled IRQ: {}ns", regs.read_latency());

        drop(self.mapping.take());
    }
}

impl<P: Platform> Drop for IrqGen<'_, P> {
    fn drop(&mut self) {
        self.release();
        log::info!("{} exiting", DRIVER_LNAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use test_case::test_case;

    use crate::config::IRQGEN_FIRST_IRQ;
    use crate::drivers::irqgen::regs::{GenerateWord, Register, GENIRQ};
    use crate::drivers::{DevicePublisher, FileOperations, MmioMapper, RegisterIo};
    use crate::emulators::irqgen::{SimClock, SimEvent, SimHardware, SimPlatform};
    use crate::irq::{IrqController, IrqReturn};

    type Outcome = Arc<Mutex<Option<Option<IrqReturn>>>>;

    /// Register window that delivers one more interrupt as the generator
    /// is being stopped
    #[derive(Clone)]
    struct InterruptOnStop {
        hw: Arc<SimHardware>,
        platform: Arc<SimPlatform>,
        outcome: Outcome,
    }

    impl RegisterIo for InterruptOnStop {
        fn read32(&self, offset: usize) -> u32 {
            self.hw.read32(offset)
        }

        fn write32(&self, offset: usize, value: u32) {
            let stopping = offset == Register::GenIrq.offset()
                && GenerateWord::new(value).read(GENIRQ::AMOUNT) == 0;
            if stopping {
                *self.outcome.lock().unwrap() = Some(self.platform.raise(IRQGEN_FIRST_IRQ));
            }
            self.hw.write32(offset, value);
        }
    }

    struct LateInterruptPlatform {
        sim: Arc<SimPlatform>,
        outcome: Outcome,
    }

    impl MmioMapper for LateInterruptPlatform {
        type Io = InterruptOnStop;

        fn ioremap(&self, phys: u64, size: usize) -> Result<Self::Io> {
            Ok(InterruptOnStop {
                hw: self.sim.ioremap(phys, size)?,
                platform: Arc::clone(&self.sim),
                outcome: Arc::clone(&self.outcome),
            })
        }

        fn iounmap(&self, io: Self::Io) {
            self.sim.iounmap(io.hw);
        }
    }

    impl IrqController for LateInterruptPlatform {
        fn request_irq(
            &self,
            irq: IrqNumber,
            flags: IrqFlags,
            name: &'static str,
            handler: Arc<dyn IrqHandler>,
        ) -> Result<IrqCookie> {
            self.sim.request_irq(irq, flags, name, handler)
        }

        fn free_irq(&self, irq: IrqNumber, cookie: IrqCookie) {
            self.sim.free_irq(irq, cookie);
        }
    }

    impl DevicePublisher for LateInterruptPlatform {
        fn publish(&self, name: &'static str) -> Result<DevNode> {
            self.sim.publish(name)
        }

        fn unpublish(&self, node: DevNode) {
            self.sim.unpublish(node);
        }
    }

    impl Platform for LateInterruptPlatform {
        type Clock = SimClock;

        fn clock(&self) -> SimClock {
            self.sim.clock()
        }
    }

    fn read_line<P: Platform>(driver: &IrqGen<'_, P>) -> Option<String> {
        let mut buf = [0u8; 64];
        let mut pos = 0;
        let n = driver.cdev().read(&mut buf, &mut pos).unwrap();
        (n > 0).then(|| String::from_utf8(buf[..n].to_vec()).unwrap())
    }

    #[test]
    fn test_load_time_interrupts_end_to_end() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::new(5, 2)).unwrap();

        assert_eq!(platform.raise_pending(), 5);
        assert_eq!(driver.count_handled(), 5);

        driver.cdev().open().unwrap();
        let lines: Vec<String> = core::iter::from_fn(|| read_line(&driver)).collect();
        assert_eq!(lines.len(), 5);

        let mut last_timestamp = 0;
        for line in &lines {
            assert!(line.ends_with('\n'));
            let fields: Vec<u64> = line
                .trim_end()
                .split(',')
                .map(|f| f.parse().unwrap())
                .collect();
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[0], 0);
            assert_eq!(fields[1], platform.hardware().latency_for_delay(2) as u64 * 10);
            assert!(fields[2] > last_timestamp);
            last_timestamp = fields[2];
        }

        // sixth read: nothing left
        assert_eq!(read_line(&driver), None);
        driver.cdev().release().unwrap();
        driver.unload();
    }

    #[test]
    fn test_no_load_time_interrupts_by_default() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default()).unwrap();
        assert_eq!(platform.raise_pending(), 0);
        assert_eq!(driver.stats().pending_samples, 0);
    }

    #[test]
    fn test_load_acquires_in_order_and_unload_mirrors() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::new(1, 0)).unwrap();
        assert!(platform.is_mapped());
        assert!(platform.irq_registered(45));
        assert!(platform.is_published());

        driver.unload();

        assert_eq!(
            platform.events(),
            vec![
                SimEvent::Mapped,
                SimEvent::IrqRequested(45),
                SimEvent::Published,
                SimEvent::GeneratorEnabled,
                SimEvent::Generate { amount: 1, line: 0, delay: 0 },
                SimEvent::GeneratorDisabled,
                SimEvent::Unpublished,
                SimEvent::IrqFreed(45),
                SimEvent::Unmapped,
            ]
        );
        assert!(!platform.is_mapped());
        assert!(!platform.irq_registered(45));
        assert!(!platform.is_published());
    }

    #[test]
    fn test_irq_request_failure_rolls_back_mapping() {
        let platform = SimPlatform::new().fail_request_irq();
        let err = IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::new(5, 2)).err();

        assert_eq!(err, Some(Error::IrqUnavailable));
        assert_eq!(err.map(Error::errno), Some(-crate::errno::EBUSY));
        assert!(!platform.is_mapped());
        assert!(!platform.irq_registered(45));
        assert!(!platform.is_published());
        assert_eq!(platform.events(), vec![SimEvent::Mapped, SimEvent::Unmapped]);
    }

    #[test]
    fn test_publish_failure_rolls_back_irq_then_mapping() {
        let platform = SimPlatform::new().fail_publish();
        let result = IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default());

        assert_eq!(result.err(), Some(Error::PublishFailed));
        assert_eq!(
            platform.events(),
            vec![
                SimEvent::Mapped,
                SimEvent::IrqRequested(45),
                SimEvent::IrqFreed(45),
                SimEvent::Unmapped,
            ]
        );
    }

    #[test]
    fn test_map_failure_acquires_nothing() {
        let platform = SimPlatform::new().fail_ioremap();
        let result = IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default());

        assert_eq!(result.err(), Some(Error::MapFailed));
        assert!(platform.events().is_empty());
    }

    #[test_case(0 ; "empty window")]
    #[test_case(8 ; "latency register outside")]
    #[test_case(0xC ; "one register short")]
    fn test_window_smaller_than_register_file_rejected(phys_size: usize) {
        let platform = SimPlatform::new();
        let config = DeviceConfig {
            phys_size,
            ..DeviceConfig::default()
        };
        assert_eq!(
            IrqGen::load(&platform, config, ModuleParams::new(5, 2)).err(),
            Some(Error::InvalidArgument)
        );
        assert!(!platform.is_mapped());
        assert!(platform.events().is_empty());
    }

    #[test]
    fn test_window_of_exactly_the_register_file_loads() {
        let platform = SimPlatform::new();
        let config = DeviceConfig {
            phys_size: REGISTER_FILE_SIZE,
            ..DeviceConfig::default()
        };
        let driver = IrqGen::load(&platform, config, ModuleParams::new(1, 0)).unwrap();
        assert_eq!(platform.raise_pending(), 1);
        assert_eq!(driver.count_handled(), 1);
    }

    #[test]
    fn test_interrupt_while_stopping_is_still_handled() {
        let sim = Arc::new(SimPlatform::new());
        let outcome: Outcome = Arc::default();
        let platform = LateInterruptPlatform {
            sim: Arc::clone(&sim),
            outcome: Arc::clone(&outcome),
        };

        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default()).unwrap();
        driver.unload();

        assert_eq!(*outcome.lock().unwrap(), Some(Some(IrqReturn::Handled)));
        assert_eq!(sim.events().last(), Some(&SimEvent::Unmapped));
        assert!(!sim.irq_registered(IRQGEN_FIRST_IRQ));
        assert!(!sim.hardware().is_enabled());
    }

    #[test]
    fn test_wrong_irq_number_is_unavailable() {
        let platform = SimPlatform::new();
        let config = DeviceConfig {
            irq: 7,
            ..DeviceConfig::default()
        };
        assert_eq!(
            IrqGen::load(&platform, config, ModuleParams::default()).err(),
            Some(Error::IrqUnavailable)
        );
        assert!(!platform.is_mapped());
    }

    #[test]
    fn test_parameters_are_clamped_at_load() {
        let platform = SimPlatform::new();
        let driver = IrqGen::load(
            &platform,
            DeviceConfig::default(),
            ModuleParams::new(100_000, 100_000),
        )
        .unwrap();
        assert_eq!(driver.params(), ModuleParams::new(IRQGEN_MAX_AMOUNT, IRQGEN_MAX_DELAY));
        assert!(platform.events().contains(&SimEvent::Generate {
            amount: IRQGEN_MAX_AMOUNT,
            line: 0,
            delay: IRQGEN_MAX_DELAY,
        }));
    }

    #[test]
    fn test_interrupt_after_unload_is_not_handled() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default()).unwrap();
        driver.unload();
        assert_eq!(platform.raise(45), None);
    }

    #[test]
    fn test_stats_reflect_hardware() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default()).unwrap();
        driver.generate(3, 0, 4);
        assert_eq!(platform.raise_pending(), 3);

        let stats = driver.stats();
        assert_eq!(stats.count_handled, 3);
        assert_eq!(stats.irq_count, 3);
        assert_eq!(stats.pending_samples, 3);
        assert_eq!(stats.latency_ns, platform.hardware().latency_for_delay(4) as u64 * 10);
        assert_eq!(stats.overruns, 0);
    }

    #[test]
    fn test_busy_device_between_sessions() {
        let platform = SimPlatform::new();
        let driver =
            IrqGen::load(&platform, DeviceConfig::default(), ModuleParams::default()).unwrap();
        driver.cdev().open().unwrap();
        assert_eq!(driver.cdev().open(), Err(Error::Busy));
        driver.cdev().release().unwrap();
        driver.cdev().open().unwrap();
    }
}
