//! IRQ Generator emulator
//!
//! [`SimHardware`] models the IP core's register file: a generate request
//! queues interrupts that are delivered one at a time while the core is
//! enabled. [`SimPlatform`] provides the kernel side (mapping, interrupt
//! registration, device nodes, clock) on top of it, with optional fault
//! injection for each acquisition step.
//!
//! Hardware writes and platform calls are recorded in one ordered event
//! log.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::{IRQGEN_FIRST_IRQ, IRQGEN_REG_PHYS_BASE, IRQGEN_REG_PHYS_SIZE};
use crate::drivers::irqgen::regs::{ControlWord, GenerateWord, Register, CTRL, GENIRQ};
use crate::drivers::{DevNode, DevicePublisher, MmioMapper, Platform, RegisterIo};
use crate::irq::{IrqController, IrqCookie, IrqFlags, IrqHandler, IrqNumber, IrqReturn};
use crate::sync::IrqSpinLock;
use crate::utils::Clock;
use crate::{Error, Result};

/// Latency register value for a zero-delay interrupt
pub const SIM_BASE_LATENCY: u32 = 5;

/// Major number handed out for published nodes
pub const SIM_MAJOR: u32 = 240;

/// Something observable the emulated system did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// CTRL written with ENABLE set and HANDLED clear
    GeneratorEnabled,
    /// CTRL written with ENABLE clear while enabled
    GeneratorDisabled,
    /// GENIRQ written with a non-zero amount
    Generate { amount: u32, line: u8, delay: u32 },
    Mapped,
    Unmapped,
    IrqRequested(IrqNumber),
    IrqFreed(IrqNumber),
    Published,
    Unpublished,
}

/// Emulated IRQ Generator register file
pub struct SimHardware {
    ctrl: AtomicU32,
    genirq: AtomicU32,
    irq_count: AtomicU32,
    latency: AtomicU32,
    /// Interrupts requested but not yet raised
    pending: AtomicU32,
    events: IrqSpinLock<Vec<SimEvent>>,
}

impl SimHardware {
    /// Hardware in its reset state
    pub fn new() -> Self {
        Self {
            ctrl: AtomicU32::new(0),
            genirq: AtomicU32::new(0),
            irq_count: AtomicU32::new(0),
            latency: AtomicU32::new(0),
            pending: AtomicU32::new(0),
            events: IrqSpinLock::new(Vec::new()),
        }
    }

    /// Latency register value the core reports for interrupts `delay` apart
    pub fn latency_for_delay(&self, delay: u32) -> u32 {
        SIM_BASE_LATENCY + delay
    }

    /// Force the latency register
    pub fn set_latency_register(&self, value: u32) {
        self.latency.store(value, Ordering::Release);
    }

    /// Current value of a register as the driver would read it
    pub fn read_register(&self, reg: Register) -> u32 {
        match reg {
            Register::Ctrl => self.ctrl.load(Ordering::Acquire),
            Register::GenIrq => self.genirq.load(Ordering::Acquire),
            Register::IrqCount => self.irq_count.load(Ordering::Acquire),
            Register::Latency => self.latency.load(Ordering::Acquire),
        }
    }

    /// Whether CTRL.ENABLE is set
    pub fn is_enabled(&self) -> bool {
        ControlWord::new(self.read_register(Register::Ctrl)).is_set(CTRL::ENABLE)
    }

    /// Interrupts still to be raised
    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Raise the next queued interrupt, returning the line it fires on
    ///
    /// Nothing fires while the core is disabled.
    pub fn fire(&self) -> Option<u8> {
        if !self.is_enabled() {
            return None;
        }
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()?;

        let word = GenerateWord::new(self.read_register(Register::GenIrq));
        self.irq_count.fetch_add(1, Ordering::AcqRel);
        self.set_latency_register(self.latency_for_delay(word.read(GENIRQ::DELAY)));
        Some(word.read(GENIRQ::LINE) as u8)
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock_irqsave().clone()
    }

    fn record(&self, event: SimEvent) {
        self.events.lock_irqsave().push(event);
    }

    fn write_ctrl(&self, value: u32) {
        let old = ControlWord::new(self.ctrl.swap(value, Ordering::AcqRel));
        let new = ControlWord::new(value);
        if new.is_set(CTRL::ENABLE) && !new.is_set(CTRL::HANDLED) {
            self.record(SimEvent::GeneratorEnabled);
        } else if !new.is_set(CTRL::ENABLE) && old.is_set(CTRL::ENABLE) {
            self.record(SimEvent::GeneratorDisabled);
        }
    }

    fn write_genirq(&self, value: u32) {
        self.genirq.store(value, Ordering::Release);
        let word = GenerateWord::new(value);
        let amount = word.read(GENIRQ::AMOUNT);
        if amount == 0 {
            self.pending.store(0, Ordering::Release);
            return;
        }
        self.pending.fetch_add(amount, Ordering::AcqRel);
        self.record(SimEvent::Generate {
            amount,
            line: word.read(GENIRQ::LINE) as u8,
            delay: word.read(GENIRQ::DELAY),
        });
    }
}

impl Default for SimHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterIo for SimHardware {
    fn read32(&self, offset: usize) -> u32 {
        Register::from_offset(offset)
            .map(|reg| self.read_register(reg))
            .unwrap_or(0)
    }

    fn write32(&self, offset: usize, value: u32) {
        match Register::from_offset(offset) {
            Some(Register::Ctrl) => self.write_ctrl(value),
            Some(Register::GenIrq) => self.write_genirq(value),
            // read-only
            Some(Register::IrqCount) | Some(Register::Latency) => {}
            None => log::warn!("sim: write to unknown register offset {:#x}", offset),
        }
    }
}

/// Clock advancing by a fixed step on every reading
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<AtomicU64>,
    step: u64,
}

impl SimClock {
    /// First reading is `start`, each later one `step` ns after the last
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
            step,
        }
    }
}

impl Clock for SimClock {
    fn now_ns(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

struct Registration {
    irq: IrqNumber,
    token: usize,
    handler: Arc<dyn IrqHandler>,
}

#[derive(Default)]
struct PlatformState {
    mapped: bool,
    registration: Option<Registration>,
    next_token: usize,
    published: bool,
}

/// Emulated kernel services around one [`SimHardware`]
pub struct SimPlatform {
    hardware: Arc<SimHardware>,
    clock: SimClock,
    fail_ioremap: bool,
    fail_request_irq: bool,
    fail_publish: bool,
    state: IrqSpinLock<PlatformState>,
}

impl SimPlatform {
    /// A platform where every service succeeds
    pub fn new() -> Self {
        Self {
            hardware: Arc::new(SimHardware::new()),
            clock: SimClock::new(1_000_000, 1_000),
            fail_ioremap: false,
            fail_request_irq: false,
            fail_publish: false,
            state: IrqSpinLock::new(PlatformState::default()),
        }
    }

    /// Make `ioremap` fail
    pub fn fail_ioremap(mut self) -> Self {
        self.fail_ioremap = true;
        self
    }

    /// Make `request_irq` fail
    pub fn fail_request_irq(mut self) -> Self {
        self.fail_request_irq = true;
        self
    }

    /// Make `publish` fail
    pub fn fail_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    /// The emulated core
    pub fn hardware(&self) -> &Arc<SimHardware> {
        &self.hardware
    }

    /// Whether the register window is mapped
    pub fn is_mapped(&self) -> bool {
        self.state.lock_irqsave().mapped
    }

    /// Whether a handler is registered on `irq`
    pub fn irq_registered(&self, irq: IrqNumber) -> bool {
        self.state
            .lock_irqsave()
            .registration
            .as_ref()
            .is_some_and(|r| r.irq == irq)
    }

    /// Whether a device node is published
    pub fn is_published(&self) -> bool {
        self.state.lock_irqsave().published
    }

    /// Recorded hardware and platform events, oldest first
    pub fn events(&self) -> Vec<SimEvent> {
        self.hardware.events()
    }

    /// Deliver one interrupt on `irq`
    ///
    /// Returns `None` if no handler is registered on it.
    pub fn raise(&self, irq: IrqNumber) -> Option<IrqReturn> {
        let handler = {
            let state = self.state.lock_irqsave();
            let registration = state.registration.as_ref().filter(|r| r.irq == irq)?;
            Arc::clone(&registration.handler)
        };
        Some(handler.handle_irq(irq))
    }

    /// Raise every queued interrupt, returning how many were handled
    pub fn raise_pending(&self) -> u32 {
        let mut handled = 0;
        while let Some(line) = self.hardware.fire() {
            if self.raise(IRQGEN_FIRST_IRQ + line as u32) == Some(IrqReturn::Handled) {
                handled += 1;
            }
        }
        handled
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioMapper for SimPlatform {
    type Io = Arc<SimHardware>;

    fn ioremap(&self, phys: u64, size: usize) -> Result<Self::Io> {
        if self.fail_ioremap {
            return Err(Error::MapFailed);
        }
        if phys != IRQGEN_REG_PHYS_BASE || size > IRQGEN_REG_PHYS_SIZE {
            return Err(Error::InvalidArgument);
        }

        let mut state = self.state.lock_irqsave();
        if state.mapped {
            return Err(Error::Busy);
        }
        state.mapped = true;
        self.hardware.record(SimEvent::Mapped);
        Ok(Arc::clone(&self.hardware))
    }

    fn iounmap(&self, _io: Self::Io) {
        let mut state = self.state.lock_irqsave();
        if state.mapped {
            state.mapped = false;
            self.hardware.record(SimEvent::Unmapped);
        }
    }
}

impl IrqController for SimPlatform {
    fn request_irq(
        &self,
        irq: IrqNumber,
        _flags: IrqFlags,
        _name: &'static str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie> {
        if self.fail_request_irq {
            return Err(Error::Busy);
        }
        if irq != IRQGEN_FIRST_IRQ {
            return Err(Error::InvalidArgument);
        }

        let mut state = self.state.lock_irqsave();
        if state.registration.is_some() {
            return Err(Error::Busy);
        }
        state.next_token += 1;
        let token = state.next_token;
        state.registration = Some(Registration {
            irq,
            token,
            handler,
        });
        self.hardware.record(SimEvent::IrqRequested(irq));
        Ok(IrqCookie::new(token))
    }

    fn free_irq(&self, irq: IrqNumber, cookie: IrqCookie) {
        let mut state = self.state.lock_irqsave();
        match state.registration.as_ref() {
            Some(r) if r.irq == irq && r.token == cookie.token() => {
                state.registration = None;
                self.hardware.record(SimEvent::IrqFreed(irq));
            }
            _ => log::warn!("sim: free_irq({}) with unknown cookie", irq),
        }
    }
}

impl DevicePublisher for SimPlatform {
    fn publish(&self, name: &'static str) -> Result<DevNode> {
        if self.fail_publish {
            return Err(Error::PublishFailed);
        }

        let mut state = self.state.lock_irqsave();
        if state.published {
            return Err(Error::Busy);
        }
        state.published = true;
        self.hardware.record(SimEvent::Published);
        Ok(DevNode::new(SIM_MAJOR, 0, name))
    }

    fn unpublish(&self, _node: DevNode) {
        let mut state = self.state.lock_irqsave();
        if state.published {
            state.published = false;
            self.hardware.record(SimEvent::Unpublished);
        }
    }
}

impl Platform for SimPlatform {
    type Clock = SimClock;

    fn clock(&self) -> SimClock {
        self.clock.clone()
    }
}
