//! IRQ Generator interrupt handler
//!
//! The state shared between interrupt context and the rest of the driver:
//! the register window, the sample ring and the handled counter.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::MAX_LATENCIES;
use crate::drivers::irqgen::regs::IrqGenRegisters;
use crate::drivers::irqgen::ring::{RingBuffer, Sample};
use crate::drivers::RegisterIo;
use crate::irq::{IrqHandler, IrqNumber, IrqReturn};
use crate::utils::Clock;

/// Ring buffer type used by the device
pub type SampleRing = RingBuffer<MAX_LATENCIES>;

/// Point-in-time view of the device counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Interrupts handled since load
    pub count_handled: u32,
    /// Interrupts generated by the core since reset (IRQ_COUNT register)
    pub irq_count: u32,
    /// Latency of the last handled interrupt in nanoseconds (scaled stub)
    pub latency_ns: u64,
    /// Samples waiting to be read
    pub pending_samples: usize,
    /// Samples dropped because the ring was full
    pub overruns: u64,
}

/// Interrupt handler for one IRQ Generator
pub struct IrqGenCore<R: RegisterIo, C: Clock> {
    regs: IrqGenRegisters<R>,
    clock: C,
    /// Line recorded in every sample
    line: u8,
    samples: Arc<SampleRing>,
    /// Written only by the handler
    count_handled: AtomicU32,
    /// Cleared when teardown begins; later interrupts are not ours
    active: AtomicBool,
}

impl<R: RegisterIo, C: Clock> IrqGenCore<R, C> {
    /// Create an active handler
    pub fn new(regs: IrqGenRegisters<R>, clock: C, line: u8, samples: Arc<SampleRing>) -> Self {
        Self {
            regs,
            clock,
            line,
            samples,
            count_handled: AtomicU32::new(0),
            active: AtomicBool::new(true),
        }
    }

    /// The device registers
    pub fn regs(&self) -> &IrqGenRegisters<R> {
        &self.regs
    }

    /// The sample ring
    pub fn samples(&self) -> &Arc<SampleRing> {
        &self.samples
    }

    /// Interrupts handled since load
    pub fn count_handled(&self) -> u32 {
        self.count_handled.load(Ordering::Relaxed)
    }

    /// Whether interrupts are still being serviced
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop servicing interrupts
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Snapshot of the device counters
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            count_handled: self.count_handled(),
            irq_count: self.regs.read_irq_count(),
            latency_ns: self.regs.read_latency(),
            pending_samples: self.samples.len(),
            overruns: self.samples.overruns(),
        }
    }
}

impl<R: RegisterIo, C: Clock> IrqHandler for IrqGenCore<R, C> {
    fn handle_irq(&self, irq: IrqNumber) -> IrqReturn {
        if !self.is_active() {
            return IrqReturn::None;
        }

        if cfg!(feature = "debug") {
            log::debug!("IRQ #{} received", irq);
        }

        self.count_handled.fetch_add(1, Ordering::Relaxed);

        self.samples.push(Sample {
            line: self.line,
            latency: self.regs.read_latency(),
            timestamp: self.clock.now_ns(),
        });

        // ENABLE=1, HANDLED=1, ACK=0: serviced, re-armed
        self.regs.ack_handled();

        IrqReturn::Handled
    }
}
