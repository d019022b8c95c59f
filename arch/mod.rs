//! Architecture support
//!
//! Local interrupt masking for the interrupt-safe lock and the free-running
//! counter behind [`crate::utils::CounterClock`].
//!
//! Masking is only real on bare metal targets (`target_os = "none"`). On a
//! hosted target the "interrupt" is another thread, so there is nothing to
//! mask and the spin flag alone provides exclusion.

/// Saved local interrupt state, restored by [`local_irq_restore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqState(usize);

impl IrqState {
    /// Whether interrupts were enabled when the state was saved
    pub fn were_enabled(&self) -> bool {
        self.0 != 0
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        use aarch64_cpu::registers::*;

        /// Mask IRQs on the local CPU, returning the previous state
        #[inline]
        pub fn local_irq_save() -> IrqState {
            let enabled = !DAIF.is_set(DAIF::I);
            DAIF.modify(DAIF::I::Masked);
            IrqState(enabled as usize)
        }

        /// Restore the local IRQ mask saved by [`local_irq_save`]
        #[inline]
        pub fn local_irq_restore(state: IrqState) {
            if state.were_enabled() {
                DAIF.modify(DAIF::I::Unmasked);
            }
        }
    } else if #[cfg(all(target_arch = "riscv64", target_os = "none"))] {
        use riscv::register::sstatus;

        /// Mask supervisor interrupts on the local hart, returning the previous state
        #[inline]
        pub fn local_irq_save() -> IrqState {
            let enabled = sstatus::read().sie();
            unsafe { sstatus::clear_sie() };
            IrqState(enabled as usize)
        }

        /// Restore the local interrupt enable saved by [`local_irq_save`]
        #[inline]
        pub fn local_irq_restore(state: IrqState) {
            if state.were_enabled() {
                unsafe { sstatus::set_sie() };
            }
        }
    } else if #[cfg(all(target_arch = "x86_64", target_os = "none"))] {
        use x86_64::instructions::interrupts;

        /// Clear IF on the local CPU, returning the previous state
        #[inline]
        pub fn local_irq_save() -> IrqState {
            let enabled = interrupts::are_enabled();
            interrupts::disable();
            IrqState(enabled as usize)
        }

        /// Restore IF saved by [`local_irq_save`]
        #[inline]
        pub fn local_irq_restore(state: IrqState) {
            if state.were_enabled() {
                interrupts::enable();
            }
        }
    } else {
        /// Hosted target: nothing to mask
        #[inline]
        pub fn local_irq_save() -> IrqState {
            IrqState(0)
        }

        /// Hosted target: nothing to restore
        #[inline]
        pub fn local_irq_restore(_state: IrqState) {}
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        /// Read the virtual counter
        #[inline]
        pub fn read_counter() -> u64 {
            let cnt: u64;
            unsafe {
                core::arch::asm!(
                    "mrs {}, cntvct_el0",
                    out(reg) cnt,
                    options(nomem, nostack, preserves_flags)
                );
            }
            cnt
        }
    } else if #[cfg(target_arch = "riscv64")] {
        /// Read the time CSR
        #[inline]
        pub fn read_counter() -> u64 {
            let cnt: u64;
            unsafe {
                core::arch::asm!("rdtime {}", out(reg) cnt, options(nomem, nostack));
            }
            cnt
        }
    } else if #[cfg(target_arch = "x86_64")] {
        /// Read the time stamp counter
        #[inline]
        pub fn read_counter() -> u64 {
            unsafe { core::arch::x86_64::_rdtsc() }
        }
    } else {
        use core::sync::atomic::{AtomicU64, Ordering};

        static TICKS: AtomicU64 = AtomicU64::new(0);

        /// No counter available: a strictly increasing tick
        #[inline]
        pub fn read_counter() -> u64 {
            TICKS.fetch_add(1, Ordering::Relaxed)
        }
    }
}
