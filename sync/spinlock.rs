//! Interrupt-safe spinlock
//!
//! A spinlock whose critical section runs with local interrupts masked.
//! Both sides of an interrupt/process-context pair take the same lock: the
//! interrupt handler cannot be preempted by itself, and the process-context
//! side cannot be interrupted by the handler while it holds the lock, so
//! neither side can spin forever on a holder running below it.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::{self, IrqState};

/// Spinlock callable from interrupt and process context
pub struct IrqSpinLock<T> {
    /// Atomic flag indicating if the lock is held
    locked: AtomicBool,
    /// The data protected by the lock
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Create a new spinlock
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Try to acquire the lock without spinning
    ///
    /// Local interrupts are masked only if the lock is taken.
    pub fn try_lock_irqsave(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved = arch::local_irq_save();
        if self.try_acquire() {
            Some(IrqSpinLockGuard { lock: self, saved })
        } else {
            arch::local_irq_restore(saved);
            None
        }
    }

    /// Mask local interrupts and acquire the lock, spinning until available
    pub fn lock_irqsave(&self) -> IrqSpinLockGuard<'_, T> {
        let saved = arch::local_irq_save();
        while !self.try_acquire() {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        IrqSpinLockGuard { lock: self, saved }
    }

    /// Check if the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Mutable access without locking, through exclusive ownership
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the lock, returning the protected data
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

/// A guard that provides access to the data protected by an IrqSpinLock
///
/// Dropping the guard releases the lock, then restores the interrupt mask.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved: IrqState,
}

impl<'a, T> Deref for IrqSpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqSpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for IrqSpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        arch::local_irq_restore(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_release() {
        let lock = IrqSpinLock::new(5u32);
        {
            let mut guard = lock.lock_irqsave();
            *guard += 1;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock_irqsave(), 6);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = IrqSpinLock::new(());
        let guard = lock.lock_irqsave();
        assert!(lock.try_lock_irqsave().is_none());
        drop(guard);
        assert!(lock.try_lock_irqsave().is_some());
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let lock = Arc::new(IrqSpinLock::new(0u64));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *lock.lock_irqsave() += 1;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*lock.lock_irqsave(), 40_000);
    }

    #[test]
    fn test_into_inner() {
        let mut lock = IrqSpinLock::new(1u8);
        *lock.get_mut() = 2;
        assert_eq!(lock.into_inner(), 2);
    }
}
