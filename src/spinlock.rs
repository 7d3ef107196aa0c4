//! Spin-then-yield mutual exclusion for very short critical sections.
//!
//! [`SpinLock`] is a bare exclusion flag: no fairness, no reentrancy and no
//! owner tracking. Any thread may release a lock acquired by another thread,
//! which lets an owner hand the critical section off across tasks.
//!
//! [`SpinMutex`] wraps a value behind a [`SpinLock`] and hands out an RAII
//! guard. The policy owner uses it to serialize every segment operation.

use crate::sync::*;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

/// Number of busy-wait iterations before yielding the processor
const MAX_SPINS: u32 = 16;

/// A test-and-test-and-set spin lock.
#[derive(Debug)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, spinning until it is available.
    ///
    /// Waiters spin on a plain load and only attempt the swap once the flag
    /// is observed clear. After [`MAX_SPINS`] iterations the thread yields
    /// and the spin budget starts over. There is no timeout: a holder that
    /// never unlocks livelocks every waiter.
    ///
    /// Calling `lock` twice from the same thread without an `unlock` in
    /// between deadlocks.
    pub fn lock(&self) {
        let mut spins = 0;
        loop {
            while self.locked.load(Ordering::Relaxed) {
                spins += 1;
                if spins > MAX_SPINS {
                    spins = 0;
                    yield_now();
                } else {
                    spin_loop();
                }
            }

            if !self.locked.swap(true, Ordering::Acquire) {
                return;
            }
        }
    }

    /// Try to acquire the lock without waiting.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock.
    ///
    /// The lock is not tied to a thread. One thread may lock and arrange
    /// for another thread to unlock.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A value protected by a [`SpinLock`].
pub struct SpinMutex<T> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `lock`
unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    pub fn new(data: T) -> Self {
        Self {
            lock: SpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock and return a guard that releases it on drop
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.lock.lock();
        SpinGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(SpinGuard { mutex: self })
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Exclusive access without locking, statically guaranteed by `&mut self`
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard for [`SpinMutex`]
pub struct SpinGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while the lock is held
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while the lock is held
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}
