use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU8, Ordering},
};

/// Slot states: a cell moves `EMPTY -> SETTING -> READY` exactly once.
const EMPTY: u8 = 0;
const SETTING: u8 = 1;
const READY: u8 = 2;

/// A slot filled once during bring-up and read lock-free afterwards.
///
/// Trap handlers cannot take locks to reach the allocator or the PLIC, so
/// these globals are published with a three-state handshake instead: the
/// writer claims the slot, stores the value, then flips it readable with
/// release ordering. Readers that arrive before the flip see an empty
/// cell, never a half-written value.
pub struct BootCell<T> {
    state: AtomicU8,
    slot: UnsafeCell<Option<T>>,
}

unsafe impl<T: Send> Sync for BootCell<T> {}

impl<T> BootCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            slot: UnsafeCell::new(None),
        }
    }

    /// Fills the slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot was ever claimed before.
    #[track_caller]
    pub fn set(&self, value: T) {
        let claimed =
            self.state
                .compare_exchange(EMPTY, SETTING, Ordering::Relaxed, Ordering::Relaxed);
        assert!(claimed.is_ok(), "boot cell set twice");

        unsafe {
            *self.slot.get() = Some(value);
        }
        self.state.store(READY, Ordering::Release);
    }

    /// The value, if the slot has been filled.
    pub fn try_get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) != READY {
            return None;
        }
        unsafe { (*self.slot.get()).as_ref() }
    }

    /// The value.
    ///
    /// # Panics
    ///
    /// Panics if the slot is still empty.
    #[track_caller]
    pub fn get(&self) -> &T {
        self.try_get().expect("boot cell read while empty")
    }
}

impl<T> Default for BootCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
