//! One-shot initialization flags.
//!
//! [`InitFlag`] is a one-way "subsystem is ready" marker; [`StateFlag`]
//! guards a critical init section so that exactly one CPU performs the work
//! while latecomers wait on the corresponding `InitFlag`.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct InitFlag(AtomicBool);

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mark_set(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StateFlag(AtomicBool);

impl StateFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Try to enter the guarded section. Returns false if another CPU is
    /// already inside.
    #[inline]
    pub fn enter(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn leave(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new()
    }
}
