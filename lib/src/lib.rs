#![no_std]

pub mod init_flag;
pub mod klog;
pub mod mmio;
pub mod testing;

pub mod tsc {
    /// Read the CPU timestamp counter.
    #[inline(always)]
    pub fn rdtsc() -> u64 {
        unsafe { core::arch::x86_64::_rdtsc() }
    }
}

#[doc(hidden)]
pub use paste;

pub use init_flag::{InitFlag, StateFlag};
pub use klog::{KlogLevel, klog_get_level, klog_register_backend, klog_set_level};
pub use mmio::MmioWindow;
