//! Volatile MMIO register window.
//!
//! [`MmioWindow`] is the only path to memory-mapped device registers in the
//! kernel. It binds an already-mapped virtual base to a byte size and
//! exposes volatile 32-bit accessors, so the compiler can neither cache nor
//! reorder device register accesses, and no safe code can alias them with
//! ordinary memory. Mapping the physical range is the platform layer's job;
//! a window never touches the page tables.

use core::ptr::{read_volatile, write_volatile};

use emberos_abi::addr::VirtAddr;

#[derive(Clone, Copy, Debug)]
pub struct MmioWindow {
    base: VirtAddr,
    size: usize,
}

impl MmioWindow {
    #[inline]
    pub const fn empty() -> Self {
        Self {
            base: VirtAddr::NULL,
            size: 0,
        }
    }

    /// Bind a window to a mapped register range. Rejects a null base or a
    /// zero/misaligned size for 32-bit access.
    pub fn new(base: VirtAddr, size: usize) -> Option<Self> {
        if base.is_null() || size == 0 || !base.is_aligned(4) {
            return None;
        }
        Some(Self { base, size })
    }

    #[inline]
    fn check_access(&self, offset: usize) {
        debug_assert!(
            offset % 4 == 0,
            "MMIO access misaligned: offset={:#x}",
            offset
        );
        debug_assert!(
            offset
                .checked_add(4)
                .is_some_and(|end| end <= self.size),
            "MMIO access out of bounds: offset={:#x}, window={:#x}",
            offset,
            self.size
        );
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check_access(offset);
        let ptr = self.base.offset(offset as u64).as_ptr::<u32>();
        // SAFETY: the platform layer guarantees `base..base+size` is a
        // mapped device register range, and check_access keeps the offset
        // aligned and in bounds.
        unsafe { read_volatile(ptr) }
    }

    #[inline]
    pub fn write_u32(&self, offset: usize, value: u32) {
        self.check_access(offset);
        let ptr = self.base.offset(offset as u64).as_mut_ptr::<u32>();
        // SAFETY: same contract as read_u32.
        unsafe { write_volatile(ptr, value) }
    }

    #[inline]
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.size != 0
    }
}

impl Default for MmioWindow {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}
