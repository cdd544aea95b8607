//! Physical and virtual address newtypes.
//!
//! Mixing up physical and virtual addresses is one of the classic OS bugs;
//! these `#[repr(transparent)]` wrappers make the confusion a compile error
//! while costing nothing at runtime.
//!
//! - [`PhysAddr`]: a physical memory address. Never dereferenced directly;
//!   the platform layer translates it before handing it to a driver.
//! - [`VirtAddr`]: a virtual address, convertible to a raw pointer.

/// A physical memory address.
///
/// On x86_64 physical addresses are at most 52 bits wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// A virtual memory address.
///
/// On x86_64 virtual addresses must be canonical: bits 48-63 are copies of
/// bit 47.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl PhysAddr {
    /// The null physical address.
    pub const NULL: Self = Self(0);

    /// Maximum valid physical address (52-bit physical address space).
    pub const MAX: Self = Self((1 << 52) - 1);

    /// Create a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 52-bit physical address limit.
    #[inline]
    pub fn new(addr: u64) -> Self {
        assert!(addr <= Self::MAX.0, "PhysAddr out of range: 0x{:x}", addr);
        Self(addr)
    }

    /// Create a new physical address if it is in range.
    #[inline]
    pub const fn try_new(addr: u64) -> Option<Self> {
        if addr <= Self::MAX.0 {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Add an offset to this address (wrapping on overflow).
    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    /// Check if the address is aligned to the given power-of-two alignment.
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }
}

impl VirtAddr {
    /// The null virtual address.
    pub const NULL: Self = Self(0);

    /// Create a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical.
    #[inline]
    pub fn new(addr: u64) -> Self {
        assert!(
            Self::is_canonical(addr),
            "VirtAddr not canonical: 0x{:x}",
            addr
        );
        Self(addr)
    }

    /// Create a new virtual address if it is canonical.
    #[inline]
    pub const fn try_new(addr: u64) -> Option<Self> {
        if Self::is_canonical(addr) {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Convert to a const pointer of type T.
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// Convert to a mut pointer of type T.
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Add an offset to this address (wrapping on overflow).
    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    /// Check if the address is aligned to the given power-of-two alignment.
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Returns true if the raw address is canonical on x86_64.
    #[inline]
    pub const fn is_canonical(addr: u64) -> bool {
        let sign = (addr >> 47) & 1;
        let upper = addr >> 48;
        if sign == 0 { upper == 0 } else { upper == 0xFFFF }
    }
}

impl From<u64> for PhysAddr {
    #[inline]
    fn from(addr: u64) -> Self {
        Self::new(addr)
    }
}

impl From<PhysAddr> for u64 {
    #[inline]
    fn from(addr: PhysAddr) -> Self {
        addr.0
    }
}

impl From<u64> for VirtAddr {
    #[inline]
    fn from(addr: u64) -> Self {
        Self::new(addr)
    }
}

impl From<VirtAddr> for u64 {
    #[inline]
    fn from(addr: VirtAddr) -> Self {
        addr.0
    }
}

impl core::fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl core::fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}
