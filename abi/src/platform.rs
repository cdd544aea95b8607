//! Platform-discovery output consumed by the interrupt-controller drivers.
//!
//! The platform layer (ACPI MADT walk, MP tables, whatever the board
//! provides) runs before the drivers and records what it found in a
//! [`SystemInfo`]. The IOAPIC driver never parses firmware tables and never
//! touches the page tables itself: every candidate arrives with its MMIO
//! register window already mapped.

use crate::addr::{PhysAddr, VirtAddr};

/// Fixed capacity of the IOAPIC descriptor table.
pub const IOAPIC_MAX_DEVICES: usize = 32;

/// One IOAPIC candidate reported by platform discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoapicCandidate {
    /// Firmware-assigned IOAPIC ID.
    pub id: u8,
    /// Mapped base of the 32-bit MMIO register window. A null base marks a
    /// slot the platform found but could not map; the driver rejects it.
    pub base: VirtAddr,
    /// Original physical base, kept for diagnostics.
    pub phys: PhysAddr,
}

impl IoapicCandidate {
    pub const fn empty() -> Self {
        Self {
            id: 0,
            base: VirtAddr::NULL,
            phys: PhysAddr::NULL,
        }
    }

    pub const fn new(id: u8, base: VirtAddr, phys: PhysAddr) -> Self {
        Self { id, base, phys }
    }
}

/// Everything platform discovery learned that the drivers need.
///
/// The candidate table is fixed-capacity; `push` keeps counting past
/// [`IOAPIC_MAX_DEVICES`] so the driver can distinguish "platform reported
/// too many controllers" from a merely full table.
#[derive(Clone, Copy)]
pub struct SystemInfo {
    ioapics: [IoapicCandidate; IOAPIC_MAX_DEVICES],
    supplied: usize,
}

impl SystemInfo {
    pub const fn empty() -> Self {
        Self {
            ioapics: [IoapicCandidate::empty(); IOAPIC_MAX_DEVICES],
            supplied: 0,
        }
    }

    /// Record a discovered IOAPIC. Returns false if the table was already
    /// full; the candidate is still counted in [`Self::candidate_count`].
    pub fn push(&mut self, candidate: IoapicCandidate) -> bool {
        let slot = self.supplied;
        self.supplied += 1;
        if slot >= IOAPIC_MAX_DEVICES {
            return false;
        }
        self.ioapics[slot] = candidate;
        true
    }

    /// Number of candidates the platform reported, including any that did
    /// not fit in the table.
    #[inline]
    pub fn candidate_count(&self) -> usize {
        self.supplied
    }

    /// The stored candidates, in discovery order.
    pub fn candidates(&self) -> impl Iterator<Item = &IoapicCandidate> {
        self.ioapics[..self.supplied.min(IOAPIC_MAX_DEVICES)].iter()
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::empty()
    }
}
