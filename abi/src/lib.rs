//! Emberos shared ABI types.
//!
//! Canonical definitions for types that cross subsystem boundaries: typed
//! memory addresses and the platform-discovery structures handed to the
//! hardware drivers. Keeping these in one dependency-free crate avoids
//! duplicate definitions and accidental layout drift between the platform
//! layer and the drivers that consume its output.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod platform;

pub use addr::{PhysAddr, VirtAddr};
pub use platform::{IOAPIC_MAX_DEVICES, IoapicCandidate, SystemInfo};
