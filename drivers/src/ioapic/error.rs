//! IOAPIC driver error type.
//!
//! Caller-contract violations (bad device index, bad pin, reserved vector)
//! are detected before any register access, so an invalid request never
//! programs reserved or undefined hardware state.

use core::fmt;

use emberos_abi::platform::IOAPIC_MAX_DEVICES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoapicError {
    /// Platform discovery supplied zero candidates.
    NoCandidates,
    /// Platform discovery supplied more candidates than the table holds.
    TooManyDevices { supplied: usize },
    /// Every supplied candidate failed initialization.
    NoUsableDevice,
    /// Operation before a successful `init`.
    NotInitialized,
    DeviceOutOfRange { device: usize },
    /// The device slot exists but was marked unusable during init.
    DeviceUnusable { device: usize },
    IrqOutOfRange { irq: u32, max: u32 },
    /// Vectors below 0x10 are architecturally reserved.
    ReservedVector { vector: u8 },
    /// A redirection entry read back with a reserved delivery-mode encoding.
    ReservedDeliveryMode { bits: u8 },
}

impl fmt::Display for IoapicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no IOAPIC candidates supplied"),
            Self::TooManyDevices { supplied } => {
                write!(
                    f,
                    "platform supplied {} IOAPIC candidates (limit {})",
                    supplied, IOAPIC_MAX_DEVICES
                )
            }
            Self::NoUsableDevice => write!(f, "no usable IOAPIC device"),
            Self::NotInitialized => write!(f, "IOAPIC driver not initialized"),
            Self::DeviceOutOfRange { device } => {
                write!(f, "IOAPIC device index {} out of range", device)
            }
            Self::DeviceUnusable { device } => {
                write!(f, "IOAPIC device {} is unusable", device)
            }
            Self::IrqOutOfRange { irq, max } => {
                write!(f, "IRQ {} out of range (device has {} entries)", irq, max)
            }
            Self::ReservedVector { vector } => {
                write!(f, "vector {:#x} is architecturally reserved", vector)
            }
            Self::ReservedDeliveryMode { bits } => {
                write!(f, "reserved delivery mode encoding {:#b}", bits)
            }
        }
    }
}

/// Convenience result type for IOAPIC operations.
pub type IoapicResult<T = ()> = Result<T, IoapicError>;
