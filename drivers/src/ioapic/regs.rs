//! IOAPIC hardware definitions and the redirection-entry codec.
//!
//! The IOAPIC exposes its internal registers indirectly: software writes a
//! register index to `IOREGSEL` (base + 0x00) and then transfers the value
//! through `IOWIN` (base + 0x10). The indexed space holds the ID, Version
//! and Arbitration registers plus one 64-bit redirection entry per input
//! pin, split into two 32-bit words.
//!
//! Entries are encoded/decoded with explicit shift/mask arithmetic on plain
//! `u32` words. Overlapping bitfield structs would be shorter but their
//! layout is compiler folklore; the register layout here must be bit-exact.

use bitflags::bitflags;

use super::error::IoapicError;

/// Byte size of the MMIO register window of one IOAPIC.
pub const IOAPIC_WINDOW_SIZE: usize = 0x20;

/// MMIO offset of the register-select (index) register.
pub(crate) const MMIO_IOREGSEL: usize = 0x00;
/// MMIO offset of the data window register.
pub(crate) const MMIO_IOWIN: usize = 0x10;

// Indexed register space.
pub(crate) const IOAPIC_REG_ID: u32 = 0x00;
pub(crate) const IOAPIC_REG_VER: u32 = 0x01;
pub(crate) const IOAPIC_REG_ARB: u32 = 0x02;
pub(crate) const IOAPIC_REG_REDIR_BASE: u32 = 0x10;

/// Vectors 0x00-0x0F are architecturally reserved for exceptions.
pub const IOAPIC_MIN_VECTOR: u8 = 0x10;

const VECTOR_MASK: u32 = 0xFF;
const DELIVERY_MODE_SHIFT: u32 = 8;
const DELIVERY_MODE_MASK: u32 = 0x7 << DELIVERY_MODE_SHIFT;
const DESTINATION_SHIFT: u32 = 24;
const DESTINATION_PHYSICAL_MASK: u8 = 0x0F;

/// Index of the low word of redirection entry `irq`.
#[inline]
pub(crate) const fn entry_low_index(irq: u32) -> u32 {
    IOAPIC_REG_REDIR_BASE + 2 * irq
}

/// Index of the high word of redirection entry `irq`.
#[inline]
pub(crate) const fn entry_high_index(irq: u32) -> u32 {
    entry_low_index(irq) + 1
}

bitflags! {
    /// Single-bit fields of a redirection entry low word.
    ///
    /// `DELIVERY_STATUS` and `REMOTE_IRR` are read-only in hardware; the
    /// codec reports them on decode and never sets them on encode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RedirFlags: u32 {
        const DEST_LOGICAL    = 1 << 11;
        const DELIVERY_STATUS = 1 << 12;
        const ACTIVE_LOW      = 1 << 13;
        const REMOTE_IRR      = 1 << 14;
        const LEVEL_TRIGGERED = 1 << 15;
        const MASKED          = 1 << 16;
    }
}

/// How an interrupt is dispatched to its destination.
///
/// Encodings 0b011 and 0b110 are reserved by the architecture and rejected
/// on decode.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Fixed = 0b000,
    LowestPriority = 0b001,
    Smi = 0b010,
    Nmi = 0b100,
    Init = 0b101,
    ExtInt = 0b111,
}

impl DeliveryMode {
    pub(crate) const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0b000 => Some(Self::Fixed),
            0b001 => Some(Self::LowestPriority),
            0b010 => Some(Self::Smi),
            0b100 => Some(Self::Nmi),
            0b101 => Some(Self::Init),
            0b111 => Some(Self::ExtInt),
            _ => None,
        }
    }
}

/// Whether the destination field names an APIC ID or a logical group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationMode {
    Physical,
    Logical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinPolarity {
    ActiveHigh,
    ActiveLow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Edge,
    Level,
}

/// Decoded routing configuration of one redirection entry.
///
/// `delivery_pending` and `remote_irr` mirror the entry's read-only status
/// bits: they are filled in by [`RedirEntry::decode`] and ignored by
/// [`RedirEntry::encode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirEntry {
    pub vector: u8,
    pub delivery_mode: DeliveryMode,
    pub dest_mode: DestinationMode,
    pub polarity: PinPolarity,
    pub trigger: TriggerMode,
    pub masked: bool,
    /// Destination APIC ID (physical mode, 4 bits) or processor group
    /// (logical mode, 8 bits).
    pub destination: u8,
    pub delivery_pending: bool,
    pub remote_irr: bool,
}

impl RedirEntry {
    /// An unmasked entry with the given routing and clear status bits.
    pub const fn new(
        vector: u8,
        delivery_mode: DeliveryMode,
        dest_mode: DestinationMode,
        polarity: PinPolarity,
        trigger: TriggerMode,
        destination: u8,
    ) -> Self {
        Self {
            vector,
            delivery_mode,
            dest_mode,
            polarity,
            trigger,
            masked: false,
            destination,
            delivery_pending: false,
            remote_irr: false,
        }
    }

    /// Encode into the (low, high) register words.
    ///
    /// Read-only bits are never set. In physical destination mode only the
    /// low 4 destination bits are significant; the rest are dropped.
    pub fn encode(&self) -> (u32, u32) {
        let mut low = self.vector as u32;
        low |= (self.delivery_mode as u32) << DELIVERY_MODE_SHIFT;

        let mut flags = RedirFlags::empty();
        if matches!(self.dest_mode, DestinationMode::Logical) {
            flags |= RedirFlags::DEST_LOGICAL;
        }
        if matches!(self.polarity, PinPolarity::ActiveLow) {
            flags |= RedirFlags::ACTIVE_LOW;
        }
        if matches!(self.trigger, TriggerMode::Level) {
            flags |= RedirFlags::LEVEL_TRIGGERED;
        }
        if self.masked {
            flags |= RedirFlags::MASKED;
        }
        low |= flags.bits();

        let destination = match self.dest_mode {
            DestinationMode::Physical => self.destination & DESTINATION_PHYSICAL_MASK,
            DestinationMode::Logical => self.destination,
        };
        let high = (destination as u32) << DESTINATION_SHIFT;

        (low, high)
    }

    /// Decode the (low, high) register words read from hardware.
    pub fn decode(low: u32, high: u32) -> Result<Self, IoapicError> {
        let mode_bits = (low & DELIVERY_MODE_MASK) >> DELIVERY_MODE_SHIFT;
        let delivery_mode = DeliveryMode::from_bits(mode_bits)
            .ok_or(IoapicError::ReservedDeliveryMode { bits: mode_bits as u8 })?;

        let flags = RedirFlags::from_bits_truncate(low);
        let dest_mode = if flags.contains(RedirFlags::DEST_LOGICAL) {
            DestinationMode::Logical
        } else {
            DestinationMode::Physical
        };
        let dest_byte = (high >> DESTINATION_SHIFT) as u8;
        let destination = match dest_mode {
            DestinationMode::Physical => dest_byte & DESTINATION_PHYSICAL_MASK,
            DestinationMode::Logical => dest_byte,
        };

        Ok(Self {
            vector: (low & VECTOR_MASK) as u8,
            delivery_mode,
            dest_mode,
            polarity: if flags.contains(RedirFlags::ACTIVE_LOW) {
                PinPolarity::ActiveLow
            } else {
                PinPolarity::ActiveHigh
            },
            trigger: if flags.contains(RedirFlags::LEVEL_TRIGGERED) {
                TriggerMode::Level
            } else {
                TriggerMode::Edge
            },
            masked: flags.contains(RedirFlags::MASKED),
            destination,
            delivery_pending: flags.contains(RedirFlags::DELIVERY_STATUS),
            remote_irr: flags.contains(RedirFlags::REMOTE_IRR),
        })
    }
}
