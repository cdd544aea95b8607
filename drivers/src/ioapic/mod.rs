//! IOAPIC driver.
//!
//! Owns the table of discovered IOAPIC devices and the redirection table of
//! each one. The platform layer performs discovery and hands the result to
//! [`init`] as a [`SystemInfo`]; after that, interrupt-setup code uses
//! [`mask_irq`]/[`unmask_irq`]/[`program_entry`] to control individual
//! input pins.
//!
//! Every register access goes through the indexed `IOREGSEL`/`IOWIN` pair,
//! which makes the index register shared mutable state for the whole chip.
//! A per-device lock is therefore held across every index/data sequence,
//! with interrupts disabled so an IRQ-context caller on the same CPU cannot
//! deadlock against it. Different devices never contend.

pub mod error;
pub mod regs;
#[cfg(feature = "itests")]
pub mod tests;

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;
use x86_64::instructions::interrupts;

use emberos_abi::platform::{IOAPIC_MAX_DEVICES, IoapicCandidate, SystemInfo};
use emberos_lib::{InitFlag, MmioWindow, StateFlag, klog_debug, klog_info, klog_warn};

use error::{IoapicError, IoapicResult};
use regs::*;

struct IoapicDevice {
    id: u8,
    version: u8,
    entry_count: u32,
    usable: bool,
    window: MmioWindow,
}

impl IoapicDevice {
    const fn empty() -> Self {
        Self {
            id: 0,
            version: 0,
            entry_count: 0,
            usable: false,
            window: MmioWindow::empty(),
        }
    }

    /// Indexed register read: select via IOREGSEL, transfer via IOWIN.
    /// Caller holds the device lock for the whole sequence.
    #[inline]
    fn read_reg(&self, reg: u32) -> u32 {
        self.window.write_u32(MMIO_IOREGSEL, reg);
        self.window.read_u32(MMIO_IOWIN)
    }

    #[inline]
    fn write_reg(&self, reg: u32, value: u32) {
        self.window.write_u32(MMIO_IOREGSEL, reg);
        self.window.write_u32(MMIO_IOWIN, value);
    }

    fn check_irq(&self, irq: u32) -> IoapicResult {
        if irq >= self.entry_count {
            return Err(IoapicError::IrqOutOfRange {
                irq,
                max: self.entry_count,
            });
        }
        Ok(())
    }
}

static DEVICES: [Mutex<IoapicDevice>; IOAPIC_MAX_DEVICES] =
    [const { Mutex::new(IoapicDevice::empty()) }; IOAPIC_MAX_DEVICES];
static DEVICE_COUNT: AtomicUsize = AtomicUsize::new(0);
static USABLE_COUNT: AtomicUsize = AtomicUsize::new(0);
static IOAPIC_READY: InitFlag = InitFlag::new();
static IOAPIC_INIT_IN_PROGRESS: StateFlag = StateFlag::new();

/// Run `f` against a device with its lock held and interrupts disabled.
fn with_device<T>(
    device: usize,
    f: impl FnOnce(&IoapicDevice) -> IoapicResult<T>,
) -> IoapicResult<T> {
    if !IOAPIC_READY.is_set() {
        return Err(IoapicError::NotInitialized);
    }
    if device >= DEVICE_COUNT.load(Ordering::Acquire) {
        return Err(IoapicError::DeviceOutOfRange { device });
    }
    interrupts::without_interrupts(|| {
        let dev = DEVICES[device].lock();
        if !dev.usable {
            return Err(IoapicError::DeviceUnusable { device });
        }
        f(&dev)
    })
}

/// Bring one candidate up. Returns false (slot stays unusable) on a null
/// base or an unreachable device; never aborts the surrounding init pass.
fn init_device(dev: &mut IoapicDevice, candidate: &IoapicCandidate) -> bool {
    dev.usable = false;

    let Some(window) = MmioWindow::new(candidate.base, IOAPIC_WINDOW_SIZE) else {
        return false;
    };
    dev.window = window;

    let version = dev.read_reg(IOAPIC_REG_VER);
    // A floating bus reads all-ones; a hole in the mapping reads zero.
    // Real hardware always has a nonzero version field.
    if version == 0 || version == u32::MAX {
        return false;
    }
    dev.version = (version & 0xFF) as u8;
    dev.entry_count = ((version >> 16) & 0xFF) + 1;

    let id = ((dev.read_reg(IOAPIC_REG_ID) >> 24) & 0x0F) as u8;
    if id != candidate.id {
        klog_debug!(
            "IOAPIC: firmware reported id {:#x}, hardware has {:#x}",
            candidate.id,
            id
        );
    }
    dev.id = id;

    // Quiesce: mask every pin and clear its destination so nothing fires
    // until interrupt setup programs a real route.
    for irq in 0..dev.entry_count {
        dev.write_reg(entry_high_index(irq), 0);
        dev.write_reg(entry_low_index(irq), RedirFlags::MASKED.bits());
    }

    dev.usable = true;
    true
}

/// Initialize the driver from platform discovery output.
///
/// Idempotent: repeated calls return the usable-device count of the first
/// successful pass. A caller that races a pass in progress waits for it to
/// finish and reports its outcome; if that pass failed the racer returns
/// `NotInitialized` and a later call may retry. A candidate that fails to
/// initialize is marked unusable and skipped; the pass fails only if zero
/// candidates were supplied, the platform exceeded [`IOAPIC_MAX_DEVICES`],
/// or no candidate survived.
pub fn init(sys: &SystemInfo) -> IoapicResult<usize> {
    if IOAPIC_READY.is_set() {
        return Ok(USABLE_COUNT.load(Ordering::Acquire));
    }
    if !IOAPIC_INIT_IN_PROGRESS.enter() {
        // The running pass may fail without ever setting the ready flag,
        // so wait on the in-progress flag rather than readiness.
        while IOAPIC_INIT_IN_PROGRESS.is_active() {
            core::hint::spin_loop();
        }
        if IOAPIC_READY.is_set() {
            return Ok(USABLE_COUNT.load(Ordering::Acquire));
        }
        return Err(IoapicError::NotInitialized);
    }

    let supplied = sys.candidate_count();
    if supplied == 0 {
        IOAPIC_INIT_IN_PROGRESS.leave();
        return Err(IoapicError::NoCandidates);
    }
    if supplied > IOAPIC_MAX_DEVICES {
        IOAPIC_INIT_IN_PROGRESS.leave();
        return Err(IoapicError::TooManyDevices { supplied });
    }

    let mut usable = 0;
    for (slot, candidate) in sys.candidates().enumerate() {
        let mut dev = DEVICES[slot].lock();
        if init_device(&mut dev, candidate) {
            usable += 1;
            klog_info!(
                "IOAPIC: device {} id {:#x} @ phys {:#x}, version {:#x}, {} entries",
                slot,
                dev.id,
                candidate.phys,
                dev.version,
                dev.entry_count
            );
        } else {
            klog_warn!(
                "IOAPIC: device {} id {:#x} @ phys {:#x} unusable, skipping",
                slot,
                candidate.id,
                candidate.phys
            );
        }
    }

    if usable == 0 {
        IOAPIC_INIT_IN_PROGRESS.leave();
        return Err(IoapicError::NoUsableDevice);
    }

    DEVICE_COUNT.store(supplied, Ordering::Release);
    USABLE_COUNT.store(usable, Ordering::Release);

    klog_info!("IOAPIC: {} of {} devices usable", usable, supplied);
    IOAPIC_READY.mark_set();
    IOAPIC_INIT_IN_PROGRESS.leave();
    Ok(usable)
}

fn update_mask(device: usize, irq: u32, masked: bool) -> IoapicResult {
    with_device(device, |dev| {
        dev.check_irq(irq)?;
        let reg = entry_low_index(irq);
        let mut low = dev.read_reg(reg);
        if masked {
            low |= RedirFlags::MASKED.bits();
        } else {
            low &= !RedirFlags::MASKED.bits();
        }
        dev.write_reg(reg, low);
        Ok(())
    })
}

/// Suppress delivery for one input pin. Read-modify-write of the low word
/// only; every other programmed field is preserved.
pub fn mask_irq(device: usize, irq: u32) -> IoapicResult {
    update_mask(device, irq, true)
}

/// Re-enable delivery for one input pin.
pub fn unmask_irq(device: usize, irq: u32) -> IoapicResult {
    update_mask(device, irq, false)
}

/// Mask every pin of a device.
pub fn mask_all(device: usize) -> IoapicResult {
    with_device(device, |dev| {
        for irq in 0..dev.entry_count {
            let reg = entry_low_index(irq);
            let low = dev.read_reg(reg);
            dev.write_reg(reg, low | RedirFlags::MASKED.bits());
        }
        Ok(())
    })
}

/// Program the full redirection entry for one input pin.
///
/// The two words are written independently (the hardware has no atomic
/// 64-bit write); the destination goes first so a partially-written entry
/// never delivers to a stale target.
pub fn program_entry(device: usize, irq: u32, entry: &RedirEntry) -> IoapicResult {
    if entry.vector < IOAPIC_MIN_VECTOR {
        return Err(IoapicError::ReservedVector {
            vector: entry.vector,
        });
    }
    with_device(device, |dev| {
        dev.check_irq(irq)?;
        let (low, high) = entry.encode();
        dev.write_reg(entry_high_index(irq), high);
        dev.write_reg(entry_low_index(irq), low);
        klog_debug!(
            "IOAPIC: device {} irq {} -> vector {:#x}, low={:#x}, high={:#x}",
            device,
            irq,
            entry.vector,
            low,
            high
        );
        Ok(())
    })
}

/// Read back the decoded redirection entry for one input pin.
pub fn read_entry(device: usize, irq: u32) -> IoapicResult<RedirEntry> {
    with_device(device, |dev| {
        dev.check_irq(irq)?;
        let low = dev.read_reg(entry_low_index(irq));
        let high = dev.read_reg(entry_high_index(irq));
        RedirEntry::decode(low, high)
    })
}

/// Bus arbitration ID of a device (indexed register 0x02).
pub fn arbitration_id(device: usize) -> IoapicResult<u8> {
    with_device(device, |dev| {
        Ok(((dev.read_reg(IOAPIC_REG_ARB) >> 24) & 0x0F) as u8)
    })
}

/// Number of redirection entries a device implements.
pub fn entry_count(device: usize) -> IoapicResult<u32> {
    with_device(device, |dev| Ok(dev.entry_count))
}

/// Number of device slots populated by init, usable or not.
pub fn device_count() -> usize {
    DEVICE_COUNT.load(Ordering::Acquire)
}

/// Number of devices that survived init.
pub fn usable_count() -> usize {
    USABLE_COUNT.load(Ordering::Acquire)
}

pub fn is_ready() -> bool {
    IOAPIC_READY.is_set()
}
