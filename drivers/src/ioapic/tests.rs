//! IOAPIC driver tests.
//!
//! Codec and validation tests run anywhere. Tests that need a device go
//! through two paths: if the driver is already initialized (real hardware)
//! they run against it, otherwise the init tests bring the driver up on
//! RAM-backed fake windows. A fake is plain memory, so its data window
//! always returns the last value stored at offset 0x10 regardless of the
//! selected index; the tests only rely on low-word behavior there.

use core::cell::UnsafeCell;
use core::fmt::{self, Write};

use emberos_abi::addr::{PhysAddr, VirtAddr};
use emberos_abi::platform::{IOAPIC_MAX_DEVICES, IoapicCandidate, SystemInfo};
use emberos_lib::fail;
use emberos_lib::testing::TestResult;

use super::error::IoapicError;
use super::regs::*;
use crate::ioapic;

struct FakeIoapic(UnsafeCell<[u32; 16]>);

// SAFETY: test-only backing store; the driver serializes all accesses
// through its per-device lock.
unsafe impl Sync for FakeIoapic {}

impl FakeIoapic {
    const fn filled(value: u32) -> Self {
        Self(UnsafeCell::new([value; 16]))
    }

    fn base(&self) -> VirtAddr {
        VirtAddr::new(self.0.get() as u64)
    }

    fn store(&self, word: usize, value: u32) {
        // SAFETY: word < 16, and nothing else aliases the cell mutably.
        unsafe { (self.0.get() as *mut u32).add(word).write_volatile(value) }
    }
}

/// Reads as all-ones, like a floating bus.
static DEAD_IOAPIC: FakeIoapic = FakeIoapic::filled(0xFFFF_FFFF);
/// Version registers seeded before init; see the module comment.
static LIVE_IOAPIC: FakeIoapic = FakeIoapic::filled(0);
static SECOND_LIVE_IOAPIC: FakeIoapic = FakeIoapic::filled(0);

/// Truncating formatting sink for checking `Display` output.
struct FmtBuf {
    buf: [u8; 96],
    len: usize,
}

impl FmtBuf {
    const fn new() -> Self {
        Self { buf: [0; 96], len: 0 }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for FmtBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

const GOLDEN_LOW: u32 = 0x0000_0030;
const GOLDEN_HIGH: u32 = 0x0100_0000;

fn golden_entry() -> RedirEntry {
    RedirEntry::new(
        0x30,
        DeliveryMode::Fixed,
        DestinationMode::Physical,
        PinPolarity::ActiveHigh,
        TriggerMode::Edge,
        0x01,
    )
}

pub fn test_entry_encode_golden() -> TestResult {
    let (low, high) = golden_entry().encode();
    if low != GOLDEN_LOW || high != GOLDEN_HIGH {
        return fail!("golden entry encoded to low={:#x} high={:#x}", low, high);
    }
    TestResult::Pass
}

pub fn test_entry_roundtrip_all_fields() -> TestResult {
    let mut entry = RedirEntry::new(
        0x45,
        DeliveryMode::LowestPriority,
        DestinationMode::Logical,
        PinPolarity::ActiveLow,
        TriggerMode::Level,
        0xAA,
    );
    entry.masked = true;

    let (low, high) = entry.encode();
    let expected_low = 0x45
        | (1 << 8)
        | RedirFlags::DEST_LOGICAL.bits()
        | RedirFlags::ACTIVE_LOW.bits()
        | RedirFlags::LEVEL_TRIGGERED.bits()
        | RedirFlags::MASKED.bits();
    if low != expected_low || high != 0xAA00_0000 {
        return fail!("all-fields entry encoded to low={:#x} high={:#x}", low, high);
    }

    match RedirEntry::decode(low, high) {
        Ok(decoded) if decoded == entry => TestResult::Pass,
        Ok(decoded) => fail!("roundtrip mismatch: {:?}", decoded),
        Err(err) => fail!("roundtrip decode failed: {}", err),
    }
}

pub fn test_entry_decode_reserved_mode() -> TestResult {
    for bits in [0b011u32, 0b110] {
        match RedirEntry::decode(bits << 8, 0) {
            Err(IoapicError::ReservedDeliveryMode { .. }) => {}
            other => return fail!("reserved mode {:#b} decoded as {:?}", bits, other),
        }
    }
    TestResult::Pass
}

pub fn test_entry_status_bits_readonly() -> TestResult {
    let low = GOLDEN_LOW | RedirFlags::DELIVERY_STATUS.bits() | RedirFlags::REMOTE_IRR.bits();
    let entry = match RedirEntry::decode(low, GOLDEN_HIGH) {
        Ok(entry) => entry,
        Err(err) => return fail!("decode failed: {}", err),
    };

    if !entry.delivery_pending || !entry.remote_irr {
        return fail!("status bits not reported on decode");
    }

    let (reencoded_low, _) = entry.encode();
    if reencoded_low & (RedirFlags::DELIVERY_STATUS | RedirFlags::REMOTE_IRR).bits() != 0 {
        return fail!("encode set read-only bits: {:#x}", reencoded_low);
    }
    TestResult::Pass
}

pub fn test_entry_physical_destination_truncated() -> TestResult {
    let entry = RedirEntry::new(
        0x30,
        DeliveryMode::Fixed,
        DestinationMode::Physical,
        PinPolarity::ActiveHigh,
        TriggerMode::Edge,
        0xFF,
    );
    let (_, high) = entry.encode();
    if high != 0x0F00_0000 {
        return fail!("physical destination not truncated: high={:#x}", high);
    }
    TestResult::Pass
}

pub fn test_mask_bit_isolated() -> TestResult {
    let masked = GOLDEN_LOW | RedirFlags::MASKED.bits();
    if masked ^ GOLDEN_LOW != 1 << 16 {
        return fail!("mask flip touched other bits");
    }
    if masked & !RedirFlags::MASKED.bits() != GOLDEN_LOW {
        return fail!("clearing the mask did not restore the word");
    }
    TestResult::Pass
}

pub fn test_register_constants() -> TestResult {
    if IOAPIC_REG_ID != 0x00 || IOAPIC_REG_VER != 0x01 || IOAPIC_REG_ARB != 0x02 {
        return fail!("indexed register offsets are wrong");
    }
    if IOAPIC_REG_REDIR_BASE != 0x10 {
        return fail!("redirection table base should be 0x10");
    }
    if entry_low_index(3) != 0x16 || entry_high_index(3) != 0x17 {
        return fail!("entry index arithmetic is wrong");
    }
    TestResult::Pass
}

pub fn test_flag_constants() -> TestResult {
    if RedirFlags::MASKED.bits() != 1 << 16 {
        return fail!("MASKED must be bit 16");
    }
    if RedirFlags::DEST_LOGICAL.bits() != 1 << 11
        || RedirFlags::ACTIVE_LOW.bits() != 1 << 13
        || RedirFlags::LEVEL_TRIGGERED.bits() != 1 << 15
    {
        return fail!("redirection flag bits are wrong");
    }
    TestResult::Pass
}

pub fn test_too_many_devices_message_names_limit() -> TestResult {
    let mut out = FmtBuf::new();
    let err = IoapicError::TooManyDevices {
        supplied: IOAPIC_MAX_DEVICES + 1,
    };
    if write!(out, "{}", err).is_err() {
        return fail!("formatting failed");
    }
    let text = out.as_str();
    if !text.contains("33") || !text.contains("limit 32") {
        return fail!("message does not name count and limit: {}", text);
    }
    TestResult::Pass
}

pub fn test_program_reserved_vector() -> TestResult {
    let mut entry = golden_entry();
    entry.vector = 0x0F;
    match ioapic::program_entry(0, 0, &entry) {
        Err(IoapicError::ReservedVector { vector: 0x0F }) => TestResult::Pass,
        other => fail!("reserved vector accepted: {:?}", other),
    }
}

pub fn test_ops_require_init() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }
    if ioapic::mask_irq(0, 0) != Err(IoapicError::NotInitialized) {
        return fail!("mask_irq worked before init");
    }
    if ioapic::unmask_irq(0, 0) != Err(IoapicError::NotInitialized) {
        return fail!("unmask_irq worked before init");
    }
    if ioapic::read_entry(0, 0) != Err(IoapicError::NotInitialized) {
        return fail!("read_entry worked before init");
    }
    if ioapic::program_entry(0, 0, &golden_entry()) != Err(IoapicError::NotInitialized) {
        return fail!("program_entry worked before init");
    }
    TestResult::Pass
}

pub fn test_init_zero_candidates() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }
    match ioapic::init(&SystemInfo::empty()) {
        Err(IoapicError::NoCandidates) => TestResult::Pass,
        other => fail!("init with zero candidates: {:?}", other),
    }
}

pub fn test_init_too_many_candidates() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let mut sys = SystemInfo::empty();
    for id in 0..=IOAPIC_MAX_DEVICES {
        sys.push(IoapicCandidate::new(
            id as u8,
            VirtAddr::NULL,
            PhysAddr::NULL,
        ));
    }
    match ioapic::init(&sys) {
        Err(IoapicError::TooManyDevices { supplied }) if supplied == IOAPIC_MAX_DEVICES + 1 => {
            TestResult::Pass
        }
        other => fail!("init with 33 candidates: {:?}", other),
    }
}

pub fn test_init_all_candidates_dead() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let mut sys = SystemInfo::empty();
    sys.push(IoapicCandidate::new(0, VirtAddr::NULL, PhysAddr::NULL));
    match ioapic::init(&sys) {
        Err(IoapicError::NoUsableDevice) => {}
        other => return fail!("init with only a null candidate: {:?}", other),
    }
    if ioapic::device_count() != 0 || ioapic::usable_count() != 0 {
        return fail!("failed init published device counts");
    }
    TestResult::Pass
}

pub fn test_failed_init_is_not_sticky() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }
    if ioapic::init(&SystemInfo::empty()) != Err(IoapicError::NoCandidates) {
        return fail!("first failing init");
    }
    // The in-progress flag must be released on every failure exit so the
    // next caller retries instead of waiting on a pass that already died.
    if ioapic::init(&SystemInfo::empty()) != Err(IoapicError::NoCandidates) {
        return fail!("retry after a failed init did not run");
    }
    if ioapic::is_ready() || ioapic::device_count() != 0 {
        return fail!("failed init left driver state behind");
    }
    TestResult::Pass
}

pub fn test_init_partial_failure() -> TestResult {
    if ioapic::is_ready() {
        return TestResult::Skipped;
    }

    // Version 0x11, max redirection entry 0x17 (24 entries).
    LIVE_IOAPIC.store(4, 0x0017_0011);
    SECOND_LIVE_IOAPIC.store(4, 0x0017_0011);

    let mut sys = SystemInfo::empty();
    sys.push(IoapicCandidate::new(0, DEAD_IOAPIC.base(), PhysAddr::NULL));
    sys.push(IoapicCandidate::new(1, LIVE_IOAPIC.base(), PhysAddr::NULL));
    sys.push(IoapicCandidate::new(
        2,
        SECOND_LIVE_IOAPIC.base(),
        PhysAddr::NULL,
    ));

    match ioapic::init(&sys) {
        Ok(2) => {}
        other => return fail!("one bad candidate killed init: {:?}", other),
    }
    if ioapic::device_count() != 3 || ioapic::usable_count() != 2 {
        return fail!("device accounting wrong after partial init");
    }
    if ioapic::mask_irq(0, 0) != Err(IoapicError::DeviceUnusable { device: 0 }) {
        return fail!("dead device not rejected");
    }
    if ioapic::entry_count(1) != Ok(24) || ioapic::entry_count(2) != Ok(24) {
        return fail!("live device entry count wrong");
    }
    TestResult::Pass
}

pub fn test_double_init_idempotent() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    match ioapic::init(&SystemInfo::empty()) {
        Ok(count) if count == ioapic::usable_count() => TestResult::Pass,
        other => fail!("second init: {:?}", other),
    }
}

fn first_usable_device() -> Option<usize> {
    (0..ioapic::device_count()).find(|&device| ioapic::entry_count(device).is_ok())
}

pub fn test_mask_unmask_roundtrip() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let Some(device) = first_usable_device() else {
        return TestResult::Skipped;
    };

    let before = match ioapic::read_entry(device, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry failed: {}", err),
    };

    // Normalize the mask and transient status bits before comparing.
    let routing_of = |mut entry: RedirEntry| {
        entry.masked = false;
        entry.delivery_pending = false;
        entry.remote_irr = false;
        entry
    };

    if ioapic::mask_irq(device, 0).is_err() {
        return fail!("mask_irq failed");
    }
    let masked = match ioapic::read_entry(device, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry after mask failed: {}", err),
    };
    if !masked.masked {
        return fail!("mask bit not set");
    }
    if routing_of(masked) != routing_of(before) {
        return fail!("mask_irq clobbered other fields: {:?}", masked);
    }

    if ioapic::unmask_irq(device, 0).is_err() {
        return fail!("unmask_irq failed");
    }
    let unmasked = match ioapic::read_entry(device, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry after unmask failed: {}", err),
    };
    if unmasked.masked {
        return fail!("mask bit not cleared");
    }
    if routing_of(unmasked) != routing_of(before) {
        return fail!("unmask_irq clobbered other fields: {:?}", unmasked);
    }

    // Leave the pin the way we found it.
    if before.masked && ioapic::mask_irq(device, 0).is_err() {
        return fail!("could not restore mask state");
    }
    TestResult::Pass
}

pub fn test_program_entry_masked_readback() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let Some(device) = first_usable_device() else {
        return TestResult::Skipped;
    };

    let mut entry = golden_entry();
    entry.masked = true;
    if let Err(err) = ioapic::program_entry(device, 0, &entry) {
        return fail!("program_entry failed: {}", err);
    }

    let back = match ioapic::read_entry(device, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("readback failed: {}", err),
    };
    if back.vector != entry.vector
        || !back.masked
        || back.delivery_mode != entry.delivery_mode
        || back.polarity != entry.polarity
        || back.trigger != entry.trigger
    {
        return fail!("readback mismatch: {:?}", back);
    }
    TestResult::Pass
}

pub fn test_mask_all_pins() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let Some(device) = first_usable_device() else {
        return TestResult::Skipped;
    };

    let before = match ioapic::read_entry(device, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry failed: {}", err),
    };

    if let Err(err) = ioapic::mask_all(device) {
        return fail!("mask_all failed: {}", err);
    }
    match ioapic::read_entry(device, 0) {
        Ok(entry) if entry.masked => {}
        Ok(entry) => return fail!("pin 0 still unmasked: {:?}", entry),
        Err(err) => return fail!("readback failed: {}", err),
    }

    if !before.masked && ioapic::unmask_irq(device, 0).is_err() {
        return fail!("could not restore pin 0");
    }
    TestResult::Pass
}

pub fn test_arbitration_id_in_range() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let Some(device) = first_usable_device() else {
        return TestResult::Skipped;
    };
    match ioapic::arbitration_id(device) {
        Ok(arb) if arb <= 0x0F => TestResult::Pass,
        Ok(arb) => fail!("arbitration id {:#x} exceeds 4 bits", arb),
        Err(err) => fail!("arbitration_id failed: {}", err),
    }
}

pub fn test_devices_are_independent() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let mut usable = (0..ioapic::device_count()).filter(|&d| ioapic::entry_count(d).is_ok());
    let (Some(dev_a), Some(dev_b)) = (usable.next(), usable.next()) else {
        return TestResult::Skipped;
    };

    let before_a = match ioapic::read_entry(dev_a, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry failed: {}", err),
    };

    // Walking every pin of one device must leave the other untouched.
    if let Err(err) = ioapic::mask_all(dev_b) {
        return fail!("mask_all failed: {}", err);
    }
    let after_a = match ioapic::read_entry(dev_a, 0) {
        Ok(entry) => entry,
        Err(err) => return fail!("read_entry failed: {}", err),
    };
    let settle = |mut entry: RedirEntry| {
        entry.delivery_pending = false;
        entry.remote_irr = false;
        entry
    };
    if settle(after_a) != settle(before_a) {
        return fail!("mask_all on device {} touched device {}", dev_b, dev_a);
    }
    match ioapic::read_entry(dev_b, 0) {
        Ok(entry) if entry.masked => {}
        Ok(entry) => return fail!("mask_all missed pin 0: {:?}", entry),
        Err(err) => return fail!("readback failed: {}", err),
    }

    // And the first device stays fully operable meanwhile.
    if ioapic::mask_irq(dev_a, 0).is_err() {
        return fail!("mask_irq on device {} failed", dev_a);
    }
    if !before_a.masked && ioapic::unmask_irq(dev_a, 0).is_err() {
        return fail!("could not restore device {} pin 0", dev_a);
    }
    TestResult::Pass
}

pub fn test_irq_out_of_range() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let Some(device) = first_usable_device() else {
        return TestResult::Skipped;
    };
    match ioapic::mask_irq(device, 0x1000) {
        Err(IoapicError::IrqOutOfRange { .. }) => TestResult::Pass,
        other => fail!("out-of-range irq accepted: {:?}", other),
    }
}

pub fn test_device_out_of_range() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    let device = ioapic::device_count();
    match ioapic::mask_irq(device, 0) {
        Err(IoapicError::DeviceOutOfRange { .. }) => TestResult::Pass,
        other => fail!("out-of-range device accepted: {:?}", other),
    }
}

emberos_lib::define_test_suite!(
    ioapic,
    [
        test_entry_encode_golden,
        test_entry_roundtrip_all_fields,
        test_entry_decode_reserved_mode,
        test_entry_status_bits_readonly,
        test_entry_physical_destination_truncated,
        test_mask_bit_isolated,
        test_register_constants,
        test_flag_constants,
        test_too_many_devices_message_names_limit,
        test_program_reserved_vector,
        test_ops_require_init,
        test_init_zero_candidates,
        test_init_too_many_candidates,
        test_init_all_candidates_dead,
        test_failed_init_is_not_sticky,
        test_init_partial_failure,
        test_double_init_idempotent,
        test_mask_unmask_roundtrip,
        test_program_entry_masked_readback,
        test_mask_all_pins,
        test_arbitration_id_in_range,
        test_devices_are_independent,
        test_irq_out_of_range,
        test_device_out_of_range,
    ]
);
