#![no_std]

pub mod ioapic;
