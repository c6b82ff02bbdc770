// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Host-side register fakes
//!
//! [`RecordingMpu`] and [`SimFaultRegisters`] stand in for the MPU and the
//! SCB fault registers so the allocator, the access mask manager and the
//! fault responder can be exercised without a target. Both model only what
//! the kernel reads back: region words, the enable bit, the CFSR/MMFAR pair
//! and the two pending flags.

use crate::arch::{FaultRegisters, MpuRegisters};
use crate::mpu;

/// Register slots kept by [`RecordingMpu`] (RNR.REGION is 4 bits on ARMv7-M)
pub const MAX_REGIONS: usize = 16;

/// MMFSR.MMARVALID
const MMARVALID: u32 = 1 << 7;

/// MPU fake that remembers every region word written to it
#[derive(Debug, Clone)]
pub struct RecordingMpu {
    region_count: u8,
    selected: u8,
    bases: [u32; MAX_REGIONS],
    attributes: [u32; MAX_REGIONS],
    writes: usize,
    enabled: bool,
    privileged_default_map: bool,
}

impl RecordingMpu {
    /// MPU reporting `region_count` regions
    #[must_use]
    pub const fn new(region_count: u8) -> Self {
        Self {
            region_count,
            selected: 0,
            bases: [0; MAX_REGIONS],
            attributes: [0; MAX_REGIONS],
            writes: 0,
            enabled: false,
            privileged_default_map: false,
        }
    }

    /// Part without an MPU (DREGION reads 0)
    #[must_use]
    pub const fn absent() -> Self {
        Self::new(0)
    }

    /// Last RBAR written to `region`
    #[must_use]
    pub fn base(&self, region: u8) -> u32 {
        self.bases[Self::slot(region)]
    }

    /// Last RASR written to `region`
    #[must_use]
    pub fn attributes(&self, region: u8) -> u32 {
        self.attributes[Self::slot(region)]
    }

    /// SRD field of `region`'s RASR
    #[must_use]
    pub fn subregion_disable(&self, region: u8) -> u8 {
        mpu::srd_of(self.attributes(region))
    }

    /// Currently selected region
    #[must_use]
    pub const fn selected(&self) -> u8 {
        self.selected
    }

    /// Number of RASR writes so far
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Check if the MPU has been enabled
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check if PRIVDEFENA was set on enable
    #[must_use]
    pub const fn privileged_default_map(&self) -> bool {
        self.privileged_default_map
    }

    fn slot(region: u8) -> usize {
        usize::from(region) % MAX_REGIONS
    }
}

impl MpuRegisters for RecordingMpu {
    fn region_count(&self) -> u8 {
        self.region_count
    }

    fn select_region(&mut self, region: u8) {
        self.selected = region;
    }

    fn set_base(&mut self, rbar: u32) {
        self.bases[Self::slot(self.selected)] = rbar;
    }

    fn set_attributes(&mut self, rasr: u32) {
        self.attributes[Self::slot(self.selected)] = rasr;
        self.writes += 1;
    }

    fn enable(&mut self, privileged_default_map: bool) {
        self.enabled = true;
        self.privileged_default_map = privileged_default_map;
    }
}

/// SCB fault register fake
#[derive(Debug, Clone, Default)]
pub struct SimFaultRegisters {
    cfsr: u32,
    hfsr: u32,
    mmfar: u32,
    bfar: u32,
    msp: u32,
    mem_fault_pending: bool,
    deferred_pending: bool,
    deferred_requests: u32,
}

impl SimFaultRegisters {
    /// All registers clear
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cfsr: 0,
            hfsr: 0,
            mmfar: 0,
            bfar: 0,
            msp: 0,
            mem_fault_pending: false,
            deferred_pending: false,
            deferred_requests: 0,
        }
    }

    /// Latch a MemManage fault with the given MMFSR bits
    ///
    /// `address` sets MMFAR and MMARVALID when present.
    pub fn inject_mem_fault(&mut self, mmfsr: u8, address: Option<u32>) {
        self.cfsr |= u32::from(mmfsr);
        if let Some(address) = address {
            self.mmfar = address;
            self.cfsr |= MMARVALID;
        }
        self.mem_fault_pending = true;
    }

    /// Latch raw CFSR/HFSR/BFAR values for a bus, usage or hard fault
    pub fn inject_status(&mut self, cfsr: u32, hfsr: u32, bfar: u32) {
        self.cfsr |= cfsr;
        self.hfsr |= hfsr;
        self.bfar = bfar;
    }

    /// Set the value reported for MSP
    pub fn set_main_stack_pointer(&mut self, msp: u32) {
        self.msp = msp;
    }

    /// Take the pending deferred interrupt, as the NVIC would
    ///
    /// Returns `false` if nothing was pending.
    pub fn take_deferred(&mut self) -> bool {
        core::mem::replace(&mut self.deferred_pending, false)
    }

    /// Check if the MemManage exception is still pending
    #[must_use]
    pub const fn mem_fault_pending(&self) -> bool {
        self.mem_fault_pending
    }

    /// Check if the deferred interrupt is pending
    #[must_use]
    pub const fn deferred_pending(&self) -> bool {
        self.deferred_pending
    }

    /// Times the deferred interrupt was requested
    #[must_use]
    pub const fn deferred_requests(&self) -> u32 {
        self.deferred_requests
    }
}

impl FaultRegisters for SimFaultRegisters {
    fn fault_status(&self) -> u32 {
        self.cfsr
    }

    fn hard_fault_status(&self) -> u32 {
        self.hfsr
    }

    fn mem_fault_address(&self) -> u32 {
        self.mmfar
    }

    fn bus_fault_address(&self) -> u32 {
        self.bfar
    }

    fn main_stack_pointer(&self) -> u32 {
        self.msp
    }

    fn clear_fault_status(&mut self, bits: u32) {
        self.cfsr &= !bits;
    }

    fn clear_mem_fault_pending(&mut self) {
        self.mem_fault_pending = false;
    }

    fn pend_deferred(&mut self) {
        self.deferred_pending = true;
        self.deferred_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_mpu_tracks_selected_region() {
        let mut mpu = RecordingMpu::new(8);
        mpu.select_region(2);
        mpu.set_base(0x2000_2000);
        mpu.set_attributes(0x0000_FF00);
        mpu.select_region(5);
        mpu.set_attributes(1);

        assert_eq!(mpu.base(2), 0x2000_2000);
        assert_eq!(mpu.subregion_disable(2), 0xFF);
        assert_eq!(mpu.attributes(5), 1);
        assert_eq!(mpu.writes(), 2);
        assert!(!mpu.is_enabled());
    }

    #[test]
    fn test_fault_status_is_write_one_to_clear() {
        let mut regs = SimFaultRegisters::new();
        regs.inject_mem_fault(0b10, Some(0x2000_1400));
        assert_eq!(regs.fault_status(), 0b10 | MMARVALID);
        assert_eq!(regs.mem_fault_address(), 0x2000_1400);

        regs.clear_fault_status(0b10);
        assert_eq!(regs.fault_status(), MMARVALID);
    }

    #[test]
    fn test_take_deferred_once() {
        let mut regs = SimFaultRegisters::new();
        regs.pend_deferred();
        assert!(regs.take_deferred());
        assert!(!regs.take_deferred());
        assert_eq!(regs.deferred_requests(), 1);
    }
}
