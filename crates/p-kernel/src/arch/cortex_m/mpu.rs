// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! ARM Cortex-M Memory Protection Unit (MPU) registers
//!
//! ARMv7-M MPU on the TM4C123GH6PM: 8 regions, 8 subregions each for
//! regions of 256 bytes or more.

use core::ptr;

use crate::arch::MpuRegisters;

// ============================================================================
// MPU Register Addresses
// ============================================================================

/// MPU base address
const MPU_BASE: u32 = 0xE000_ED90;

/// MPU Type Register
const MPU_TYPE: u32 = MPU_BASE + 0x00;

/// MPU Control Register
const MPU_CTRL: u32 = MPU_BASE + 0x04;

/// MPU Region Number Register
const MPU_RNR: u32 = MPU_BASE + 0x08;

/// MPU Region Base Address Register
const MPU_RBAR: u32 = MPU_BASE + 0x0C;

/// MPU Region Attribute and Size Register
const MPU_RASR: u32 = MPU_BASE + 0x10;

// MPU_CTRL bits
const MPU_CTRL_ENABLE: u32 = 1 << 0; // Enable MPU
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2; // Enable default memory map for privileged access

/// The MPU of the running core
#[derive(Debug, Default)]
pub struct CortexMpu {
    _private: (),
}

impl CortexMpu {
    /// Take the MPU
    ///
    /// # Safety
    /// Only one `CortexMpu` may exist; it assumes exclusive use of the MPU
    /// registers.
    #[must_use]
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl MpuRegisters for CortexMpu {
    fn region_count(&self) -> u8 {
        // SAFETY: MPU_TYPE (0xE000_ED90) is an architecturally-defined read-only Cortex-M
        // register. Reading it detects MPU presence. Always valid, no side effects.
        let mpu_type = unsafe { ptr::read_volatile(MPU_TYPE as *const u32) };

        // Bits 15:8 contain DREGION (number of data regions)
        ((mpu_type >> 8) & 0xFF) as u8
    }

    fn select_region(&mut self, region: u8) {
        // SAFETY: MPU_RNR selects the region the RBAR/RASR accesses apply to. Callers only pass
        // regions validated against DREGION. volatile access required for MMIO.
        unsafe { ptr::write_volatile(MPU_RNR as *mut u32, u32::from(region)) };
    }

    fn set_base(&mut self, rbar: u32) {
        // SAFETY: RBAR write with VALID clear keeps the region chosen through RNR. volatile
        // access required for MMIO.
        unsafe { ptr::write_volatile(MPU_RBAR as *mut u32, rbar & !0x1F) };
    }

    fn set_attributes(&mut self, rasr: u32) {
        // SAFETY: RASR of the selected region. The barrier makes the new attributes apply before
        // the next access. volatile access required for MMIO.
        unsafe { ptr::write_volatile(MPU_RASR as *mut u32, rasr) };
        super::barrier();
    }

    fn enable(&mut self, privileged_default_map: bool) {
        let mut ctrl = MPU_CTRL_ENABLE;
        if privileged_default_map {
            ctrl |= MPU_CTRL_PRIVDEFENA;
        }

        // SAFETY: MPU_CTRL (0xE000_ED94) is the MPU control register. Writing the ENABLE bit
        // activates the MPU. volatile access required for MMIO.
        unsafe { ptr::write_volatile(MPU_CTRL as *mut u32, ctrl) };
        super::barrier();
    }
}
