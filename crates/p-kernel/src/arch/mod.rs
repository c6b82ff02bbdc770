// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Architecture-specific code
//!
//! The protection core never touches a register directly. It talks to the
//! hardware through two narrow traits defined here:
//!
//! - [`MpuRegisters`]: region selection and RBAR/RASR/CTRL writes
//! - [`FaultRegisters`]: the SCB fault status and address registers
//!
//! Supported architectures:
//! - ARM Cortex-M (feature: `cortex-m`)
//! - Host stub (no feature), used by tests together with [`crate::sim`]

use crate::mpu::RegionDescriptor;

// ============================================================================
// Hardware seams
// ============================================================================

/// Access to the MPU region registers
pub trait MpuRegisters {
    /// Number of regions the MPU implements (MPU_TYPE.DREGION), 0 if absent
    fn region_count(&self) -> u8;

    /// Select the region later writes apply to (MPU_RNR)
    fn select_region(&mut self, region: u8);

    /// Write the selected region's base address (MPU_RBAR)
    fn set_base(&mut self, rbar: u32);

    /// Write the selected region's attribute and size word (MPU_RASR)
    fn set_attributes(&mut self, rasr: u32);

    /// Turn the MPU on (MPU_CTRL)
    fn enable(&mut self, privileged_default_map: bool);

    /// Program one region from a descriptor
    fn write_region(&mut self, region: &RegionDescriptor) {
        self.select_region(region.number);
        self.set_base(region.rbar());
        self.set_attributes(region.rasr());
    }
}

/// Access to the fault status registers of the System Control Block
pub trait FaultRegisters {
    /// Configurable Fault Status Register (MMFSR in bits 7:0)
    fn fault_status(&self) -> u32;

    /// HardFault Status Register
    fn hard_fault_status(&self) -> u32;

    /// MemManage Fault Address Register
    fn mem_fault_address(&self) -> u32;

    /// BusFault Address Register
    fn bus_fault_address(&self) -> u32;

    /// Current main stack pointer
    fn main_stack_pointer(&self) -> u32;

    /// Clear CFSR bits (write-one-to-clear)
    fn clear_fault_status(&mut self, bits: u32);

    /// Clear the MemManage pending flag (SHCSR.MEMFAULTPENDED)
    fn clear_mem_fault_pending(&mut self);

    /// Pend the deferred recovery interrupt (PendSV)
    fn pend_deferred(&mut self);
}

// ============================================================================
// ARM Cortex-M Architecture
// ============================================================================

cfg_if::cfg_if! {
    if #[cfg(feature = "cortex-m")] {
        pub mod cortex_m;

        pub use self::cortex_m::{critical, enable_fault_handlers, halt};
        pub use self::cortex_m::exceptions::ScbFaultRegisters;
        pub use self::cortex_m::mpu::CortexMpu;
    } else {
        pub mod stub;

        pub use self::stub::{critical, enable_fault_handlers, halt};
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpu::{AccessPermission, RegionSize};
    use crate::sim::RecordingMpu;

    #[test]
    fn test_write_region_selects_then_writes() {
        let mut mpu = RecordingMpu::new(8);
        let region =
            RegionDescriptor::new(3, 0x2000_4000, RegionSize::SIZE_8KB, AccessPermission::PrivRw);
        mpu.write_region(&region);

        assert_eq!(mpu.base(3), 0x2000_4000);
        assert_eq!(mpu.attributes(3), region.rasr());
        assert_eq!(mpu.selected(), 3);
    }

    #[test]
    fn test_critical_returns_value() {
        assert_eq!(critical(|| 7), 7);
    }
}
