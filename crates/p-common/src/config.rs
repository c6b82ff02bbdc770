// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Kernel configuration for Palisade RTOS
//!
//! All configuration is compile-time. The heap geometry itself is fixed (see
//! [`crate::constants`]); what can be chosen here is which MPU slot holds
//! which rule, where the static regions sit, and how chatty the logs are.

use crate::constants::{FLASH_BASE, FLASH_SIZE, HEAP_REGIONS, PERIPHERAL_BASE, PERIPHERAL_SIZE};
use crate::log::LogLevel;

/// Assignment of MPU region numbers and static region placement
///
/// Higher-numbered MPU regions take priority where regions overlap, so the
/// background rule must have the lowest number and the flash and peripheral
/// rules must sit above the heap regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpuLayout {
    /// Region holding the 4 GiB background rule
    pub background_region: u8,
    /// Regions covering the heap, lowest address first
    pub heap_regions: [u8; HEAP_REGIONS],
    /// Region holding the read-only flash rule
    pub flash_region: u8,
    /// Flash base address
    pub flash_base: u32,
    /// Flash size in bytes (power of two)
    pub flash_size: u32,
    /// Region holding the privileged-only peripheral rule
    pub peripheral_region: u8,
    /// Peripheral space base address
    pub peripheral_base: u32,
    /// Peripheral space size in bytes (power of two)
    pub peripheral_size: u32,
    /// Enable the default memory map for privileged code (MPU_CTRL.PRIVDEFENA)
    pub privileged_default_map: bool,
}

impl MpuLayout {
    /// Default layout for the TM4C123GH6PM
    pub const DEFAULT: Self = Self {
        background_region: 0,
        heap_regions: [1, 2, 3, 4],
        flash_region: 5,
        flash_base: FLASH_BASE,
        flash_size: FLASH_SIZE,
        peripheral_region: 6,
        peripheral_base: PERIPHERAL_BASE,
        peripheral_size: PERIPHERAL_SIZE,
        privileged_default_map: true,
    };

    /// Highest region number referenced by the layout
    #[must_use]
    pub fn highest_region(&self) -> u8 {
        self.heap_regions
            .iter()
            .copied()
            .chain([self.background_region, self.flash_region, self.peripheral_region])
            .max()
            .unwrap_or(0)
    }
}

impl Default for MpuLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Kernel-wide configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// MPU region layout
    pub mpu: MpuLayout,
    /// Minimum level recorded by kernel log buffers
    pub log_level: LogLevel,
}

impl KernelConfig {
    /// Default configuration
    pub const DEFAULT: Self = Self {
        mpu: MpuLayout::DEFAULT,
        log_level: LogLevel::Info,
    };

    /// Same configuration with a different log level
    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_priorities() {
        let layout = MpuLayout::DEFAULT;
        assert!(layout.heap_regions.iter().all(|&r| r > layout.background_region));
        assert!(layout.heap_regions.iter().all(|&r| r < layout.flash_region));
        assert_eq!(layout.highest_region(), 6);
    }
}
