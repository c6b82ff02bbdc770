// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Memory map constants for Palisade RTOS
//!
//! The protected heap sits at the bottom of SRAM and is covered by four
//! 8 KiB MPU regions of eight 1 KiB subregions each:
//!
//! ```text
//!  0x2000_8000  +----------------+
//!               | heap region 3  |  global subregion bits 24-31
//!  0x2000_6000  +----------------+
//!               | heap region 2  |  bits 16-23
//!  0x2000_4000  +----------------+
//!               | heap region 1  |  bits 8-15
//!  0x2000_2000  +----------------+
//!               | heap region 0  |  bits 4-7 usable
//!  0x2000_1000  | - - - - - - - -|
//!               | kernel (4 KiB) |  bits 0-3 reserved
//!  0x2000_0000  +----------------+
//! ```

// =============================================================================
// SRAM Heap
// =============================================================================

/// Start of SRAM and of the first heap MPU region
pub const SRAM_BASE: u32 = 0x2000_0000;

/// Allocation unit, equal to one MPU subregion
pub const BLOCK_SIZE: u32 = 1024;

/// Subregions per MPU region
pub const SUBREGIONS_PER_REGION: usize = 8;

/// Bytes covered by one heap MPU region
pub const REGION_SIZE: u32 = BLOCK_SIZE * SUBREGIONS_PER_REGION as u32;

/// Number of MPU regions covering the heap
pub const HEAP_REGIONS: usize = 4;

/// Subregions at the bottom of region 0 reserved for the kernel
pub const RESERVED_SUBREGIONS: usize = 4;

/// First allocatable address
pub const HEAP_START: u32 = SRAM_BASE + RESERVED_SUBREGIONS as u32 * BLOCK_SIZE;

/// One past the last allocatable address
pub const HEAP_END: u32 = SRAM_BASE + HEAP_REGIONS as u32 * REGION_SIZE;

/// Allocatable heap size in bytes
pub const HEAP_SIZE: u32 = HEAP_END - HEAP_START;

/// Number of blocks in the block table
pub const NUM_BLOCKS: usize = (HEAP_SIZE / BLOCK_SIZE) as usize;

/// Total subregion bits tracked by the access mask
pub const TOTAL_SUBREGIONS: usize = HEAP_REGIONS * SUBREGIONS_PER_REGION;

/// Largest single allocation: one full region
pub const MAX_ALLOCATION: usize = REGION_SIZE as usize;

// =============================================================================
// MPU
// =============================================================================

/// Regions needed: background, four heap regions, flash, peripherals
pub const MIN_MPU_REGIONS: u8 = 7;

/// Flash base (TM4C123GH6PM)
pub const FLASH_BASE: u32 = 0x0000_0000;

/// Flash size (TM4C123GH6PM)
pub const FLASH_SIZE: u32 = 256 * 1024;

/// Base of the private peripheral space
pub const PERIPHERAL_BASE: u32 = 0xE000_0000;

/// Size of the private peripheral space
pub const PERIPHERAL_SIZE: u32 = 512 * 1024 * 1024;

// =============================================================================
// Faults
// =============================================================================

/// MPU faults that may await deferred recovery at once
pub const MAX_OUTSTANDING_FAULTS: usize = 4;

/// Recovered faults remembered to catch a resumed process faulting again
pub const RECOVERED_FAULT_HISTORY: usize = 8;

// =============================================================================
// Logging
// =============================================================================

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Default number of entries kept by a log buffer
pub const DEFAULT_LOG_ENTRIES: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_layout() {
        assert_eq!(HEAP_START, 0x2000_1000);
        assert_eq!(HEAP_END, 0x2000_8000);
        assert_eq!(NUM_BLOCKS, 28);
        assert_eq!(TOTAL_SUBREGIONS, NUM_BLOCKS + RESERVED_SUBREGIONS);
        assert_eq!(MAX_ALLOCATION, 8192);
    }
}
