// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Heap geometry
//!
//! Translation between byte addresses, block-table indices, heap region
//! indices and global subregion bits. Block index `i` lives at
//! `HEAP_START + i * BLOCK_SIZE` and is tracked by global subregion bit
//! `i + RESERVED_SUBREGIONS`; every caller goes through these functions so
//! the offset is applied in exactly one place.

use p_common::constants::{
    BLOCK_SIZE, HEAP_END, HEAP_START, REGION_SIZE, RESERVED_SUBREGIONS, SRAM_BASE,
    SUBREGIONS_PER_REGION,
};

/// Block-table index of a block-aligned heap address
///
/// Returns `None` for addresses outside the heap or not on a block boundary.
#[must_use]
pub const fn block_index_of(address: u32) -> Option<usize> {
    if address < HEAP_START || address >= HEAP_END {
        return None;
    }
    let offset = address - HEAP_START;
    if offset % BLOCK_SIZE != 0 {
        return None;
    }
    Some((offset / BLOCK_SIZE) as usize)
}

/// Base address of block `index`
#[must_use]
pub const fn address_of(index: usize) -> u32 {
    HEAP_START + index as u32 * BLOCK_SIZE
}

/// Heap region (0..`HEAP_REGIONS`) containing block `index`
#[must_use]
pub const fn region_of(index: usize) -> usize {
    subregion_bit_of(index) / SUBREGIONS_PER_REGION
}

/// Global subregion bit of the subregion containing `address`
///
/// `address` must not be below `SRAM_BASE`.
#[must_use]
pub const fn subregion_bit(address: u32) -> usize {
    ((address - SRAM_BASE) / BLOCK_SIZE) as usize
}

/// Global subregion bit tracking block `index`
#[must_use]
pub const fn subregion_bit_of(index: usize) -> usize {
    index + RESERVED_SUBREGIONS
}

/// Blocks needed to hold `size` bytes
#[must_use]
pub const fn blocks_for(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE as usize)
}

/// Base address of heap region `region`
#[must_use]
pub const fn region_base(region: usize) -> u32 {
    SRAM_BASE + region as u32 * REGION_SIZE
}

/// Check whether `[address, address + size)` lies inside the heap
#[must_use]
pub const fn in_heap(address: u32, size: u32) -> bool {
    address >= HEAP_START && address < HEAP_END && size <= HEAP_END - address
}
