// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! SRAM access mask manager
//!
//! Keeps one bit per heap subregion (4 reserved + 28 usable) and mirrors it
//! into the SRD fields of the four heap MPU regions.
//!
//! The heap regions are privileged RW only. A granted subregion is
//! *disabled* in its heap region, so accesses to it fall through to the
//! background rule (region 0), which gives unprivileged code RW access. An
//! ungranted subregion stays enabled and any unprivileged access to it
//! raises a MemManage fault.
//!
//! ```text
//!  mask bit  SRD bit  rule in force        unprivileged access
//!  --------  -------  -------------------  -------------------
//!     0         0     heap region (P-RW)   fault
//!     1         1     background (RW/RW)   allowed
//! ```

use core::fmt;

use p_common::constants::{BLOCK_SIZE, HEAP_REGIONS, MIN_MPU_REGIONS, SUBREGIONS_PER_REGION};
use p_common::{Error, MpuLayout, Result};

use crate::arch::MpuRegisters;
use crate::geometry;
use crate::mpu::{AccessPermission, MemoryAttributes, RegionDescriptor, RegionSize};

/// One bit per subregion over the four heap regions
///
/// Bit `8 * r + s` covers subregion `s` of heap region `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMask(u32);

impl AccessMask {
    /// No subregion granted
    pub const EMPTY: Self = Self(0);

    /// Wrap raw mask bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw mask bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether global subregion `bit` is granted
    #[must_use]
    pub const fn is_set(self, bit: usize) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    /// The eight bits belonging to heap region `region`
    #[must_use]
    pub const fn region_bits(self, region: usize) -> u8 {
        (self.0 >> (region * SUBREGIONS_PER_REGION)) as u8
    }

    /// Number of granted subregions
    #[must_use]
    pub const fn granted(self) -> u32 {
        self.0.count_ones()
    }

    fn set_range(&mut self, first: usize, count: usize) {
        self.0 |= Self::range(first, count);
    }

    fn clear_range(&mut self, first: usize, count: usize) {
        self.0 &= !Self::range(first, count);
    }

    fn range(first: usize, count: usize) -> u32 {
        (first..first + count)
            .filter(|&bit| bit < 32)
            .fold(0, |acc, bit| acc | (1 << bit))
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Owner of the heap MPU regions and the access mask mirror
pub struct SramProtection<R: MpuRegisters> {
    mpu: R,
    mask: AccessMask,
    heap_regions: [RegionDescriptor; HEAP_REGIONS],
}

impl<R: MpuRegisters> SramProtection<R> {
    /// Wrap the MPU. Nothing is written until [`Self::init_static_regions`].
    #[must_use]
    pub fn new(mpu: R) -> Self {
        Self {
            mpu,
            mask: AccessMask::EMPTY,
            heap_regions: heap_descriptors(&MpuLayout::DEFAULT),
        }
    }

    /// Program the background, flash, peripheral and heap regions and
    /// enable the MPU with an empty mask
    ///
    /// # Errors
    /// - `MpuNotPresent` if the part has no MPU or too few regions
    /// - `InvalidRegion`, `InvalidAlignment`, `InvalidSize` if `layout` does
    ///   not describe regions the hardware can hold
    pub fn init_static_regions(&mut self, layout: &MpuLayout) -> Result<()> {
        let count = self.mpu.region_count();
        if count < MIN_MPU_REGIONS {
            return Err(Error::MpuNotPresent);
        }

        let background = RegionDescriptor::new(
            layout.background_region,
            0,
            RegionSize::SIZE_4GB,
            AccessPermission::FullAccess,
        );
        let flash = RegionDescriptor::new(
            layout.flash_region,
            layout.flash_base,
            RegionSize::from_bytes(u64::from(layout.flash_size))?,
            AccessPermission::ReadOnly,
        )
        .with_attributes(MemoryAttributes::FLASH)
        .with_execute_never(false);
        let peripherals = RegionDescriptor::new(
            layout.peripheral_region,
            layout.peripheral_base,
            RegionSize::from_bytes(u64::from(layout.peripheral_size))?,
            AccessPermission::PrivRw,
        )
        .with_attributes(MemoryAttributes::DEVICE);
        let heap = heap_descriptors(layout);

        // Validate everything before the first register write.
        for region in [&background, &flash, &peripherals].into_iter().chain(heap.iter()) {
            region.validate(count)?;
        }

        self.mpu.write_region(&background);
        self.mpu.write_region(&flash);
        self.mpu.write_region(&peripherals);
        for region in &heap {
            self.mpu.write_region(region);
        }

        self.heap_regions = heap;
        self.mask = AccessMask::EMPTY;
        self.apply();
        self.mpu.enable(layout.privileged_default_map);
        Ok(())
    }

    /// Give unprivileged code RW access to `[address, address + size)`
    ///
    /// # Errors
    /// `BadWindow` if the window is empty, not block-granular or not inside
    /// the heap. The mask is unchanged.
    pub fn grant(&mut self, address: u32, size: u32) -> Result<()> {
        let (first, count) = window(address, size)?;
        self.mask.set_range(first, count);
        self.apply();
        Ok(())
    }

    /// Take unprivileged access to `[address, address + size)` away
    ///
    /// # Errors
    /// `BadWindow` under the same conditions as [`Self::grant`].
    pub fn revoke(&mut self, address: u32, size: u32) -> Result<()> {
        let (first, count) = window(address, size)?;
        self.mask.clear_range(first, count);
        self.apply();
        Ok(())
    }

    /// Write the mask into the SRD field of each heap region
    pub fn apply(&mut self) {
        for (index, region) in self.heap_regions.iter().enumerate() {
            let rasr = region
                .with_subregion_disable(self.mask.region_bits(index))
                .rasr();
            self.mpu.select_region(region.number);
            self.mpu.set_attributes(rasr);
        }
    }

    /// Current mask
    #[must_use]
    pub const fn mask(&self) -> AccessMask {
        self.mask
    }

    /// MPU register access
    #[must_use]
    pub const fn registers(&self) -> &R {
        &self.mpu
    }

    /// MPU region numbers of the heap regions, lowest address first
    #[must_use]
    pub fn heap_region_numbers(&self) -> [u8; HEAP_REGIONS] {
        self.heap_regions.map(|region| region.number)
    }
}

/// Heap region descriptors for `layout`
fn heap_descriptors(layout: &MpuLayout) -> [RegionDescriptor; HEAP_REGIONS] {
    core::array::from_fn(|index| {
        RegionDescriptor::new(
            layout.heap_regions[index],
            geometry::region_base(index),
            RegionSize::SIZE_8KB,
            AccessPermission::PrivRw,
        )
        .with_attributes(MemoryAttributes::SRAM)
    })
}

/// Validate a grant/revoke window and convert it to a bit range
fn window(address: u32, size: u32) -> Result<(usize, usize)> {
    if size == 0 || size % BLOCK_SIZE != 0 || !geometry::in_heap(address, size) {
        return Err(Error::BadWindow);
    }
    let index = geometry::block_index_of(address).ok_or(Error::BadWindow)?;
    Ok((geometry::subregion_bit_of(index), (size / BLOCK_SIZE) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpu::ap_of;
    use crate::sim::RecordingMpu;
    use p_common::constants::{HEAP_END, HEAP_START};

    fn protection() -> SramProtection<RecordingMpu> {
        let mut prot = SramProtection::new(RecordingMpu::new(8));
        prot.init_static_regions(&MpuLayout::DEFAULT).unwrap();
        prot
    }

    #[test]
    fn test_static_regions() {
        let prot = protection();
        let mpu = prot.registers();

        assert!(mpu.is_enabled());
        assert!(mpu.privileged_default_map());
        assert_eq!(ap_of(mpu.attributes(0)), AccessPermission::FullAccess as u8);
        assert_eq!(ap_of(mpu.attributes(5)), AccessPermission::ReadOnly as u8);
        assert_eq!(ap_of(mpu.attributes(6)), AccessPermission::PrivRw as u8);
        assert_eq!(mpu.base(6), 0xE000_0000);
        for (index, region) in [1u8, 2, 3, 4].into_iter().enumerate() {
            assert_eq!(mpu.base(region), geometry::region_base(index));
            assert_eq!(ap_of(mpu.attributes(region)), AccessPermission::PrivRw as u8);
            assert_eq!(mpu.subregion_disable(region), 0);
        }
    }

    #[test]
    fn test_no_mpu() {
        let mut prot = SramProtection::new(RecordingMpu::absent());
        assert_eq!(prot.init_static_regions(&MpuLayout::DEFAULT), Err(Error::MpuNotPresent));
        assert!(!prot.registers().is_enabled());
    }

    #[test]
    fn test_bad_layout_rejected_before_writes() {
        let mut prot = SramProtection::new(RecordingMpu::new(8));
        let layout = MpuLayout {
            flash_size: 300 * 1024,
            ..MpuLayout::DEFAULT
        };
        assert_eq!(prot.init_static_regions(&layout), Err(Error::InvalidSize));
        assert_eq!(prot.registers().writes(), 0);
    }

    #[test]
    fn test_grant_sets_region_bits() {
        let mut prot = protection();
        prot.grant(HEAP_START, 1024).unwrap();
        assert_eq!(prot.mask().bits(), 1 << 4);
        assert_eq!(prot.registers().subregion_disable(1), 0b0001_0000);

        prot.grant(0x2000_2000, 2048).unwrap();
        assert_eq!(prot.mask().region_bits(1), 0b11);
        assert_eq!(prot.registers().subregion_disable(2), 0b11);
    }

    #[test]
    fn test_grant_then_revoke_restores_mask() {
        let mut prot = protection();
        prot.grant(0x2000_4400, 3072).unwrap();
        let before = prot.mask();

        prot.grant(0x2000_6000, 8192).unwrap();
        prot.revoke(0x2000_6000, 8192).unwrap();

        assert_eq!(prot.mask(), before);
        assert_eq!(prot.registers().subregion_disable(4), 0);
    }

    #[test]
    fn test_bad_windows() {
        let mut prot = protection();
        let cases = [
            (HEAP_START, 0),
            (HEAP_START, 1000),
            (HEAP_START + 512, 1024),
            (0x2000_0000, 1024),
            (HEAP_END - 1024, 2048),
            (HEAP_END, 1024),
        ];
        for (address, size) in cases {
            assert_eq!(prot.grant(address, size), Err(Error::BadWindow));
            assert_eq!(prot.revoke(address, size), Err(Error::BadWindow));
        }
        assert_eq!(prot.mask(), AccessMask::EMPTY);
    }

    #[test]
    fn test_reserved_bits_never_set() {
        let mut prot = protection();
        prot.grant(HEAP_START, HEAP_END - HEAP_START).unwrap();
        assert_eq!(prot.mask().bits() & 0xF, 0);
        assert_eq!(prot.mask().granted(), 28);
    }

    #[test]
    fn test_mask_display() {
        assert_eq!(format!("{}", AccessMask::from_bits(0xF0)), "0x000000f0");
    }
}
