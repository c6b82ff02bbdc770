// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! ARMv7-M MPU region encoding
//!
//! Builds the RBAR and RASR words for one MPU region. Nothing here touches
//! hardware; the words are handed to an [`MpuRegisters`] implementation.
//!
//! # RASR layout
//!
//! | Bits  | Field  | Meaning                                   |
//! |-------|--------|-------------------------------------------|
//! | 28    | XN     | instruction fetch disabled                |
//! | 26:24 | AP     | access permissions                        |
//! | 21:19 | TEX    | type extension                            |
//! | 18:16 | S,C,B  | shareable, cacheable, bufferable          |
//! | 15:8  | SRD    | subregion disable, one bit per eighth     |
//! | 5:1   | SIZE   | region is 2^(SIZE+1) bytes                |
//! | 0     | ENABLE | region enabled                            |
//!
//! [`MpuRegisters`]: crate::arch::MpuRegisters

use p_common::{Error, Result};

// MPU_RASR bits
const RASR_ENABLE: u32 = 1 << 0;
const RASR_SIZE_SHIFT: u32 = 1;
const RASR_SIZE_MASK: u32 = 0x1F << RASR_SIZE_SHIFT;
/// Subregion disable field shift
pub const RASR_SRD_SHIFT: u32 = 8;
/// Subregion disable field mask
pub const RASR_SRD_MASK: u32 = 0xFF << RASR_SRD_SHIFT;
const RASR_B: u32 = 1 << 16;
const RASR_C: u32 = 1 << 17;
const RASR_S: u32 = 1 << 18;
const RASR_TEX_SHIFT: u32 = 19;
const RASR_TEX_MASK: u32 = 0x7 << RASR_TEX_SHIFT;
const RASR_AP_SHIFT: u32 = 24;
const RASR_AP_MASK: u32 = 0x7 << RASR_AP_SHIFT;
const RASR_XN: u32 = 1 << 28;

/// Smallest region that can be split into subregions
const MIN_SUBREGION_REGION: u64 = 256;

/// Encoded region size (RASR.SIZE); the region spans 2^(code+1) bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegionSize(u8);

impl RegionSize {
    /// 32 bytes, the smallest region
    pub const MIN: Self = Self(4);
    /// One heap region
    pub const SIZE_8KB: Self = Self(12);
    /// The whole address space
    pub const SIZE_4GB: Self = Self(31);

    /// Wrap a raw SIZE field value (4..=31)
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        if code >= Self::MIN.0 && code <= Self::SIZE_4GB.0 {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Encode an exact power-of-two byte count
    ///
    /// # Errors
    /// `InvalidSize` unless `bytes` is a power of two between 32 B and 4 GiB.
    pub fn from_bytes(bytes: u64) -> Result<Self> {
        if !bytes.is_power_of_two() {
            return Err(Error::InvalidSize);
        }
        bytes
            .trailing_zeros()
            .checked_sub(1)
            .and_then(|code| u8::try_from(code).ok())
            .and_then(Self::from_code)
            .ok_or(Error::InvalidSize)
    }

    /// Raw SIZE field value
    #[must_use]
    pub const fn code(&self) -> u8 {
        self.0
    }

    /// Size in bytes
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        1 << (self.0 as u32 + 1)
    }
}

/// Access permissions (RASR.AP)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccessPermission {
    /// No access
    NoAccess = 0b000,
    /// Privileged RW only
    PrivRw = 0b001,
    /// Privileged RW, Unprivileged RO
    PrivRwUnprivRo = 0b010,
    /// Full access (Priv RW, Unpriv RW)
    FullAccess = 0b011,
    /// Privileged RO only
    PrivRo = 0b101,
    /// Read-only (Priv RO, Unpriv RO)
    ReadOnly = 0b110,
}

/// Memory type attributes (RASR.TEX, S, C, B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryAttributes {
    /// TEX field (type extension)
    pub tex: u8,
    /// Shareable
    pub shareable: bool,
    /// Cacheable
    pub cacheable: bool,
    /// Bufferable
    pub bufferable: bool,
}

impl MemoryAttributes {
    /// Strongly ordered, all attribute bits clear
    pub const STRONGLY_ORDERED: Self = Self {
        tex: 0,
        shareable: false,
        cacheable: false,
        bufferable: false,
    };

    /// Internal flash: normal, write-through
    pub const FLASH: Self = Self {
        tex: 0,
        shareable: false,
        cacheable: true,
        bufferable: false,
    };

    /// Internal SRAM: normal, shareable, write-through
    pub const SRAM: Self = Self {
        tex: 0,
        shareable: true,
        cacheable: true,
        bufferable: false,
    };

    /// Peripherals: device, shareable
    pub const DEVICE: Self = Self {
        tex: 0,
        shareable: true,
        cacheable: false,
        bufferable: true,
    };

    fn bits(self) -> u32 {
        let mut bits = (u32::from(self.tex) << RASR_TEX_SHIFT) & RASR_TEX_MASK;
        if self.shareable {
            bits |= RASR_S;
        }
        if self.cacheable {
            bits |= RASR_C;
        }
        if self.bufferable {
            bits |= RASR_B;
        }
        bits
    }
}

/// Everything needed to program one MPU region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// Region number (RNR)
    pub number: u8,
    /// Base address, aligned to `size`
    pub base: u32,
    /// Region size
    pub size: RegionSize,
    /// Access permissions
    pub access: AccessPermission,
    /// Memory type
    pub attributes: MemoryAttributes,
    /// Disable instruction fetch
    pub execute_never: bool,
    /// Subregion disable bits, bit n covers the n-th eighth of the region
    pub subregion_disable: u8,
    /// Region enabled
    pub enabled: bool,
}

impl RegionDescriptor {
    /// Enabled, execute-never region with no subregions disabled
    #[must_use]
    pub const fn new(number: u8, base: u32, size: RegionSize, access: AccessPermission) -> Self {
        Self {
            number,
            base,
            size,
            access,
            attributes: MemoryAttributes::STRONGLY_ORDERED,
            execute_never: true,
            subregion_disable: 0,
            enabled: true,
        }
    }

    /// Set memory attributes
    #[must_use]
    pub const fn with_attributes(mut self, attributes: MemoryAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set execute never flag
    #[must_use]
    pub const fn with_execute_never(mut self, xn: bool) -> Self {
        self.execute_never = xn;
        self
    }

    /// Set subregion disable mask
    #[must_use]
    pub const fn with_subregion_disable(mut self, srd: u8) -> Self {
        self.subregion_disable = srd;
        self
    }

    /// Check the descriptor against hardware rules
    ///
    /// # Errors
    /// - `InvalidRegion` if `number` is not below `region_count`
    /// - `InvalidAlignment` if `base` is not a multiple of the region size
    /// - `InvalidSize` if subregions are used on a region smaller than 256 B
    pub fn validate(&self, region_count: u8) -> Result<()> {
        if self.number >= region_count {
            return Err(Error::InvalidRegion);
        }
        if u64::from(self.base) % self.size.bytes() != 0 {
            return Err(Error::InvalidAlignment);
        }
        if self.subregion_disable != 0 && self.size.bytes() < MIN_SUBREGION_REGION {
            return Err(Error::InvalidSize);
        }
        Ok(())
    }

    /// RBAR value (address only; the region is chosen through RNR)
    #[must_use]
    pub fn rbar(&self) -> u32 {
        // 4 GiB does not fit in u32; its mask covers every address bit.
        let mask = u32::try_from(self.size.bytes() - 1).unwrap_or(u32::MAX);
        self.base & !mask
    }

    /// RASR value
    #[must_use]
    pub fn rasr(&self) -> u32 {
        let mut rasr = (u32::from(self.size.code()) << RASR_SIZE_SHIFT) & RASR_SIZE_MASK;
        if self.enabled {
            rasr |= RASR_ENABLE;
        }
        rasr |= (u32::from(self.subregion_disable) << RASR_SRD_SHIFT) & RASR_SRD_MASK;
        rasr |= self.attributes.bits();
        rasr |= ((self.access as u32) << RASR_AP_SHIFT) & RASR_AP_MASK;
        if self.execute_never {
            rasr |= RASR_XN;
        }
        rasr
    }
}

/// Extract the SRD field from a RASR value
#[must_use]
pub const fn srd_of(rasr: u32) -> u8 {
    ((rasr & RASR_SRD_MASK) >> RASR_SRD_SHIFT) as u8
}

/// Extract the AP field from a RASR value
#[must_use]
pub const fn ap_of(rasr: u32) -> u8 {
    ((rasr & RASR_AP_MASK) >> RASR_AP_SHIFT) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_size_from_bytes() {
        assert_eq!(RegionSize::from_bytes(32), Ok(RegionSize::MIN));
        assert_eq!(RegionSize::from_bytes(8192), Ok(RegionSize::SIZE_8KB));
        assert_eq!(RegionSize::from_bytes(1 << 32), Ok(RegionSize::SIZE_4GB));
        assert_eq!(RegionSize::from_bytes(256 * 1024).map(|s| s.code()), Ok(17));
        assert_eq!(RegionSize::from_bytes(3000), Err(Error::InvalidSize));
        assert_eq!(RegionSize::from_bytes(16), Err(Error::InvalidSize));
        assert_eq!(RegionSize::from_bytes(0), Err(Error::InvalidSize));
        assert_eq!(RegionSize::from_bytes(1), Err(Error::InvalidSize));
    }

    #[test]
    fn test_background_rule_encoding() {
        let bg = RegionDescriptor::new(0, 0, RegionSize::SIZE_4GB, AccessPermission::FullAccess);
        // enable | (31 << 1) | (0b011 << 24) | XN
        assert_eq!(bg.rasr(), 0x1300_003F);
        assert_eq!(bg.rbar(), 0);
    }

    #[test]
    fn test_heap_region_encoding() {
        let heap = RegionDescriptor::new(1, 0x2000_0000, RegionSize::SIZE_8KB, AccessPermission::PrivRw)
            .with_subregion_disable(0xF0);
        let rasr = heap.rasr();
        assert_eq!((rasr >> RASR_SIZE_SHIFT) & 0x1F, 12);
        assert_eq!(srd_of(rasr), 0xF0);
        assert_eq!(ap_of(rasr), 0b001);
        assert_ne!(rasr & RASR_XN, 0);
        assert_eq!(heap.rbar(), 0x2000_0000);
    }

    #[test]
    fn test_validate() {
        let ok = RegionDescriptor::new(2, 0x2000_2000, RegionSize::SIZE_8KB, AccessPermission::PrivRw);
        assert_eq!(ok.validate(8), Ok(()));
        assert_eq!(ok.validate(2), Err(Error::InvalidRegion));

        let misaligned = RegionDescriptor { base: 0x2000_1000, ..ok };
        assert_eq!(misaligned.validate(8), Err(Error::InvalidAlignment));

        let tiny = RegionDescriptor::new(3, 0, RegionSize::MIN, AccessPermission::PrivRw)
            .with_subregion_disable(1);
        assert_eq!(tiny.validate(8), Err(Error::InvalidSize));
    }
}
