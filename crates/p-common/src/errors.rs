// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Error types for Palisade RTOS
//!
//! A single `Copy` error enum covers the allocator, the access mask manager,
//! the fault responder and MPU programming. Every variant carries a stable
//! numeric code so it can be reported over a byte-oriented console.

use core::fmt;

/// Result type alias for Palisade operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for Palisade RTOS
///
/// Allocator and mask errors are recoverable: the operation that returned
/// them did not touch the block table, the access mask or the MPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Heap Errors (0x09xx)
    // =========================================================================
    /// Requested size is zero or larger than one MPU region
    TooLarge,
    /// No run of free blocks inside a single region is long enough
    OutOfMemory,
    /// Pointer is not the start of a block run inside the heap
    InvalidPointer,
    /// Block is free, or is owned by a different process
    NotOwner,
    /// Access window is not block-granular or leaves the heap
    BadWindow,
    /// A process touched memory it was not granted
    AccessViolation,

    // =========================================================================
    // MPU Errors (0x0Axx)
    // =========================================================================
    /// MPU is absent or has too few regions for the heap layout
    MpuNotPresent,
    /// Region number is outside the MPU's region count
    InvalidRegion,
    /// Region base address is not aligned to the region size
    InvalidAlignment,
    /// Region size is not a power of two in the 32 B..4 GiB range
    InvalidSize,
}

impl Error {
    /// Get the error code for this error
    ///
    /// - 0x09xx: heap, access mask and protection fault errors
    /// - 0x0Axx: MPU programming errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::TooLarge => 0x0901,
            Self::OutOfMemory => 0x0902,
            Self::InvalidPointer => 0x0903,
            Self::NotOwner => 0x0904,
            Self::BadWindow => 0x0905,
            Self::AccessViolation => 0x0906,

            Self::MpuNotPresent => 0x0A01,
            Self::InvalidRegion => 0x0A02,
            Self::InvalidAlignment => 0x0A03,
            Self::InvalidSize => 0x0A04,
        }
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::TooLarge => "allocation size out of range",
            Self::OutOfMemory => "out of heap memory",
            Self::InvalidPointer => "invalid heap pointer",
            Self::NotOwner => "block not owned by caller",
            Self::BadWindow => "bad access window",
            Self::AccessViolation => "memory access violation",
            Self::MpuNotPresent => "MPU not present",
            Self::InvalidRegion => "invalid MPU region",
            Self::InvalidAlignment => "MPU region misaligned",
            Self::InvalidSize => "invalid MPU region size",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_grouped() {
        assert_eq!(Error::TooLarge.code() >> 8, 0x09);
        assert_eq!(Error::AccessViolation.code() >> 8, 0x09);
        assert_eq!(Error::MpuNotPresent.code() >> 8, 0x0A);
        assert_eq!(Error::InvalidSize.code() >> 8, 0x0A);
    }
}
