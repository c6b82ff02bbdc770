// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Common types for Palisade RTOS

use core::fmt;

/// Process identifier handed out by the scheduler
///
/// The kernel core treats it as an opaque tag: it is stored as the owner of
/// heap blocks and printed in fault reports, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Process id used for the kernel itself
    pub const KERNEL: ProcessId = ProcessId(0);

    /// Create a new process id
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProcessId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "pid {}", self.0);
    }
}
