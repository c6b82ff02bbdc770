// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Stub implementations for when no architecture is selected.
//!
//! These allow the code to compile for testing on host platforms.

/// Run `f` as a critical section (no interrupts to mask on the host)
#[inline]
pub fn critical<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Enable the configurable fault exceptions (no-op on stub)
pub fn enable_fault_handlers() {}

/// Stop forever
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
