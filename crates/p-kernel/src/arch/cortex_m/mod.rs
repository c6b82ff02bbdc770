// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! ARM Cortex-M architecture support
//!
//! - MPU register access ([`mpu::CortexMpu`])
//! - Fault status access and the fault exception entry points
//!   ([`exceptions`])
//! - Critical sections and barriers

pub mod exceptions;
pub mod mpu;

use core::ptr;

// ============================================================================
// Cortex-M Core Register Addresses
// ============================================================================

/// System Control Block (SCB) base address
pub const SCB_BASE: u32 = 0xE000_ED00;

/// SCB registers
pub mod scb {
    /// Interrupt Control and State Register
    pub const ICSR: u32 = super::SCB_BASE + 0x04;
    /// System Handler Control and State Register
    pub const SHCSR: u32 = super::SCB_BASE + 0x24;
    /// Configurable Fault Status Register
    pub const CFSR: u32 = super::SCB_BASE + 0x28;
    /// Hard Fault Status Register
    pub const HFSR: u32 = super::SCB_BASE + 0x2C;
    /// MemManage Fault Address Register
    pub const MMFAR: u32 = super::SCB_BASE + 0x34;
    /// Bus Fault Address Register
    pub const BFAR: u32 = super::SCB_BASE + 0x38;

    /// ICSR bit: Set PendSV pending status
    pub const ICSR_PENDSVSET: u32 = 1 << 28;

    /// SHCSR bit: MemManage exception pending
    pub const SHCSR_MEMFAULTPENDED: u32 = 1 << 13;
    /// SHCSR bit: MemManage exception enable
    pub const SHCSR_MEMFAULTENA: u32 = 1 << 16;
    /// SHCSR bit: BusFault exception enable
    pub const SHCSR_BUSFAULTENA: u32 = 1 << 17;
    /// SHCSR bit: UsageFault exception enable
    pub const SHCSR_USGFAULTENA: u32 = 1 << 18;
}

// ============================================================================
// Core Functions
// ============================================================================

/// Run `f` with interrupts masked
#[inline]
pub fn critical<R>(f: impl FnOnce() -> R) -> R {
    cortex_m::interrupt::free(|_| f())
}

/// Data and instruction barriers after an MPU or SCB write
#[inline]
pub fn barrier() {
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Enable the MemManage, BusFault and UsageFault exceptions
///
/// Without this, every configurable fault escalates to HardFault.
pub fn enable_fault_handlers() {
    // SAFETY: SHCSR (0xE000_ED24) is an architecturally-defined SCB register. Read-modify-write
    // sets only the three enable bits. volatile accesses are required for MMIO.
    unsafe {
        let shcsr = scb::SHCSR as *mut u32;
        let val = ptr::read_volatile(shcsr);
        ptr::write_volatile(
            shcsr,
            val | scb::SHCSR_MEMFAULTENA | scb::SHCSR_BUSFAULTENA | scb::SHCSR_USGFAULTENA,
        );
    }
    barrier();
}

/// Stop forever with interrupts masked
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}
