// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! ARM Cortex-M Exception Handlers
//!
//! - MemManage: first stage of the fault responder
//! - PendSV: deferred recovery, then the scheduler's own PendSV work
//! - BusFault, UsageFault, HardFault: report and halt
//!
//! The responder is installed once at boot with [`install_responder`].
//! Reports go to the hook set with [`set_report_hook`] (typically the
//! serial driver); confirmed violations go to the hook set with
//! [`set_violation_hook`] (the scheduler). Without a violation hook, or
//! when it answers [`Recovery::Halt`], the system halts.

use core::cell::{Cell, RefCell};
use core::ptr;

#[cfg(target_arch = "arm")]
use core::arch::global_asm;

use cortex_m::interrupt::{self, Mutex};
use p_common::ProcessId;

use super::scb;
use crate::arch::FaultRegisters;
use crate::fault::{
    diagnostic_report, ExceptionFrame, FaultKind, FaultReport, FaultResponder, MemoryFault,
    Recovery, Violation,
};

// ============================================================================
// Fault Status Registers
// ============================================================================

/// The SCB fault registers of the running core
#[derive(Debug, Default)]
pub struct ScbFaultRegisters {
    _private: (),
}

impl ScbFaultRegisters {
    /// Take the fault registers
    ///
    /// # Safety
    /// The caller must be the only writer of CFSR, SHCSR and ICSR.PENDSVSET.
    #[must_use]
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }

    fn read(address: u32) -> u32 {
        // SAFETY: Only called with the architecturally-defined SCB fault register addresses in
        // `scb`. Reads have no side effects. volatile reads are necessary as hardware updates
        // these registers asynchronously during faults.
        unsafe { ptr::read_volatile(address as *const u32) }
    }
}

impl FaultRegisters for ScbFaultRegisters {
    fn fault_status(&self) -> u32 {
        Self::read(scb::CFSR)
    }

    fn hard_fault_status(&self) -> u32 {
        Self::read(scb::HFSR)
    }

    fn mem_fault_address(&self) -> u32 {
        Self::read(scb::MMFAR)
    }

    fn bus_fault_address(&self) -> u32 {
        Self::read(scb::BFAR)
    }

    fn main_stack_pointer(&self) -> u32 {
        cortex_m::register::msp::read()
    }

    fn clear_fault_status(&mut self, bits: u32) {
        // SAFETY: CFSR bits are write-one-to-clear; writing `bits` clears exactly those flags.
        unsafe { ptr::write_volatile(scb::CFSR as *mut u32, bits) };
    }

    fn clear_mem_fault_pending(&mut self) {
        // SAFETY: Read-modify-write of SHCSR clearing only MEMFAULTPENDED. Runs inside the
        // MemManage handler, which is the only writer of this bit.
        unsafe {
            let shcsr = scb::SHCSR as *mut u32;
            let val = ptr::read_volatile(shcsr);
            ptr::write_volatile(shcsr, val & !scb::SHCSR_MEMFAULTPENDED);
        }
    }

    fn pend_deferred(&mut self) {
        // SAFETY: Writing PENDSVSET to ICSR (0xE000_ED04) is the standard mechanism to trigger
        // PendSV on Cortex-M. Other ICSR bits written as zero have no effect.
        unsafe { ptr::write_volatile(scb::ICSR as *mut u32, scb::ICSR_PENDSVSET) };
    }
}

// ============================================================================
// Installed Responder and Hooks
// ============================================================================

/// Responder type used by the exception handlers
pub type SystemResponder = FaultResponder<ScbFaultRegisters, fn() -> ProcessId>;

/// Receives every fault report
pub type ReportHook = fn(&FaultReport);

/// Decides the fate of every confirmed access violation
pub type ViolationHook = fn(&Violation) -> Recovery;

/// Scheduler work run at the end of PendSV
pub type DeferredHook = fn();

static RESPONDER: Mutex<RefCell<Option<SystemResponder>>> = Mutex::new(RefCell::new(None));
static REPORT_HOOK: Mutex<Cell<Option<ReportHook>>> = Mutex::new(Cell::new(None));
static VIOLATION_HOOK: Mutex<Cell<Option<ViolationHook>>> = Mutex::new(Cell::new(None));
static DEFERRED_HOOK: Mutex<Cell<Option<DeferredHook>>> = Mutex::new(Cell::new(None));

/// Install the fault responder
///
/// `current_process` is asked for the running process on every fault.
pub fn install_responder(current_process: fn() -> ProcessId) {
    // SAFETY: The installed responder becomes the only user of the SCB fault registers.
    let registers = unsafe { ScbFaultRegisters::steal() };
    let responder = FaultResponder::new(registers, current_process);
    interrupt::free(|cs| {
        RESPONDER.borrow(cs).replace(Some(responder));
    });
}

/// Run `f` on the installed responder, e.g. to drain its log
pub fn with_responder<R>(f: impl FnOnce(&mut SystemResponder) -> R) -> Option<R> {
    interrupt::free(|cs| RESPONDER.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Set the fault report sink
pub fn set_report_hook(hook: ReportHook) {
    interrupt::free(|cs| REPORT_HOOK.borrow(cs).set(Some(hook)));
}

/// Set the receiver of confirmed access violations
pub fn set_violation_hook(hook: ViolationHook) {
    interrupt::free(|cs| VIOLATION_HOOK.borrow(cs).set(Some(hook)));
}

/// Set the scheduler's PendSV work
pub fn set_deferred_hook(hook: DeferredHook) {
    interrupt::free(|cs| DEFERRED_HOOK.borrow(cs).set(Some(hook)));
}

fn emit(report: &FaultReport) {
    if let Some(hook) = interrupt::free(|cs| REPORT_HOOK.borrow(cs).get()) {
        hook(report);
    }
}

fn fatal(kind: FaultKind, frame: &ExceptionFrame, process_stack: u32) -> ! {
    let report = with_responder(|r| r.on_fatal(kind, frame, process_stack)).unwrap_or_else(|| {
        // SAFETY: Read-only use while halting; no responder owns the registers.
        let registers = unsafe { ScbFaultRegisters::steal() };
        diagnostic_report(kind, &registers, ProcessId::KERNEL, frame, process_stack)
    });
    emit(&report);
    super::halt()
}

// ============================================================================
// Exception Handlers
// ============================================================================

// MemManage Fault handler
//
// Returns to the faulting context; EXC_RETURN is kept on the stack across
// the call.
#[cfg(target_arch = "arm")]
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.MemManage_Handler",
    ".global MemManage_Handler",
    ".type MemManage_Handler, %function",
    ".thumb_func",
    "MemManage_Handler:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    push {{r4, lr}}",
    "    bl memmanage_handler_c",
    "    pop {{r4, pc}}",
    ".size MemManage_Handler, . - MemManage_Handler",
);

#[no_mangle]
extern "C" fn memmanage_handler_c(frame: *const ExceptionFrame) {
    // SAFETY: The frame pointer comes from the MemManage assembly trampoline, which takes it
    // from MSP or PSP (the stack that was active when the fault occurred). The hardware stacked
    // the eight words it points to.
    let frame = unsafe { &*frame };
    let process_stack = frame as *const ExceptionFrame as u32;

    match with_responder(|r| r.on_memory_fault(frame, process_stack)) {
        Some(MemoryFault::Reported(report)) => emit(&report),
        // Same instruction again before recovery ran
        Some(MemoryFault::Repeated) => {}
        Some(MemoryFault::Unrecoverable(report)) => {
            if let Some(report) = report {
                emit(&report);
            }
            super::halt()
        }
        None => fatal(FaultKind::MemManage, frame, process_stack),
    }
}

/// PendSV handler
///
/// Finishes outstanding MPU faults, then runs the scheduler's PendSV work.
#[no_mangle]
pub extern "C" fn PendSV_Handler() {
    let violations = with_responder(SystemResponder::on_deferred).unwrap_or_default();
    let scheduler = interrupt::free(|cs| VIOLATION_HOOK.borrow(cs).get());
    for violation in &violations {
        if Recovery::decide(scheduler, violation) == Recovery::Halt {
            super::halt();
        }
    }

    if let Some(hook) = interrupt::free(|cs| DEFERRED_HOOK.borrow(cs).get()) {
        hook();
    }
}

// Bus Fault handler
#[cfg(target_arch = "arm")]
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.BusFault_Handler",
    ".global BusFault_Handler",
    ".type BusFault_Handler, %function",
    ".thumb_func",
    "BusFault_Handler:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    bl busfault_handler_c",
    "1:  b 1b",
    ".size BusFault_Handler, . - BusFault_Handler",
);

#[no_mangle]
extern "C" fn busfault_handler_c(frame: *const ExceptionFrame) -> ! {
    // SAFETY: Same invariants as memmanage_handler_c.
    let frame = unsafe { &*frame };
    fatal(FaultKind::Bus, frame, frame as *const ExceptionFrame as u32)
}

// Usage Fault handler
#[cfg(target_arch = "arm")]
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.UsageFault_Handler",
    ".global UsageFault_Handler",
    ".type UsageFault_Handler, %function",
    ".thumb_func",
    "UsageFault_Handler:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    bl usagefault_handler_c",
    "1:  b 1b",
    ".size UsageFault_Handler, . - UsageFault_Handler",
);

#[no_mangle]
extern "C" fn usagefault_handler_c(frame: *const ExceptionFrame) -> ! {
    // SAFETY: Same invariants as memmanage_handler_c.
    let frame = unsafe { &*frame };
    fatal(FaultKind::Usage, frame, frame as *const ExceptionFrame as u32)
}

// Hard Fault handler
#[cfg(target_arch = "arm")]
global_asm!(
    ".syntax unified",
    ".thumb",
    ".section .text.HardFault_Handler",
    ".global HardFault_Handler",
    ".type HardFault_Handler, %function",
    ".thumb_func",
    "HardFault_Handler:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    bl hard_fault_handler_c",
    "1:  b 1b",
    ".size HardFault_Handler, . - HardFault_Handler",
);

#[no_mangle]
extern "C" fn hard_fault_handler_c(frame: *const ExceptionFrame) -> ! {
    // SAFETY: Same invariants as memmanage_handler_c.
    let frame = unsafe { &*frame };
    fatal(FaultKind::Hard, frame, frame as *const ExceptionFrame as u32)
}
