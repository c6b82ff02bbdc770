// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Protection-fault responder
//!
//! A MemManage fault is handled in two stages:
//!
//! 1. **Faulted** (MemManage, high priority): capture the status byte, the
//!    fault address and the stacked registers, clear the pending flag and
//!    pend the deferred interrupt.
//! 2. **PendingRecovery** (PendSV, lowest priority): re-check the access
//!    violation flags, clear them and hand each [`Violation`] to the
//!    scheduler. Its [`Recovery`] decision defaults to halting.
//!
//! The responder never reclaims memory and never touches the block table.
//!
//! Bus, usage and hard faults are not recoverable: the architecture layer
//! builds a [`FaultReport`] with [`diagnostic_report`], emits it and halts.

use core::fmt;

use bitflags::bitflags;
use heapless::{Deque, Vec};
use p_common::constants::{MAX_OUTSTANDING_FAULTS, RECOVERED_FAULT_HISTORY};
use p_common::{log_debug, log_error, log_info, log_warn};
use p_common::{Error, LogBuffer, ProcessId};

use crate::arch::FaultRegisters;
use crate::process::ProcessSource;

const MODULE: &str = "fault";

/// CFSR.BFARVALID
const BFARVALID: u32 = 1 << 15;

bitflags! {
    /// MemManage Fault Status Register (CFSR bits 7:0)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemManageStatus: u8 {
        /// Instruction access violation
        const IACCVIOL = 1 << 0;
        /// Data access violation
        const DACCVIOL = 1 << 1;
        /// MemManage fault on exception return
        const MUNSTKERR = 1 << 3;
        /// MemManage fault on exception entry
        const MSTKERR = 1 << 4;
        /// MemManage fault during lazy FP state preservation
        const MLSPERR = 1 << 5;
        /// MMFAR holds the faulting address
        const MMARVALID = 1 << 7;
    }
}

impl MemManageStatus {
    /// Extract the MemManage byte from a CFSR value
    #[must_use]
    pub const fn from_cfsr(cfsr: u32) -> Self {
        Self::from_bits_truncate((cfsr & 0xFF) as u8)
    }

    /// Check if an instruction or data access violation is flagged
    #[must_use]
    pub const fn is_access_violation(self) -> bool {
        self.intersects(Self::IACCVIOL.union(Self::DACCVIOL))
    }
}

// ============================================================================
// Exception Frame
// ============================================================================

/// Exception frame pushed by hardware during exception entry
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionFrame {
    /// R0
    pub r0: u32,
    /// R1
    pub r1: u32,
    /// R2
    pub r2: u32,
    /// R3
    pub r3: u32,
    /// R12
    pub r12: u32,
    /// Link Register
    pub lr: u32,
    /// Program Counter (faulting instruction)
    pub pc: u32,
    /// Program Status Register
    pub xpsr: u32,
}

impl ExceptionFrame {
    /// Frame from the eight stacked words, in stacking order
    #[must_use]
    pub const fn from_words(words: [u32; 8]) -> Self {
        Self {
            r0: words[0],
            r1: words[1],
            r2: words[2],
            r3: words[3],
            r12: words[4],
            lr: words[5],
            pc: words[6],
            xpsr: words[7],
        }
    }
}

// ============================================================================
// Fault Report
// ============================================================================

/// Which exception caught the fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// MPU violation (recoverable)
    MemManage,
    /// Bus error
    Bus,
    /// Usage fault
    Usage,
    /// Hard fault
    Hard,
}

impl FaultKind {
    /// Name used in reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MemManage => "MPU",
            Self::Bus => "Bus",
            Self::Usage => "Usage",
            Self::Hard => "Hard",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register snapshot taken when a fault is caught
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultReport {
    /// Exception that caught the fault
    pub kind: FaultKind,
    /// Process running when the fault hit
    pub pid: ProcessId,
    /// Stacked registers
    pub frame: ExceptionFrame,
    /// Address of the stacked frame (PSP for a process fault)
    pub process_stack: u32,
    /// Main stack pointer
    pub main_stack: u32,
    /// Configurable Fault Status Register
    pub status: u32,
    /// HardFault Status Register
    pub hard_status: u32,
    /// Faulting data address, when the hardware latched one
    pub data_address: Option<u32>,
}

impl FaultReport {
    /// MemManage status byte
    #[must_use]
    pub const fn mem_manage_status(&self) -> MemManageStatus {
        MemManageStatus::from_cfsr(self.status)
    }

    /// Address of the offending instruction
    #[must_use]
    pub const fn offending_instruction(&self) -> u32 {
        self.frame.pc
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} fault in process {}", self.kind, self.pid)?;
        writeln!(f, "  {:<22}{:#010x}", "psp", self.process_stack)?;
        writeln!(f, "  {:<22}{:#010x}", "msp", self.main_stack)?;
        writeln!(f, "  {:<22}{:#04x}", "mfault flags", self.mem_manage_status().bits())?;
        if self.kind == FaultKind::Hard {
            writeln!(f, "  {:<22}{:#010x}", "hfsr", self.hard_status)?;
        }
        writeln!(f, "  {:<22}{:#010x}", "offending instruction", self.frame.pc)?;
        if let Some(address) = self.data_address {
            writeln!(f, "  {:<22}{:#010x}", "data address", address)?;
        }
        writeln!(f, "  process stack dump:")?;
        let frame = &self.frame;
        for (name, value) in [
            ("xpsr", frame.xpsr),
            ("pc", frame.pc),
            ("lr", frame.lr),
            ("r0", frame.r0),
            ("r1", frame.r1),
            ("r2", frame.r2),
            ("r3", frame.r3),
            ("r12", frame.r12),
        ] {
            writeln!(f, "  {name:<22}{value:#010x}")?;
        }
        Ok(())
    }
}

/// Capture a fault report from the fault registers
#[must_use]
pub fn diagnostic_report<H: FaultRegisters>(
    kind: FaultKind,
    registers: &H,
    pid: ProcessId,
    frame: &ExceptionFrame,
    process_stack: u32,
) -> FaultReport {
    let status = registers.fault_status();
    let mem_address = MemManageStatus::from_cfsr(status)
        .contains(MemManageStatus::MMARVALID)
        .then(|| registers.mem_fault_address());
    let bus_address = (status & BFARVALID != 0).then(|| registers.bus_fault_address());

    let data_address = match kind {
        FaultKind::MemManage => mem_address,
        FaultKind::Bus => bus_address,
        FaultKind::Hard => mem_address.or(bus_address),
        FaultKind::Usage => None,
    };

    FaultReport {
        kind,
        pid,
        frame: *frame,
        process_stack,
        main_stack: registers.main_stack_pointer(),
        status,
        hard_status: registers.hard_fault_status(),
        data_address,
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Responder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponderState {
    /// No fault outstanding
    #[default]
    Idle,
    /// MemManage handler is capturing diagnostics
    Faulted,
    /// Deferred interrupt pended, recovery not yet run
    PendingRecovery,
}

/// Outcome of the MemManage stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    /// First fault of this instruction; recovery pended
    Reported(FaultReport),
    /// Instruction already awaiting recovery; counted, not reported
    Repeated,
    /// The system must halt
    ///
    /// Carries the report unless the instruction was reported before.
    Unrecoverable(Option<FaultReport>),
}

impl MemoryFault {
    /// Report to emit, if any
    #[must_use]
    pub const fn report(&self) -> Option<&FaultReport> {
        match self {
            Self::Reported(report) | Self::Unrecoverable(Some(report)) => Some(report),
            Self::Repeated | Self::Unrecoverable(None) => None,
        }
    }
}

/// Scheduler decision for a confirmed violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recovery {
    /// Stop the system
    #[default]
    Halt,
    /// The scheduler has dealt with the process
    Resume,
}

impl Recovery {
    /// Decision for `violation`: the scheduler's, or `Halt` without one
    #[must_use]
    pub fn decide(scheduler: Option<fn(&Violation) -> Recovery>, violation: &Violation) -> Self {
        scheduler.map_or(Self::Halt, |decide| decide(violation))
    }
}

/// Confirmed access violation handed to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    /// Offending process
    pub pid: ProcessId,
    /// Offending instruction
    pub pc: u32,
    /// Faulting data address, if latched
    pub address: Option<u32>,
    /// Further faults of the same instruction while recovery was pending
    pub repeats: u32,
}

impl Violation {
    /// Error reported to the scheduler
    #[must_use]
    pub const fn error(&self) -> Error {
        Error::AccessViolation
    }
}

/// Violations confirmed by one deferred stage
pub type Violations = Vec<Violation, MAX_OUTSTANDING_FAULTS>;

/// Offending instruction of one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Site {
    pid: ProcessId,
    pc: u32,
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    site: Site,
    address: Option<u32>,
    repeats: u32,
}

/// Two-stage MemManage fault responder
///
/// Every offending instruction is reported once. Faults of distinct
/// instructions queue up until the deferred stage hands them all to the
/// scheduler; a full queue, or an instruction faulting again after its
/// violation was handed over, is unrecoverable.
pub struct FaultResponder<H: FaultRegisters, S: ProcessSource> {
    registers: H,
    processes: S,
    state: ResponderState,
    outstanding: Deque<Outstanding, MAX_OUTSTANDING_FAULTS>,
    recovered: Vec<Site, RECOVERED_FAULT_HISTORY>,
    reports: u32,
    suppressed: u32,
    last_report: Option<FaultReport>,
    log: LogBuffer,
}

impl<H: FaultRegisters, S: ProcessSource> FaultResponder<H, S> {
    /// Create an idle responder
    #[must_use]
    pub fn new(registers: H, processes: S) -> Self {
        Self {
            registers,
            processes,
            state: ResponderState::Idle,
            outstanding: Deque::new(),
            recovered: Vec::new(),
            reports: 0,
            suppressed: 0,
            last_report: None,
            log: LogBuffer::new(),
        }
    }

    /// MemManage stage
    ///
    /// `frame` is the stacked register frame and `process_stack` its
    /// address.
    pub fn on_memory_fault(&mut self, frame: &ExceptionFrame, process_stack: u32) -> MemoryFault {
        let pid = self.processes.current_process_id();
        let site = Site { pid, pc: frame.pc };

        if let Some(entry) = self.outstanding.iter_mut().find(|entry| entry.site == site) {
            entry.repeats += 1;
            self.suppressed += 1;
            self.registers.clear_mem_fault_pending();
            log_debug!(self.log, MODULE, "pid {} repeat fault at {:#010x}", pid, frame.pc);
            return MemoryFault::Repeated;
        }

        if self.recovered.contains(&site) {
            self.suppressed += 1;
            self.registers.clear_mem_fault_pending();
            log_error!(
                self.log,
                MODULE,
                "pid {} resumed and faulted again at {:#010x}",
                pid,
                frame.pc
            );
            return MemoryFault::Unrecoverable(None);
        }

        self.state = ResponderState::Faulted;
        let report =
            diagnostic_report(FaultKind::MemManage, &self.registers, pid, frame, process_stack);
        self.registers.clear_mem_fault_pending();
        self.reports += 1;
        self.last_report = Some(report);

        let queued = self.outstanding.push_back(Outstanding {
            site,
            address: report.data_address,
            repeats: 0,
        });
        if queued.is_err() {
            self.state = ResponderState::PendingRecovery;
            log_error!(
                self.log,
                MODULE,
                "pid {} fault at {:#010x}: {} faults already pending",
                pid,
                frame.pc,
                MAX_OUTSTANDING_FAULTS
            );
            return MemoryFault::Unrecoverable(Some(report));
        }

        self.registers.pend_deferred();
        self.state = ResponderState::PendingRecovery;

        log_error!(
            self.log,
            MODULE,
            "MPU fault in process {} at pc {:#010x} flags {:#04x}",
            pid,
            frame.pc,
            report.mem_manage_status().bits()
        );
        MemoryFault::Reported(report)
    }

    /// Deferred (PendSV) stage
    ///
    /// Returns every outstanding violation, oldest first, if the access
    /// violation flags are still set. Each returned violation is
    /// remembered so that its instruction cannot fault silently again.
    pub fn on_deferred(&mut self) -> Violations {
        let mut confirmed = Violations::new();
        if self.state != ResponderState::PendingRecovery {
            return confirmed;
        }
        self.state = ResponderState::Idle;

        let status = MemManageStatus::from_cfsr(self.registers.fault_status());
        if !status.is_access_violation() {
            while let Some(entry) = self.outstanding.pop_front() {
                log_info!(self.log, MODULE, "pid {} fault cleared before recovery", entry.site.pid);
            }
            return confirmed;
        }
        self.registers.clear_fault_status(u32::from(status.bits()));

        while let Some(entry) = self.outstanding.pop_front() {
            log_warn!(
                self.log,
                MODULE,
                "pid {} access violation confirmed, called from MPU",
                entry.site.pid
            );
            self.remember(entry.site);
            // Same capacity as the queue
            let _ = confirmed.push(Violation {
                pid: entry.site.pid,
                pc: entry.site.pc,
                address: entry.address,
                repeats: entry.repeats,
            });
        }
        confirmed
    }

    /// Forget the recovered violations of `pid`
    ///
    /// The scheduler calls this when it restarts the process under the
    /// same id.
    pub fn release_process(&mut self, pid: ProcessId) {
        self.recovered.retain(|site| site.pid != pid);
    }

    fn remember(&mut self, site: Site) {
        if self.recovered.is_full() {
            self.recovered.remove(0);
        }
        let _ = self.recovered.push(site);
    }

    /// Build and record the report for a bus, usage or hard fault
    pub fn on_fatal(
        &mut self,
        kind: FaultKind,
        frame: &ExceptionFrame,
        process_stack: u32,
    ) -> FaultReport {
        let pid = self.processes.current_process_id();
        let report = diagnostic_report(kind, &self.registers, pid, frame, process_stack);
        self.reports += 1;
        self.last_report = Some(report);
        log_error!(self.log, MODULE, "{} fault in process {} at pc {:#010x}", kind, pid, frame.pc);
        report
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ResponderState {
        self.state
    }

    /// Violations awaiting the deferred stage
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Most recent report
    #[must_use]
    pub const fn last_report(&self) -> Option<&FaultReport> {
        self.last_report.as_ref()
    }

    /// Reports produced so far
    #[must_use]
    pub const fn reports(&self) -> u32 {
        self.reports
    }

    /// Faults absorbed without a report
    #[must_use]
    pub const fn suppressed(&self) -> u32 {
        self.suppressed
    }

    /// Fault register access
    #[must_use]
    pub const fn registers(&self) -> &H {
        &self.registers
    }

    /// Fault register access, mutable
    pub fn registers_mut(&mut self) -> &mut H {
        &mut self.registers
    }

    /// Fault event log
    #[must_use]
    pub const fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Fault event log, for draining
    pub fn log_mut(&mut self) -> &mut LogBuffer {
        &mut self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimFaultRegisters;

    fn frame(pc: u32) -> ExceptionFrame {
        ExceptionFrame::from_words([1, 2, 3, 4, 12, 0x0800_0101, pc, 0x0100_0000])
    }

    fn responder(pid: u32) -> FaultResponder<SimFaultRegisters, impl ProcessSource> {
        FaultResponder::new(SimFaultRegisters::new(), move || ProcessId(pid))
    }

    #[test]
    fn test_status_flags() {
        let status = MemManageStatus::from_cfsr(0x0000_8282);
        assert!(status.contains(MemManageStatus::DACCVIOL | MemManageStatus::MMARVALID));
        assert!(status.is_access_violation());
        assert!(!MemManageStatus::MSTKERR.is_access_violation());
    }

    #[test]
    fn test_two_stage_recovery() {
        let mut responder = responder(3);
        responder
            .registers_mut()
            .inject_mem_fault(MemManageStatus::DACCVIOL.bits(), Some(0x2000_1400));

        let outcome = responder.on_memory_fault(&frame(0x1234), 0x2000_1FE0);
        let MemoryFault::Reported(report) = outcome else {
            panic!("expected a report, got {outcome:?}");
        };
        assert_eq!(report.pid, ProcessId(3));
        assert_eq!(report.data_address, Some(0x2000_1400));
        assert_eq!(responder.state(), ResponderState::PendingRecovery);
        assert!(!responder.registers().mem_fault_pending());

        assert!(responder.registers_mut().take_deferred());
        let violations = responder.on_deferred();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].pid, ProcessId(3));
        assert_eq!(violations[0].pc, 0x1234);
        assert_eq!(violations[0].error(), Error::AccessViolation);
        assert_eq!(responder.state(), ResponderState::Idle);
        assert_eq!(responder.registers().fault_status() & 0xFF, 0);
    }

    #[test]
    fn test_deferred_without_fault_ignored() {
        let mut responder = responder(3);
        assert!(responder.on_deferred().is_empty());
        assert_eq!(responder.reports(), 0);
    }

    #[test]
    fn test_flags_already_clear() {
        let mut responder = responder(5);
        responder.registers_mut().inject_mem_fault(MemManageStatus::IACCVIOL.bits(), None);
        responder.on_memory_fault(&frame(0x400), 0x2000_2000);
        responder.registers_mut().clear_fault_status(0xFF);

        assert!(responder.on_deferred().is_empty());
        assert_eq!(responder.state(), ResponderState::Idle);
        assert_eq!(responder.outstanding(), 0);
        assert!(responder.log().contains("cleared before recovery"));
    }

    #[test]
    fn test_resumed_instruction_not_reported_again() {
        let mut responder = responder(4);
        let daccviol = MemManageStatus::DACCVIOL.bits();

        responder.registers_mut().inject_mem_fault(daccviol, None);
        assert!(matches!(
            responder.on_memory_fault(&frame(0x1A2C), 0x2000_1FE0),
            MemoryFault::Reported(_)
        ));
        assert_eq!(responder.on_deferred().len(), 1);

        // Scheduler resumed the process and it ran the same instruction
        for _ in 0..2 {
            responder.registers_mut().inject_mem_fault(daccviol, None);
            assert_eq!(
                responder.on_memory_fault(&frame(0x1A2C), 0x2000_1FE0),
                MemoryFault::Unrecoverable(None)
            );
        }
        assert_eq!(responder.reports(), 1);
        assert_eq!(responder.suppressed(), 2);
        assert!(responder.log().contains("resumed and faulted again"));
    }

    #[test]
    fn test_release_process_forgets_recovered_faults() {
        let mut responder = responder(4);
        responder.registers_mut().inject_mem_fault(MemManageStatus::DACCVIOL.bits(), None);
        responder.on_memory_fault(&frame(0x1A2C), 0x2000_1FE0);
        assert_eq!(responder.on_deferred().len(), 1);

        responder.release_process(ProcessId(4));
        responder.registers_mut().inject_mem_fault(MemManageStatus::DACCVIOL.bits(), None);
        assert!(matches!(
            responder.on_memory_fault(&frame(0x1A2C), 0x2000_1FE0),
            MemoryFault::Reported(_)
        ));
        assert_eq!(responder.reports(), 2);
    }

    #[test]
    fn test_full_queue_unrecoverable() {
        let mut responder = responder(6);
        responder.registers_mut().inject_mem_fault(MemManageStatus::DACCVIOL.bits(), None);
        for pc in 0..MAX_OUTSTANDING_FAULTS as u32 {
            assert!(matches!(
                responder.on_memory_fault(&frame(0x100 + pc * 4), 0x2000_2000),
                MemoryFault::Reported(_)
            ));
        }
        assert_eq!(responder.outstanding(), MAX_OUTSTANDING_FAULTS);

        let outcome = responder.on_memory_fault(&frame(0x800), 0x2000_2000);
        assert!(matches!(outcome, MemoryFault::Unrecoverable(Some(_))));
        assert_eq!(outcome.report().map(|r| r.frame.pc), Some(0x800));
    }

    #[test]
    fn test_recovery_defaults_to_halt() {
        let violation = Violation { pid: ProcessId(3), pc: 0x100, address: None, repeats: 0 };
        assert_eq!(Recovery::default(), Recovery::Halt);
        assert_eq!(Recovery::decide(None, &violation), Recovery::Halt);

        let kill_and_resume: fn(&Violation) -> Recovery = |_| Recovery::Resume;
        assert_eq!(Recovery::decide(Some(kill_and_resume), &violation), Recovery::Resume);
    }

    #[test]
    fn test_fatal_report_reads_bfar() {
        let mut responder = responder(2);
        responder.registers_mut().inject_status(BFARVALID | (1 << 9), 0, 0x4000_0000);
        let report = responder.on_fatal(FaultKind::Bus, &frame(0x800), 0x2000_3000);
        assert_eq!(report.data_address, Some(0x4000_0000));
        assert_eq!(responder.state(), ResponderState::Idle);
    }

    #[test]
    fn test_report_display() {
        let mut regs = SimFaultRegisters::new();
        regs.inject_mem_fault(MemManageStatus::DACCVIOL.bits(), Some(0x2000_1400));
        regs.set_main_stack_pointer(0x2000_0F00);
        let report =
            diagnostic_report(FaultKind::MemManage, &regs, ProcessId(7), &frame(0x1234), 0x2000_1FE0);

        let text = format!("{report}");
        assert!(text.starts_with("MPU fault in process 7\n"));
        assert!(text.contains("  psp                   0x20001fe0\n"));
        assert!(text.contains("  mfault flags          0x82\n"));
        assert!(text.contains("  data address          0x20001400\n"));
        assert!(text.contains("  r12                   0x0000000c\n"));
        assert_eq!(text.lines().count(), 15);
    }
}
