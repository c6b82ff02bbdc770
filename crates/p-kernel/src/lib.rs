// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Palisade RTOS memory-protection core
//!
//! Protected heap and protection-fault handling for a single-core
//! Cortex-M4F (TM4C123GH6PM) with an MPU:
//!
//! - **Geometry**: address / block / region / subregion translation
//! - **Mpu**: RBAR and RASR encoding
//! - **Protection**: the access mask and its mirror in the heap regions
//! - **Heap**: first-fit block allocator with per-block ownership
//! - **Fault**: two-stage MemManage responder and fatal fault reports
//! - **Arch**: register access and exception entry points (Cortex-M), or a
//!   host stub
//!
//! # Usage
//!
//! ```rust,ignore
//! use p_common::{KernelConfig, ProcessId};
//! use p_kernel::arch::CortexMpu;
//! use p_kernel::heap::HeapAllocator;
//!
//! let mpu = unsafe { CortexMpu::steal() };
//! let mut heap = HeapAllocator::new(mpu, || scheduler::current_pid());
//! p_kernel::init(&mut heap, &KernelConfig::DEFAULT).expect("MPU init failed");
//! p_kernel::arch::cortex_m::exceptions::install_responder(scheduler::current_pid);
//!
//! let buffer = heap.allocate(3000)?;
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(feature = "cortex-m"), forbid(unsafe_code))]
#![warn(missing_docs)]

pub mod arch;
pub mod fault;
pub mod geometry;
pub mod heap;
pub mod mpu;
pub mod process;
pub mod protection;
pub mod sim;

// Re-export commonly used types
pub use fault::{
    ExceptionFrame, FaultKind, FaultReport, FaultResponder, MemoryFault, Recovery, ResponderState,
    Violation,
};
pub use heap::{Block, BlockRecord, HeapAllocator, HeapDump};
pub use process::ProcessSource;
pub use protection::{AccessMask, SramProtection};

use arch::MpuRegisters;
use p_common::{KernelConfig, Result};

/// Kernel initialization
///
/// Programs the MPU through the allocator, then enables the configurable
/// fault exceptions so MPU violations reach the MemManage handler.
///
/// # Errors
/// Returns the allocator's init error; fault handlers stay disabled.
pub fn init<R: MpuRegisters, S: ProcessSource>(
    heap: &mut HeapAllocator<R, S>,
    config: &KernelConfig,
) -> Result<()> {
    heap.init(config)?;
    arch::enable_fault_handlers();
    Ok(())
}

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kernel build info
pub const BUILD_INFO: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " v",
    env!("CARGO_PKG_VERSION"),
    " - Palisade RTOS memory protection"
);
