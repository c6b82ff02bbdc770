// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Link to the scheduler

use p_common::ProcessId;

/// Supplies the identifier of the process currently running
///
/// The scheduler lives outside this crate; the allocator asks it who is
/// calling and the fault responder asks it who faulted.
pub trait ProcessSource {
    /// Identifier of the running process
    fn current_process_id(&self) -> ProcessId;
}

impl<F> ProcessSource for F
where
    F: Fn() -> ProcessId,
{
    fn current_process_id(&self) -> ProcessId {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_closure_source_follows_scheduler() {
        let running = Cell::new(ProcessId::new(3));
        let source = || running.get();
        assert_eq!(source.current_process_id(), ProcessId::new(3));

        running.set(ProcessId::new(7));
        assert_eq!(source.current_process_id(), ProcessId::new(7));
    }
}
