// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Protected block heap
//!
//! The heap is a table of 1 KiB blocks. An allocation is a run of
//! contiguous free blocks inside one 8 KiB region, handed to the calling
//! process; the run is then granted in the access mask so only unprivileged
//! code of that process (and the kernel) touches it.
//!
//! The block table is the ground truth. After every successful `allocate`
//! or `free`, a block's mask bit equals its `allocated` flag.

use core::fmt;

use p_common::constants::{BLOCK_SIZE, MAX_ALLOCATION, NUM_BLOCKS};
use p_common::{log_debug, log_error, log_info, log_warn};
use p_common::{Error, KernelConfig, LogBuffer, ProcessId, Result};

use crate::arch::{self, MpuRegisters};
use crate::geometry;
use crate::process::ProcessSource;
use crate::protection::{AccessMask, SramProtection};

const MODULE: &str = "heap";

/// One entry of the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    /// Block belongs to a live allocation
    pub allocated: bool,
    /// Owning process, `None` when free
    pub owner: Option<ProcessId>,
    /// Block count of the allocation, stored on every block of the run
    pub run_length: u8,
    /// First block of its run
    pub head: bool,
}

impl Block {
    /// Unallocated block
    pub const FREE: Self = Self {
        allocated: false,
        owner: None,
        run_length: 0,
        head: false,
    };
}

/// Snapshot of one block for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Table index
    pub index: usize,
    /// Base address
    pub address: u32,
    /// Heap region (`0..HEAP_REGIONS`)
    pub region: usize,
    /// Allocation state
    pub allocated: bool,
    /// Owning process
    pub owner: Option<ProcessId>,
    /// Blocks in the owning run, 0 when free
    pub run_length: u8,
}

/// Ordered snapshot of the whole block table
#[derive(Debug, Clone)]
pub struct HeapDump {
    records: [BlockRecord; NUM_BLOCKS],
}

impl HeapDump {
    /// Iterate over the records, lowest address first
    pub fn iter(&self) -> impl Iterator<Item = &BlockRecord> + '_ {
        self.records.iter()
    }

    /// Record of block `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BlockRecord> {
        self.records.get(index)
    }

    /// Number of records
    #[must_use]
    pub const fn len(&self) -> usize {
        NUM_BLOCKS
    }

    /// Always false: the table has a fixed size
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl<'a> IntoIterator for &'a HeapDump {
    type Item = &'a BlockRecord;
    type IntoIter = core::slice::Iter<'a, BlockRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for HeapDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HEAP BLOCK ALLOCATIONS")?;
        writeln!(f, " BLOCK |  ADDRESS   | REGION | ALLOC | SIZE | OWNER")?;
        for record in self {
            write!(
                f,
                " {:>5} | {:#010x} | {:>6} | {:>5} | {:>4} | ",
                record.index,
                record.address,
                record.region,
                u8::from(record.allocated),
                record.run_length
            )?;
            match record.owner {
                Some(pid) => writeln!(f, "{pid:>5}")?,
                None => writeln!(f, "{:>5}", "-")?,
            }
        }
        Ok(())
    }
}

/// First-fit block allocator over the protected heap
pub struct HeapAllocator<R: MpuRegisters, S: ProcessSource> {
    table: [Block; NUM_BLOCKS],
    protection: SramProtection<R>,
    processes: S,
    log: LogBuffer,
}

impl<R: MpuRegisters, S: ProcessSource> HeapAllocator<R, S> {
    /// Create an allocator with every block free
    ///
    /// The MPU is left untouched until [`Self::init`].
    #[must_use]
    pub fn new(mpu: R, processes: S) -> Self {
        Self {
            table: [Block::FREE; NUM_BLOCKS],
            protection: SramProtection::new(mpu),
            processes,
            log: LogBuffer::new(),
        }
    }

    /// Program the MPU and reset the block table
    ///
    /// # Errors
    /// `MpuNotPresent` if the part has no usable MPU; the layout errors of
    /// [`SramProtection::init_static_regions`] otherwise.
    pub fn init(&mut self, config: &KernelConfig) -> Result<()> {
        self.log.set_min_level(config.log_level);
        self.table = [Block::FREE; NUM_BLOCKS];

        let protection = &mut self.protection;
        if let Err(err) = arch::critical(|| protection.init_static_regions(&config.mpu)) {
            log_error!(self.log, MODULE, "MPU init failed: {}", err);
            return Err(err);
        }

        log_info!(
            self.log,
            MODULE,
            "{} blocks of {} bytes, {} MPU regions",
            NUM_BLOCKS,
            BLOCK_SIZE,
            self.protection.registers().region_count()
        );
        Ok(())
    }

    /// Allocate `size` bytes for the current process
    ///
    /// Returns the base address of a block-aligned run of
    /// `ceil(size / 1024)` blocks that lies within one region.
    ///
    /// # Errors
    /// - `TooLarge` if `size` is 0 or more than one region
    /// - `OutOfMemory` if no suitable run is free
    pub fn allocate(&mut self, size: usize) -> Result<u32> {
        let pid = self.processes.current_process_id();
        if size == 0 || size > MAX_ALLOCATION {
            return Err(self.allocate_failed(pid, size, Error::TooLarge));
        }

        let blocks = geometry::blocks_for(size);
        let Some(first) = self.find_run(blocks) else {
            return Err(self.allocate_failed(pid, size, Error::OutOfMemory));
        };

        let address = geometry::address_of(first);
        if let Err(err) = arch::critical(|| self.claim(first, blocks, pid)) {
            return Err(self.allocate_failed(pid, size, err));
        }

        log_debug!(
            self.log,
            MODULE,
            "pid {} allocated {} blocks at {:#010x}",
            pid,
            blocks,
            address
        );
        Ok(address)
    }

    /// Release the run starting at `address`
    ///
    /// # Errors
    /// - `InvalidPointer` if `address` is not the start of a block in the
    ///   heap, or points into the middle of a run
    /// - `NotOwner` if the block is free or belongs to another process
    pub fn free(&mut self, address: u32) -> Result<()> {
        let pid = self.processes.current_process_id();
        let Some(index) = geometry::block_index_of(address) else {
            return Err(self.free_failed(pid, address, Error::InvalidPointer));
        };

        let block = self.table[index];
        if !block.allocated || block.owner != Some(pid) {
            return Err(self.free_failed(pid, address, Error::NotOwner));
        }
        if !block.head {
            return Err(self.free_failed(pid, address, Error::InvalidPointer));
        }

        let blocks = usize::from(block.run_length);
        if let Err(err) = arch::critical(|| self.release(index, blocks)) {
            return Err(self.free_failed(pid, address, err));
        }

        log_debug!(
            self.log,
            MODULE,
            "pid {} freed {} blocks at {:#010x}",
            pid,
            blocks,
            address
        );
        Ok(())
    }

    /// Snapshot of the block table
    #[must_use]
    pub fn dump(&self) -> HeapDump {
        HeapDump {
            records: core::array::from_fn(|index| {
                let block = &self.table[index];
                BlockRecord {
                    index,
                    address: geometry::address_of(index),
                    region: geometry::region_of(index),
                    allocated: block.allocated,
                    owner: block.owner,
                    run_length: block.run_length,
                }
            }),
        }
    }

    /// Number of free blocks
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.table.iter().filter(|b| !b.allocated).count()
    }

    /// Longest run of free blocks that does not cross a region boundary
    #[must_use]
    pub fn largest_free_run(&self) -> usize {
        let mut best = 0;
        let mut index = 0;
        while index < NUM_BLOCKS {
            let run = self.free_run_at(index, NUM_BLOCKS);
            best = best.max(run);
            index += run.max(1);
        }
        best
    }

    /// Current access mask
    #[must_use]
    pub fn mask(&self) -> AccessMask {
        self.protection.mask()
    }

    /// Block table entry `index`
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.table.get(index)
    }

    /// Access mask manager
    #[must_use]
    pub const fn protection(&self) -> &SramProtection<R> {
        &self.protection
    }

    /// Allocation event log
    #[must_use]
    pub const fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Allocation event log, for draining
    pub fn log_mut(&mut self) -> &mut LogBuffer {
        &mut self.log
    }

    /// First run of `blocks` free blocks inside one region
    ///
    /// A rejected candidate run is skipped as a whole.
    fn find_run(&self, blocks: usize) -> Option<usize> {
        let mut index = 0;
        while index < NUM_BLOCKS {
            let run = self.free_run_at(index, blocks);
            if run == blocks {
                return Some(index);
            }
            index += run.max(1);
        }
        None
    }

    /// Free blocks from `index` onwards in the same region, capped at `limit`
    fn free_run_at(&self, index: usize, limit: usize) -> usize {
        let region = geometry::region_of(index);
        (index..NUM_BLOCKS)
            .take(limit)
            .take_while(|&i| !self.table[i].allocated && geometry::region_of(i) == region)
            .count()
    }

    fn claim(&mut self, first: usize, blocks: usize, pid: ProcessId) -> Result<()> {
        let size = blocks as u32 * BLOCK_SIZE;
        self.protection.grant(geometry::address_of(first), size)?;
        let run_length = u8::try_from(blocks).map_err(|_| Error::TooLarge)?;
        for (offset, block) in self.table[first..first + blocks].iter_mut().enumerate() {
            *block = Block {
                allocated: true,
                owner: Some(pid),
                run_length,
                head: offset == 0,
            };
        }
        Ok(())
    }

    fn release(&mut self, first: usize, blocks: usize) -> Result<()> {
        let size = blocks as u32 * BLOCK_SIZE;
        self.protection.revoke(geometry::address_of(first), size)?;
        self.table[first..first + blocks].fill(Block::FREE);
        Ok(())
    }

    fn allocate_failed(&mut self, pid: ProcessId, size: usize, err: Error) -> Error {
        log_warn!(self.log, MODULE, "pid {} allocate {} bytes: {}", pid, size, err);
        err
    }

    fn free_failed(&mut self, pid: ProcessId, address: u32, err: Error) -> Error {
        log_warn!(self.log, MODULE, "pid {} free {:#010x}: {}", pid, address, err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingMpu;
    use core::cell::Cell;
    use p_common::constants::HEAP_START;

    fn allocator(pid: &Cell<u32>) -> HeapAllocator<RecordingMpu, impl ProcessSource + '_> {
        let mut heap = HeapAllocator::new(RecordingMpu::new(8), move || ProcessId(pid.get()));
        heap.init(&KernelConfig::DEFAULT).unwrap();
        heap
    }

    #[test]
    fn test_first_fit_from_heap_start() {
        let pid = Cell::new(3);
        let mut heap = allocator(&pid);
        assert_eq!(heap.allocate(1), Ok(HEAP_START));
        assert_eq!(heap.allocate(1024), Ok(HEAP_START + 1024));
    }

    #[test]
    fn test_run_does_not_cross_region() {
        let pid = Cell::new(3);
        let mut heap = allocator(&pid);
        // Region 0 holds four blocks; five must start in region 1.
        assert_eq!(heap.allocate(5 * 1024), Ok(0x2000_2000));
        // The four blocks of region 0 are still free.
        assert_eq!(heap.allocate(4 * 1024), Ok(HEAP_START));
    }

    #[test]
    fn test_rejected_run_skipped() {
        let pid = Cell::new(3);
        let mut heap = allocator(&pid);
        let a = heap.allocate(1024).unwrap();
        heap.allocate(1024).unwrap();
        heap.free(a).unwrap();
        // Block 0 alone is too short; the search resumes past block 1.
        assert_eq!(heap.allocate(2048), Ok(HEAP_START + 2 * 1024));
    }

    #[test]
    fn test_free_mid_run_rejected() {
        let pid = Cell::new(3);
        let mut heap = allocator(&pid);
        let base = heap.allocate(3 * 1024).unwrap();
        assert_eq!(heap.free(base + 1024), Err(Error::InvalidPointer));
        assert_eq!(heap.block(1).map(|b| b.allocated), Some(true));
        assert_eq!(heap.free(base), Ok(()));
    }

    #[test]
    fn test_failures_logged() {
        let pid = Cell::new(9);
        let mut heap = allocator(&pid);
        assert_eq!(heap.allocate(0), Err(Error::TooLarge));
        assert_eq!(heap.free(0x2000_1001), Err(Error::InvalidPointer));
        assert!(heap.log().contains("pid 9 allocate 0 bytes"));
        assert!(heap.log().contains("pid 9 free 0x20001001"));
    }

    #[test]
    fn test_largest_free_run() {
        let pid = Cell::new(1);
        let mut heap = allocator(&pid);
        assert_eq!(heap.largest_free_run(), 8);
        for _ in 0..3 {
            heap.allocate(8192).unwrap();
        }
        assert_eq!(heap.largest_free_run(), 4);
        assert_eq!(heap.free_blocks(), 4);
    }

    #[test]
    fn test_dump_display() {
        let pid = Cell::new(3);
        let mut heap = allocator(&pid);
        heap.allocate(2048).unwrap();

        let text = format!("{}", heap.dump());
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("HEAP BLOCK ALLOCATIONS"));
        lines.next();
        assert_eq!(lines.next(), Some("     0 | 0x20001000 |      0 |     1 |    2 |     3"));
        assert_eq!(text.lines().count(), NUM_BLOCKS + 2);
        assert!(text.ends_with("    27 | 0x20007c00 |      3 |     0 |    0 |     -\n"));
    }

    #[test]
    fn test_dump_regions_cover_heap_regions() {
        use p_common::constants::HEAP_REGIONS;

        let pid = Cell::new(3);
        let heap = allocator(&pid);
        let dump = heap.dump();
        assert!(dump.iter().all(|record| record.region < HEAP_REGIONS));
        assert_eq!(dump.get(0).map(|record| record.region), Some(0));
        assert_eq!(dump.get(NUM_BLOCKS - 1).map(|record| record.region), Some(HEAP_REGIONS - 1));
    }
}
