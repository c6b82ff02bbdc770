// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Logging infrastructure for Palisade RTOS
//!
//! Kernel components record reports into a fixed-capacity ring of log
//! entries. Nothing is written to a device from here: the serial driver (or
//! the shell) drains the ring with [`LogBuffer::drain_into`] whenever it
//! gets the chance. When the ring is full the oldest entry is dropped and
//! counted.

use core::fmt::{self, Write};
use heapless::{Deque, String};

use crate::constants::{DEFAULT_LOG_ENTRIES, MAX_LOG_MESSAGE_LEN};

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that require immediate attention
    Error = 0,
    /// Warnings about potential issues
    Warn = 1,
    /// Informational messages
    Info = 2,
    /// Debug messages (development only)
    Debug = 3,
    /// Trace messages (very verbose, development only)
    Trace = 4,
}

impl LogLevel {
    /// Get the log level name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Get a short prefix for the log level
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
            Self::Trace => 'T',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LogLevel {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// One recorded report
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Position of this entry in the buffer's history
    pub sequence: u32,
    /// Component that produced the entry
    pub module: &'static str,
    /// Message text, truncated to [`MAX_LOG_MESSAGE_LEN`]
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:04}] {} [{}] {}",
            self.sequence,
            self.level.prefix(),
            self.module,
            self.message
        )
    }
}

/// Fixed-capacity ring of log entries
pub struct LogBuffer<const N: usize = DEFAULT_LOG_ENTRIES> {
    entries: Deque<LogEntry, N>,
    sequence: u32,
    dropped: u32,
    min_level: LogLevel,
}

impl<const N: usize> LogBuffer<N> {
    /// Create an empty buffer recording `Info` and above
    #[must_use]
    pub const fn new() -> Self {
        Self::with_level(LogLevel::Info)
    }

    /// Create an empty buffer with the given minimum level
    #[must_use]
    pub const fn with_level(min_level: LogLevel) -> Self {
        Self {
            entries: Deque::new(),
            sequence: 0,
            dropped: 0,
            min_level,
        }
    }

    /// Set the minimum log level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Get the minimum log level
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Check if a log level would be recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Record a formatted message
    ///
    /// Text past [`MAX_LOG_MESSAGE_LEN`] is cut off. If the ring is full the
    /// oldest entry is evicted.
    pub fn log(&mut self, level: LogLevel, module: &'static str, args: fmt::Arguments<'_>) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::new();
        let _ = message.write_fmt(args);

        let entry = LogEntry {
            level,
            sequence: self.sequence,
            module,
            message,
        };
        self.sequence = self.sequence.wrapping_add(1);

        if self.entries.is_full() {
            self.entries.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        // Cannot fail: a slot was freed above if the ring was full.
        let _ = self.entries.push_back(entry);
    }

    /// Number of entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted because the ring was full
    #[must_use]
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Most recent entry
    #[must_use]
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Iterate over entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter()
    }

    /// Check whether any held entry's message contains `needle`
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    /// Write every entry to `out`, one per line, removing them
    ///
    /// Stops at the first write error; entries not yet written stay in the
    /// buffer.
    pub fn drain_into<W: Write>(&mut self, out: &mut W) -> fmt::Result {
        while let Some(entry) = self.entries.front() {
            writeln!(out, "{entry}")?;
            self.entries.pop_front();
        }
        Ok(())
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<const N: usize> Default for LogBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $module, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $module, format_args!($($arg)*))
    };
}

/// Log a trace-level message
#[macro_export]
macro_rules! log_trace {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Trace, $module, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let mut log: LogBuffer<4> = LogBuffer::with_level(LogLevel::Warn);
        log.log(LogLevel::Info, "test", format_args!("dropped"));
        log.log(LogLevel::Error, "test", format_args!("kept"));
        assert_eq!(log.len(), 1);
        assert!(log.contains("kept"));
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut log: LogBuffer<2> = LogBuffer::new();
        for i in 0..3 {
            log.log(LogLevel::Info, "test", format_args!("entry {i}"));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 1);
        assert!(!log.contains("entry 0"));
        assert_eq!(log.latest().map(|e| e.sequence), Some(2));
    }

    #[test]
    fn test_drain_into_writer() {
        let mut log: LogBuffer<4> = LogBuffer::new();
        log.log(LogLevel::Warn, "heap", format_args!("out of memory"));

        let mut out: String<128> = String::new();
        log.drain_into(&mut out).unwrap();
        assert!(log.is_empty());
        assert_eq!(out.as_str(), "[0000] W [heap] out of memory\n");
    }
}
