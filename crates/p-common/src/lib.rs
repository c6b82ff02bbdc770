// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Palisade RTOS contributors

//! Palisade RTOS Common Library
//!
//! Types, error definitions, configuration and logging shared by the
//! Palisade kernel crates.
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting for errors and log levels
//!
//! Nothing in this crate allocates: buffers are fixed-size arrays or
//! heapless collections.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod types;
pub mod errors;
pub mod config;
pub mod log;
pub mod constants;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::ProcessId;
pub use config::{KernelConfig, MpuLayout};
pub use log::{LogBuffer, LogLevel};
