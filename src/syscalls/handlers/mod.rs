//! # System Call Handlers
//!
//! Contains implementations for all system call categories.
//!
//! ## Modules
//!
//! - `io`: Console I/O and screen control (puts, getc, settextcolor, cls)
//! - `process`: Task management (getpid, fork, kill)
//! - `time`: Time operations (sleep)
//! - `memory`: Physical-page accounting

pub mod io;
pub mod memory;
pub mod process;
pub mod time;
