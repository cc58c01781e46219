//! Device Subsystem
//!
//! Hardware abstractions behind which the kernel's collaborators live:
//! - `console`: byte-level console output, input queue, screen control
//! - `fs`: the filesystem seam the file syscalls route through
//! - `keyboard`: PS/2 scancode decoding feeding the console input queue

pub mod console;
pub mod fs;
pub mod keyboard;

pub use console::{Console, InputQueue};
#[cfg(not(test))]
pub use console::SerialConsole;
pub use fs::{Filesystem, NoFilesystem, NO_FS};
