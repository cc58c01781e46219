//! The system-call surface: numbers, register convention, dispatcher and
//! per-category handlers. Calls arrive through the `int 0x30` trap gate and
//! are routed here by the trap dispatcher.

pub mod dispatcher;
pub mod handlers;
pub mod numbers;

pub use dispatcher::{dispatch, SyscallContext, SyscallError, SyscallResult};
pub use numbers::SyscallNumber;
