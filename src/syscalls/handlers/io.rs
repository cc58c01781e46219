//! Console I/O syscall handlers.
//!
//! All console traffic goes through the kernel's [`Console`] collaborator;
//! these handlers only validate arguments and translate results into the
//! syscall return convention.
//!
//! [`Console`]: crate::devices::Console

use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

/// Longest string `puts` will accept in one call.
const PUTS_MAX: usize = 4096;

/// Writes `len` bytes starting at `buf` to the console. Returns the number
/// of bytes written.
pub fn sys_puts(k: &Kernel, buf: *const u8, len: usize) -> SyscallResult {
    if buf.is_null() || len == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    if len > PUTS_MAX {
        return Err(SyscallError::InvalidArgument);
    }

    // The buffer lives in the calling task's address space, which is the
    // one active on this core for the duration of the call.
    let bytes = unsafe { core::slice::from_raw_parts(buf, len) };
    for &b in bytes {
        k.console.putch(b);
    }
    Ok(len)
}

/// Pops one byte from the console input queue, or -1 when it is empty.
/// Non-blocking; user code polls.
pub fn sys_getc(k: &Kernel) -> isize {
    match k.console.getc() {
        Some(b) => b as isize,
        None => -1,
    }
}

pub fn sys_set_text_color(k: &Kernel, fg: u8, bg: u8) -> SyscallResult {
    k.console.set_text_color(fg, bg);
    Ok(0)
}

pub fn sys_cls(k: &Kernel) -> SyscallResult {
    k.console.clear();
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Console;
    use crate::test_env::test_kernel;

    #[test]
    fn puts_writes_through_the_console() {
        let (k, console) = test_kernel(1);
        let msg = b"hello from ring 3";
        assert_eq!(sys_puts(k, msg.as_ptr(), msg.len()), Ok(msg.len()));
        console.with_output(|out| assert_eq!(out, msg));
    }

    #[test]
    fn puts_rejects_bad_arguments() {
        let (k, _console) = test_kernel(1);
        assert_eq!(
            sys_puts(k, core::ptr::null(), 4),
            Err(SyscallError::InvalidArgument)
        );
        let msg = b"x";
        assert_eq!(
            sys_puts(k, msg.as_ptr(), 0),
            Err(SyscallError::InvalidArgument)
        );
        assert_eq!(
            sys_puts(k, msg.as_ptr(), PUTS_MAX + 1),
            Err(SyscallError::InvalidArgument)
        );
    }

    #[test]
    fn getc_drains_the_input_queue_then_reports_empty() {
        let (k, console) = test_kernel(1);
        console.push_input(b'a');
        console.push_input(b'b');
        assert_eq!(sys_getc(k), b'a' as isize);
        assert_eq!(sys_getc(k), b'b' as isize);
        assert_eq!(sys_getc(k), -1);
    }

    #[test]
    fn screen_control_reaches_the_console() {
        let (k, console) = test_kernel(1);
        assert_eq!(sys_set_text_color(k, 0x0A, 0x00), Ok(0));
        assert_eq!(console.color(), (0x0A, 0x00));
        assert_eq!(sys_cls(k), Ok(0));
        assert_eq!(console.clear_count(), 1);
    }
}
