//! The syscall dispatcher: decodes the register-based calling convention
//! out of the caller's trapframe and routes to the handler functions.

use crate::kernel::Kernel;
use crate::syscalls::handlers;
use crate::syscalls::numbers::SyscallNumber;
use crate::trap::Trapframe;

/// System call result type.
pub type SyscallResult = Result<usize, SyscallError>;

/// System call errors, reported to user code as negative errno values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall,
    InvalidArgument,
    TableFull,
    NotImplemented,
    NoMemory,
    IoError,
}

impl SyscallError {
    pub fn as_errno(self) -> isize {
        match self {
            Self::InvalidSyscall => -1,
            Self::InvalidArgument => -22, // EINVAL
            Self::TableFull => -1,
            Self::NotImplemented => -38, // ENOSYS
            Self::NoMemory => -12,       // ENOMEM
            Self::IoError => -5,         // EIO
        }
    }
}

/// Decoded register arguments.
///
/// Calling convention (`int 0x30`):
///   rax = syscall number
///   rdx = arg0
///   rcx = arg1
///   rbx = arg2
///   rdi = arg3
///   rsi = arg4
///   rax = return value
#[derive(Debug, Clone, Copy)]
pub struct SyscallContext {
    pub syscall_num: usize,
    pub arg0: usize,
    pub arg1: usize,
    pub arg2: usize,
    pub arg3: usize,
    pub arg4: usize,
}

impl SyscallContext {
    pub fn from_trapframe(tf: &Trapframe) -> Self {
        Self {
            syscall_num: tf.regs.rax as usize,
            arg0: tf.regs.rdx as usize,
            arg1: tf.regs.rcx as usize,
            arg2: tf.regs.rbx as usize,
            arg3: tf.regs.rdi as usize,
            arg4: tf.regs.rsi as usize,
        }
    }
}

/// Routes one syscall. Returns `Some(value)` to store into the caller's
/// return-value register, or `None` when the call transferred control away
/// from the caller (sleep, killing yourself) and the frame must not be
/// touched afterwards.
pub fn dispatch(k: &Kernel, cpu: usize, tf: &mut Trapframe) -> Option<isize> {
    let ctx = SyscallContext::from_trapframe(tf);

    match SyscallNumber::from(ctx.syscall_num) {
        // Console I/O
        SyscallNumber::Puts => ret(handlers::io::sys_puts(
            k,
            ctx.arg0 as *const u8,
            ctx.arg1,
        )),
        SyscallNumber::Getc => Some(handlers::io::sys_getc(k)),
        SyscallNumber::SetTextColor => ret(handlers::io::sys_set_text_color(
            k,
            ctx.arg0 as u8,
            ctx.arg1 as u8,
        )),
        SyscallNumber::Cls => ret(handlers::io::sys_cls(k)),

        // Process management
        SyscallNumber::GetPid => ret(handlers::process::sys_getpid(k, cpu)),
        SyscallNumber::GetCid => Some(cpu as isize),
        SyscallNumber::Fork => ret(handlers::process::sys_fork(k, cpu)),
        SyscallNumber::Kill => handlers::process::sys_kill(k, cpu, ctx.arg0),
        SyscallNumber::Sleep => handlers::time::sys_sleep(k, cpu, tf, ctx.arg0 as u64),

        // Memory accounting
        SyscallNumber::GetNumUsedPage => ret(handlers::memory::sys_get_num_used_page(k)),
        SyscallNumber::GetNumFreePage => ret(handlers::memory::sys_get_num_free_page(k)),

        // Time
        SyscallNumber::GetTicks => Some(handlers::time::sys_get_ticks(k) as isize),

        // File system, routed to the filesystem collaborator.
        SyscallNumber::Open => Some(k.fs.open(ctx.arg0 as *const u8, ctx.arg1, ctx.arg2) as isize),
        SyscallNumber::Close => Some(k.fs.close(ctx.arg0 as i32) as isize),
        SyscallNumber::Read => {
            Some(k.fs.read(ctx.arg0 as i32, ctx.arg1 as *mut u8, ctx.arg2) as isize)
        }
        SyscallNumber::Write => {
            Some(k.fs.write(ctx.arg0 as i32, ctx.arg1 as *const u8, ctx.arg2) as isize)
        }
        SyscallNumber::Lseek => {
            Some(k.fs.lseek(ctx.arg0 as i32, ctx.arg1 as i64, ctx.arg2 as i32) as isize)
        }
        SyscallNumber::Unlink => Some(k.fs.unlink(ctx.arg0 as *const u8) as isize),
        SyscallNumber::Readdir => Some(k.fs.readdir(ctx.arg0 as *const u8) as isize),

        SyscallNumber::Unknown => Some(SyscallError::InvalidSyscall.as_errno()),
    }
}

fn ret(r: SyscallResult) -> Option<isize> {
    Some(match r {
        Ok(v) => v as isize,
        Err(e) => e.as_errno(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched;
    use crate::test_env::{syscall_frame, test_kernel};

    #[test]
    fn unknown_numbers_fail_cleanly() {
        let (k, _console) = test_kernel(1);
        k.spawn_root_for_test();
        sched::reschedule(k, 0);

        let mut tf = syscall_frame(1234, [0; 5]);
        assert_eq!(dispatch(k, 0, &mut tf), Some(-1));
    }

    #[test]
    fn getcid_reports_the_calling_core() {
        let (k, _console) = test_kernel(2);
        let mut tf = syscall_frame(SyscallNumber::GetCid as u64, [0; 5]);
        assert_eq!(dispatch(k, 1, &mut tf), Some(1));
    }

    #[test]
    fn page_accounting_is_visible_from_user_code() {
        let (k, _console) = test_kernel(1);
        let used = k.alloc.used_pages();
        let free = k.alloc.free_pages();

        let mut tf = syscall_frame(SyscallNumber::GetNumUsedPage as u64, [0; 5]);
        assert_eq!(dispatch(k, 0, &mut tf), Some(used as isize));
        let mut tf = syscall_frame(SyscallNumber::GetNumFreePage as u64, [0; 5]);
        assert_eq!(dispatch(k, 0, &mut tf), Some(free as isize));
    }

    #[test]
    fn fs_calls_without_a_filesystem_report_enosys() {
        let (k, _console) = test_kernel(1);
        let mut tf = syscall_frame(SyscallNumber::Open as u64, [0x1000, 0, 0, 0, 0]);
        assert_eq!(dispatch(k, 0, &mut tf), Some(-38));
        let mut tf = syscall_frame(SyscallNumber::Readdir as u64, [0x1000, 0, 0, 0, 0]);
        assert_eq!(dispatch(k, 0, &mut tf), Some(-38));
    }
}
