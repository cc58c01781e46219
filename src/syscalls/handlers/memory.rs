//! Physical-page accounting syscalls.
//!
//! User code can observe how many pages the kernel's allocator has handed
//! out; the fork/kill tests in user land lean on these to prove that task
//! teardown returns every page.

use crate::kernel::Kernel;
use crate::syscalls::dispatcher::SyscallResult;

pub fn sys_get_num_used_page(k: &Kernel) -> SyscallResult {
    Ok(k.alloc.used_pages())
}

pub fn sys_get_num_free_page(k: &Kernel) -> SyscallResult {
    Ok(k.alloc.free_pages())
}
