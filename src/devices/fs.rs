//! The filesystem seam.
//!
//! The file syscalls (open/close/read/write/lseek/unlink/readdir) route to
//! whatever implements this trait. Returns follow the errno convention:
//! non-negative on success, negative error codes otherwise. The kernel
//! boots with [`NoFilesystem`] until a real backend is attached.

/// Filesystem collaborator behind the file syscalls.
///
/// Pointer arguments refer to the calling task's address space, which is
/// active on the core for the duration of the call.
pub trait Filesystem: Sync {
    fn open(&self, path: *const u8, flags: usize, mode: usize) -> i32;
    fn close(&self, fd: i32) -> i32;
    fn read(&self, fd: i32, buf: *mut u8, len: usize) -> i32;
    fn write(&self, fd: i32, buf: *const u8, len: usize) -> i32;
    fn lseek(&self, fd: i32, offset: i64, whence: i32) -> i32;
    fn unlink(&self, path: *const u8) -> i32;
    fn readdir(&self, path: *const u8) -> i32;
}

/// ENOSYS as the errno-style return of an unimplemented operation.
const NOSYS: i32 = -38;

/// Backend used when no filesystem is mounted: every operation reports
/// that it is unimplemented.
pub struct NoFilesystem;

pub static NO_FS: NoFilesystem = NoFilesystem;

impl Filesystem for NoFilesystem {
    fn open(&self, _path: *const u8, _flags: usize, _mode: usize) -> i32 {
        NOSYS
    }

    fn close(&self, _fd: i32) -> i32 {
        NOSYS
    }

    fn read(&self, _fd: i32, _buf: *mut u8, _len: usize) -> i32 {
        NOSYS
    }

    fn write(&self, _fd: i32, _buf: *const u8, _len: usize) -> i32 {
        NOSYS
    }

    fn lseek(&self, _fd: i32, _offset: i64, _whence: i32) -> i32 {
        NOSYS
    }

    fn unlink(&self, _path: *const u8) -> i32 {
        NOSYS
    }

    fn readdir(&self, _path: *const u8) -> i32 {
        NOSYS
    }
}
