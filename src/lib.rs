//! A small multiprocessor-capable, preemptible kernel core for x86_64:
//! task lifecycle (create/destroy/fork), per-CPU round-robin scheduling
//! with sleep/wake, interrupt/exception/syscall dispatch, and per-task
//! address spaces.
//!
//! The crate is a library on purpose: boot bring-up lives outside, and all
//! core logic compiles (and is tested) on the host. The privileged
//! operations — CR3 install, CR2 read, port I/O, the `iretq` trapframe
//! restore — sit behind a narrow seam in [`kernel::ArchOps`] and the
//! interrupt entry stubs.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod devices;
pub mod interrupts;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod sched;
pub mod syscalls;
pub mod task;
pub mod test_env;
pub mod trap;

#[cfg(not(test))]
pub static SERIAL: spin::Mutex<uart_16550::SerialPort> =
    spin::Mutex::new(unsafe { uart_16550::SerialPort::new(0x3F8) });

#[cfg(not(test))]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut serial = $crate::SERIAL.lock();
        let _ = writeln!(serial, $($arg)*);
    }};
}

// Host tests route kernel logging to stdout instead of the serial port.
#[cfg(test)]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        std::println!($($arg)*);
    }};
}
