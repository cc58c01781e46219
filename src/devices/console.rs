//! The console collaborator: byte output, a fixed-size input queue fed by
//! the keyboard interrupt, and the screen-control hooks the corresponding
//! syscalls reach.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Byte-level console the kernel talks to. One implementation drives the
/// serial port on hardware; tests substitute a recording mock.
pub trait Console: Sync {
    /// Writes one byte of output.
    fn putch(&self, byte: u8);

    /// Pops one byte from the input queue. Non-blocking.
    fn getc(&self) -> Option<u8>;

    /// Pushes a byte into the input queue, usually from interrupt context.
    fn push_input(&self, byte: u8);

    fn set_text_color(&self, fg: u8, bg: u8);

    fn clear(&self);

    /// Invoked by the trap dispatcher on a keyboard interrupt; the
    /// implementation drains the device and feeds `push_input`.
    fn on_keyboard_interrupt(&self) {}
}

const QUEUE_SIZE: usize = 256;

/// Single-producer single-consumer byte ring: the interrupt path enqueues,
/// the `getc` syscall dequeues. When full, new input is dropped rather than
/// overwriting unread bytes.
pub struct InputQueue {
    buf: UnsafeCell<[u8; QUEUE_SIZE]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// head/tail publication orders the buffer writes; each slot is written by
// exactly one side at a time.
unsafe impl Sync for InputQueue {}

impl InputQueue {
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; QUEUE_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, byte: u8) {
        let head = self.head.load(Ordering::Relaxed);
        let next = head.wrapping_add(1) % QUEUE_SIZE;
        let tail = self.tail.load(Ordering::Acquire);
        if next != tail {
            unsafe {
                (*self.buf.get())[head] = byte;
            }
            self.head.store(next, Ordering::Release);
        }
    }

    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            None
        } else {
            let byte = unsafe { (*self.buf.get())[tail] };
            self.tail.store(tail.wrapping_add(1) % QUEUE_SIZE, Ordering::Release);
            Some(byte)
        }
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial-port console used on hardware. Output goes straight to the UART;
/// input arrives via the keyboard interrupt through the shared queue.
/// Color and clear are no-ops on a serial line.
#[cfg(not(test))]
pub struct SerialConsole {
    input: InputQueue,
    decoder: spin::Mutex<crate::devices::keyboard::ScancodeDecoder>,
}

#[cfg(not(test))]
impl SerialConsole {
    pub const fn new() -> Self {
        Self {
            input: InputQueue::new(),
            decoder: spin::Mutex::new(crate::devices::keyboard::ScancodeDecoder::new()),
        }
    }
}

#[cfg(not(test))]
impl Console for SerialConsole {
    fn putch(&self, byte: u8) {
        crate::SERIAL.lock().send(byte);
    }

    fn getc(&self) -> Option<u8> {
        self.input.pop()
    }

    fn push_input(&self, byte: u8) {
        self.input.push(byte);
    }

    fn set_text_color(&self, _fg: u8, _bg: u8) {}

    fn clear(&self) {}

    fn on_keyboard_interrupt(&self) {
        let scancode = unsafe {
            let mut port = x86_64::instructions::port::Port::<u8>::new(0x60);
            port.read()
        };
        if let Some(ch) = self.decoder.lock().decode(scancode) {
            self.input.push(ch as u8);
        }
    }
}
