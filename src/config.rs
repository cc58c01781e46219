//! Fixed layout and sizing constants shared by the task, memory and
//! scheduling subsystems.

/// Capacity of the task table, fixed at boot. Slot indices are task ids.
pub const NR_TASKS: usize = 32;

/// Upper bound on physical cores the kernel will manage.
pub const NR_CPUS: usize = 8;

/// Core that advances the global tick counter and scans sleeping tasks.
pub const COORDINATOR_CPU: usize = 0;

/// Tick budget a RUNNING task gets before preemption.
pub const TIME_QUANTUM: u64 = 100;

pub const PAGE_SIZE: usize = 4096;

/// Top of the fixed per-task user stack; the stack grows down from here.
pub const USER_STACK_TOP: u64 = 0x0000_7fff_fff0_0000;

/// User stack size in bytes (16 pages).
pub const USER_STACK_SIZE: u64 = 16 * PAGE_SIZE as u64;

/// Physical/virtual base of the statically loaded user program image.
/// The image is identity-mapped into every user address space.
pub const PROG_IMAGE_BASE: u64 = 0x0080_0000;

/// Pages covered by the shared program-image window.
pub const PROG_IMAGE_PAGES: usize = 64;

/// Top-level page-table slot used for the recursive self-mapping.
pub const RECURSIVE_SLOT: usize = 510;

/// First top-level slot of the shared kernel upper half.
pub const KERNEL_HALF_START: usize = 256;
