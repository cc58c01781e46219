//! The task table: fixed-capacity task slots, per-CPU assignment records,
//! and the lifecycle operations (create, fork, destroy).
//!
//! The whole table sits behind one `spin::Mutex` owned by the kernel; every
//! method here assumes the caller holds that lock. Slot indices double as
//! task ids, and free slots are recycled through an array-backed stack
//! seeded so the lowest slots are handed out first.

use x86_64::structures::paging::PhysFrame;

use crate::config::{NR_CPUS, NR_TASKS, USER_STACK_TOP};
use crate::interrupts::gdt::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, USER_CODE_SELECTOR, USER_DATA_SELECTOR,
};
use crate::kernel::ArchOps;
use crate::loader;
use crate::memory::{AddressSpace, MemError, PageAllocator};
use crate::trap::Trapframe;

/// Slot index into the task table.
pub type TaskId = usize;

/// RFLAGS for a fresh task: reserved bit plus interrupts enabled, so the
/// task is preemptible from its first instruction.
const INITIAL_RFLAGS: u64 = 0x2 | 0x200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Free,
    Runnable,
    Running,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NoFreeSlot,
    OutOfMemory,
}

impl From<MemError> for TaskError {
    fn from(e: MemError) -> Self {
        match e {
            MemError::OutOfMemory => TaskError::OutOfMemory,
        }
    }
}

pub struct Task {
    pub id: TaskId,
    pub parent: TaskId,
    pub state: TaskState,
    pub tf: Trapframe,
    /// Absolute tick this task becomes runnable again (SLEEPING) or must
    /// yield the core by (RUNNING). One field serves both, since a task is
    /// never in both states.
    pub wake_tick: u64,
    pub space: Option<AddressSpace>,
}

impl Task {
    fn empty(id: TaskId) -> Self {
        Self {
            id,
            parent: 0,
            state: TaskState::Free,
            tf: Trapframe::default(),
            wake_tick: 0,
            space: None,
        }
    }
}

/// Per-core scheduling record.
pub struct CpuState {
    /// Task currently assigned to this core, if any.
    pub current: Option<TaskId>,
    /// Vector of the last trap dispatched on this core, for fatal dumps.
    pub last_trapno: Option<u8>,
}

impl CpuState {
    const fn new() -> Self {
        Self {
            current: None,
            last_trapno: None,
        }
    }
}

pub struct TaskTable {
    slots: [Task; NR_TASKS],
    free: [u16; NR_TASKS],
    free_len: usize,
    cpus: [CpuState; NR_CPUS],
}

impl TaskTable {
    pub fn new() -> Self {
        let mut free = [0u16; NR_TASKS];
        for (i, slot) in free.iter_mut().enumerate() {
            // Stack pops from the end, so store high indices first.
            *slot = (NR_TASKS - 1 - i) as u16;
        }
        Self {
            slots: core::array::from_fn(Task::empty),
            free,
            free_len: NR_TASKS,
            cpus: core::array::from_fn(|_| CpuState::new()),
        }
    }

    pub fn slot(&self, id: TaskId) -> &Task {
        &self.slots[id]
    }

    pub fn slot_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.slots[id]
    }

    pub fn cpu(&self, cpu: usize) -> &CpuState {
        &self.cpus[cpu]
    }

    pub fn cpu_mut(&mut self, cpu: usize) -> &mut CpuState {
        &mut self.cpus[cpu]
    }

    pub fn current(&self, cpu: usize) -> Option<TaskId> {
        self.cpus[cpu].current
    }

    pub fn set_current(&mut self, cpu: usize, id: Option<TaskId>) {
        self.cpus[cpu].current = id;
    }

    pub fn free_slots(&self) -> usize {
        self.free_len
    }

    /// The core `id` is currently assigned to, if any.
    pub fn running_on(&self, id: TaskId) -> Option<usize> {
        self.cpus
            .iter()
            .position(|c| c.current == Some(id))
    }

    /// Number of live (non-FREE) tasks, idle tasks included.
    pub fn live_tasks(&self) -> usize {
        NR_TASKS - self.free_len
    }

    /// Claims a slot and builds a fresh task in it: new address space with
    /// the shared kernel half, a mapped user stack, and a zeroed trapframe
    /// whose segment selectors match the requested privilege. The new task
    /// is RUNNABLE with `rsp` at the stack top; the caller sets `rip`.
    ///
    /// On allocation failure everything is rolled back and the slot is
    /// returned to the free stack.
    pub fn create(
        &mut self,
        alloc: &dyn PageAllocator,
        kernel_root: PhysFrame,
        user: bool,
    ) -> Result<TaskId, TaskError> {
        if self.free_len == 0 {
            return Err(TaskError::NoFreeSlot);
        }
        self.free_len -= 1;
        let id = self.free[self.free_len] as usize;
        debug_assert_eq!(self.slots[id].state, TaskState::Free);

        let space = match AddressSpace::new(alloc, kernel_root) {
            Ok(s) => s,
            Err(e) => {
                self.free[self.free_len] = id as u16;
                self.free_len += 1;
                return Err(e.into());
            }
        };
        if let Err(e) = space.map_user_stack(alloc) {
            space.free_user_stack(alloc);
            space.destroy(alloc);
            self.free[self.free_len] = id as u16;
            self.free_len += 1;
            return Err(e.into());
        }

        let (cs, data) = if user {
            (USER_CODE_SELECTOR, USER_DATA_SELECTOR)
        } else {
            (KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR)
        };

        let t = &mut self.slots[id];
        t.parent = 0;
        t.state = TaskState::Runnable;
        t.wake_tick = 0;
        t.tf = Trapframe::default();
        t.tf.cs = cs as u64;
        t.tf.ss = data as u64;
        t.tf.ds = data as u64;
        t.tf.es = data as u64;
        t.tf.rsp = USER_STACK_TOP;
        t.tf.rflags = INITIAL_RFLAGS;
        t.space = Some(space);
        Ok(id)
    }

    /// Duplicates `parent` into a new slot: same trapframe (except the
    /// return-value register, which reads 0 in the child), a copied stack,
    /// and the shared program-image window re-established in the child's
    /// address space.
    pub fn fork(
        &mut self,
        parent: TaskId,
        alloc: &dyn PageAllocator,
        kernel_root: PhysFrame,
    ) -> Result<TaskId, TaskError> {
        debug_assert_ne!(self.slots[parent].state, TaskState::Free);
        let parent_tf = self.slots[parent].tf;

        let child = self.create(alloc, kernel_root, parent_tf.from_user())?;

        {
            let ps = self.slots[parent].space.as_ref().expect("parent has a space");
            let cs = self.slots[child].space.as_ref().expect("fresh child has a space");
            cs.copy_stack_from(alloc, ps);
            if let Err(e) = loader::map_image(alloc, cs) {
                // Roll the half-built child back.
                let space = self.slots[child].space.take().expect("child space present");
                space.free_user_stack(alloc);
                space.destroy(alloc);
                self.slots[child].state = TaskState::Free;
                self.free[self.free_len] = child as u16;
                self.free_len += 1;
                return Err(e.into());
            }
        }

        let c = &mut self.slots[child];
        c.tf = parent_tf;
        c.tf.regs.rax = 0;
        c.parent = parent;
        c.state = TaskState::Runnable;
        Ok(child)
    }

    /// Releases a task: switches this core onto the kernel's own address
    /// space, tears down the task's stack and page-table tree, marks the
    /// slot FREE and recycles it. Destroying a FREE slot is a no-op.
    ///
    /// Callers must ensure no other core is still executing on the task's
    /// address space (the scheduler reaps cross-core victims on their own
    /// core for exactly this reason).
    pub fn destroy(
        &mut self,
        id: TaskId,
        alloc: &dyn PageAllocator,
        arch: &ArchOps,
        kernel_root: PhysFrame,
    ) {
        if id >= NR_TASKS || self.slots[id].state == TaskState::Free {
            return;
        }

        (arch.activate)(kernel_root);

        let t = &mut self.slots[id];
        if let Some(space) = t.space.take() {
            space.free_user_stack(alloc);
            space.destroy(alloc);
        }
        t.state = TaskState::Free;
        t.wake_tick = 0;

        debug_assert!(self.free_len < NR_TASKS);
        self.free[self.free_len] = id as u16;
        self.free_len += 1;

        for cpu in self.cpus.iter_mut() {
            if cpu.current == Some(id) {
                cpu.current = None;
            }
        }
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
