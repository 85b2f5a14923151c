//! Task struct and state machine (section 4.5's state diagram, data model
//! entry for `task` and `Wait object`).

extern crate alloc;

use alloc::sync::Arc;
use spin::Mutex;

use crate::task::process::Process;

pub type Tid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    None,
    Task(Tid),
    Mutex,
    Cond,
    Timer,
    Sem,
    Kb,
    MwoElem,
}

/// A task's wait object: what it is blocked on, and where it is linked
/// into the target's waiter list (section 3, "Wait object").
#[derive(Debug, Clone, Copy)]
pub struct WaitObject {
    pub kind: WaitKind,
}

impl WaitObject {
    pub const fn none() -> Self {
        WaitObject { kind: WaitKind::None }
    }
}

/// A saved general-purpose register frame. Field layout is intentionally
/// minimal: the real context-switch assembly stub (outside this crate's
/// scope) only needs a stack pointer to resume from.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterFrame {
    pub esp: u32,
    pub eip: u32,
}

pub struct Task {
    pub tid: Tid,
    pub process: Arc<Mutex<Process>>,
    pub frame: RegisterFrame,
    pub kernel_stack_base: u32,
    pub state: TaskState,
    pub wait_obj: WaitObject,
    pub exit_wstatus: Option<i32>,
    /// `true` for tasks created via `kthread_create`, which share the
    /// kernel pdir and have no separate process of their own beyond the
    /// kernel's.
    pub is_kernel_thread: bool,
}

impl Task {
    pub fn new(tid: Tid, process: Arc<Mutex<Process>>, kernel_stack_base: u32, is_kernel_thread: bool) -> Self {
        Task {
            tid,
            process,
            frame: RegisterFrame::default(),
            kernel_stack_base,
            state: TaskState::Runnable,
            wait_obj: WaitObject::none(),
            exit_wstatus: None,
            is_kernel_thread,
        }
    }

    pub fn set_wait(&mut self, kind: WaitKind) {
        self.wait_obj = WaitObject { kind };
        self.state = TaskState::Sleeping;
    }

    pub fn wake(&mut self) {
        self.wait_obj = WaitObject::none();
        if self.state == TaskState::Sleeping {
            self.state = TaskState::Runnable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::process::Process;

    #[test_case]
    fn wake_transitions_sleeping_to_runnable() {
        let process = Arc::new(Mutex::new(Process::new_init()));
        let mut t = Task::new(1, process, 0, false);
        t.set_wait(WaitKind::Timer);
        assert_eq!(t.state, TaskState::Sleeping);
        t.wake();
        assert_eq!(t.state, TaskState::Runnable);
    }
}
