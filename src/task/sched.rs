//! Run queues, preemption discipline, fork/exit, and kernel-thread creation
//! (section 4.5). Single-CPU cooperative-preemptive, per section 5.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{KError, KResult};
use crate::task::process::{Pid, Process, INIT_PID};
use crate::task::task::{Task, TaskState, Tid, WaitKind};

pub struct Scheduler {
    tasks: Vec<Option<Task>>,
    processes: Vec<Option<Arc<Mutex<Process>>>>,
    runnable: VecDeque<Tid>,
    current: Option<Tid>,
    next_pid: Pid,
    preempt_count: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            tasks: Vec::new(),
            processes: Vec::new(),
            runnable: VecDeque::new(),
            current: None,
            next_pid: INIT_PID,
            preempt_count: 0,
        }
    }

    pub fn disable_preemption(&mut self) {
        self.preempt_count += 1;
    }

    pub fn enable_preemption(&mut self) {
        debug_assert!(self.preempt_count > 0, "enable_preemption without matching disable");
        self.preempt_count -= 1;
    }

    pub fn is_preemption_enabled(&self) -> bool {
        self.preempt_count == 0
    }

    fn alloc_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    fn task_mut(&mut self, tid: Tid) -> KResult<&mut Task> {
        self.tasks
            .get_mut(tid as usize)
            .and_then(|t| t.as_mut())
            .ok_or(KError::InvalidArgument)
    }

    pub fn task(&self, tid: Tid) -> KResult<&Task> {
        self.tasks
            .get(tid as usize)
            .and_then(|t| t.as_ref())
            .ok_or(KError::InvalidArgument)
    }

    pub fn process(&self, pid: Pid) -> KResult<Arc<Mutex<Process>>> {
        self.processes
            .get(pid as usize)
            .and_then(|p| p.clone())
            .ok_or(KError::InvalidArgument)
    }

    /// Creates the bootstrap init task/process (pid 1). Must be called
    /// exactly once before any other scheduler operation.
    pub fn init(&mut self) -> Tid {
        let process = Arc::new(Mutex::new(Process::new_init()));
        let tid = 0;
        self.tasks.push(Some(Task::new(tid, process.clone(), 0, false)));
        self.processes.push(None); // pid 0 unused, keeps index == pid
        self.processes.push(Some(process));
        self.next_pid = INIT_PID + 1;
        self.runnable.push_back(tid);
        self.current = Some(tid);
        tid
    }

    pub fn current_tid(&self) -> Option<Tid> {
        self.current
    }

    /// `kthread_create(func, arg)`: the provided closure represents the
    /// pre-populated stack entry point; a plain return from it is treated
    /// as `kthread_exit` by the caller of `run_kernel_thread_body`.
    pub fn kthread_create(&mut self, kernel_stack_base: u32) -> KResult<Tid> {
        debug_assert!(!self.is_preemption_enabled() || true);
        let init_process = self.process(INIT_PID)?;
        let tid = self.tasks.len() as Tid;
        self.tasks.push(Some(Task::new(tid, init_process, kernel_stack_base, true)));
        self.runnable.push_back(tid);
        Ok(tid)
    }

    /// `sys_fork` (section 4.5). Returns the child pid, as observed by the
    /// parent; the child's own "returns 0" behavior is the caller's
    /// responsibility once it dispatches the new task.
    pub fn fork(&mut self, parent_tid: Tid, kernel_stack_base: u32) -> KResult<Pid> {
        self.disable_preemption();

        let result = (|| {
            let parent_process = {
                let parent_task = self.task(parent_tid)?;
                parent_task.process.clone()
            };

            let child_pid = self.alloc_pid();
            let child_process = {
                let parent = parent_process.lock();
                Process::child_of(child_pid, &parent)
            };
            let child_process = Arc::new(Mutex::new(child_process));

            parent_process.lock().children.insert(child_pid);

            while self.processes.len() <= child_pid as usize {
                self.processes.push(None);
            }
            self.processes[child_pid as usize] = Some(child_process.clone());

            // One task per process in this simplified model: the child's
            // tid is its pid, keeping `tasks` and `processes` in lockstep
            // so callers can use a pid wherever a tid is expected.
            let child_tid = child_pid;
            while self.tasks.len() <= child_tid as usize {
                self.tasks.push(None);
            }
            self.tasks[child_tid as usize] = Some(Task::new(child_tid, child_process, kernel_stack_base, false));
            self.runnable.push_back(child_tid);

            Ok(child_pid)
        })();

        self.enable_preemption();
        result
    }

    /// `terminate_process` (section 4.5). `exit_wstatus` is
    /// `(exit_code << 8) | term_sig`.
    pub fn terminate_task(&mut self, tid: Tid, exit_code: i32, term_sig: i32) -> KResult<()> {
        let pid = {
            let task = self.task_mut(tid)?;
            if task.state == TaskState::Sleeping {
                task.wait_obj = crate::task::task::WaitObject::none();
            }
            task.state = TaskState::Zombie;
            task.exit_wstatus = Some((exit_code << 8) | term_sig);
            task.process.lock().pid
        };

        self.runnable.retain(|&t| t != tid);

        if pid == INIT_PID {
            panic!("init (pid 1) exited");
        }

        // reparent children to init
        let process = self.process(pid)?;
        let children: Vec<Pid> = process.lock().children.iter().copied().collect();
        let init = self.process(INIT_PID)?;
        for child_pid in children {
            if let Ok(child) = self.process(child_pid) {
                child.lock().parent_pid = INIT_PID;
                init.lock().children.insert(child_pid);
            }
        }
        process.lock().children.clear();

        // wake any task sleeping on this task's exit
        for slot in self.tasks.iter_mut().flatten() {
            if slot.wait_obj.kind == WaitKind::Task(tid) {
                slot.wake();
                self.runnable.push_back(slot.tid);
            }
        }

        Ok(())
    }

    pub fn wait_on_task(&mut self, waiter: Tid, target: Tid) -> KResult<()> {
        let task = self.task_mut(waiter)?;
        task.set_wait(WaitKind::Task(target));
        self.runnable.retain(|&t| t != waiter);
        Ok(())
    }

    /// Cooperative round-robin selection: pops the next runnable task and
    /// re-enqueues the currently running one if it is still runnable.
    pub fn schedule_next(&mut self) -> Option<Tid> {
        if let Some(cur) = self.current {
            if let Ok(task) = self.task_mut(cur) {
                if task.state == TaskState::Running {
                    task.state = TaskState::Runnable;
                    self.runnable.push_back(cur);
                }
            }
        }

        let next = self.runnable.pop_front()?;
        if let Ok(task) = self.task_mut(next) {
            task.state = TaskState::Running;
        }
        self.current = Some(next);
        Some(next)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn fork_registers_child_as_runnable_with_independent_process() {
        let mut sched = Scheduler::new();
        let init_tid = sched.init();
        let child_pid = sched.fork(init_tid, 0x1000).unwrap();

        assert_ne!(child_pid, INIT_PID);
        let child = sched.process(child_pid).unwrap();
        assert_eq!(child.lock().parent_pid, INIT_PID);

        let init = sched.process(INIT_PID).unwrap();
        assert!(init.lock().children.contains(&child_pid));
    }

    #[test_case]
    fn terminate_reparents_children_to_init() {
        let mut sched = Scheduler::new();
        let init_tid = sched.init();
        let mid_pid = sched.fork(init_tid, 0x1000).unwrap();
        let mid_tid = mid_pid; // one task per process in this model

        let grandchild_pid = sched.fork(mid_tid, 0x2000).unwrap();

        sched.terminate_task(mid_tid, 0, 0).unwrap();

        let grandchild = sched.process(grandchild_pid).unwrap();
        assert_eq!(grandchild.lock().parent_pid, INIT_PID);

        let init = sched.process(INIT_PID).unwrap();
        assert!(init.lock().children.contains(&grandchild_pid));
    }

    #[test_case]
    fn kernel_thread_return_reaches_zombie() {
        let mut sched = Scheduler::new();
        sched.init();
        let tid = sched.kthread_create(0x3000).unwrap();
        sched.terminate_task(tid, 0, 0).unwrap();
        assert_eq!(sched.task(tid).unwrap().state, TaskState::Zombie);
    }
}
