//! Task/process model, scheduler, and fault-to-signal taxonomy (C5).
//!
//! Grounded on `process.c`: task/process separation, fork, zombie reaping,
//! process groups and sessions.

pub mod fault;
pub mod process;
pub mod sched;
pub mod task;

pub use process::{Pid, Process};
pub use sched::Scheduler;
pub use task::{Tid, Task, TaskState, WaitObject, WaitKind};
