//! Worker-thread (deferrable-work) framework (C6).
//!
//! Grounded directly on `wth.c`: a fixed-size table of worker threads,
//! each with a bounded single-producer ring of `{func, arg}` jobs,
//! enqueued safely from IRQ context and drained FIFO by a dedicated task.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::VecDeque;

use crate::config::WTH_MAX_THREADS;
use crate::error::{KError, KResult};
use crate::task::task::Tid;

pub type JobFn = Box<dyn FnOnce() + Send>;

struct Job {
    func: JobFn,
}

/// A single worker thread's job ring plus the dedicated task that drains
/// it. The ring itself is a `VecDeque` rather than the source's raw
/// ringbuffer-over-an-array, since this crate already depends on `alloc`
/// for every other subsystem and a `VecDeque` gives the same FIFO/bounded
/// semantics without unsafe pointer arithmetic.
struct WorkerThread {
    priority: i32,
    capacity: usize,
    queue: VecDeque<Job>,
    task: Tid,
    waiting_for_jobs: bool,
}

impl WorkerThread {
    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct WorkerThreadTable {
    threads: [Option<WorkerThread>; WTH_MAX_THREADS],
    count: usize,
}

impl WorkerThreadTable {
    pub const fn new() -> Self {
        WorkerThreadTable {
            threads: [const { None }; WTH_MAX_THREADS],
            count: 0,
        }
    }

    /// `wth_create_thread(priority, queue_size)`.
    pub fn create_thread(&mut self, priority: i32, queue_size: usize, task: Tid) -> KResult<usize> {
        if self.count >= WTH_MAX_THREADS {
            return Err(KError::TooManyOpenFiles);
        }

        let idx = self.count;
        self.threads[idx] = Some(WorkerThread {
            priority,
            capacity: queue_size,
            queue: VecDeque::with_capacity(queue_size),
            task,
            waiting_for_jobs: false,
        });
        self.count += 1;
        Ok(idx)
    }

    /// `wth_enqueue_job`: safe to call from IRQ context, never yields.
    /// Returns whether the worker's task needs to be woken by the caller
    /// (mirroring the source's direct call to `wth_wakeup`, kept as a
    /// caller-visible return value here so this module stays independent
    /// of the scheduler).
    pub fn enqueue_job(&mut self, wth: usize, job: JobFn) -> KResult<bool> {
        let t = self.threads.get_mut(wth).and_then(|t| t.as_mut()).ok_or(KError::InvalidArgument)?;

        if t.queue.len() >= t.capacity {
            return Err(KError::Busy);
        }

        let was_empty = t.queue.is_empty();
        t.queue.push_back(Job { func: job });

        let needs_wakeup = was_empty && t.waiting_for_jobs;
        if needs_wakeup {
            t.waiting_for_jobs = false;
        }

        Ok(needs_wakeup)
    }

    /// `wth_process_single_job`: runs with preemption enabled from the
    /// worker's own consumer loop.
    pub fn process_single_job(&mut self, wth: usize) -> bool {
        let Some(t) = self.threads.get_mut(wth).and_then(|t| t.as_mut()) else {
            return false;
        };

        match t.queue.pop_front() {
            Some(job) => {
                (job.func)();
                true
            }
            None => false,
        }
    }

    /// Called by a worker's consumer loop once its ring is observed empty;
    /// returns `true` if the worker should now go to sleep.
    pub fn mark_waiting_if_empty(&mut self, wth: usize) -> bool {
        let Some(t) = self.threads.get_mut(wth).and_then(|t| t.as_mut()) else {
            return false;
        };

        if t.is_empty() {
            t.waiting_for_jobs = true;
            true
        } else {
            false
        }
    }

    /// `wth_get_runnable_thread`: highest-priority (lowest number) worker
    /// with queued work, among those whose task is actually runnable.
    pub fn get_runnable_thread<F>(&self, task_is_runnable: F) -> Option<Tid>
    where
        F: Fn(Tid) -> bool,
    {
        let mut selected: Option<&WorkerThread> = None;

        for slot in self.threads[..self.count].iter().flatten() {
            if slot.is_empty() {
                continue;
            }
            if !task_is_runnable(slot.task) {
                continue;
            }
            if selected.map_or(true, |s| slot.priority < s.priority) {
                selected = Some(slot);
            }
        }

        selected.map(|s| s.task)
    }

    pub fn queue_size(&self, wth: usize) -> usize {
        self.threads.get(wth).and_then(|t| t.as_ref()).map(|t| t.capacity).unwrap_or(0)
    }
}

impl Default for WorkerThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test_case]
    fn jobs_run_fifo() {
        static ORDER: AtomicU32 = AtomicU32::new(0);
        static SEEN: [AtomicU32; 3] = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];

        let mut table = WorkerThreadTable::new();
        let wth = table.create_thread(0, 8, 0).unwrap();

        for i in 0..3u32 {
            table
                .enqueue_job(wth, Box::new(move || {
                    let pos = ORDER.fetch_add(1, Ordering::SeqCst);
                    SEEN[pos as usize].store(i, Ordering::SeqCst);
                }))
                .unwrap();
        }

        while table.process_single_job(wth) {}

        assert_eq!(SEEN[0].load(Ordering::SeqCst), 0);
        assert_eq!(SEEN[1].load(Ordering::SeqCst), 1);
        assert_eq!(SEEN[2].load(Ordering::SeqCst), 2);
    }

    #[test_case]
    fn empty_to_nonempty_transition_reports_wakeup_needed() {
        let mut table = WorkerThreadTable::new();
        let wth = table.create_thread(0, 4, 0).unwrap();
        table.mark_waiting_if_empty(wth);

        let needs_wakeup = table.enqueue_job(wth, Box::new(|| {})).unwrap();
        assert!(needs_wakeup);
    }

    #[test_case]
    fn full_queue_rejects_further_enqueues() {
        let mut table = WorkerThreadTable::new();
        let wth = table.create_thread(0, 1, 0).unwrap();
        table.enqueue_job(wth, Box::new(|| {})).unwrap();
        assert_eq!(table.enqueue_job(wth, Box::new(|| {})), Err(KError::Busy));
    }
}
