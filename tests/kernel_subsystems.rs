#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(halcyon::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    halcyon::test_panic_handler(info);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn main(_mb_boot_info_addr: *const u8) -> ! {
    test_main();
    halcyon::hlt();
}

#[test_case]
fn fork_then_terminate_reparents_to_init() {
    use halcyon::task::Scheduler;

    let mut sched = Scheduler::new();
    let init = sched.init();
    let child = sched.fork(init, 0x5000).expect("fork");
    let grandchild = sched.fork(child, 0x6000).expect("fork");

    sched.terminate_task(child, 0, 0).expect("terminate");

    let gc_process = sched.process(grandchild).unwrap();
    assert_eq!(gc_process.lock().parent_pid, halcyon::task::process::INIT_PID);
}

#[test_case]
fn worker_thread_jobs_complete_in_order() {
    use alloc::boxed::Box;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use halcyon::wth::WorkerThreadTable;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    static LAST: AtomicUsize = AtomicUsize::new(0);

    let mut table = WorkerThreadTable::new();
    let wth = table.create_thread(0, 16, 0).unwrap();

    for i in 1..=5usize {
        table
            .enqueue_job(wth, Box::new(move || {
                COUNTER.fetch_add(1, Ordering::SeqCst);
                LAST.store(i, Ordering::SeqCst);
            }))
            .unwrap();
    }

    while table.process_single_job(wth) {}

    assert_eq!(COUNTER.load(Ordering::SeqCst), 5);
    assert_eq!(LAST.load(Ordering::SeqCst), 5);
}

#[test_case]
fn vfs_resolves_across_a_mount_point() {
    use alloc::sync::Arc;
    use halcyon::fs::fs_ops::{EntryType, FsOps, FsPath, InodeId};
    use halcyon::fs::{resolve, MountTable};
    use spin::Mutex;

    struct OneDirFs {
        child: Mutex<Option<(InodeId, &'static str, EntryType)>>,
    }

    impl FsOps for OneDirFs {
        fn root_inode(&self) -> InodeId {
            0
        }

        fn get_entry(&self, dir: InodeId, name: &str) -> FsPath {
            if dir != 0 {
                return FsPath::NOT_FOUND;
            }
            match *self.child.lock() {
                Some((inode, n, ty)) if n == name => FsPath { inode: Some(inode), ty },
                _ => FsPath::NOT_FOUND,
            }
        }
    }

    let root = Arc::new(OneDirFs { child: Mutex::new(Some((1, "mnt", EntryType::Dir))) });
    let target = Arc::new(OneDirFs { child: Mutex::new(Some((1, "leaf", EntryType::File))) });

    let mut mt = MountTable::new(root.clone());
    mt.mount(root.clone(), 1, target.clone());

    let resolved = resolve("/mnt/leaf", (root, 0), &mt, false, false).expect("resolve");
    assert!(Arc::ptr_eq(&resolved.fs, &target));
    assert_eq!(resolved.ty, EntryType::File);
    resolved.fs.fs_shunlock();
}
