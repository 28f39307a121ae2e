//! The process table, owned by one global scheduler.

use page_table::PageTable;
use process::{Entry, ProcId, Scheduler};

use crate::{memory, sbi, sync::SpinLock};

mod switch;

static SCHEDULER: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

/// Creates the idle process. The caller continues as idle.
pub fn init() {
    let identity = memory::identity_regions();
    let res = memory::with_allocator(|alloc| {
        SCHEDULER
            .lock()
            .boot(alloc, &identity, switch::user_entry as usize)
    });
    if let Err(e) = res {
        panic!("scheduler boot failed: {e}");
    }
}

/// Creates a user process running `image`.
pub fn spawn_user(image: &[u8]) -> ProcId {
    let res = memory::with_allocator(|alloc| {
        SCHEDULER.lock().create_process(alloc, Entry::User(image))
    });
    match res {
        Ok(pid) => {
            log::info!("process {pid} created ({} bytes)", image.len());
            pid
        }
        Err(e) => panic!("failed to create process: {e}"),
    }
}

/// Returns the address space of the running process.
pub fn current_page_table() -> PageTable {
    let sched = SCHEDULER.lock();
    let Some(table) = sched.current().page_table() else {
        panic!("running process {} has no page table", sched.current().pid());
    };
    table
}

/// Gives up the CPU to the next runnable process.
///
/// Returns when this process is scheduled again.
pub fn yield_now() {
    // the lock must be released before switching stacks
    let switch = SCHEDULER.lock().schedule();
    if let Some(switch) = switch {
        unsafe {
            switch.perform(&switch::RiscvPlatform);
        }
    }
}

/// Terminates the running process.
pub fn exit_current() -> ! {
    let res = SCHEDULER.lock().exit_current();
    match res {
        Ok(pid) => log::info!("process {pid} exited"),
        Err(e) => panic!("exit: {e}"),
    }
    yield_now();
    panic!("exited process was scheduled");
}

/// The idle loop.
///
/// Hands the CPU to user processes and powers off once none of them can
/// run any more.
pub fn idle() -> ! {
    loop {
        yield_now();
        if !SCHEDULER.lock().has_runnable() {
            log::info!("no runnable process, shutting down");
            sbi::shutdown();
        }
    }
}
