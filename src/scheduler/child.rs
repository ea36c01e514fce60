//! Parent/child exit-status rendezvous.
//!
//! Mirrors `struct child_info` from the reference scheduler's `thread.h`:
//! a parent that spawned a child can later block waiting for it to exit
//! and retrieve its exit status exactly once. This module only models
//! the thread-level bookkeeping; there is no process/exec layer above it
//! in this crate.

use alloc::boxed::Box;

use super::thread::ThreadId;
use crate::sync::semaphore::Semaphore;

pub struct ChildInfo {
    pub child_tid: ThreadId,
    pub exit_status: i32,
    pub has_exited: bool,
    /// Signaled once by the child on exit; `wait` downs it. Boxed so its
    /// address stays stable while this entry is reachable from outside
    /// the scheduler lock (see `wait` below).
    pub wait_sema: Box<Semaphore>,
}

impl ChildInfo {
    pub fn new(child_tid: ThreadId) -> Self {
        Self {
            child_tid,
            exit_status: 0,
            has_exited: false,
            wait_sema: Box::new(Semaphore::new(0)),
        }
    }
}

/// Records a parent/child relationship so `wait` can later find it.
pub fn register(parent: ThreadId, child: ThreadId) {
    super::with_scheduler_mut(|s| {
        s.thread_mut(parent).children.push(ChildInfo::new(child));
    });
}

/// Called by a thread as it exits: posts its status to the parent's
/// `ChildInfo` entry, if the parent is still around and still tracking it.
pub fn record_exit(child: ThreadId, status: i32) {
    let parent = super::with_scheduler_mut(|s| s.thread(child).parent_tid);
    let Some(parent) = parent else { return };

    let sema_ptr: Option<*const Semaphore> = super::with_scheduler_mut(|s| {
        let parent_thread = s.try_thread_mut(parent)?;
        let info = parent_thread.children.iter_mut().find(|c| c.child_tid == child)?;
        info.exit_status = status;
        info.has_exited = true;
        Some(&*info.wait_sema as *const Semaphore)
    });

    // `up` is called with the scheduler lock released: it may itself
    // need to take that lock to unblock the parent.
    if let Some(ptr) = sema_ptr {
        // SAFETY: the entry stays in `parent`'s children list (and thus
        // this Box stays allocated) until `wait` removes it, which can't
        // happen before this `up` is observed.
        unsafe { &*ptr }.up();
    }
}

/// Blocks until `child` has exited, then returns its status and removes
/// the bookkeeping entry. Returns `None` if `child` was never a tracked
/// child of the caller (matching `process_wait`'s behavior for a bad tid).
pub fn wait(child: ThreadId) -> Option<i32> {
    let current = super::current_id();

    let sema_ptr: Option<*const Semaphore> = super::with_scheduler(|s| {
        s.thread(current)
            .children
            .iter()
            .find(|c| c.child_tid == child)
            .map(|c| &*c.wait_sema as *const Semaphore)
    });
    let ptr = sema_ptr?;

    // SAFETY: this entry is only ever removed by this same call, below,
    // after the down() below has returned.
    unsafe { &*ptr }.down();

    super::with_scheduler_mut(|s| {
        let t = s.thread_mut(current);
        let pos = t.children.iter().position(|c| c.child_tid == child)?;
        let info = t.children.remove(pos);
        Some(info.exit_status)
    })
}
