//! Thread control block and identity types.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use super::child::ChildInfo;
use super::fixed_point::Fp;
use super::{InterruptContext, MAX_NAME_LEN};

/// Thread identifier. TID_ERROR (-1) is reserved for allocation failure
/// and is represented separately from this type at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Magic word written at the bottom of each thread's stack, checked on
/// every schedule to detect stack overflow.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Thread control block.
///
/// Mirrors the fields of the reference scheduler's `struct thread`: the
/// donation bookkeeping (`original_priority`, `is_donated`,
/// `waiting_for_lock`, `acquired_locks`) and the MLFQS bookkeeping
/// (`nice`, `recent_cpu`) coexist on every thread, but only one set is
/// actually consulted depending on whether MLFQS is enabled.
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub stack: Box<[u8]>,
    pub interrupt_context: InterruptContext,

    /// Effective scheduling priority, `0..=63`. Under priority scheduling
    /// this can be temporarily boosted by donation; under MLFQS it is
    /// fully recomputed every fourth tick and `set_priority` is a no-op.
    pub priority: i32,
    /// Priority the thread was created with / last explicitly set to.
    /// Donation never touches this field.
    pub original_priority: i32,
    /// Count of locks currently donating to this thread. Zero means any
    /// explicit `set_priority` call takes effect immediately.
    pub is_donated: u32,
    /// Lock this thread is blocked trying to acquire, if any. Used to
    /// walk the donation chain.
    pub waiting_for_lock: Option<*const crate::sync::lock::Lock>,
    /// Locks currently held by this thread, used to recompute priority
    /// on release.
    pub acquired_locks: Vec<*const crate::sync::lock::Lock>,

    /// MLFQS niceness, `-20..=20`.
    pub nice: i32,
    /// MLFQS recent CPU usage, 17.14 fixed-point.
    pub recent_cpu: Fp,

    /// Non-zero while the thread is asleep; the absolute tick count at
    /// which it should be woken.
    pub wake_tick: u64,

    pub parent_tid: Option<ThreadId>,
    pub children: Vec<ChildInfo>,

    pub magic: u32,
}

// SAFETY: raw pointers to `Lock` stored in `waiting_for_lock`/`acquired_locks`
// are only ever dereferenced with interrupts disabled and only ever point at
// locks that outlive the thread referencing them (locks are never freed
// while a thread still holds or waits on them).
unsafe impl Send for Thread {}

impl Thread {
    pub fn new(id: ThreadId, name: &str, stack: Box<[u8]>, priority: i32) -> Self {
        let mut bounded = String::new();
        for c in name.chars().take(MAX_NAME_LEN) {
            bounded.push(c);
        }
        Self {
            id,
            name: bounded,
            state: ThreadState::Blocked,
            stack,
            interrupt_context: InterruptContext::default(),
            priority,
            original_priority: priority,
            is_donated: 0,
            waiting_for_lock: None,
            acquired_locks: Vec::new(),
            nice: 0,
            recent_cpu: Fp::ZERO,
            wake_tick: 0,
            parent_tid: None,
            children: Vec::new(),
            magic: THREAD_MAGIC,
        }
    }

    pub fn check_stack_overflow(&self) {
        assert_eq!(self.magic, THREAD_MAGIC, "thread {} stack overflow detected", self.id);
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("priority", &self.priority)
            .field("nice", &self.nice)
            .finish()
    }
}

/// Returns true when `a` should be ordered before `b` in a priority-sorted
/// structure (descending priority, matching the original's
/// `thread_priority_less`).
pub fn priority_less(a: &Thread, b: &Thread) -> bool {
    a.priority > b.priority
}
