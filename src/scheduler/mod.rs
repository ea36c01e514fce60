//! Thread scheduler: ready-queue dispatch, priority donation and MLFQS.
//!
//! A single global scheduler instance is protected by a spinlock that is
//! only ever touched with interrupts disabled, so the lock is never
//! actually contended on this uniprocessor target. Context switches are
//! driven through a single interrupt path (hardware timer IRQ0, or
//! software `int 0x81` for a voluntary yield).

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use spin::Mutex;

pub mod child;
pub mod dispatch;
pub mod fixed_point;
pub mod mlfqs;
pub mod ready_queue;
pub mod sleep;
pub mod thread;
pub mod tick;

use ready_queue::ReadyQueue;
use thread::{Thread, ThreadId, ThreadState};

/// Lowest valid priority.
pub const PRI_MIN: i32 = 0;
/// Priority assigned to new threads by default.
pub const PRI_DEFAULT: i32 = 31;
/// Highest valid priority.
pub const PRI_MAX: i32 = 63;
/// Number of MLFQS priority buckets (`PRI_MAX - PRI_MIN + 1`).
pub const PRI_LEVELS: usize = (PRI_MAX - PRI_MIN + 1) as usize;
/// Timer ticks per preemption quantum.
pub const TIME_SLICE: u64 = 4;
/// Maximum hops walked while propagating a priority donation.
pub const MAX_DONATION_DEPTH: u32 = 8;
/// Timer interrupt frequency.
pub const TICK_HZ: u64 = 100;
/// Max thread name length, matching the TCB's fixed-size name buffer.
pub const MAX_NAME_LEN: usize = 16;

pub const THREAD_STACK_SIZE: usize = 64 * 1024;

/// `TID_ERROR`: returned by `spawn` when id allocation is exhausted.
pub const TID_ERROR: isize = -1;

/// Interrupt frame pushed by the CPU on entry to an interrupt handler.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptFrame {
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl Default for InterruptFrame {
    fn default() -> Self {
        Self {
            rip: 0,
            cs: 0x08,
            rflags: 0x202,
            rsp: 0,
            ss: 0x10,
        }
    }
}

/// Saved CPU context for a blocked/ready thread: general-purpose
/// registers plus the hardware-pushed interrupt frame. A thread that has
/// never run has this set up to look as though it was interrupted right
/// at its entry point, so the common `iretq` restore path launches it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub iret_frame: InterruptFrame,
}

/// Whether the MLFQS discipline is active. Set once at boot from
/// `scheduler::init` and never changed afterward, matching the
/// reference scheduler's `thread_mlfqs` global.
static MLFQS_ENABLED: AtomicBool = AtomicBool::new(false);

static CURRENT_THREAD_ID: AtomicUsize = AtomicUsize::new(0);
static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);
static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

/// System-wide load average, 17.14 fixed-point, recomputed once a second.
static LOAD_AVG: Mutex<fixed_point::Fp> = Mutex::new(fixed_point::Fp::ZERO);

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Ticks spent with the idle thread running, vs. any other thread.
/// Maintained for `tick_stats`, the `thread_print_stats` equivalent.
static IDLE_TICKS: AtomicU64 = AtomicU64::new(0);
static BUSY_TICKS: AtomicU64 = AtomicU64::new(0);

/// Ticks the running thread has held the CPU since the last switch.
/// Reset whenever `dispatch::reschedule` actually switches threads.
static SLICE_TICKS: AtomicU64 = AtomicU64::new(0);

pub(self) fn bump_slice_tick() -> u64 {
    SLICE_TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

pub(self) fn reset_slice_tick() {
    SLICE_TICKS.store(0, Ordering::Relaxed);
}

pub struct SchedulerState {
    threads: BTreeMap<ThreadId, Thread>,
    ready: ReadyQueue,
    sleeping: alloc::vec::Vec<ThreadId>,
    destruction_queue: alloc::vec::Vec<ThreadId>,
    idle_tid: ThreadId,
}

static SCHEDULER: Mutex<Option<SchedulerState>> = Mutex::new(None);

pub fn mlfqs_enabled() -> bool {
    MLFQS_ENABLED.load(Ordering::Relaxed)
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Attributes the tick just handled to the idle thread or to real work.
/// Called once per tick from `tick::on_tick_inner`.
pub(self) fn record_tick_for(id: ThreadId, idle_tid: ThreadId) {
    if id == idle_tid {
        IDLE_TICKS.fetch_add(1, Ordering::Relaxed);
    } else {
        BUSY_TICKS.fetch_add(1, Ordering::Relaxed);
    }
}

/// `(total, idle, busy)` tick counts since boot, the
/// `thread_print_stats` equivalent.
pub fn tick_stats() -> (u64, u64, u64) {
    (
        ticks(),
        IDLE_TICKS.load(Ordering::Relaxed),
        BUSY_TICKS.load(Ordering::Relaxed),
    )
}

pub fn current_id() -> ThreadId {
    ThreadId(CURRENT_THREAD_ID.load(Ordering::SeqCst))
}

pub fn with_scheduler<R>(f: impl FnOnce(&SchedulerState) -> R) -> R {
    let guard = SCHEDULER.lock();
    f(guard.as_ref().expect("scheduler not initialized"))
}

pub fn with_scheduler_mut<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler not initialized"))
}

/// Initializes the scheduler with the idle thread as thread 0. `mlfqs`
/// selects the scheduling discipline for the lifetime of the kernel.
pub fn init(mlfqs: bool) {
    MLFQS_ENABLED.store(mlfqs, Ordering::Relaxed);

    let idle_stack = alloc::vec![0u8; THREAD_STACK_SIZE].into_boxed_slice();
    let mut idle = Thread::new(ThreadId(0), "idle", idle_stack, PRI_MIN);
    idle.state = ThreadState::Running;

    let mut threads = BTreeMap::new();
    threads.insert(ThreadId(0), idle);

    *SCHEDULER.lock() = Some(SchedulerState {
        threads,
        ready: ReadyQueue::new(mlfqs),
        sleeping: alloc::vec::Vec::new(),
        destruction_queue: alloc::vec::Vec::new(),
        idle_tid: ThreadId(0),
    });

    log::info!("scheduler initialized (mlfqs={})", mlfqs);
}

/// Enables preemptive scheduling. Must be called after interrupts are
/// wired up (IDT loaded) but is safe to call with interrupts still off;
/// it only flips a flag consulted by the tick handler and `yield_now`.
pub fn enable() {
    SCHEDULER_ENABLED.store(true, Ordering::SeqCst);
    log::info!("scheduler enabled");
}

pub fn is_enabled() -> bool {
    SCHEDULER_ENABLED.load(Ordering::SeqCst)
}

impl SchedulerState {
    pub fn thread(&self, id: ThreadId) -> &Thread {
        self.threads.get(&id).expect("unknown thread id")
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        self.threads.get_mut(&id).expect("unknown thread id")
    }

    pub fn try_thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    pub fn current(&self) -> ThreadId {
        current_id()
    }

    pub fn all_thread_ids(&self) -> alloc::vec::Vec<ThreadId> {
        self.threads.keys().copied().collect()
    }

    pub fn idle_tid(&self) -> ThreadId {
        self.idle_tid
    }
}

/// Read-only snapshot of a thread's public fields, returned by
/// `thread_by_tid` so callers never hold a `&Thread` across the scheduler
/// lock. Mirrors the reference `thread_get_by_tid` lookup under the
/// global `all_threads` list, which `with_scheduler` plays the role of
/// here.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub name: alloc::string::String,
    pub state: ThreadState,
    pub priority: i32,
    pub nice: i32,
}

/// Looks up a thread by id among every thread currently known to the
/// scheduler (running, ready, blocked, or sleeping). Returns `None` once
/// the thread has exited and been reaped.
pub fn thread_by_tid(id: ThreadId) -> Option<ThreadSnapshot> {
    with_scheduler(|s| {
        s.threads.get(&id).map(|t| ThreadSnapshot {
            id: t.id,
            name: t.name.clone(),
            state: t.state,
            priority: t.priority,
            nice: t.nice,
        })
    })
}

/// Returns the running thread's current effective priority.
pub fn get_priority() -> i32 {
    with_scheduler(|s| s.thread(current_id()).priority)
}

/// Sets the running thread's base priority. No-op under MLFQS, matching
/// `thread_set_priority`'s `if (thread_mlfqs) return;` guard. If the
/// thread is currently the target of a donation the new value only takes
/// effect as `original_priority`, to be restored once the donation clears
/// (see `Lock::release`); otherwise it applies immediately, yielding if
/// it no longer outranks the best ready thread.
pub fn set_priority(new_priority: i32) {
    if mlfqs_enabled() {
        return;
    }
    let new_priority = new_priority.clamp(PRI_MIN, PRI_MAX);
    let id = current_id();
    let outranked = with_scheduler_mut(|s| {
        let t = s.thread_mut(id);
        t.original_priority = new_priority;
        if t.is_donated == 0 {
            t.priority = new_priority;
        }
        let effective = t.priority;
        s.ready.max_ready_priority().is_some_and(|p| p > effective)
    });
    if outranked {
        dispatch::yield_now();
    }
}

/// Allocates a fresh thread id, protected the same way the id allocator
/// in the reference scheduler is: a dedicated counter, mutual exclusion
/// coming from interrupts being disabled by every caller.
pub fn allocate_tid() -> Option<ThreadId> {
    let id = NEXT_TID.fetch_add(1, Ordering::SeqCst);
    if id > (isize::MAX as usize) {
        None
    } else {
        Some(ThreadId(id))
    }
}
