//! Counting semaphore with priority-aware wake.
//!
//! Grounded in `synch.c`'s `sema_down`/`sema_try_down`/`sema_up`: waiters
//! queue in insertion order, but `up` always wakes the highest-priority
//! waiter rather than the oldest one (ties broken by insertion order, via
//! a stable leftmost-max scan, matching `list_min`/`thread_priority_less`
//! used the same way in the reference scheduler).

use alloc::vec::Vec;
use spin::Mutex;

use crate::arch::x86_64::interrupts::DisableInterrupts;
use crate::scheduler::dispatch;
use crate::scheduler::thread::ThreadId;
use crate::scheduler::{current_id, with_scheduler};

struct Inner {
    value: u32,
    waiters: Vec<ThreadId>,
}

/// A classic counting semaphore. Safe to share across threads; `up` and
/// `try_down` may additionally be called from interrupt context.
pub struct Semaphore {
    inner: Mutex<Inner>,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                waiters: Vec::new(),
            }),
        }
    }

    /// Blocks the calling thread until the semaphore can be decremented.
    /// Must not be called from interrupt context. Interrupts are masked
    /// for the whole wait, mirroring `sema_down`'s single `intr_disable`
    /// around the loop rather than one per iteration: a thread only ever
    /// resumes from `block_current` with interrupts already off.
    pub fn down(&self) {
        assert!(
            !dispatch::in_interrupt_context(),
            "sema_down called from interrupt context"
        );
        let _guard = DisableInterrupts::new();
        loop {
            let mut inner = self.inner.lock();
            if inner.value > 0 {
                inner.value -= 1;
                return;
            }
            inner.waiters.push(current_id());
            drop(inner);
            dispatch::block_current();
        }
    }

    /// Non-blocking attempt to decrement. Safe from interrupt context.
    pub fn try_down(&self) -> bool {
        let _guard = DisableInterrupts::new();
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increments the value and, if threads are waiting, wakes the one
    /// with the greatest current priority. Safe from interrupt context.
    pub fn up(&self) {
        let _guard = DisableInterrupts::new();
        let mut inner = self.inner.lock();
        inner.value += 1;
        let woken = pop_highest_priority(&mut inner.waiters);
        drop(inner);
        if let Some(id) = woken {
            dispatch::unblock(id);
        }
    }

    /// Greatest priority among current waiters, without removing anyone.
    /// Used by `Lock::release` to recompute the holder's priority from
    /// its remaining held locks.
    pub fn highest_waiter_priority(&self) -> Option<i32> {
        let ids = self.waiter_ids();
        if ids.is_empty() {
            return None;
        }
        with_scheduler(|s| ids.iter().map(|&id| s.thread(id).priority).max())
    }

    /// A snapshot of current waiters' thread ids, taken under this
    /// semaphore's own lock only — does not touch the scheduler lock, so
    /// it is safe to call from inside a `with_scheduler`/`with_scheduler_mut`
    /// closure (unlike `highest_waiter_priority`, which locks the
    /// scheduler itself and would deadlock if called that way).
    pub fn waiter_ids(&self) -> Vec<ThreadId> {
        self.inner.lock().waiters.clone()
    }
}

/// Removes and returns the waiter with the greatest priority, leftmost
/// match wins on ties (stable FIFO tie-break).
fn pop_highest_priority(waiters: &mut Vec<ThreadId>) -> Option<ThreadId> {
    if waiters.is_empty() {
        return None;
    }
    let idx = with_scheduler(|s| {
        let mut best = 0;
        let mut best_priority = s.thread(waiters[0]).priority;
        for (i, &id) in waiters.iter().enumerate().skip(1) {
            let p = s.thread(id).priority;
            if p > best_priority {
                best = i;
                best_priority = p;
            }
        }
        best
    });
    Some(waiters.remove(idx))
}
