//! Mesa-style condition variable: a monitor companion to a `Lock`.
//!
//! Grounded in `synch.c`'s `cond_wait`/`cond_signal`/`cond_broadcast` and
//! its `struct semaphore_elem`: each waiter owns a private semaphore
//! (here, a stack local living for the duration of `wait`) and the
//! condvar keeps an ordered list of pointers to them. `signal` picks the
//! waiter record whose thread currently has the highest priority, not the
//! oldest one.

use alloc::vec::Vec;
use spin::Mutex;

use crate::arch::x86_64::interrupts::DisableInterrupts;
use crate::scheduler::dispatch;
use crate::scheduler::thread::ThreadId;
use crate::scheduler::{current_id, with_scheduler};

use super::lock::Lock;
use super::semaphore::Semaphore;

pub struct CondVar {
    waiters: Mutex<Vec<(ThreadId, *const Semaphore)>>,
}

// SAFETY: the raw pointers stored here only ever point at a `Semaphore`
// owned by a live stack frame inside `wait`, which does not return until
// the corresponding entry has been removed by `signal`/`broadcast`.
unsafe impl Send for CondVar {}
unsafe impl Sync for CondVar {}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Atomically releases `lock` and blocks until signaled, then
    /// reacquires `lock` before returning. Precondition: caller holds
    /// `lock`. Like any Mesa monitor, the caller must recheck its
    /// predicate after `wait` returns: a `signal` only wakes the waiter,
    /// it doesn't guarantee the condition still holds by the time the
    /// lock is reacquired.
    pub fn wait(&self, lock: &Lock) {
        assert!(lock.is_held_by_current(), "cond_wait called without holding lock");
        assert!(
            !dispatch::in_interrupt_context(),
            "cond_wait called from interrupt context"
        );

        let private_sema = Semaphore::new(0);
        let me = current_id();
        {
            let _guard = DisableInterrupts::new();
            self.waiters.lock().push((me, &private_sema as *const Semaphore));
        }

        lock.release();
        private_sema.down();
        lock.acquire();
    }

    /// Wakes at most one waiter: the one whose thread has the greatest
    /// current priority, ties broken by insertion order. No-op if nobody
    /// is waiting. Precondition: caller holds `lock`.
    pub fn signal(&self, lock: &Lock) {
        assert!(lock.is_held_by_current(), "cond_signal called without holding lock");

        let woken = {
            let _guard = DisableInterrupts::new();
            let mut waiters = self.waiters.lock();
            pop_highest_priority(&mut waiters)
        };
        if let Some(sema_ptr) = woken {
            // SAFETY: see the `unsafe impl Send/Sync` justification above.
            unsafe { &*sema_ptr }.up();
        }
    }

    /// Repeatedly signals until no waiters remain.
    pub fn broadcast(&self, lock: &Lock) {
        loop {
            let empty = {
                let _guard = DisableInterrupts::new();
                self.waiters.lock().is_empty()
            };
            if empty {
                break;
            }
            self.signal(lock);
        }
    }
}

fn pop_highest_priority(waiters: &mut Vec<(ThreadId, *const Semaphore)>) -> Option<*const Semaphore> {
    if waiters.is_empty() {
        return None;
    }
    let idx = with_scheduler(|s| {
        let mut best = 0;
        let mut best_priority = s.thread(waiters[0].0).priority;
        for (i, &(id, _)) in waiters.iter().enumerate().skip(1) {
            let p = s.thread(id).priority;
            if p > best_priority {
                best = i;
                best_priority = p;
            }
        }
        best
    });
    Some(waiters.remove(idx).1)
}
