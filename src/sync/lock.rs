//! Mutex with priority donation, built on a binary `Semaphore`.
//!
//! Grounded in `synch.c`'s `lock_acquire`/`lock_release` and the donation
//! walk performed inline in `lock_acquire` (the reference source has no
//! separate named function for it): acquiring a held lock donates the
//! acquirer's priority along the chain of `waiting_for_lock` edges,
//! bounded by `MAX_DONATION_DEPTH` hops so a malformed chain can't spin
//! forever.

use crate::arch::x86_64::interrupts::DisableInterrupts;
use crate::scheduler::dispatch;
use crate::scheduler::thread::{ThreadId, ThreadState};
use crate::scheduler::{current_id, with_scheduler, with_scheduler_mut, MAX_DONATION_DEPTH};

use super::semaphore::Semaphore;

use core::cell::UnsafeCell;

/// A mutex. `holder` is read under interrupt masking only; there is no
/// separate spinlock protecting it, matching the reference scheduler's
/// assumption that list/holder bookkeeping never needs more than
/// interrupt masking on a uniprocessor.
pub struct Lock {
    sema: Semaphore,
    holder: UnsafeCell<Option<ThreadId>>,
}

// SAFETY: `holder` is only ever mutated or read with interrupts disabled,
// which on this uniprocessor target is the whole of the synchronization
// story (see module docs on `sync`).
unsafe impl Sync for Lock {}

impl Lock {
    pub const fn new() -> Self {
        Self {
            sema: Semaphore::new(1),
            holder: UnsafeCell::new(None),
        }
    }

    pub fn holder(&self) -> Option<ThreadId> {
        let _guard = DisableInterrupts::new();
        unsafe { *self.holder.get() }
    }

    pub fn is_held_by_current(&self) -> bool {
        self.holder() == Some(current_id())
    }

    /// Greatest priority among this lock's current waiters, if any.
    pub fn highest_waiter_priority(&self) -> Option<i32> {
        self.sema.highest_waiter_priority()
    }

    /// Snapshot of current waiters' thread ids, without touching the
    /// scheduler lock. See `Semaphore::waiter_ids`.
    fn waiter_ids(&self) -> alloc::vec::Vec<ThreadId> {
        self.sema.waiter_ids()
    }

    /// Acquires the lock, donating priority along the holder's wait chain
    /// first if it is already held. Must not be called from interrupt
    /// context, and the caller must not already hold this lock.
    pub fn acquire(&self) {
        assert!(
            !dispatch::in_interrupt_context(),
            "lock_acquire called from interrupt context"
        );
        assert!(!self.is_held_by_current(), "thread already holds this lock");

        {
            let _guard = DisableInterrupts::new();
            if let Some(holder) = self.holder() {
                donate_chain(holder, current_id());
            }
            let me = current_id();
            with_scheduler_mut(|s| {
                s.thread_mut(me).waiting_for_lock = Some(self as *const Lock);
            });
        }

        // Donation is visible before this call can block, as required:
        // the chain walk above already ran with interrupts disabled.
        self.sema.down();

        let _guard = DisableInterrupts::new();
        let me = current_id();
        with_scheduler_mut(|s| {
            let t = s.thread_mut(me);
            t.waiting_for_lock = None;
            t.is_donated += 1;
            t.acquired_locks.push(self as *const Lock);
        });
        unsafe { *self.holder.get() = Some(me) };
    }

    /// Non-blocking acquire. No donation occurs: there is no blocked
    /// waiter to donate from when the lock is free.
    pub fn try_acquire(&self) -> bool {
        assert!(!self.is_held_by_current(), "thread already holds this lock");
        if !self.sema.try_down() {
            return false;
        }
        let _guard = DisableInterrupts::new();
        let me = current_id();
        with_scheduler_mut(|s| {
            let t = s.thread_mut(me);
            t.is_donated += 1;
            t.acquired_locks.push(self as *const Lock);
        });
        unsafe { *self.holder.get() = Some(me) };
        true
    }

    /// Releases the lock the caller holds, recomputing its own priority
    /// from any remaining held locks' waiters before waking the next
    /// holder.
    pub fn release(&self) {
        assert!(
            !dispatch::in_interrupt_context(),
            "lock_release called from interrupt context"
        );
        assert!(self.is_held_by_current(), "release of lock not held by current thread");

        let me = current_id();
        {
            let _guard = DisableInterrupts::new();

            with_scheduler_mut(|s| {
                let t = s.thread_mut(me);
                t.acquired_locks.retain(|&l| l != self as *const Lock);
            });

            // Collect each remaining held lock's waiter ids before taking
            // the scheduler lock: `waiter_ids` only locks the semaphore's
            // own mutex, but `with_scheduler` below must not be re-entered
            // while already held (spin locks are not reentrant), so the
            // per-thread priority lookups happen inside the one closure.
            let acquired_locks: alloc::vec::Vec<*const Lock> =
                with_scheduler(|s| s.thread(me).acquired_locks.clone());
            let mut waiter_lists: alloc::vec::Vec<alloc::vec::Vec<ThreadId>> =
                alloc::vec::Vec::with_capacity(acquired_locks.len());
            for &lock_ptr in &acquired_locks {
                // SAFETY: every pointer in `acquired_locks` names a lock
                // this thread currently holds, which by definition
                // outlives the hold.
                waiter_lists.push(unsafe { (*lock_ptr).waiter_ids() });
            }

            let new_priority = with_scheduler(|s| {
                let mut max_priority = s.thread(me).original_priority;
                for ids in &waiter_lists {
                    if let Some(p) = ids.iter().map(|&id| s.thread(id).priority).max() {
                        if p > max_priority {
                            max_priority = p;
                        }
                    }
                }
                max_priority
            });
            with_scheduler_mut(|s| s.thread_mut(me).priority = new_priority);

            with_scheduler_mut(|s| {
                s.thread_mut(me).is_donated = s.thread(me).is_donated.saturating_sub(1);
            });
            unsafe { *self.holder.get() = None };
        }
        self.sema.up();
    }
}

/// Walks the chain `holder --waiting_for_lock--> lock --holder--> ...`,
/// raising each link's priority to `donor`'s while it's still lower, and
/// repositioning the link in the ready structure if it's currently
/// sitting there. Stops early once a link already outranks the donor, the
/// chain runs out, or `MAX_DONATION_DEPTH` hops have been walked.
fn donate_chain(first_holder: ThreadId, donor: ThreadId) {
    let donor_priority = with_scheduler(|s| s.thread(donor).priority);
    let mut holder = first_holder;

    for _ in 0..MAX_DONATION_DEPTH {
        let (cur_priority, is_ready, next_lock) = with_scheduler(|s| {
            let t = s.thread(holder);
            (t.priority, t.state == ThreadState::Ready, t.waiting_for_lock)
        });

        if cur_priority >= donor_priority {
            break;
        }

        with_scheduler_mut(|s| {
            s.thread_mut(holder).priority = donor_priority;
            if is_ready {
                s.ready.remove(holder);
                s.ready.push(holder, donor_priority);
            }
        });

        match next_lock {
            Some(lock_ptr) => {
                // SAFETY: `waiting_for_lock` only ever names a lock that
                // outlives the waiter (see the invariant in thread.rs).
                match unsafe { (*lock_ptr).holder() } {
                    Some(next_holder) => holder = next_holder,
                    None => break,
                }
            }
            None => break,
        }
    }
}
