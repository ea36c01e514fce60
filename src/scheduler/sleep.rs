//! Timed sleep: parks the calling thread until a given absolute tick.
//!
//! Grounded in the reference scheduler's timer-sleep handling: rather
//! than busy-waiting, a sleeping thread is blocked and recorded in a
//! side list keyed by wake tick; the timer tick hook scans that list
//! and unblocks anyone whose time has come.

use super::dispatch;
use super::thread::ThreadId;
use super::{current_id, ticks, with_scheduler_mut};

/// Blocks the running thread until at least `ticks() + duration_ticks`.
/// A `duration_ticks` of zero returns immediately, matching
/// `timer_sleep`'s documented behavior for a non-positive duration.
pub fn sleep_ticks(duration_ticks: u64) {
    if duration_ticks == 0 {
        return;
    }
    let wake_at = ticks() + duration_ticks;
    let id = current_id();

    with_scheduler_mut(|s| {
        s.thread_mut(id).wake_tick = wake_at;
        s.sleeping.push(id);
    });

    dispatch::block_current();
}

/// Called from the tick handler: wakes every thread whose `wake_tick`
/// has arrived. Runs with the scheduler lock already held.
pub(super) fn wake_ready_sleepers(s: &mut super::SchedulerState, now: u64) {
    let mut still_sleeping = alloc::vec::Vec::new();
    let mut woken: alloc::vec::Vec<ThreadId> = alloc::vec::Vec::new();

    for id in s.sleeping.drain(..) {
        if s.thread(id).wake_tick <= now {
            woken.push(id);
        } else {
            still_sleeping.push(id);
        }
    }
    s.sleeping = still_sleeping;

    for id in woken {
        let priority = {
            let t = s.thread_mut(id);
            t.state = super::thread::ThreadState::Ready;
            t.priority
        };
        s.ready.push(id, priority);
    }
}
