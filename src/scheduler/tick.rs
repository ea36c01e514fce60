//! Timer tick hook: per-tick MLFQS bookkeeping, sleeper wakeups, and the
//! decision of whether this tick warrants an actual context switch.
//!
//! Mirrors `thread_tick` from the reference scheduler's `thread.c`, which
//! runs on every timer interrupt regardless of discipline and leaves the
//! actual switch to the interrupt return path.

use core::sync::atomic::Ordering;

use super::dispatch;
use super::{mlfqs, sleep, with_scheduler, with_scheduler_mut, InterruptContext, TICKS, TICK_HZ, TIME_SLICE};

#[no_mangle]
pub extern "C" fn on_timer_tick(
    current_ctx_ptr: *const InterruptContext,
) -> *const InterruptContext {
    dispatch::enter_interrupt();
    let result = on_tick_inner(current_ctx_ptr);
    dispatch::leave_interrupt();
    result
}

fn on_tick_inner(current_ctx_ptr: *const InterruptContext) -> *const InterruptContext {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    if !super::is_enabled() {
        return current_ctx_ptr;
    }

    if super::mlfqs_enabled() {
        mlfqs::tick_recent_cpu();
        if now % TICK_HZ == 0 {
            mlfqs::update_load_avg();
            mlfqs::update_recent_cpu_all();
        }
        if now % TIME_SLICE == 0 {
            mlfqs::recompute_all_priorities();
        }
    }

    let current_priority = with_scheduler_mut(|s| {
        super::record_tick_for(s.current(), s.idle_tid());
        sleep::wake_ready_sleepers(s, now);
        s.thread(s.current()).priority
    });

    let slice_expired = super::bump_slice_tick() >= TIME_SLICE;
    let preempted = dispatch::should_yield_on_return();
    let higher_ready = with_scheduler(|s| s.ready.max_ready_priority())
        .is_some_and(|p| p > current_priority);

    if slice_expired || preempted || higher_ready {
        super::reset_slice_tick();
        dispatch::reschedule(current_ctx_ptr)
    } else {
        current_ctx_ptr
    }
}
