//! Multi-level feedback queue scheduling formulas.
//!
//! Three computations, all taken directly from the reference scheduler's
//! `thread.c`: per-thread priority from `recent_cpu`/`nice`, system load
//! average from the ready thread count, and `recent_cpu` decay from the
//! load average. None of this runs unless `scheduler::init` was called
//! with `mlfqs = true`.

use super::fixed_point::Fp;
use super::thread::ThreadId;
use super::{with_scheduler_mut, LOAD_AVG, PRI_MAX, PRI_MIN};

/// `priority = PRI_MAX - (recent_cpu / 4) - (nice * 2)`, clamped to the
/// valid range.
pub fn recompute_priority(recent_cpu: Fp, nice: i32) -> i32 {
    let cpu_term = recent_cpu.div_int(4).to_int_trunc();
    let nice_term = nice * 2;
    (PRI_MAX - cpu_term - nice_term).clamp(PRI_MIN, PRI_MAX)
}

/// Recomputes one thread's priority in place and, if it's currently
/// sitting in the ready structure, moves it to the bucket matching its
/// new priority.
fn recompute_and_requeue(s: &mut super::SchedulerState, id: ThreadId) {
    let (recent_cpu, nice, old_priority, is_ready) = {
        let t = s.thread(id);
        (t.recent_cpu, t.nice, t.priority, t.state == super::thread::ThreadState::Ready)
    };
    let new_priority = recompute_priority(recent_cpu, nice);
    s.thread_mut(id).priority = new_priority;
    if is_ready && new_priority != old_priority {
        s.ready.remove(id);
        s.ready.push(id, new_priority);
    }
}

/// Recomputes every thread's priority. Called once every `TIME_SLICE`
/// ticks (4 under the standard 100Hz clock), matching
/// `thread_update_all_priority`.
pub fn recompute_all_priorities() {
    with_scheduler_mut(|s| {
        let ids = s.all_thread_ids();
        for id in ids {
            recompute_and_requeue(s, id);
        }
    });
}

/// `load_avg = (59/60) * load_avg + (1/60) * ready_threads`, where
/// `ready_threads` counts the running thread too (unless it's idle).
pub fn update_load_avg() {
    let fifty_nine_sixtieths = Fp::from_int(59).div(Fp::from_int(60));
    let one_sixtieth = Fp::from_int(1).div(Fp::from_int(60));

    with_scheduler_mut(|s| {
        let ready_count = s.ready.len() as i32;
        let current_counts = s.current() != s.idle_tid();
        let runnable = ready_count + if current_counts { 1 } else { 0 };

        let mut load_avg = LOAD_AVG.lock();
        *load_avg = fifty_nine_sixtieths
            .mul(*load_avg)
            .add(one_sixtieth.mul_int(runnable));
    });
}

/// `recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + nice`,
/// applied to every thread once a second.
pub fn update_recent_cpu_all() {
    let load_avg = *LOAD_AVG.lock();
    let two_load_avg = load_avg.mul_int(2);
    let coefficient = two_load_avg.div(two_load_avg.add_int(1));

    with_scheduler_mut(|s| {
        let ids = s.all_thread_ids();
        for id in ids {
            let t = s.thread_mut(id);
            t.recent_cpu = coefficient.mul(t.recent_cpu).add_int(t.nice);
        }
    });
}

/// Increments the running thread's `recent_cpu` by one, called on every
/// tick (unless the running thread is idle).
pub fn tick_recent_cpu() {
    with_scheduler_mut(|s| {
        let current = s.current();
        if current != s.idle_tid() {
            let t = s.thread_mut(current);
            t.recent_cpu = t.recent_cpu.add_int(1);
        }
    });
}

pub fn load_avg() -> Fp {
    *LOAD_AVG.lock()
}

/// 100 times the system load average, matching `thread_get_load_avg`'s
/// scaled integer return convention.
pub fn load_avg_x100() -> i32 {
    load_avg().mul_int(100).to_int_trunc()
}

/// 100 times the running thread's `recent_cpu`, matching
/// `thread_get_recent_cpu`.
pub fn recent_cpu_x100() -> i32 {
    super::with_scheduler(|s| s.thread(super::current_id()).recent_cpu.mul_int(100).to_int_trunc())
}

/// Sets the running thread's niceness, clamped to `-20..=20`, recomputes
/// its priority immediately, and yields if it no longer outranks the best
/// ready thread. Mirrors `thread_set_nice`. Meaningful regardless of
/// whether MLFQS is enabled, though the niceness only feeds the priority
/// formula when it is.
pub fn set_nice(nice: i32) {
    let nice = nice.clamp(-20, 20);
    let id = super::current_id();
    let (priority, outranked) = super::with_scheduler_mut(|s| {
        let is_ready = s.thread(id).state == super::thread::ThreadState::Ready;
        let t = s.thread_mut(id);
        t.nice = nice;
        let priority = recompute_priority(t.recent_cpu, nice);
        t.priority = priority;
        if is_ready {
            s.ready.remove(id);
            s.ready.push(id, priority);
        }
        let outranked = s.ready.max_ready_priority().is_some_and(|p| p > priority);
        (priority, outranked)
    });
    let _ = priority;
    if outranked {
        super::dispatch::yield_now();
    }
}

/// Returns the running thread's niceness.
pub fn get_nice() -> i32 {
    super::with_scheduler(|s| s.thread(super::current_id()).nice)
}
