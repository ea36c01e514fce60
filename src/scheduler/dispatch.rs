//! Dispatcher: thread creation/exit, block/unblock, and the interrupt
//! path that actually performs a context switch.
//!
//! Every context switch, preemptive or voluntary, goes through the
//! same mechanism: an interrupt (hardware timer IRQ0, or software
//! `int 0x81`) pushes an `InterruptFrame`, the naked
//! handler saves the general-purpose registers to build a complete
//! `InterruptContext` on the stack, calls `schedule_from_interrupt` with
//! a pointer to it, and `iretq`s through whatever context that call
//! returns. A thread that has merely been marked `Ready`/`Blocked`
//! doesn't actually stop running until this path fires.

use alloc::string::ToString;
use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};

use super::thread::{Thread, ThreadId, ThreadState};
use super::{
    allocate_tid, current_id, is_enabled, with_scheduler_mut, InterruptContext, PRI_DEFAULT,
    TICKS, TID_ERROR,
};

/// Set by `unblock`/donation when called from interrupt context and the
/// woken/boosted thread now outranks the thread that was interrupted.
/// Consulted by the timer handler right before `iretq` to decide whether
/// to immediately reschedule instead of resuming the interrupted thread.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);
static IN_INTERRUPT_CONTEXT: AtomicBool = AtomicBool::new(false);

pub fn in_interrupt_context() -> bool {
    IN_INTERRUPT_CONTEXT.load(Ordering::Relaxed)
}

pub(super) fn enter_interrupt() {
    IN_INTERRUPT_CONTEXT.store(true, Ordering::Relaxed);
}

pub(super) fn leave_interrupt() {
    IN_INTERRUPT_CONTEXT.store(false, Ordering::Relaxed);
}

fn request_yield_on_return() {
    YIELD_ON_RETURN.store(true, Ordering::Relaxed);
}

/// Creates a new thread, ready to run. Mirrors `thread_create`: priority
/// is set from the argument under plain priority scheduling; under MLFQS
/// the child inherits the creating thread's `nice`/`recent_cpu` and its
/// priority is computed from those via `mlfqs_update_priority`.
pub fn spawn(entry_point: fn(), name: &str, priority: i32) -> isize {
    let id = match allocate_tid() {
        Some(id) => id,
        None => return TID_ERROR,
    };

    let stack = alloc::vec![0u8; super::THREAD_STACK_SIZE].into_boxed_slice();
    let stack_top = stack.as_ptr() as u64 + super::THREAD_STACK_SIZE as u64;

    let mut ctx = InterruptContext::default();
    ctx.iret_frame.rip = entry_point as u64;
    ctx.iret_frame.rsp = stack_top;

    let mut thread = Thread::new(id, name, stack, priority.clamp(super::PRI_MIN, super::PRI_MAX));
    thread.interrupt_context = ctx;
    thread.parent_tid = Some(current_id());

    if super::mlfqs_enabled() {
        with_scheduler_mut(|s| {
            let parent = s.thread(current_id());
            let nice = parent.nice;
            let recent_cpu = parent.recent_cpu;
            thread.nice = nice;
            thread.recent_cpu = recent_cpu;
        });
        thread.priority = super::mlfqs::recompute_priority(thread.recent_cpu, thread.nice);
    }

    thread.state = ThreadState::Ready;
    let prio = thread.priority;

    with_scheduler_mut(|s| {
        s.threads.insert(id, thread);
        s.ready.push(id, prio);
    });

    // Child-info bookkeeping for parent/child rendezvous (spec's `create`
    // contract), separate from the insert above since it locks the
    // scheduler again to reach the parent's own TCB.
    super::child::register(current_id(), id);

    log::debug!("spawned thread {} '{}' priority {}", id, name, prio);
    maybe_preempt(prio);

    id.0 as isize
}

/// Spawns with the default priority, for callers that don't care.
pub fn spawn_default(entry_point: fn(), name: &str) -> isize {
    spawn(entry_point, name, PRI_DEFAULT)
}

/// If `new_priority` now outranks the running thread, either yields
/// immediately (thread context) or marks the interrupt epilogue to do so
/// (interrupt context), matching `thread_unblock`'s preemption check.
fn maybe_preempt(new_priority: i32) {
    if !is_enabled() {
        return;
    }
    let current = current_id();
    let current_priority = with_scheduler_mut(|s| s.thread(current).priority);
    if new_priority > current_priority {
        if in_interrupt_context() {
            request_yield_on_return();
        } else {
            yield_now();
        }
    }
}

/// Blocks the running thread. The caller is responsible for arranging a
/// later `unblock`, typically a synchronization primitive recording
/// this thread as a waiter before calling this.
pub fn block_current() {
    assert!(
        !crate::arch::x86_64::interrupts::are_enabled() || in_interrupt_context(),
        "block_current called with interrupts enabled outside a sync primitive's critical section"
    );
    let id = current_id();
    with_scheduler_mut(|s| {
        s.thread_mut(id).state = ThreadState::Blocked;
    });
    trigger_switch();
}

/// Makes a blocked thread ready again, reinserting it into the ready
/// structure at its current priority and preempting if it now outranks
/// whatever is running.
pub fn unblock(id: ThreadId) {
    let priority = with_scheduler_mut(|s| {
        let t = s.thread_mut(id);
        assert_eq!(t.state, ThreadState::Blocked, "unblock of non-blocked thread {}", id);
        t.state = ThreadState::Ready;
        let p = t.priority;
        s.ready.push(id, p);
        p
    });
    maybe_preempt(priority);
}

/// Voluntarily gives up the CPU. The running thread stays `Ready` and is
/// reinserted into the ready structure by `schedule_from_interrupt`.
pub fn yield_now() {
    if !is_enabled() {
        return;
    }
    trigger_switch();
}

/// Terminates the running thread. Never returns.
pub fn exit_current(exit_code: i32) -> ! {
    let id = current_id();
    assert_ne!(id.0, 0, "the idle thread cannot exit");

    log::info!("thread {} exiting with code {}", id, exit_code);

    super::child::record_exit(id, exit_code);

    // Only mark the thread Dying here. Queuing it for destruction happens
    // in `reschedule`, once the switch away from it is actually underway —
    // queuing it here would let the very next `drain_destruction_queue`
    // (at the top of this same reschedule) free the TCB and kernel stack
    // this thread is still executing on.
    with_scheduler_mut(|s| {
        s.thread_mut(id).state = ThreadState::Dying;
    });

    trigger_switch();
    unreachable!("exited thread resumed after context switch");
}

fn trigger_switch() {
    unsafe {
        asm!("int 0x81", options(nostack));
    }
}

/// Core dispatch logic, called from both the hardware timer handler and
/// the software yield handler with a pointer to the interrupted thread's
/// saved context. Returns the context to restore.
///
/// Runs with interrupts hardware-masked (we're in an interrupt handler)
/// and must not block.
#[no_mangle]
pub extern "C" fn schedule_from_interrupt(
    current_ctx_ptr: *const InterruptContext,
) -> *const InterruptContext {
    enter_interrupt();
    let result = reschedule(current_ctx_ptr);
    leave_interrupt();
    result
}

/// Saves the interrupted thread's context, requeues it if still
/// runnable, and switches to the next ready thread (or idle). Shared by
/// the voluntary-yield path and the timer tick path once it has decided
/// a switch is warranted.
pub(super) fn reschedule(current_ctx_ptr: *const InterruptContext) -> *const InterruptContext {
    if !is_enabled() {
        return current_ctx_ptr;
    }

    let current = current_id();

    super::with_scheduler_mut(|s| {
        // Only frees threads a *prior* dispatch marked Dying and queued —
        // never the thread whose stack is executing this call right now
        // (that one is queued below, after its context is saved, so it is
        // only actually freed the next time this runs).
        drain_destruction_queue(s);

        // Save the interrupted thread's registers and decide whether it
        // goes back on the ready structure, is queued for destruction, or
        // (idle, preempted mid-halt) simply drops off the ready structure.
        let cur_state;
        let cur_priority;
        {
            let t = s.thread_mut(current);
            // SAFETY: pointer was built by the naked handler just before
            // this call and points at a live stack frame.
            t.interrupt_context = unsafe { *current_ctx_ptr };
            t.check_stack_overflow();
            cur_state = t.state;
            cur_priority = t.priority;
        }
        match cur_state {
            ThreadState::Running if current != s.idle_tid() => {
                s.thread_mut(current).state = ThreadState::Ready;
                s.ready.push(current, cur_priority);
            }
            // The idle thread is never on the ready structure (spec
            // invariant): it has no wait structure to return to, so a
            // timer tick that preempts it while halted just leaves it
            // Blocked until directly selected again by the
            // `unwrap_or_else` fallback below.
            ThreadState::Running => {
                s.thread_mut(current).state = ThreadState::Blocked;
            }
            ThreadState::Dying => {
                s.destruction_queue.push(current);
            }
            ThreadState::Ready | ThreadState::Blocked => {}
        }

        let next = s.ready.pop_next().unwrap_or_else(|| s.idle_tid());
        s.thread_mut(next).state = ThreadState::Running;
        super::CURRENT_THREAD_ID.store(next.0, Ordering::SeqCst);

        YIELD_ON_RETURN.store(false, Ordering::Relaxed);
        &s.thread(next).interrupt_context as *const InterruptContext
    })
}

fn drain_destruction_queue(s: &mut super::SchedulerState) {
    let dying: alloc::vec::Vec<ThreadId> = s.destruction_queue.drain(..).collect();
    for id in dying {
        if let Some(t) = s.threads.remove(&id) {
            log::trace!("freed thread {} '{}'", id, t.name.to_string());
        }
    }
}

/// Software interrupt handler for voluntary context switches
/// (`int 0x81`), used by `yield_now`, `block_current`, and `exit_current`.
#[unsafe(naked)]
pub unsafe extern "C" fn yield_interrupt_handler() {
    core::arch::naked_asm!(
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "call {schedule_fn}",
        "mov rsp, rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "iretq",
        schedule_fn = sym schedule_from_interrupt,
    )
}

/// Preemptive timer interrupt handler (IRQ0). Identical register
/// save/restore to `yield_interrupt_handler`, plus the PIC EOI a
/// hardware IRQ requires.
#[unsafe(naked)]
pub unsafe extern "C" fn preemptive_timer_interrupt_handler() {
    core::arch::naked_asm!(
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "call {tick_fn}",
        "mov rsp, rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "push rax",
        "mov al, 0x20",
        "out 0x20, al",
        "pop rax",
        "iretq",
        tick_fn = sym crate::scheduler::tick::on_timer_tick,
    )
}

pub(super) fn should_yield_on_return() -> bool {
    YIELD_ON_RETURN.swap(false, Ordering::Relaxed)
}

pub(super) fn current_ticks_snapshot() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
