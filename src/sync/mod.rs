//! Synchronization primitives built on the scheduler's ready-queue and
//! interrupt-masking discipline: a counting semaphore, a mutex with
//! priority donation, and a Mesa-style condition variable.
//!
//! None of these are spinlocks. On this uniprocessor target mutual
//! exclusion for the short bookkeeping sections is interrupt masking
//! (`arch::x86_64::interrupts::DisableInterrupts`); the primitives
//! themselves block the calling thread through the scheduler rather than
//! busy-waiting.

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::CondVar;
pub use lock::Lock;
pub use semaphore::Semaphore;
