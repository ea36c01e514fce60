//! Architecture support. Only x86_64 is implemented; the scheduler core
//! itself is architecture-agnostic apart from the trap-frame layout and
//! the naked-asm context-switch handlers in `scheduler::dispatch`.

#[cfg(target_arch = "x86_64")]
#[macro_use]
pub mod x86_64;
