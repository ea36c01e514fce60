/*
 * Kernel Entry Point
 *
 * Boots on bare x86_64: sets up the GDT/TSS, the IDT (CPU exceptions,
 * the timer IRQ, and the software yield vector), brings up the serial
 * console and 8259 PIC, hands Rust's allocator a kernel heap, and then
 * starts the scheduler and its MLFQS/priority-donation test suite. This
 * kernel has no notion of a user-process layer, a filesystem, or a
 * bootloader-supplied memory map; it only exists to exercise the
 * scheduler core.
 */

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
#![allow(dead_code)]

extern crate alloc;

use core::panic::PanicInfo;

mod arch;
mod memory;
mod scheduler;
mod sync;
mod tests;
mod utils;

#[repr(C, align(16))]
pub struct AlignedBspStack([u8; 64 * 1024]);

#[unsafe(no_mangle)]
pub static mut BSP_STACK: AlignedBspStack = AlignedBspStack([0; 64 * 1024]);

/// ===============================
///  EARLY ENTRY POINT (_start)
/// ===============================
///
/// The entry point the loader jumps to. There is no bootloader protocol
/// struct to consume here (no multiboot/bootboot info page); this
/// kernel only needs a stack before it can run Rust code.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "lea rax, [rip + BSP_STACK]",
        "add rax, {stack_size}",
        "mov rsp, rax",
        "jmp kstart",
        stack_size = const 64 * 1024,
    );
}

/// ===============================
///  RUST KERNEL ENTRY POINT
/// ===============================
///
/// Now running on our own stack.
#[unsafe(no_mangle)]
pub extern "C" fn kstart() -> ! {
    utils::logger::init(true);
    log::info!("kernel starting...");

    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();
    arch::x86_64::peripheral::init_peripherals();

    memory::init();

    // Exercise the allocator before anything depends on it.
    {
        use alloc::vec::Vec;
        let mut probe = Vec::new();
        probe.push(42);
        probe.push(1337);
        log::debug!("heap allocation probe: {:?}", probe);
    }

    scheduler::init(false);
    utils::timer::init();

    x86_64::instructions::interrupts::enable();
    log::info!("interrupts enabled");

    scheduler::enable();

    scheduler::dispatch::spawn(tests::run_test_suite, "test-runner", scheduler::PRI_DEFAULT);

    log::info!("kernel initialization complete, idling");
    loop {
        x86_64::instructions::hlt();
    }
}

/// ===============================
///  PANIC HANDLER
/// ===============================
///
/// Logging may fail very early in boot, but is safe once the logger is
/// installed, which happens before anything that could meaningfully
/// panic.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if let Some(location) = info.location() {
        log::error!("PANIC at {}:{}: {}", location.file(), location.line(), info.message());
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        x86_64::instructions::hlt();
    }
}
