/*
 * Interrupt Descriptor Table (IDT)
 *
 * Wires up the handlers this kernel actually needs: CPU exceptions (all
 * fatal here, since there is no page fault recovery path without a
 * virtual memory subsystem), the timer IRQ0 that drives preemption and
 * MLFQS bookkeeping, and a software interrupt vector used for voluntary
 * context switches.
 */

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(fatal_divide_error);
        idt.debug.set_handler_fn(fatal_debug);
        idt.non_maskable_interrupt.set_handler_fn(fatal_nmi);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(fatal_overflow);
        idt.bound_range_exceeded.set_handler_fn(fatal_bound_range);
        idt.invalid_opcode.set_handler_fn(fatal_invalid_opcode);
        idt.device_not_available.set_handler_fn(fatal_device_not_available);
        unsafe {
            idt.double_fault
                .set_handler_fn(fatal_double_fault)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(fatal_invalid_tss);
        idt.segment_not_present.set_handler_fn(fatal_segment_not_present);
        idt.stack_segment_fault.set_handler_fn(fatal_stack_segment_fault);
        idt.general_protection_fault.set_handler_fn(fatal_general_protection);
        idt.page_fault.set_handler_fn(fatal_page_fault);
        idt.x87_floating_point.set_handler_fn(fatal_x87);
        idt.alignment_check.set_handler_fn(fatal_alignment_check);
        idt.machine_check.set_handler_fn(fatal_machine_check);
        idt.simd_floating_point.set_handler_fn(fatal_simd);
        idt.virtualization.set_handler_fn(fatal_virtualization);
        idt.security_exception.set_handler_fn(fatal_security_exception);

        // Software vector for a voluntary context switch (yield/block/exit).
        unsafe {
            idt[0x81].set_handler_addr(core::mem::transmute::<*const (), x86_64::VirtAddr>(
                crate::scheduler::dispatch::yield_interrupt_handler as *const (),
            ));
        }

        // IRQ0 (vector 32): the only hardware interrupt this kernel
        // services. Drives preemption, sleep wakeups, and MLFQS recompute.
        unsafe {
            idt[32].set_handler_addr(core::mem::transmute::<*const (), x86_64::VirtAddr>(
                crate::scheduler::dispatch::preemptive_timer_interrupt_handler as *const (),
            ));
        }

        idt
    };
}

/// Loads the IDT. Must run before interrupts are enabled.
pub fn init() {
    IDT.load();
    log::info!("IDT loaded");
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("breakpoint at {:#x}", stack_frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn fatal_divide_error(stack_frame: InterruptStackFrame) {
    panic!("divide error: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_debug(stack_frame: InterruptStackFrame) {
    panic!("debug exception: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_nmi(stack_frame: InterruptStackFrame) {
    panic!("non-maskable interrupt: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_overflow(stack_frame: InterruptStackFrame) {
    panic!("overflow exception: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_bound_range(stack_frame: InterruptStackFrame) {
    panic!("bound range exceeded: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_invalid_opcode(stack_frame: InterruptStackFrame) {
    panic!("invalid opcode at {:#x}", stack_frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn fatal_device_not_available(stack_frame: InterruptStackFrame) {
    panic!("device not available: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_double_fault(stack_frame: InterruptStackFrame, error_code: u64) -> ! {
    log::error!("double fault (error code {}): {:#?}", error_code, stack_frame);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn fatal_invalid_tss(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("invalid TSS (selector {}): {:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn fatal_segment_not_present(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("segment not present (selector {}): {:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn fatal_stack_segment_fault(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("stack segment fault (selector {}): {:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn fatal_general_protection(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("general protection fault (error code {}): {:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn fatal_page_fault(
    stack_frame: InterruptStackFrame,
    error_code: x86_64::structures::idt::PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    let fault_addr = Cr2::read_raw();
    panic!(
        "page fault at {:#x} (error {:?}): {:#?}",
        fault_addr, error_code, stack_frame
    );
}

extern "x86-interrupt" fn fatal_x87(stack_frame: InterruptStackFrame) {
    panic!("x87 floating point exception: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_alignment_check(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("alignment check (error code {}): {:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn fatal_machine_check(stack_frame: InterruptStackFrame) -> ! {
    log::error!("machine check: {:#?}", stack_frame);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn fatal_simd(stack_frame: InterruptStackFrame) {
    panic!("SIMD floating point exception: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_virtualization(stack_frame: InterruptStackFrame) {
    panic!("virtualization exception: {:#?}", stack_frame);
}

extern "x86-interrupt" fn fatal_security_exception(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!("security exception (error code {}): {:#?}", error_code, stack_frame);
}
