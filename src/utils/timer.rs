/*
 * Programmable Interval Timer (PIT) setup
 *
 * Programs PIT channel 0 to fire IRQ0 at the scheduler's assumed tick
 * rate (100 Hz, `scheduler::TICK_HZ`). The tick itself is handled
 * entirely on the interrupt path (`scheduler::dispatch::
 * preemptive_timer_interrupt_handler`, wired up in `arch::x86_64::idt`);
 * this module only configures the hardware divisor.
 */

use x86_64::instructions::port::Port;

const PIT_FREQUENCY_HZ: u32 = 1_193_182;

/// Programs PIT channel 0 for square-wave mode at `scheduler::TICK_HZ`.
pub fn init() {
    let divisor = (PIT_FREQUENCY_HZ / crate::scheduler::TICK_HZ as u32) as u16;

    let mut command: Port<u8> = Port::new(0x43);
    let mut channel0: Port<u8> = Port::new(0x40);

    unsafe {
        command.write(0x36u8); // channel 0, lobyte/hibyte, mode 3 (square wave)
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }

    log::info!("PIT programmed for {} Hz", crate::scheduler::TICK_HZ);
}
