/*
 * Peripheral Device Management
 *
 * Hardware devices the scheduler core needs to boot and report itself:
 * the 8259 PIC (interrupt routing) and the COM1 serial port (the only
 * debug/log sink this kernel has; there is no framebuffer or keyboard
 * in scope).
 */

pub mod pic;
pub mod serial;

/// Brings up the peripherals the kernel depends on before interrupts are
/// enabled: the serial console and the PIC's IRQ remap.
pub fn init_peripherals() {
    serial::init();
    log::info!("Serial console initialized");
    pic::init_pic();
    log::info!("PIC initialization complete");
}
