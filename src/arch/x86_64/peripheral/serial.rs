//! 16550 UART driver for the kernel's debug/log console.
//!
//! Register layout and init sequence are the standard 16550 ones. An
//! earlier revision of this driver built on an external `Io` trait for
//! port access; `x86_64::Port` already gives the same raw port
//! read/write this needs, with no extra dependency.

use bitflags::bitflags;
use spin::Mutex;
use x86_64::instructions::port::Port;

bitflags! {
    /// Interrupt enable flags.
    #[allow(dead_code)]
    struct IntEnFlags: u8 {
        const RECEIVED = 1;
        const SENT = 1 << 1;
        const ERRORED = 1 << 2;
        const STATUS_CHANGE = 1 << 3;
    }
}

bitflags! {
    /// Line status flags.
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        const OUTPUT_EMPTY = 1 << 5;
    }
}

/// A 16550-compatible serial port.
pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// Brings the port up: disable UART interrupts, set DLAB and the
    /// divisor for 38400 baud, 8N1 framing, enable and clear the FIFO,
    /// then re-enable the "data received" interrupt.
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x01);
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
            self.int_en.write(0x01);
        }
    }

    fn line_sts(&mut self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(unsafe { self.line_sts.read() })
    }

    /// Sends a single byte, spinning until the transmit holding register
    /// is empty.
    pub fn send(&mut self, data: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {}
        unsafe { self.data.write(data) };
    }

    /// Writes a byte, expanding backspace/delete into the usual
    /// "backspace, space, backspace" terminal sequence.
    pub fn write(&mut self, b: u8) {
        match b {
            8 | 0x7F => {
                self.send(8);
                self.send(b' ');
                self.send(8);
            }
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => self.send(b),
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.write(byte);
        }
        Ok(())
    }
}

/// COM1, the kernel's sole debug/log console.
pub static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(0x3F8));

pub fn init() {
    COM1.lock().init();
}
