use core::fmt;

use spin::MutexGuard;

use crate::arch::x86_64::pio::Pio;
use crate::arch::x86_64::uart_16550::{COM2, SerialPort};

/// A simple writer that writes to the serial port.
pub struct Writer<'a> {
    serial: MutexGuard<'a, SerialPort<Pio<u8>>>,
}

impl<'a> Writer<'a> {
    /// Creates a new instance of the writer.
    pub fn new() -> Writer<'a> {
        Writer { serial: COM2.lock() }
    }

    /// Writes a byte to the serial port.
    pub fn write(&mut self, byte: u8) {
        self.serial.write(byte);
    }
}

impl<'a> fmt::Write for Writer<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write(byte);
        }
        Ok(())
    }
}
