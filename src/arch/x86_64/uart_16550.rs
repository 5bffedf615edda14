/*
 * 16550 UART serial port driver.
 *
 * Backs the kernel logger: every `log::info!`/`log::warn!`/`log::error!`
 * call ultimately writes bytes through a `SerialPort<Pio<u8>>`.
 */

use core::convert::TryInto;

use bitflags::bitflags;
use spin::Mutex;

use super::pio::{Io, Pio, ReadOnly};

bitflags! {
    /// Line status flags.
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        const OUTPUT_EMPTY = 1 << 5;
    }
}

/// Serial port representation.
pub struct SerialPort<T: Io> {
    data: T,
    int_en: T,
    fifo_ctrl: T,
    line_ctrl: T,
    modem_ctrl: T,
    line_sts: ReadOnly<T>,
}

impl SerialPort<Pio<u8>> {
    /// Creates a new serial port instance at the given I/O base port.
    pub const fn new(base: u16) -> SerialPort<Pio<u8>> {
        SerialPort {
            data: Pio::new(base),
            int_en: Pio::new(base + 1),
            fifo_ctrl: Pio::new(base + 2),
            line_ctrl: Pio::new(base + 3),
            modem_ctrl: Pio::new(base + 4),
            line_sts: ReadOnly::new(Pio::new(base + 5)),
        }
    }
}

impl<T: Io> SerialPort<T>
where
    T::Value: From<u8> + TryInto<u8>,
{
    /// Initializes the serial port: 38400 baud, 8N1, FIFO enabled.
    pub fn init(&mut self) {
        self.int_en.write(0x00.into());
        self.line_ctrl.write(0x80.into());
        self.data.write(0x01.into());
        self.int_en.write(0x00.into());
        self.line_ctrl.write(0x03.into());
        self.fifo_ctrl.write(0xC7.into());
        self.modem_ctrl.write(0x0B.into());
        self.int_en.write(0x01.into());
    }

    fn line_sts(&self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(
            (self.line_sts.read() & 0xFF.into()).try_into().unwrap_or(0),
        )
    }

    /// Sends a raw byte, busy-waiting until the transmit holding register is empty.
    pub fn send(&mut self, data: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {}
        self.data.write(data.into())
    }

    /// Writes a byte, translating `\n` to `\r\n` for terminal emulators.
    pub fn write(&mut self, b: u8) {
        match b {
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => self.send(b),
        }
    }
}

/// The debug serial port backing the kernel logger and `print!` macros.
pub static COM2: Mutex<SerialPort<Pio<u8>>> = Mutex::new(SerialPort::<Pio<u8>>::new(0x2F8));

/// Initializes the debug port. Must run before the first `log::*!` call.
pub fn init_debug_port() {
    COM2.lock().init();
}
