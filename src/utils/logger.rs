use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};

/// Serial-port logger implementation, the sink for every `log::*!` call.
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Initializes the logger, optionally clearing the terminal first.
///
/// # Panics
///
/// Panics if a logger has already been installed.
pub fn init(clearscr: bool) {
    if clearscr {
        _ = crate::utils::writer::Writer::new().write_str("\u{001B}[2J\u{001B}[H");
    }

    match log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info)) {
        Ok(()) => serial_println!("logger initialized"),
        Err(err) => panic!("failed to initialize logger: {}", err),
    }
}
