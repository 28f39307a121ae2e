//! `log` backend that writes to the console.

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::println;

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

#[cfg(not(feature = "verbose"))]
const MAX_LEVEL: LevelFilter = LevelFilter::Info;
#[cfg(feature = "verbose")]
const MAX_LEVEL: LevelFilter = LevelFilter::Trace;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= MAX_LEVEL
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        println!("[{level}] {}", record.args());
    }

    fn flush(&self) {}
}

pub fn init() {
    // only fails if a logger is already installed
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(MAX_LEVEL);
    }
}
