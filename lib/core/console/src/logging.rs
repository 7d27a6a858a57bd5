//! Logging facilities.

use log::{LevelFilter, Metadata, Record};

use interface::error::{ErrorKind, Result};

use crate::{println, set_sink, ConsoleSink};

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} - {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Routes the `log` facade to the console. Can be called once per program.
pub fn init_logging(sink: ConsoleSink, level: LevelFilter) -> Result<()> {
    if !set_sink(sink) {
        return Err(ErrorKind::AlreadyInitialized);
    }
    log::set_logger(&LOGGER).map_err(|_| ErrorKind::AlreadyInitialized)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use spin::Mutex;
    use std::string::String;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(s: &str) {
        CAPTURED.lock().push_str(s);
    }

    #[test]
    fn records_reach_the_sink_once_installed() {
        assert_eq!(init_logging(capture, LevelFilter::Debug), Ok(()));
        assert_eq!(
            init_logging(capture, LevelFilter::Trace),
            Err(ErrorKind::AlreadyInitialized)
        );

        log::debug!("tis state {}", "Ready");
        log::trace!("filtered out");

        let out = CAPTURED.lock();
        assert!(out.contains("DEBUG - console::logging::tests: tis state Ready\n"));
        assert!(!out.contains("filtered out"));
    }
}
