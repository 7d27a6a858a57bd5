#![no_std]
use core::fmt::{Write};
use spin::{Mutex, Once};

mod logging;

pub use logging::init_logging;

/// Backend the console writes to (UART, semihosting, a test buffer).
pub type ConsoleSink = fn(&str);

static SINK: Once<ConsoleSink> = Once::new();

pub static CONSOLE: Mutex<Console> = Mutex::new(Console {});

pub struct Console {
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if let Some(sink) = SINK.get() {
            sink(s);
        }
        Ok(())
    }
}

/// Output written before a sink is registered is dropped.
pub fn set_sink(sink: ConsoleSink) -> bool {
    let mut installed = false;
    SINK.call_once(|| {
        installed = true;
        sink
    });
    installed
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    // the sink cannot fail
    let _ = CONSOLE.lock().write_fmt(args);
}
