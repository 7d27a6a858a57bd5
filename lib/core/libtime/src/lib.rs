#![no_std]

use interface::error::{ErrorKind, Result};

pub const ONE_US_IN_NS: u64 = 1000;
pub const ONE_MS_IN_NS: u64 = 1000 * 1000;

/// Outcome of a bounded poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    TimedOut,
}

impl<T> Poll<T> {
    pub fn is_ready(&self) -> bool {
        match self {
            Poll::Ready(_) => true,
            Poll::TimedOut => false,
        }
    }

    pub fn ready_or_timeout(self) -> Result<T> {
        match self {
            Poll::Ready(v) => Ok(v),
            Poll::TimedOut => Err(ErrorKind::TimedOut),
        }
    }
}

/// Calls `step` at most `budget` times, stopping at the first `Some`.
///
/// The budget counts iterations, not wall-clock time; a step that wants to pace
/// itself sleeps inside the closure.
pub fn poll_with_budget<T, F>(budget: usize, mut step: F) -> Poll<T>
where
    F: FnMut() -> Option<T>,
{
    for _ in 0..budget {
        if let Some(v) = step() {
            return Poll::Ready(v);
        }
    }
    Poll::TimedOut
}

/// Busy-wait delays. Implementations never yield.
pub trait Delay {
    fn delay_ns(&mut self, ns: u64);

    fn delay_us(&mut self, us: u64) {
        self.delay_ns(us * ONE_US_IN_NS);
    }

    fn delay_ms(&mut self, ms: u64) {
        self.delay_ns(ms * ONE_MS_IN_NS);
    }
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ns(&mut self, ns: u64) {
        (**self).delay_ns(ns)
    }
}

/// Spins a calibrated number of iterations per microsecond.
pub struct LoopDelay {
    spins_per_us: u64,
}

impl LoopDelay {
    pub const fn new(spins_per_us: u64) -> Self {
        Self { spins_per_us }
    }
}

impl Delay for LoopDelay {
    fn delay_ns(&mut self, ns: u64) {
        let spins = (ns * self.spins_per_us + ONE_US_IN_NS - 1) / ONE_US_IN_NS;
        for _ in 0..spins {
            core::hint::spin_loop();
        }
    }
}

/// Returns immediately. For simulated buses where time does not pass.
#[derive(Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_ns(&mut self, _ns: u64) {}
}
