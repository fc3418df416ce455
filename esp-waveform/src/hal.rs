//! # Hardware seams
//!
//! The generator itself never touches a register. Everything it needs from
//! the chip goes through the traits in this module, which keeps the dispatch
//! loop identical between the ESP8266 backend and the host simulator used by
//! the tests.
//!
//! Every method here may be called from the timer interrupt, so
//! implementations must not block, allocate or log.

/// Interrupt handler signature accepted by [`OneShotTimer::attach`].
pub type InterruptHandler = fn();

/// Monotonic CPU cycle counter.
pub trait CycleClock {
    /// Current value of the cycle counter. Wraps at 2^32.
    fn now(&self) -> u32;

    /// Converts a duration in microseconds into CPU cycles at the current
    /// clock rate.
    fn micros_to_cycles(&self, us: u32) -> u32;

    /// Whether the CPU runs at twice the rate of the timer's tick, in which
    /// case timer reload values are half the cycle count.
    fn is_fast(&self) -> bool;
}

/// A single GPIO output line.
///
/// Implementations are expected to be a single register write where the
/// hardware allows it; lines that need a read-modify-write (GPIO16 on the
/// ESP8266) implement the same trait with their slower path.
pub trait GpioLine {
    /// Drives the line high.
    fn set(&self);

    /// Drives the line low.
    fn clear(&self);
}

/// A hardware timer that raises one interrupt after a programmed number of
/// ticks and then stays silent until it is armed again.
pub trait OneShotTimer {
    /// Installs `handler` as the timer's interrupt handler.
    fn attach(&self, handler: InterruptHandler);

    /// Removes the interrupt handler.
    fn detach(&self);

    /// Enables the timer in edge-triggered, one-shot mode.
    fn enable(&self);

    /// Disables the timer. A pending expiry does not fire.
    fn disable(&self);

    /// Loads `ticks` into the reload register. The interrupt fires once the
    /// count reaches zero.
    fn arm(&self, ticks: u32);

    /// Ticks left until the armed interrupt fires, `0` once it has fired or
    /// while nothing is armed.
    fn remaining(&self) -> u32;
}

/// Everything the generator needs from a target.
pub trait Platform {
    /// The cycle counter.
    type Clock: CycleClock;
    /// The one-shot timer shared by the generator and the aux callback.
    type Timer: OneShotTimer;

    /// The cycle counter.
    fn clock(&self) -> &Self::Clock;

    /// The one-shot timer.
    fn timer(&self) -> &Self::Timer;

    /// The output line for `pin`, which is always in `0..=16`.
    fn line(&self, pin: u8) -> &dyn GpioLine;

    /// Pins that exist but must never be driven, e.g. flash interface pins.
    fn is_reserved(&self, pin: u8) -> bool;

    /// Lets other cooperative work run. Only called from foreground code,
    /// while waiting for the dispatch loop to pick up a request.
    ///
    /// A target with no scheduler underneath has nothing to yield to and may
    /// implement this as the same spin as [`relax`](Self::relax); the timer
    /// interrupt still preempts the wait.
    fn yield_now(&self);

    /// Busy-wait hint. Must be safe in any interrupt context.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}
