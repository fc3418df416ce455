//! # One-shot timer driver
//!
//! Owns start/stop of the single hardware timer that the dispatch loop and
//! the aux callback share. Both operations are idempotent and may be called
//! from foreground or interrupt context.

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    config::Timing,
    hal::{CycleClock, InterruptHandler, OneShotTimer},
};

/// Converts a delay in CPU cycles into timer ticks.
///
/// The ESP8266 timer always counts at 80 MHz; at 160 MHz a tick is two
/// cycles.
#[inline(always)]
pub(crate) fn cycles_to_ticks(clock: &impl CycleClock, cycles: u32) -> u32 {
    if clock.is_fast() {
        cycles >> 1
    } else {
        cycles
    }
}

#[derive(Debug)]
pub(crate) struct TimerDriver {
    running: AtomicBool,
    handler: InterruptHandler,
}

impl TimerDriver {
    pub const fn new(handler: InterruptHandler) -> Self {
        Self {
            running: AtomicBool::new(false),
            handler,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Attaches the dispatch loop and schedules its first run right away.
    pub fn start(&self, timer: &impl OneShotTimer, clock: &impl CycleClock) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        timer.disable();
        timer.attach(self.handler);
        timer.enable();
        Self::fire_soon(timer, clock);
        debug!("waveform timer started");
    }

    /// Detaches the dispatch loop and silences the timer.
    pub fn stop(&self, timer: &impl OneShotTimer) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        timer.detach();
        timer.disable();
        debug!("waveform timer stopped");
    }

    /// Pulls the next interrupt in to the shortest safe delay, so a pending
    /// request gets serviced promptly. An interrupt already due sooner is
    /// left alone.
    pub fn arm_imminent(&self, timer: &impl OneShotTimer, clock: &impl CycleClock) {
        if self.is_running() && timer.remaining() > Self::latency_ticks(clock) {
            Self::fire_soon(timer, clock);
        }
    }

    fn latency_ticks(clock: &impl CycleClock) -> u32 {
        cycles_to_ticks(clock, Timing::new(clock).latency as u32)
    }

    fn fire_soon(timer: &impl OneShotTimer, clock: &impl CycleClock) {
        timer.arm(Self::latency_ticks(clock));
    }
}
