//! # Dispatch loop
//!
//! The timer interrupt. Every invocation:
//!
//! 1. folds pending enable/disable requests into the enabled mask,
//! 2. sweeps the enabled channels, toggling every line that is due and
//!    advancing its phase, for as long as another edge is imminent and the
//!    time budget lasts,
//! 3. runs the aux callback, if any,
//! 4. re-arms the one-shot timer for the earliest next event.
//!
//! Phase is tracked as an absolute cycle count that only ever advances in
//! whole periods, so interrupt latency shows up as jitter on single edges
//! but never accumulates.
//!
//! This runs as an NMI on the ESP8266: no locks that foreground code might
//! hold, no logging, no panics.

use portable_atomic::Ordering;

use crate::{
    channel::{active_range, pin_mask, Mode},
    config::Timing,
    hal::{CycleClock, OneShotTimer, Platform},
    timer::cycles_to_ticks,
    WaveformGenerator,
};

pub(crate) const EMPTY_SCAN_RANGE: u32 = pack_range(1, 0);

#[inline(always)]
const fn pack_range(first: u8, last: u8) -> u32 {
    first as u32 | (last as u32) << 8
}

#[inline(always)]
const fn unpack_range(range: u32) -> (u8, u8) {
    (range as u8, (range >> 8) as u8)
}

/// Signed distance from `now` to `then`, tolerant of counter wraparound.
#[inline(always)]
pub(crate) fn until(then: u32, now: u32) -> i32 {
    then.wrapping_sub(now) as i32
}

impl<P: Platform> WaveformGenerator<P> {
    /// Services the channels and re-arms the timer.
    ///
    /// To be called from the one-shot timer's interrupt handler only. Must
    /// not be re-entered.
    #[inline(never)]
    pub fn on_timer_interrupt(&self) {
        let clock = self.platform.clock();
        let isr_start = clock.now();
        let timing = Timing::new(clock);
        let isr_deadline = isr_start.wrapping_add(timing.budget as u32);

        let mut enabled = self.enabled.load(Ordering::Relaxed);
        let mut level = self.level.load(Ordering::Relaxed);
        let mut range = self.scan_range.load(Ordering::Relaxed);

        let pending = self.requests.take_snapshot();
        if !pending.is_empty() {
            enabled = pending.apply(enabled);
            // Newly enabled channels start low.
            level &= !pending.enable;
            let (first, last) = active_range(enabled);
            range = pack_range(first, last);

            self.level.store(level, Ordering::Relaxed);
            self.scan_range.store(range, Ordering::Relaxed);
            self.enabled.store(enabled, Ordering::Release);
            self.requests.acknowledge(pending);
        }

        let mut now = isr_start;
        let mut wake_at = now.wrapping_add(timing.max_period as u32);

        if enabled != 0 {
            let enabled_on_entry = enabled;

            loop {
                let sweep_now = now;
                let next_wake = self.sweep(range, &mut enabled, &mut level, sweep_now, &timing);

                now = clock.now();
                if enabled == 0 {
                    wake_at = now.wrapping_add(timing.max_period as u32);
                    break;
                }
                wake_at = sweep_now.wrapping_add(next_wake as u32);

                let imminent = until(wake_at, now) <= timing.latency;
                let in_budget = until(isr_deadline, now) > 0;
                if !(imminent && in_budget) {
                    break;
                }
            }

            self.level.store(level, Ordering::Relaxed);
            if enabled != enabled_on_entry {
                let (first, last) = active_range(enabled);
                self.scan_range
                    .store(pack_range(first, last), Ordering::Relaxed);
                self.enabled.store(enabled, Ordering::Release);
            }
        }

        let mut delay = until(wake_at, now);

        if let Some(callback) = self.aux_callback() {
            let requested = clock.micros_to_cycles(callback()).min(i32::MAX as u32) as i32;
            let after = clock.now();
            let callback_delay = requested.saturating_sub(until(after, now));
            delay = until(wake_at, after).min(callback_delay);
        }

        self.rearm(delay, &timing);
    }

    /// One pass over the enabled channels at time `now`. Returns the delay
    /// until the earliest upcoming edge or deadline, relative to `now`.
    #[inline(always)]
    fn sweep(
        &self,
        range: u32,
        enabled: &mut u32,
        level: &mut u32,
        now: u32,
        timing: &Timing,
    ) -> i32 {
        let (first, last) = unpack_range(range);
        let mut next_wake = timing.max_period;

        for pin in first..=last {
            let mask = pin_mask(pin);
            if *enabled & mask == 0 {
                continue;
            }
            let wave = self.channels.get(pin);

            let mut mode = wave.mode();
            if mode == Mode::Init {
                wave.set_phase_start(now);
                mode = if wave.expiry() == 0 {
                    Mode::Infinite
                } else {
                    Mode::UpdateExpiry
                };
                wave.set_mode(mode);
            }
            if mode == Mode::UpdateExpiry {
                wave.set_expiry(wave.expiry().wrapping_add(wave.phase_start()));
                mode = Mode::Expires;
                wave.set_mode(mode);
            }

            let mut phase_start = wave.phase_start();
            let (duty, period) = wave.active_shape();
            let high_time = if *level & mask != 0 { duty } else { 0 };
            let mut next_event = until(phase_start.wrapping_add(high_time), now);
            let expiry_remaining = if mode == Mode::Expires {
                until(wave.expiry(), now)
            } else {
                next_event.wrapping_add(1)
            };

            if next_event <= 0 && expiry_remaining > next_event {
                *level ^= mask;
                let line = self.platform.line(pin);

                if *level & mask != 0 {
                    // Rising edge: the only point a new shape is picked up.
                    let (duty, _) = wave.latch_shape();
                    if duty > 0 {
                        line.set();
                    }
                    next_event = next_event.wrapping_add(duty as i32);
                } else {
                    if duty != period {
                        line.clear();
                    }
                    // Skip whole periods we were too late for. The phase only
                    // ever moves by full periods, however late this pass ran.
                    loop {
                        phase_start = phase_start.wrapping_add(period);
                        next_event = until(phase_start, now);
                        if next_event > -(duty as i32) {
                            break;
                        }
                    }
                    wave.set_phase_start(phase_start);
                }
            }

            next_wake = next_wake.min(next_event);

            if mode == Mode::Expires {
                if expiry_remaining <= 0 {
                    *enabled &= !mask;
                } else {
                    next_wake = next_wake.min(expiry_remaining);
                }
            }
        }

        next_wake
    }

    fn rearm(&self, delay: i32, timing: &Timing) {
        let delay = delay
            .saturating_sub(timing.overhead)
            .clamp(timing.latency, timing.max_period.max(timing.latency));

        let clock = self.platform.clock();
        self.platform
            .timer()
            .arm(cycles_to_ticks(clock, delay as u32));
    }
}
