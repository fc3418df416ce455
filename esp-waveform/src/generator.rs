//! # Control API
//!
//! [`WaveformGenerator`] bundles the channel table, the request mailbox and
//! the timer driver for one [`Platform`]. Foreground code talks to it through
//! [`start_waveform`](WaveformGenerator::start_waveform),
//! [`stop_waveform`](WaveformGenerator::stop_waveform) and
//! [`set_aux_callback`](WaveformGenerator::set_aux_callback); the timer
//! interrupt runs
//! [`on_timer_interrupt`](WaveformGenerator::on_timer_interrupt).
//!
//! Nothing in here takes a lock on the waveform state. Only the dispatch loop
//! writes the `enabled` and `level` masks; the API publishes requests and
//! waits for them to be acknowledged.

use portable_atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::{
    channel::{pin_mask, ChannelTable, Mode, Waveform, MAX_PIN},
    hal::{CycleClock, InterruptHandler, Platform},
    request::Requests,
    timer::TimerDriver,
};

/// Callback run by the dispatch loop after every pass. Returns the longest
/// delay, in microseconds, until it wants to run again.
pub type AuxCallback = fn() -> u32;

/// Why a waveform could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// The pin number is above 16.
    InvalidPin,
    /// The pin exists but is reserved by the platform (e.g. flash lines).
    ReservedPin,
    /// A period of zero cycles was requested.
    ZeroPeriod,
    /// The high time is longer than the period.
    DutyExceedsPeriod,
    /// The period does not fit the signed cycle distance the dispatch loop
    /// works with (2^31 cycles, about 26 s at 80 MHz).
    PeriodTooLong,
    /// The run duration does not fit the signed cycle distance the dispatch
    /// loop works with (2^31 cycles, about 26 s at 80 MHz).
    DurationTooLong,
}

// Longest span the dispatch loop can compare against the cycle counter.
const MAX_SPAN_CYCLES: u32 = i32::MAX as u32;

/// A phase-locked waveform generator driving up to 17 GPIO lines from one
/// one-shot timer.
pub struct WaveformGenerator<P: Platform> {
    pub(crate) platform: P,
    pub(crate) channels: ChannelTable,
    pub(crate) requests: Requests,
    pub(crate) timer: TimerDriver,
    // An `AuxCallback` cast to a pointer, or null. Read from the interrupt.
    pub(crate) aux: AtomicPtr<()>,
    // Written by the dispatch loop only.
    pub(crate) enabled: AtomicU32,
    pub(crate) level: AtomicU32,
    pub(crate) scan_range: AtomicU32,
}

impl<P: Platform> WaveformGenerator<P> {
    /// Creates an idle generator.
    ///
    /// `handler` must end up calling [`Self::on_timer_interrupt`] on this
    /// very instance; it is what gets attached to the hardware timer.
    pub const fn new(platform: P, handler: InterruptHandler) -> Self {
        Self {
            platform,
            channels: ChannelTable::new(),
            requests: Requests::new(),
            timer: TimerDriver::new(handler),
            aux: AtomicPtr::new(core::ptr::null_mut()),
            enabled: AtomicU32::new(0),
            level: AtomicU32::new(0),
            scan_range: AtomicU32::new(crate::dispatch::EMPTY_SCAN_RANGE),
        }
    }

    /// The platform this generator drives.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Starts, or reshapes, the waveform on `pin`.
    ///
    /// `duty_cycles` of every `period_cycles` are high. `run_duration_cycles`
    /// limits how long the waveform runs; `0` runs until
    /// [`stop_waveform`](Self::stop_waveform).
    ///
    /// On a pin that is already running the new shape takes effect at its
    /// next rising edge and the run duration is re-anchored at the current
    /// period start. Otherwise this returns only once the dispatch loop has
    /// picked the channel up, yielding to other cooperative work while it
    /// waits. Must not be called from an interrupt.
    ///
    /// The period and the run duration must each stay within 2^31 cycles.
    pub fn start_waveform(
        &self,
        pin: u8,
        duty_cycles: u32,
        period_cycles: u32,
        run_duration_cycles: u32,
    ) -> bool {
        self.try_start_waveform(pin, duty_cycles, period_cycles, run_duration_cycles)
            .is_ok()
    }

    /// Like [`start_waveform`](Self::start_waveform), reporting why a request
    /// was rejected. A rejected request has no side effects.
    pub fn try_start_waveform(
        &self,
        pin: u8,
        duty_cycles: u32,
        period_cycles: u32,
        run_duration_cycles: u32,
    ) -> Result<(), StartError> {
        if pin > MAX_PIN {
            warn!("waveform: pin {} out of range", pin);
            return Err(StartError::InvalidPin);
        }
        if self.platform.is_reserved(pin) {
            warn!("waveform: pin {} is reserved", pin);
            return Err(StartError::ReservedPin);
        }
        if period_cycles == 0 {
            warn!("waveform: zero period on pin {}", pin);
            return Err(StartError::ZeroPeriod);
        }
        if period_cycles > MAX_SPAN_CYCLES {
            warn!("waveform: period {} too long on pin {}", period_cycles, pin);
            return Err(StartError::PeriodTooLong);
        }
        if duty_cycles > period_cycles {
            warn!(
                "waveform: duty {} exceeds period {} on pin {}",
                duty_cycles,
                period_cycles,
                pin
            );
            return Err(StartError::DutyExceedsPeriod);
        }
        if run_duration_cycles > MAX_SPAN_CYCLES {
            warn!(
                "waveform: run duration {} too long on pin {}",
                run_duration_cycles,
                pin
            );
            return Err(StartError::DurationTooLong);
        }

        let wave = self.channels.get(pin);
        let mask = pin_mask(pin);
        wave.set_shape(duty_cycles, period_cycles);

        if self.enabled.load(Ordering::Acquire) & mask == 0 {
            wave.set_mode(Mode::Init);
            wave.set_expiry(run_duration_cycles);
            trace!("waveform: enable request for pin {}", pin);
            self.requests.request_enable(mask);

            if self.timer.is_running() {
                self.timer
                    .arm_imminent(self.platform.timer(), self.platform.clock());
            } else {
                self.timer.start(self.platform.timer(), self.platform.clock());
            }

            while self.requests.enable_pending(mask) {
                self.platform.yield_now();
            }
        } else {
            Self::update_expiry(wave, run_duration_cycles);
        }

        Ok(())
    }

    /// Starts a waveform with `high_us` high and `low_us` low per period.
    pub fn start_waveform_micros(&self, pin: u8, high_us: u32, low_us: u32, run_us: u32) -> bool {
        let clock = self.platform.clock();
        let duty = clock.micros_to_cycles(high_us);
        let period = duty.saturating_add(clock.micros_to_cycles(low_us));
        self.start_waveform(pin, duty, period, clock.micros_to_cycles(run_us))
    }

    // The loop must never see the old absolute deadline paired with a new
    // relative value, so expiry checks are switched off while it changes.
    fn update_expiry(wave: &Waveform, run_duration_cycles: u32) {
        wave.set_mode(Mode::Infinite);
        wave.set_expiry(run_duration_cycles);
        if run_duration_cycles != 0 {
            wave.set_mode(Mode::UpdateExpiry);
        }
    }

    /// Stops the waveform on `pin`, leaving the line at its current level.
    ///
    /// Returns `false` if there was nothing to stop. Busy-waits without
    /// yielding until the dispatch loop acknowledges, so it is safe to call
    /// from any interrupt other than the timer's own.
    pub fn stop_waveform(&self, pin: u8) -> bool {
        if !self.timer.is_running() || pin > MAX_PIN {
            return false;
        }
        let mask = pin_mask(pin);
        if self.enabled.load(Ordering::Acquire) & mask == 0 {
            return false;
        }

        trace!("waveform: disable request for pin {}", pin);
        self.requests.request_disable(mask);
        self.timer
            .arm_imminent(self.platform.timer(), self.platform.clock());
        while self.requests.disable_pending(mask) {
            self.platform.relax();
        }

        if self.enabled.load(Ordering::Acquire) == 0 && self.aux_callback().is_none() {
            self.timer.stop(self.platform.timer());
        }

        true
    }

    /// Installs or removes the callback run after every dispatch pass.
    ///
    /// The timer keeps running while either a callback is installed or a
    /// channel is enabled.
    pub fn set_aux_callback(&self, callback: Option<AuxCallback>) {
        let raw = callback.map_or(core::ptr::null_mut(), |cb| cb as *mut ());
        self.aux.store(raw, Ordering::Release);

        if callback.is_some() {
            if self.timer.is_running() {
                self.timer
                    .arm_imminent(self.platform.timer(), self.platform.clock());
            } else {
                self.timer.start(self.platform.timer(), self.platform.clock());
            }
        } else if self.enabled.load(Ordering::Acquire) == 0 {
            self.timer.stop(self.platform.timer());
        }
    }

    pub(crate) fn aux_callback(&self) -> Option<AuxCallback> {
        let raw = self.aux.load(Ordering::Acquire);
        if raw.is_null() {
            None
        } else {
            // Only ever stored from an `AuxCallback` in `set_aux_callback`.
            Some(unsafe { core::mem::transmute::<*mut (), AuxCallback>(raw) })
        }
    }

    /// Whether the one-shot timer is currently driving the generator.
    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Whether `pin` is currently generating a waveform.
    pub fn is_enabled(&self, pin: u8) -> bool {
        pin <= MAX_PIN && self.enabled.load(Ordering::Acquire) & pin_mask(pin) != 0
    }

    /// Bit `n` set means GPIO`n` is generating a waveform.
    pub fn enabled_mask(&self) -> u32 {
        self.enabled.load(Ordering::Acquire)
    }

    /// The level the generator last drove `pin` to. Meaningless for pins
    /// that were never started.
    pub fn level(&self, pin: u8) -> bool {
        pin <= MAX_PIN && self.level.load(Ordering::Relaxed) & pin_mask(pin) != 0
    }

    /// The channel record for `pin`.
    ///
    /// # Panics
    ///
    /// Panics if `pin > 16`.
    pub fn channel(&self, pin: u8) -> &Waveform {
        self.channels.get(pin)
    }
}
