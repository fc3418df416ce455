//! # Analog-style PWM
//!
//! Maps a value in `0..=range` onto a duty cycle at a shared frequency.
//! Writing a new value to a running pin takes effect at its next rising
//! edge.
//!
//! ```rust, ignore
//! use fugit::RateExtU32;
//!
//! let mut pwm = Pwm::new(generator);
//! pwm.set_range(1023);
//! pwm.set_frequency(2.kHz());
//! pwm.analog_write(2, 512);
//! ```

use fugit::HertzU32;

use crate::{
    hal::{CycleClock, Platform},
    WaveformGenerator,
    MAX_PIN,
};

/// Lowest accepted PWM frequency.
pub const MIN_FREQUENCY: HertzU32 = HertzU32::Hz(100);
/// Highest accepted PWM frequency.
pub const MAX_FREQUENCY: HertzU32 = HertzU32::Hz(60_000);

/// Default `range`: 8-bit values.
pub const DEFAULT_RANGE: u32 = 255;
/// Default frequency.
pub const DEFAULT_FREQUENCY: HertzU32 = HertzU32::kHz(1);

/// PWM front-end over a [`WaveformGenerator`].
pub struct Pwm<'a, P: Platform> {
    generator: &'a WaveformGenerator<P>,
    range: u32,
    frequency: HertzU32,
}

impl<'a, P: Platform> Pwm<'a, P> {
    /// A front-end with [`DEFAULT_RANGE`] and [`DEFAULT_FREQUENCY`].
    pub fn new(generator: &'a WaveformGenerator<P>) -> Self {
        Self {
            generator,
            range: DEFAULT_RANGE,
            frequency: DEFAULT_FREQUENCY,
        }
    }

    /// The value that means "always high".
    pub fn range(&self) -> u32 {
        self.range
    }

    /// Sets the full-scale value. Rejects ranges below 15 or above 65535.
    pub fn set_range(&mut self, range: u32) -> bool {
        if !(15..=65_535).contains(&range) {
            warn!("pwm: range {} rejected", range);
            return false;
        }
        self.range = range;
        true
    }

    /// The PWM frequency.
    pub fn frequency(&self) -> HertzU32 {
        self.frequency
    }

    /// Sets the PWM frequency, clamped to
    /// [`MIN_FREQUENCY`]`..=`[`MAX_FREQUENCY`]. Applies to subsequent writes.
    pub fn set_frequency(&mut self, frequency: HertzU32) {
        let hz = frequency
            .to_Hz()
            .clamp(MIN_FREQUENCY.to_Hz(), MAX_FREQUENCY.to_Hz());
        self.frequency = HertzU32::from_raw(hz);
    }

    fn period(&self) -> u32 {
        let clock = self.generator.platform().clock();
        clock.micros_to_cycles(1_000_000) / self.frequency.to_Hz()
    }

    /// Drives `pin` with `value / range` duty.
    ///
    /// `0` stops the pin, anything at or above the range holds it high.
    pub fn analog_write(&self, pin: u8, value: u32) -> bool {
        if pin > MAX_PIN {
            return false;
        }
        if value == 0 {
            self.generator.stop_waveform(pin);
            return true;
        }

        let period = self.period();
        let duty = if value >= self.range {
            period
        } else {
            (period as u64 * value as u64 / self.range as u64) as u32
        };

        self.generator.start_waveform(pin, duty, period, 0)
    }
}
