//! # Tone
//!
//! 50 % square waves given in Hertz, optionally for a limited time.
//!
//! ```rust, ignore
//! use fugit::{ExtU32, RateExtU32};
//!
//! esp_waveform::tone::tone(generator, 4, 440.Hz(), Some(250.millis()));
//! ```

use fugit::{HertzU32, MillisDurationU32};

use crate::{
    hal::{CycleClock, Platform},
    WaveformGenerator,
};

/// Plays `frequency` on `pin`, for `duration` or until [`no_tone`].
///
/// A frequency of zero stops the pin. Frequencies above half the CPU clock
/// are rejected. Durations longer than the cycle counter's half range
/// (about 26 s at 80 MHz) are capped to it.
pub fn tone<P: Platform>(
    generator: &WaveformGenerator<P>,
    pin: u8,
    frequency: HertzU32,
    duration: Option<MillisDurationU32>,
) -> bool {
    if frequency.raw() == 0 {
        no_tone(generator, pin);
        return true;
    }

    let clock = generator.platform().clock();
    let period = clock.micros_to_cycles(1_000_000) / frequency.to_Hz();
    if period < 2 {
        warn!("tone: {} Hz is too fast for pin {}", frequency.to_Hz(), pin);
        return false;
    }

    let run = match duration {
        Some(duration) => clock
            .micros_to_cycles(duration.to_millis().saturating_mul(1000))
            .clamp(1, i32::MAX as u32),
        None => 0,
    };

    generator.start_waveform(pin, period / 2, period, run)
}

/// Silences `pin`. Does nothing if no tone is playing.
pub fn no_tone<P: Platform>(generator: &WaveformGenerator<P>, pin: u8) {
    generator.stop_waveform(pin);
}
