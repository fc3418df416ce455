//! # Hobby servos
//!
//! Standard 50 Hz servo frames: one pulse of [`MIN_PULSE_US`] to
//! [`MAX_PULSE_US`] every [`REFRESH_INTERVAL_US`]. A new position is picked
//! up at the start of the next frame, so the servo never sees a runt pulse.

use crate::{
    hal::Platform,
    WaveformGenerator,
    MAX_PIN,
};

/// Length of one servo frame.
pub const REFRESH_INTERVAL_US: u32 = 20_000;
/// Shortest pulse a [`Servo`] can be limited to.
pub const MIN_PULSE_US: u32 = 200;
/// Longest pulse a [`Servo`] can be limited to.
pub const MAX_PULSE_US: u32 = 3_000;
/// Default lower limit, the 0° position.
pub const DEFAULT_MIN_US: u32 = 544;
/// Default upper limit, the 180° position.
pub const DEFAULT_MAX_US: u32 = 2_400;
/// Position a servo is sent to when first attached.
pub const DEFAULT_PULSE_US: u32 = 1_500;

/// One servo on one pin.
pub struct Servo<'a, P: Platform> {
    generator: &'a WaveformGenerator<P>,
    pin: Option<u8>,
    min_us: u32,
    max_us: u32,
    value_us: u32,
}

impl<'a, P: Platform> Servo<'a, P> {
    /// A detached servo with the default limits.
    pub fn new(generator: &'a WaveformGenerator<P>) -> Self {
        Self {
            generator,
            pin: None,
            min_us: DEFAULT_MIN_US,
            max_us: DEFAULT_MAX_US,
            value_us: DEFAULT_PULSE_US,
        }
    }

    /// Starts driving `pin` with the last written position.
    pub fn attach(&mut self, pin: u8) -> bool {
        self.attach_with_limits(pin, self.min_us, self.max_us)
    }

    /// Like [`attach`](Self::attach), also setting the pulse range that
    /// maps onto 0..=180°. Limits are clamped to
    /// [`MIN_PULSE_US`]`..=`[`MAX_PULSE_US`].
    pub fn attach_with_limits(&mut self, pin: u8, min_us: u32, max_us: u32) -> bool {
        let min_us = min_us.max(MIN_PULSE_US);
        let max_us = max_us.min(MAX_PULSE_US);
        if pin > MAX_PIN || min_us >= max_us {
            warn!("servo: cannot attach pin {} with {}..{} us", pin, min_us, max_us);
            return false;
        }

        if let Some(old) = self.pin.filter(|&old| old != pin) {
            self.generator.stop_waveform(old);
        }
        self.pin = Some(pin);
        self.min_us = min_us;
        self.max_us = max_us;

        if !self.write_micros(self.value_us) {
            self.pin = None;
            return false;
        }
        true
    }

    /// Stops the pulse train. The line stays where the last pulse left it,
    /// which is low.
    pub fn detach(&mut self) -> bool {
        match self.pin.take() {
            Some(pin) => self.generator.stop_waveform(pin),
            None => false,
        }
    }

    /// Whether a pin is being driven.
    pub fn is_attached(&self) -> bool {
        self.pin.is_some()
    }

    /// Values below the lower pulse limit are angles in degrees, anything
    /// else is a pulse width in microseconds.
    pub fn write(&mut self, value: u32) -> bool {
        if value < self.min_us {
            self.write_angle(value)
        } else {
            self.write_micros(value)
        }
    }

    /// Moves to `degrees`, clamped to 0..=180.
    pub fn write_angle(&mut self, degrees: u32) -> bool {
        let degrees = degrees.min(180);
        let span = self.max_us - self.min_us;
        self.write_micros(self.min_us + span * degrees / 180)
    }

    /// Sets the pulse width, clamped to the attach limits.
    ///
    /// Remembered while detached and applied on the next attach.
    pub fn write_micros(&mut self, pulse_us: u32) -> bool {
        self.value_us = pulse_us.clamp(self.min_us, self.max_us);

        match self.pin {
            Some(pin) => self.generator.start_waveform_micros(
                pin,
                self.value_us,
                REFRESH_INTERVAL_US - self.value_us,
                0,
            ),
            None => true,
        }
    }

    /// The current pulse width.
    pub fn read_micros(&self) -> u32 {
        self.value_us
    }

    /// The current position in degrees, rounded.
    pub fn read_angle(&self) -> u32 {
        let span = self.max_us - self.min_us;
        ((self.value_us - self.min_us) * 180 + span / 2) / span
    }
}

impl<P: Platform> Drop for Servo<'_, P> {
    fn drop(&mut self) {
        self.detach();
    }
}
