//! # Channel table
//!
//! One [`Waveform`] record per output pin. Records are never created or
//! destroyed: a slot is simply enabled or disabled in the dispatch loop's
//! `enabled` mask and keeps its last shape for a later restart.
//!
//! Field ownership is split between the two contexts:
//!
//! | field            | written by                         | read by         |
//! |------------------|------------------------------------|-----------------|
//! | `phase_start`    | dispatch loop                      | dispatch loop   |
//! | active shape     | dispatch loop                      | dispatch loop   |
//! | `duty`, `period` | control API                        | dispatch loop   |
//! | `expiry`         | control API (relative), loop (abs) | dispatch loop   |
//! | `mode`           | control API hand-offs, loop        | dispatch loop   |
//!
//! The loop copies `duty`/`period` into the active shape on every low to
//! high edge and uses only the copy until the next one, so a new shape never
//! cuts a pulse short or stretches it.
//!
//! The API only writes `mode`/`expiry` while the loop is not interpreting
//! them: before the enable request is published, or after forcing
//! [`Mode::Infinite`], which makes the loop ignore `expiry` entirely.

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

/// Number of GPIO lines the generator can drive (GPIO0..=GPIO16).
pub const CHANNEL_COUNT: usize = 17;

/// Highest pin number accepted by the control API.
pub const MAX_PIN: u8 = CHANNEL_COUNT as u8 - 1;

/// Lifetime of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Runs until stopped.
    Infinite = 0,
    /// `expiry` holds an absolute cycle deadline.
    Expires = 1,
    /// `expiry` holds a relative duration to be anchored at the current
    /// period start.
    UpdateExpiry = 2,
    /// Freshly requested; `phase_start` is anchored on the first pass.
    /// `expiry` is relative, `0` meaning forever.
    Init = 3,
}

impl Mode {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Mode::Expires,
            2 => Mode::UpdateExpiry,
            3 => Mode::Init,
            _ => Mode::Infinite,
        }
    }
}

/// Shape and lifetime of one pin's periodic signal. All times in CPU cycles.
#[derive(Debug)]
pub struct Waveform {
    phase_start: AtomicU32,
    active_duty: AtomicU32,
    active_period: AtomicU32,
    duty: AtomicU32,
    period: AtomicU32,
    expiry: AtomicU32,
    mode: AtomicU8,
}

impl Waveform {
    /// An idle record.
    pub const fn new() -> Self {
        Self {
            phase_start: AtomicU32::new(0),
            active_duty: AtomicU32::new(0),
            active_period: AtomicU32::new(0),
            duty: AtomicU32::new(0),
            period: AtomicU32::new(0),
            expiry: AtomicU32::new(0),
            mode: AtomicU8::new(Mode::Infinite as u8),
        }
    }

    /// Cycle count at which the current period started.
    pub fn phase_start(&self) -> u32 {
        self.phase_start.load(Ordering::Relaxed)
    }

    pub(crate) fn set_phase_start(&self, ccy: u32) {
        self.phase_start.store(ccy, Ordering::Relaxed);
    }

    /// The `(duty, period)` pair the current period is being generated with.
    pub fn active_shape(&self) -> (u32, u32) {
        (
            self.active_duty.load(Ordering::Relaxed),
            self.active_period.load(Ordering::Relaxed),
        )
    }

    /// Copies the requested shape into the active one and returns it.
    pub(crate) fn latch_shape(&self) -> (u32, u32) {
        let period = self.period.load(Ordering::Relaxed);
        // Clamped in case we caught the API between its two stores.
        let duty = self.duty.load(Ordering::Relaxed).min(period);
        self.active_duty.store(duty, Ordering::Relaxed);
        self.active_period.store(period, Ordering::Relaxed);
        (duty, period)
    }

    /// Requested high time per period.
    pub fn duty(&self) -> u32 {
        self.duty.load(Ordering::Relaxed)
    }

    /// Requested full period.
    pub fn period(&self) -> u32 {
        self.period.load(Ordering::Relaxed)
    }

    /// Stores a new shape. Picked up by the loop at the next low to high edge.
    pub(crate) fn set_shape(&self, duty: u32, period: u32) {
        debug_assert!(duty <= period);
        self.period.store(period, Ordering::Relaxed);
        self.duty.store(duty, Ordering::Relaxed);
    }

    /// Raw expiry word; see [`Mode`] for how to read it.
    pub fn expiry(&self) -> u32 {
        self.expiry.load(Ordering::Relaxed)
    }

    pub(crate) fn set_expiry(&self, ccy: u32) {
        self.expiry.store(ccy, Ordering::Relaxed);
    }

    /// Current lifetime mode.
    pub fn mode(&self) -> Mode {
        Mode::from_raw(self.mode.load(Ordering::Relaxed))
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }
}

impl Default for Waveform {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed table of all channels, indexed by pin.
#[derive(Debug)]
pub struct ChannelTable {
    channels: [Waveform; CHANNEL_COUNT],
}

impl ChannelTable {
    /// A table with every slot idle.
    pub const fn new() -> Self {
        Self {
            channels: [const { Waveform::new() }; CHANNEL_COUNT],
        }
    }

    /// The record for `pin`.
    ///
    /// # Panics
    ///
    /// Panics if `pin > MAX_PIN`.
    pub fn get(&self, pin: u8) -> &Waveform {
        &self.channels[pin as usize]
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-bit mask for `pin`.
#[inline(always)]
pub(crate) const fn pin_mask(pin: u8) -> u32 {
    1 << pin
}

/// Inclusive `[first, last]` pin bounds of a non-empty enabled mask.
#[inline(always)]
pub(crate) fn active_range(enabled: u32) -> (u8, u8) {
    if enabled == 0 {
        // Empty range: first > last, so a sweep does nothing.
        return (1, 0);
    }
    let first = enabled.trailing_zeros() as u8;
    let last = 31 - enabled.leading_zeros() as u8;
    (first, last)
}
