//! Phase-locked software waveform generator for the ESP8266.
//!
//! Drives up to 17 GPIO lines (GPIO0..=GPIO16) with independent periodic
//! signals from a single one-shot hardware timer. Every channel is described
//! by a high time and a period in CPU cycles. The timer interrupt toggles
//! each line when its next edge is due and re-arms itself for the earliest
//! upcoming event.
//!
//! Phases are kept as absolute cycle counts and only ever advance in whole
//! periods, so a late interrupt costs one edge some jitter but never shifts
//! the waveform. Channels whose periods divide one another stay aligned.
//! Shape changes take effect at the next rising edge and never cut a pulse
//! short.
//!
//! The generator is hardware agnostic: it talks to the chip through the
//! traits in [`hal`]. The `esp8266` feature supplies a register-level
//! implementation bound to FRC1 and exposes the control API as free
//! functions.
//!
//! On top of the cycle-based API sit small front-ends for common uses:
//! [`tone`], [`pwm`] and [`servo`].
//!
//! ```rust, ignore
//! // 5 kHz, 25 % duty on GPIO4, for 100 ms, at 80 MHz.
//! esp_waveform::start_waveform(4, 4_000, 16_000, 8_000_000);
//! ```
//!
//! ## Configuration
//!
//! The dispatch loop's timing can be tuned through environment variables at
//! build time:
#![doc = ""]
#![doc = include_str!(concat!(env!("OUT_DIR"), "/esp_waveform_config_table.md"))]
#![doc = ""]
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![doc(html_logo_url = "https://avatars.githubusercontent.com/u/46717278")]
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// MUST be the first module
mod fmt;

mod channel;
mod config;
mod dispatch;
mod generator;
mod request;
mod timer;

pub mod hal;
pub mod pwm;
pub mod servo;
pub mod tone;

#[cfg(feature = "esp8266")]
pub mod esp8266;

#[cfg(test)]
mod sim;

pub use self::{
    channel::{Mode, Waveform, CHANNEL_COUNT, MAX_PIN},
    generator::{AuxCallback, StartError, WaveformGenerator},
};

#[cfg(feature = "esp8266")]
pub use self::esp8266::{generator, set_aux_callback, start_waveform, stop_waveform};
