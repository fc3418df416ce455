use esp_config::esp_config_int;

use crate::hal::CycleClock;

pub(crate) const ISR_BUDGET_US: u32 = esp_config_int!(u32, "ESP_WAVEFORM_CONFIG_ISR_BUDGET_US");
pub(crate) const IRQ_LATENCY_US: u32 = esp_config_int!(u32, "ESP_WAVEFORM_CONFIG_IRQ_LATENCY_US");
pub(crate) const IRQ_OVERHEAD_US: u32 = esp_config_int!(u32, "ESP_WAVEFORM_CONFIG_IRQ_OVERHEAD_US");
pub(crate) const MAX_IRQ_PERIOD_US: u32 =
    esp_config_int!(u32, "ESP_WAVEFORM_CONFIG_MAX_IRQ_PERIOD_US");

/// Tunables of the dispatch loop, converted to CPU cycles.
///
/// The cycle counter rate can change at runtime (80/160 MHz on the ESP8266),
/// so this is recomputed on every interrupt rather than cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timing {
    /// Time the loop may keep sweeping before it must return.
    pub budget: i32,
    /// Shortest re-arm delay; also what "imminent" means.
    pub latency: i32,
    /// Interrupt entry cost subtracted from each re-arm.
    pub overhead: i32,
    /// Idle re-arm delay.
    pub max_period: i32,
}

impl Timing {
    pub fn new(clock: &impl CycleClock) -> Self {
        let cycles = |us: u32| clock.micros_to_cycles(us).min(i32::MAX as u32) as i32;

        Self {
            budget: cycles(ISR_BUDGET_US),
            latency: cycles(IRQ_LATENCY_US),
            overhead: cycles(IRQ_OVERHEAD_US),
            max_period: cycles(MAX_IRQ_PERIOD_US),
        }
    }
}
