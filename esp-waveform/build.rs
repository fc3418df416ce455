use esp_config::{generate_config, ConfigOption, DisplayHint, Stability, Validator, Value};

fn main() {
    // emit config
    generate_config(
        "esp-waveform",
        &[
            ConfigOption {
                name: "isr-budget-us".into(),
                description: "Upper bound on the time, in microseconds, a single timer interrupt \
                keeps servicing channels before it re-arms the timer and returns. Longer budgets \
                amortize the interrupt entry cost for very short periods at the expense of \
                foreground latency.".into(),
                default_value: Value::Integer(14),
                constraint: Some(Validator::PositiveInteger),
                stability: Stability::Unstable,
                active: true,
                display_hint: DisplayHint::None,
            },
            ConfigOption {
                name: "irq-latency-us".into(),
                description: "Shortest delay, in microseconds, the one-shot timer is ever armed \
                with. Also used when a control request needs the interrupt to run right away.".into(),
                default_value: Value::Integer(2),
                constraint: Some(Validator::PositiveInteger),
                stability: Stability::Unstable,
                active: true,
                display_hint: DisplayHint::None,
            },
            ConfigOption {
                name: "irq-overhead-us".into(),
                description: "Time, in microseconds, between the timer firing and the interrupt \
                handler reading the cycle counter. Subtracted from every re-arm delay.".into(),
                default_value: Value::Integer(2),
                constraint: Some(Validator::NonNegativeInteger),
                stability: Stability::Unstable,
                active: true,
                display_hint: DisplayHint::None,
            },
            ConfigOption {
                name: "max-irq-period-us".into(),
                description: "Longest interval, in microseconds, between two timer interrupts \
                while the generator is running. The hardware backend additionally clamps this \
                to the width of the timer's load register.".into(),
                default_value: Value::Integer(1_000_000),
                constraint: Some(Validator::PositiveInteger),
                stability: Stability::Unstable,
                active: true,
                display_hint: DisplayHint::None,
            },
        ],
        true,
        true,
    );
}
