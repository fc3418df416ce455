//! Host-side stand-in for the ESP8266 timer, cycle counter and GPIO block.
//!
//! Time only moves when something reads the clock (each read costs a
//! configurable number of cycles) or when the simulated timer fires, so
//! every test is deterministic. Yielding or spinning while waiting on the
//! dispatch loop fires the pending timer interrupt, which is exactly what
//! the real hardware would eventually do.

use std::{
    boxed::Box,
    cell::Cell,
    ops::Range,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
        Mutex,
    },
    vec::Vec,
};

use crate::{
    channel::CHANNEL_COUNT,
    dispatch::until,
    hal::{CycleClock, GpioLine, InterruptHandler, OneShotTimer, Platform},
    WaveformGenerator,
};

/// Flash interface pins, as on the ESP8266.
pub(crate) const RESERVED_PINS: Range<u8> = 6..12;

struct ClockState {
    now: AtomicU32,
    mhz: u32,
    step: u32,
}

#[derive(Clone)]
pub(crate) struct SimClock(Arc<ClockState>);

impl SimClock {
    pub fn new(mhz: u32) -> Self {
        Self::with_step(mhz, 1)
    }

    pub fn with_step(mhz: u32, step: u32) -> Self {
        Self(Arc::new(ClockState {
            now: AtomicU32::new(0),
            mhz,
            step,
        }))
    }

    /// Current time, without the cost of a read.
    pub fn peek(&self) -> u32 {
        self.0.now.load(Ordering::SeqCst)
    }

    pub fn set(&self, now: u32) {
        self.0.now.store(now, Ordering::SeqCst);
    }
}

impl CycleClock for SimClock {
    fn now(&self) -> u32 {
        self.0.now.fetch_add(self.0.step, Ordering::SeqCst)
    }

    fn micros_to_cycles(&self, us: u32) -> u32 {
        us.saturating_mul(self.0.mhz)
    }

    fn is_fast(&self) -> bool {
        self.0.mhz >= 160
    }
}

#[derive(Default)]
struct TimerState {
    handler: Mutex<Option<InterruptHandler>>,
    deadline: Mutex<Option<u32>>,
    enabled: AtomicBool,
    attaches: AtomicU32,
    last_ticks: AtomicU32,
}

#[derive(Clone)]
pub(crate) struct SimTimer {
    clock: SimClock,
    state: Arc<TimerState>,
}

impl SimTimer {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
            state: Arc::default(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_deadline().is_some()
    }

    pub fn has_handler(&self) -> bool {
        self.state.handler.lock().unwrap().is_some()
    }

    pub fn attach_count(&self) -> u32 {
        self.state.attaches.load(Ordering::SeqCst)
    }

    pub fn last_ticks(&self) -> u32 {
        self.state.last_ticks.load(Ordering::SeqCst)
    }

    /// When the timer will fire, if it will.
    pub fn armed_deadline(&self) -> Option<u32> {
        if !self.state.enabled.load(Ordering::SeqCst) || !self.has_handler() {
            return None;
        }
        *self.state.deadline.lock().unwrap()
    }

    /// Consumes the pending expiry, returning when it was due and what to run.
    fn take_expiry(&self) -> Option<(u32, InterruptHandler)> {
        self.armed_deadline()?;
        let handler = (*self.state.handler.lock().unwrap())?;
        let deadline = self.state.deadline.lock().unwrap().take()?;
        Some((deadline, handler))
    }
}

impl OneShotTimer for SimTimer {
    fn attach(&self, handler: InterruptHandler) {
        *self.state.handler.lock().unwrap() = Some(handler);
        self.state.attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&self) {
        *self.state.handler.lock().unwrap() = None;
    }

    fn enable(&self) {
        self.state.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.state.enabled.store(false, Ordering::SeqCst);
        *self.state.deadline.lock().unwrap() = None;
    }

    fn arm(&self, ticks: u32) {
        let cycles = if self.clock.is_fast() {
            ticks.saturating_mul(2)
        } else {
            ticks
        };
        self.state.last_ticks.store(ticks, Ordering::SeqCst);
        *self.state.deadline.lock().unwrap() = Some(self.clock.peek().wrapping_add(cycles));
    }

    fn remaining(&self) -> u32 {
        let Some(deadline) = self.armed_deadline() else {
            return 0;
        };
        let cycles = until(deadline, self.clock.peek()).max(0) as u32;
        if self.clock.is_fast() {
            cycles / 2
        } else {
            cycles
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub at: u32,
    pub high: bool,
}

struct Bus {
    clock: SimClock,
    out: AtomicU32,
    edges: Mutex<Vec<(u8, Edge)>>,
    slow_writes: AtomicU32,
}

pub(crate) struct SimLine {
    pin: u8,
    slow: bool,
    bus: Arc<Bus>,
}

impl SimLine {
    fn drive(&self, high: bool) {
        if self.slow {
            self.bus.slow_writes.fetch_add(1, Ordering::SeqCst);
        }
        let bit = 1 << self.pin;
        let previous = if high {
            self.bus.out.fetch_or(bit, Ordering::SeqCst)
        } else {
            self.bus.out.fetch_and(!bit, Ordering::SeqCst)
        };
        if (previous & bit != 0) != high {
            let edge = Edge {
                at: self.bus.clock.peek(),
                high,
            };
            self.bus.edges.lock().unwrap().push((self.pin, edge));
        }
    }
}

impl GpioLine for SimLine {
    fn set(&self) {
        self.drive(true);
    }

    fn clear(&self) {
        self.drive(false);
    }
}

pub(crate) struct SimPlatform {
    clock: SimClock,
    timer: SimTimer,
    bus: Arc<Bus>,
    lines: [SimLine; CHANNEL_COUNT],
    yields: AtomicU32,
    spins: AtomicU32,
    jitter: AtomicU32,
    delay_next: AtomicU32,
    rng: AtomicU32,
}

impl SimPlatform {
    fn new(clock: SimClock) -> Self {
        let bus = Arc::new(Bus {
            clock: clock.clone(),
            out: AtomicU32::new(0),
            edges: Mutex::new(Vec::new()),
            slow_writes: AtomicU32::new(0),
        });
        let lines = core::array::from_fn(|pin| SimLine {
            pin: pin as u8,
            slow: pin == 16,
            bus: bus.clone(),
        });

        Self {
            timer: SimTimer::new(&clock),
            clock,
            bus,
            lines,
            yields: AtomicU32::new(0),
            spins: AtomicU32::new(0),
            jitter: AtomicU32::new(0),
            delay_next: AtomicU32::new(0),
            rng: AtomicU32::new(0x2545_f491),
        }
    }

    // xorshift32
    fn next_jitter(&self) -> u32 {
        let max = self.jitter.load(Ordering::SeqCst);
        if max == 0 {
            return 0;
        }
        let mut x = self.rng.load(Ordering::SeqCst);
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng.store(x, Ordering::SeqCst);
        x % (max + 1)
    }

    /// Lets the armed timer expire, late by the configured jitter, and runs
    /// its handler. Returns `false` if nothing was armed.
    fn fire_timer(&self) -> bool {
        let Some((deadline, handler)) = self.timer.take_expiry() else {
            return false;
        };

        let late = self.next_jitter() + self.delay_next.swap(0, Ordering::SeqCst);
        let at = deadline.wrapping_add(late);
        if until(at, self.clock.peek()) > 0 {
            self.clock.set(at);
        }

        handler();
        true
    }
}

impl Platform for SimPlatform {
    type Clock = SimClock;
    type Timer = SimTimer;

    fn clock(&self) -> &SimClock {
        &self.clock
    }

    fn timer(&self) -> &SimTimer {
        &self.timer
    }

    fn line(&self, pin: u8) -> &dyn GpioLine {
        &self.lines[pin as usize]
    }

    fn is_reserved(&self, pin: u8) -> bool {
        RESERVED_PINS.contains(&pin)
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        assert!(self.fire_timer(), "yielding with no timer armed");
    }

    fn relax(&self) {
        self.spins.fetch_add(1, Ordering::SeqCst);
        assert!(self.fire_timer(), "spinning with no timer armed");
    }
}

std::thread_local! {
    static BOUND: Cell<Option<&'static WaveformGenerator<SimPlatform>>> = const { Cell::new(None) };
}

fn bound_handler() {
    if let Some(generator) = BOUND.with(Cell::get) {
        generator.on_timer_interrupt();
    }
}

pub(crate) struct SimBuilder {
    mhz: u32,
    step: u32,
}

impl SimBuilder {
    pub fn mhz(mut self, mhz: u32) -> Self {
        self.mhz = mhz;
        self
    }

    /// Cycles every clock read costs.
    pub fn clock_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    /// Creates a generator and routes this thread's simulated timer
    /// interrupt to it.
    pub fn build(self) -> Sim {
        let platform = SimPlatform::new(SimClock::with_step(self.mhz, self.step));
        let generator: &'static _ =
            Box::leak(Box::new(WaveformGenerator::new(platform, bound_handler)));
        BOUND.with(|bound| bound.set(Some(generator)));
        Sim { generator }
    }
}

/// A generator on simulated hardware plus the knobs and readouts tests need.
pub(crate) struct Sim {
    generator: &'static WaveformGenerator<SimPlatform>,
}

impl Sim {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SimBuilder {
        SimBuilder { mhz: 80, step: 1 }
    }

    pub fn generator(&self) -> &'static WaveformGenerator<SimPlatform> {
        self.generator
    }

    fn platform(&self) -> &SimPlatform {
        self.generator.platform()
    }

    pub fn now(&self) -> u32 {
        self.platform().clock.peek()
    }

    /// Fires the armed timer once.
    pub fn fire(&self) -> bool {
        self.platform().fire_timer()
    }

    /// Fires every timer expiry due up to `target`, then moves the clock
    /// there. The clock never goes backwards.
    pub fn run_until(&self, target: u32) {
        let platform = self.platform();
        while let Some(deadline) = platform.timer.armed_deadline() {
            if until(deadline, target) > 0 {
                break;
            }
            platform.fire_timer();
        }
        if until(target, platform.clock.peek()) > 0 {
            platform.clock.set(target);
        }
    }

    pub fn run_for(&self, cycles: u32) {
        self.run_until(self.now().wrapping_add(cycles));
    }

    /// Every subsequent firing is late by a pseudo-random `0..=max` cycles.
    pub fn set_jitter(&self, max: u32) {
        self.platform().jitter.store(max, Ordering::SeqCst);
    }

    /// Makes only the next firing late by `cycles`, on top of any jitter.
    pub fn delay_next_fire(&self, cycles: u32) {
        self.platform().delay_next.store(cycles, Ordering::SeqCst);
    }

    pub fn yields(&self) -> u32 {
        self.platform().yields.load(Ordering::SeqCst)
    }

    pub fn spins(&self) -> u32 {
        self.platform().spins.load(Ordering::SeqCst)
    }

    pub fn last_armed_ticks(&self) -> u32 {
        self.platform().timer.last_ticks()
    }

    pub fn slow_line_writes(&self) -> u32 {
        self.platform().bus.slow_writes.load(Ordering::SeqCst)
    }

    pub fn line_is_high(&self, pin: u8) -> bool {
        self.platform().bus.out.load(Ordering::SeqCst) & (1 << pin) != 0
    }

    /// Level changes seen on `pin`, oldest first.
    pub fn edges(&self, pin: u8) -> Vec<Edge> {
        self.platform()
            .bus
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|(_, edge)| *edge)
            .collect()
    }

    pub fn rising_edges(&self, pin: u8) -> u32 {
        self.edges(pin).iter().filter(|e| e.high).count() as u32
    }

    pub fn falling_edges(&self, pin: u8) -> u32 {
        self.edges(pin).iter().filter(|e| !e.high).count() as u32
    }

    /// Width of every complete high pulse on `pin`.
    pub fn pulse_widths(&self, pin: u8) -> Vec<u32> {
        self.edges(pin)
            .windows(2)
            .filter(|pair| pair[0].high && !pair[1].high)
            .map(|pair| pair[1].at.wrapping_sub(pair[0].at))
            .collect()
    }
}
