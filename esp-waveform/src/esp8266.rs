//! # ESP8266 backend
//!
//! FRC1 (timer 1) as the one-shot timer, routed to the NMI so Wi-Fi and
//! other interrupts cannot delay edges. `CCOUNT` is the cycle clock. GPIO0-15
//! are driven through the W1TS/W1TC registers and GPIO16 through its RTC
//! output register.
//!
//! A single generator instance lives in a `static`; the free functions at
//! the bottom of this module operate on it.

use portable_atomic::{AtomicPtr, Ordering};

use crate::{
    hal::{CycleClock, GpioLine, InterruptHandler, OneShotTimer, Platform},
    AuxCallback,
    WaveformGenerator,
};

const DPORT_BASE: usize = 0x3ff0_0000;
const PERI_BASE: usize = 0x6000_0000;

const DPORT_EDGE_INT_ENABLE: usize = DPORT_BASE + 0x04;
const DPORT_CPU_CLOCK: usize = DPORT_BASE + 0x14;

const GPIO_OUT_W1TS: usize = PERI_BASE + 0x304;
const GPIO_OUT_W1TC: usize = PERI_BASE + 0x308;
const RTC_GPIO_OUT: usize = PERI_BASE + 0x768;

const FRC1_LOAD: usize = PERI_BASE + 0x600;
const FRC1_COUNT: usize = PERI_BASE + 0x604;
const FRC1_CTRL: usize = PERI_BASE + 0x608;
const FRC1_INT: usize = PERI_BASE + 0x60c;

const FRC1_EDGE_INT: u32 = 1 << 1;
const FRC1_INUM: u32 = 9;
// Enabled, divide by 1, edge interrupt, no auto-reload.
const FRC1_CTRL_ONE_SHOT: u32 = 1 << 7;
// The load register is 23 bits wide.
const FRC1_MAX_LOAD: u32 = (1 << 23) - 1;

extern "C" {
    fn NmiTimSetFunc(handler: Option<unsafe extern "C" fn()>);
}

#[inline(always)]
fn read_reg(addr: usize) -> u32 {
    unsafe { (addr as *const u32).read_volatile() }
}

#[inline(always)]
fn write_reg(addr: usize, value: u32) {
    unsafe { (addr as *mut u32).write_volatile(value) }
}

/// `CCOUNT`, at 80 or 160 MHz.
pub struct Clock;

impl CycleClock for Clock {
    #[inline(always)]
    fn now(&self) -> u32 {
        xtensa_lx::timer::get_cycle_count()
    }

    #[inline(always)]
    fn micros_to_cycles(&self, us: u32) -> u32 {
        let mhz = if self.is_fast() { 160 } else { 80 };
        us.saturating_mul(mhz)
    }

    #[inline(always)]
    fn is_fast(&self) -> bool {
        read_reg(DPORT_CPU_CLOCK) & 1 != 0
    }
}

static HANDLER: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

#[link_section = ".iram.text"]
unsafe extern "C" fn frc1_nmi() {
    let handler = HANDLER.load(Ordering::Acquire);
    if !handler.is_null() {
        let handler: InterruptHandler = unsafe { core::mem::transmute(handler) };
        handler();
    }
}

/// FRC1, divide by 1, so one tick is one 80 MHz cycle.
pub struct Frc1;

impl OneShotTimer for Frc1 {
    fn attach(&self, handler: InterruptHandler) {
        HANDLER.store(handler as *mut (), Ordering::Release);
        unsafe { NmiTimSetFunc(Some(frc1_nmi)) };
        unsafe { xtensa_lx::interrupt::enable_mask(1 << FRC1_INUM) };
    }

    fn detach(&self) {
        write_reg(
            DPORT_EDGE_INT_ENABLE,
            read_reg(DPORT_EDGE_INT_ENABLE) & !FRC1_EDGE_INT,
        );
        xtensa_lx::interrupt::disable_mask(1 << FRC1_INUM);
        HANDLER.store(core::ptr::null_mut(), Ordering::Release);
    }

    fn enable(&self) {
        write_reg(FRC1_CTRL, FRC1_CTRL_ONE_SHOT);
        write_reg(FRC1_INT, 0);
    }

    fn disable(&self) {
        write_reg(FRC1_CTRL, 0);
        write_reg(FRC1_INT, 0);
    }

    #[inline(always)]
    fn arm(&self, ticks: u32) {
        write_reg(FRC1_LOAD, ticks.min(FRC1_MAX_LOAD));
        write_reg(
            DPORT_EDGE_INT_ENABLE,
            read_reg(DPORT_EDGE_INT_ENABLE) | FRC1_EDGE_INT,
        );
    }

    // Counts down from the load value and stops at zero.
    #[inline(always)]
    fn remaining(&self) -> u32 {
        read_reg(FRC1_COUNT)
    }
}

/// GPIO0-15, one write per edge.
pub struct StandardLine {
    mask: u32,
}

impl GpioLine for StandardLine {
    #[inline(always)]
    fn set(&self) {
        write_reg(GPIO_OUT_W1TS, self.mask);
    }

    #[inline(always)]
    fn clear(&self) {
        write_reg(GPIO_OUT_W1TC, self.mask);
    }
}

/// GPIO16, in the RTC domain.
pub struct Gpio16Line;

impl GpioLine for Gpio16Line {
    #[inline(always)]
    fn set(&self) {
        write_reg(RTC_GPIO_OUT, 1);
    }

    #[inline(always)]
    fn clear(&self) {
        write_reg(RTC_GPIO_OUT, 0);
    }
}

/// The ESP8266 as a generator [`Platform`].
pub struct Esp8266 {
    clock: Clock,
    timer: Frc1,
    lines: [StandardLine; 16],
    gpio16: Gpio16Line,
}

impl Esp8266 {
    const fn new() -> Self {
        let mut lines = [const { StandardLine { mask: 0 } }; 16];
        let mut pin = 0;
        while pin < 16 {
            lines[pin].mask = 1 << pin;
            pin += 1;
        }

        Self {
            clock: Clock,
            timer: Frc1,
            lines,
            gpio16: Gpio16Line,
        }
    }
}

impl Platform for Esp8266 {
    type Clock = Clock;
    type Timer = Frc1;

    fn clock(&self) -> &Clock {
        &self.clock
    }

    fn timer(&self) -> &Frc1 {
        &self.timer
    }

    fn line(&self, pin: u8) -> &dyn GpioLine {
        match pin {
            16 => &self.gpio16,
            pin => &self.lines[pin as usize],
        }
    }

    // SPI flash
    fn is_reserved(&self, pin: u8) -> bool {
        (6..=11).contains(&pin)
    }

    // Bare metal: nothing to yield to, so this is the same spin as `relax`.
    fn yield_now(&self) {
        self.relax();
    }
}

static GENERATOR: WaveformGenerator<Esp8266> = WaveformGenerator::new(Esp8266::new(), dispatch);

#[link_section = ".iram.text"]
fn dispatch() {
    GENERATOR.on_timer_interrupt();
}

/// The generator bound to FRC1, for the parts of the API not mirrored as
/// free functions.
pub fn generator() -> &'static WaveformGenerator<Esp8266> {
    &GENERATOR
}

/// See [`WaveformGenerator::start_waveform`].
pub fn start_waveform(
    pin: u8,
    duty_cycles: u32,
    period_cycles: u32,
    run_duration_cycles: u32,
) -> bool {
    GENERATOR.start_waveform(pin, duty_cycles, period_cycles, run_duration_cycles)
}

/// See [`WaveformGenerator::stop_waveform`].
pub fn stop_waveform(pin: u8) -> bool {
    GENERATOR.stop_waveform(pin)
}

/// See [`WaveformGenerator::set_aux_callback`].
pub fn set_aux_callback(callback: Option<AuxCallback>) {
    GENERATOR.set_aux_callback(callback);
}
