//! A simulated DHT22 on a virtual clock.
//!
//! [`SimSensor`] hands out a [`SimPin`] and a [`SimDelay`] that share one virtual
//! timeline. Delays advance the clock, and so does every pin sample by
//! [`SimTiming::sample_ns`], which stands in for the cost of a GPIO read on real
//! hardware. Once the pin sees a valid start signal (low for at least 1 ms, then
//! released to input) the sensor plays back its acknowledge and the 40 data bits as
//! a waveform on that timeline.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::{
    delay::DelayNs,
    digital::{self, ErrorType, InputPin, OutputPin},
};

use crate::protocol::DataLine;

const NS_PER_US: u64 = 1_000;

/// Shortest start pulse the sensor reacts to.
const MIN_START_LOW_NS: u64 = 1_000_000;

/// Pin failures the simulation can inject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimError {
    PullUpRejected,
    DirectionRejected,
    ReadFailed,
}

impl digital::Error for SimError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// How the simulated sensor answers a start signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Full acknowledge and 40 data bits.
    #[default]
    Respond,
    /// Never answers; the line stays at its idle level.
    Silent,
    /// Holds the line low indefinitely.
    StuckLow,
    /// Sends only the first `n` bits, then releases the line.
    StopAfter(usize),
}

/// Waveform timings of the simulated sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimTiming {
    /// Virtual time consumed by one pin sample.
    pub sample_ns: u32,
    pub ack_low_us: u32,
    pub ack_high_us: u32,
    pub bit_low_us: u32,
    pub zero_high_us: u32,
    pub one_high_us: u32,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            sample_ns: 2_000,
            ack_low_us: 80,
            ack_high_us: 80,
            bit_low_us: 50,
            zero_high_us: 26,
            one_high_us: 70,
        }
    }
}

#[derive(Debug)]
struct State {
    now_ns: u64,
    timing: SimTiming,
    behavior: Behavior,
    payload: [u8; 5],
    output: bool,
    driven_high: bool,
    pull_up: bool,
    low_since: Option<u64>,
    armed: bool,
    response_at: Option<u64>,
    transmissions: u32,
    reject_pull_up: bool,
    reject_direction: bool,
    fail_reads: bool,
}

impl State {
    fn level(&self) -> bool {
        if self.output {
            return self.driven_high;
        }
        if self.behavior == Behavior::StuckLow {
            return false;
        }
        let Some(start) = self.response_at else {
            return self.pull_up;
        };

        let t = &self.timing;
        let us = |v: u32| u64::from(v) * NS_PER_US;
        let bits = match self.behavior {
            Behavior::StopAfter(n) => n.min(40),
            _ => 40,
        };

        let mut elapsed = self.now_ns.saturating_sub(start);
        let segments = [(false, us(t.ack_low_us)), (true, us(t.ack_high_us))]
            .into_iter()
            .chain((0..bits).flat_map(|bit| {
                let set = self.payload[bit / 8] & (1 << (7 - bit % 8)) != 0;
                let high = if set { t.one_high_us } else { t.zero_high_us };
                [(false, us(t.bit_low_us)), (true, us(high))]
            }));
        for (level, length) in segments {
            if elapsed < length {
                return level;
            }
            elapsed -= length;
        }

        // A complete transmission ends with one more low period.
        if bits == 40 && elapsed < us(t.bit_low_us) {
            return false;
        }
        self.pull_up
    }
}

/// Shared state of one simulated sensor.
#[derive(Clone, Debug)]
pub struct SimSensor {
    state: Rc<RefCell<State>>,
}

impl SimSensor {
    pub fn new() -> Self {
        Self::with_timing(SimTiming::default())
    }

    pub fn with_timing(timing: SimTiming) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                now_ns: 0,
                timing,
                behavior: Behavior::Respond,
                payload: [0; 5],
                output: false,
                driven_high: false,
                pull_up: false,
                low_since: None,
                armed: false,
                response_at: None,
                transmissions: 0,
                reject_pull_up: false,
                reject_direction: false,
                fail_reads: false,
            })),
        }
    }

    /// Sets the reading to transmit, in tenths of a percent and tenths of a degree
    /// Celsius, with a correct checksum.
    pub fn set_reading(&self, humidity: u16, celsius: i16) {
        let temperature = if celsius < 0 {
            0x8000 | celsius.unsigned_abs()
        } else {
            celsius.unsigned_abs()
        };
        let [hum_hi, hum_lo] = humidity.to_be_bytes();
        let [temp_hi, temp_lo] = temperature.to_be_bytes();
        let checksum = [hum_hi, hum_lo, temp_hi, temp_lo]
            .iter()
            .fold(0u8, |sum, v| sum.wrapping_add(*v));
        self.set_payload([hum_hi, hum_lo, temp_hi, temp_lo, checksum]);
    }

    /// Sets the five bytes to transmit verbatim, checksum included.
    pub fn set_payload(&self, payload: [u8; 5]) {
        self.state.borrow_mut().payload = payload;
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.state.borrow_mut().behavior = behavior;
    }

    pub fn reject_pull_up(&self, reject: bool) {
        self.state.borrow_mut().reject_pull_up = reject;
    }

    pub fn reject_direction(&self, reject: bool) {
        self.state.borrow_mut().reject_direction = reject;
    }

    /// Makes every level sample fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }

    pub fn pull_up_enabled(&self) -> bool {
        self.state.borrow().pull_up
    }

    /// Number of start signals the sensor has answered.
    pub fn transmissions(&self) -> u32 {
        self.state.borrow().transmissions
    }

    /// Current virtual time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_ns / NS_PER_US
    }

    pub fn pin(&self) -> SimPin {
        SimPin {
            state: Rc::clone(&self.state),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for SimSensor {
    fn default() -> Self {
        Self::new()
    }
}

/// Data pin of a [`SimSensor`].
#[derive(Debug)]
pub struct SimPin {
    state: Rc<RefCell<State>>,
}

impl ErrorType for SimPin {
    type Error = SimError;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_reads {
            return Err(SimError::ReadFailed);
        }
        let level = state.level();
        let cost = u64::from(state.timing.sample_ns);
        state.now_ns += cost;
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.output {
            state.driven_high = false;
            state.low_since = Some(state.now_ns);
            state.armed = false;
            state.response_at = None;
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.output {
            if let Some(since) = state.low_since.take() {
                state.armed = state.now_ns - since >= MIN_START_LOW_NS;
            }
            state.driven_high = true;
        }
        Ok(())
    }
}

impl DataLine for SimPin {
    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.reject_direction {
            return Err(SimError::DirectionRejected);
        }
        state.output = true;
        Ok(())
    }

    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.reject_direction {
            return Err(SimError::DirectionRejected);
        }
        state.output = false;
        if std::mem::take(&mut state.armed) && state.behavior != Behavior::Silent {
            state.response_at = Some(state.now_ns);
            state.transmissions += 1;
        }
        Ok(())
    }

    fn enable_pull_up(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.reject_pull_up {
            return Err(SimError::PullUpRejected);
        }
        state.pull_up = true;
        Ok(())
    }
}

/// Delay provider of a [`SimSensor`]; advances the virtual clock.
#[derive(Debug)]
pub struct SimDelay {
    state: Rc<RefCell<State>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().now_ns += u64::from(ns);
    }
}
