//! Timing protocol engine.
//!
//! Drives the single-wire handshake and measures every bit period by busy-sampling
//! the data line:
//!
//! ```text
//!  MCU   ‾‾‾\______________/‾‾‾‾\ (release)
//!              10 ms        40 us
//!  DHT                           \________/‾‾‾‾‾‾‾‾\____/‾‾‾\____/‾‾‾‾‾‾‾\__ ...
//!                                  80 us     80 us   50 us 28us 50 us  70us
//!                                 ack-low   ack-high  "0" bit    "1" bit
//! ```
//!
//! The engine stores how many samples each high pulse lasted and leaves the 0/1
//! decision to the [frame decoder](crate::frame).

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

use crate::error::DhtError;
use crate::frame::{FRAME_BITS, RawFrame};
use crate::logging::error;

/// How long the MCU holds the line low to wake the sensor (ms).
const START_LOW_MS: u32 = 10;

/// How long the MCU drives the line high before releasing it (us).
const START_HIGH_US: u32 = 40;

/// Sample budget for the sensor's 80 us low acknowledge.
const ACK_LOW_SAMPLES: u8 = 80;

/// Sample budget for the sensor's 80 us high acknowledge.
const ACK_HIGH_SAMPLES: u8 = 80;

/// Sample budget for the 50 us low that opens every bit period.
const BIT_LOW_SAMPLES: u8 = 50;

/// Sample ceiling for the high pulse carrying the bit value (up to 70 us).
const BIT_HIGH_SAMPLES: u8 = 70;

/// A bidirectional GPIO line with a pull-up, as the DHT22 data pin needs.
///
/// Level control and sampling come from [`OutputPin`] and [`InputPin`]; this trait
/// adds the direction and bias switches that `embedded-hal` leaves to the HAL.
pub trait DataLine: InputPin + OutputPin {
    /// Switches the pin to push-pull output.
    fn set_as_output(&mut self) -> Result<(), Self::Error>;

    /// Switches the pin to input, releasing the line.
    fn set_as_input(&mut self) -> Result<(), Self::Error>;

    /// Enables the internal pull-up.
    fn enable_pull_up(&mut self) -> Result<(), Self::Error>;
}

impl<T: DataLine + ?Sized> DataLine for &mut T {
    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        T::set_as_output(self)
    }

    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        T::set_as_input(self)
    }

    fn enable_pull_up(&mut self) -> Result<(), Self::Error> {
        T::enable_pull_up(self)
    }
}

/// One protocol run over a borrowed pin and delay.
pub(crate) struct Transceiver<'a, PIN, DELAY> {
    pin: &'a mut PIN,
    delay: &'a mut DELAY,
}

impl<'a, PIN, DELAY, E> Transceiver<'a, PIN, DELAY>
where
    PIN: DataLine<Error = E>,
    DELAY: DelayNs,
{
    pub(crate) fn new(pin: &'a mut PIN, delay: &'a mut DELAY) -> Self {
        Self { pin, delay }
    }

    /// Runs the full handshake and captures all 40 bit periods.
    ///
    /// Blocks for roughly 15 ms. Must not be interrupted between the start signal
    /// and the last bit.
    pub(crate) fn read_frame(&mut self) -> Result<RawFrame, DhtError<E>> {
        self.start()?;
        self.acknowledge()?;

        let mut frame = RawFrame::default();
        for bit in 0..FRAME_BITS {
            frame.record(bit, self.read_bit()?);
        }
        Ok(frame)
    }

    /// Sends the start signal and releases the line to the sensor.
    fn start(&mut self) -> Result<(), DhtError<E>> {
        self.pin.set_as_output().map_err(DhtError::PinDirection)?;

        // MCU sends start request
        self.pin.set_low()?;
        self.delay.delay_ms(START_LOW_MS);
        self.pin.set_high()?;
        self.delay.delay_us(START_HIGH_US);

        self.pin.set_as_input().map_err(DhtError::PinDirection)?;
        Ok(())
    }

    /// Waits out the sensor's 80 us low / 80 us high response.
    fn acknowledge(&mut self) -> Result<(), DhtError<E>> {
        self.wait_while_low(ACK_LOW_SAMPLES)?;
        self.wait_while_high(ACK_HIGH_SAMPLES)?;
        Ok(())
    }

    /// Reads one bit period and returns the length of its high pulse in samples.
    fn read_bit(&mut self) -> Result<u8, DhtError<E>> {
        self.wait_while_low(BIT_LOW_SAMPLES)?;
        self.wait_while_high(BIT_HIGH_SAMPLES)
    }

    fn wait_while_low(&mut self, budget: u8) -> Result<u8, DhtError<E>> {
        match self.measure(false, budget)? {
            Some(count) => Ok(count),
            None => {
                error!("sensor did not switch to HIGH within {} samples", budget);
                Err(DhtError::SensorDidNotSwitchToHigh)
            }
        }
    }

    fn wait_while_high(&mut self, budget: u8) -> Result<u8, DhtError<E>> {
        match self.measure(true, budget)? {
            Some(count) => Ok(count),
            None => {
                error!("sensor did not switch to LOW within {} samples", budget);
                Err(DhtError::SensorDidNotSwitchToLow)
            }
        }
    }

    /// Samples the line until it leaves `high`, sleeping 1 us after every sample
    /// that still shows the old level.
    ///
    /// Returns the number of samples taken including the one that saw the change,
    /// or `None` if the level held for all `budget` samples.
    fn measure(&mut self, high: bool, budget: u8) -> Result<Option<u8>, DhtError<E>> {
        for count in 1..=budget {
            if self.pin.is_high()? != high {
                return Ok(Some(count));
            }
            self.delay.delay_us(1);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::CheckedDelay;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::delay::Transaction as DelayTx;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTx,
    };

    // The mock has no notion of direction or bias; those calls are accepted silently.
    impl DataLine for PinMock {
        fn set_as_output(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn set_as_input(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn enable_pull_up(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    const ZERO: u8 = 9;
    const ONE: u8 = 24;

    fn start_sequence() -> Vec<PinTx> {
        vec![
            PinTx::set(PinState::High), // Initial High
            // MCU pulls the data line low, then drives it high before releasing it
            PinTx::set(PinState::Low),
            PinTx::set(PinState::High),
        ]
    }

    fn acknowledge() -> Vec<PinTx> {
        vec![
            PinTx::get(PinState::High), // ack-low over
            PinTx::get(PinState::Low),  // ack-high over
        ]
    }

    // One bit period whose high pulse lasts `count` samples.
    fn encode_bit(count: u8) -> Vec<PinTx> {
        let mut bit = vec![PinTx::get(PinState::High)]; // 50us low over
        bit.extend(std::iter::repeat_n(PinTx::get(PinState::High), count as usize - 1));
        bit.push(PinTx::get(PinState::Low)); // end of bit
        bit
    }

    fn encode_bytes(bytes: [u8; 5]) -> Vec<PinTx> {
        (0..FRAME_BITS)
            .flat_map(|i| {
                let set = bytes[i / 8] & (1 << (7 - i % 8)) != 0;
                encode_bit(if set { ONE } else { ZERO })
            })
            .collect()
    }

    #[test]
    fn test_start_sequence() {
        let mut pin = PinMock::new(&start_sequence());
        pin.set_high().unwrap();

        let delay_transactions = vec![DelayTx::delay_ms(10), DelayTx::delay_us(40)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut pin_handle = pin.clone();
        Transceiver::new(&mut pin_handle, &mut delay).start().unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_acknowledge() {
        let mut pin = PinMock::new(&[
            // ack-low: two samples still low, each followed by a 1us delay
            PinTx::get(PinState::Low),
            PinTx::get(PinState::Low),
            PinTx::get(PinState::High),
            // ack-high: one sample still high
            PinTx::get(PinState::High),
            PinTx::get(PinState::Low),
        ]);
        let delay_transactions = vec![DelayTx::delay_us(1); 3];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut pin_handle = pin.clone();
        Transceiver::new(&mut pin_handle, &mut delay)
            .acknowledge()
            .unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_ack_low_timeout() {
        let mut pin = PinMock::new(&vec![PinTx::get(PinState::Low); ACK_LOW_SAMPLES as usize]);
        let mut delay = NoopDelay;

        let mut pin_handle = pin.clone();
        let err = Transceiver::new(&mut pin_handle, &mut delay)
            .acknowledge()
            .unwrap_err();
        assert_eq!(err, DhtError::SensorDidNotSwitchToHigh);

        pin.done();
    }

    #[test]
    fn test_ack_high_timeout() {
        let mut expect = vec![PinTx::get(PinState::High)];
        expect.extend(vec![PinTx::get(PinState::High); ACK_HIGH_SAMPLES as usize]);
        let mut pin = PinMock::new(&expect);
        let mut delay = NoopDelay;

        let mut pin_handle = pin.clone();
        let err = Transceiver::new(&mut pin_handle, &mut delay)
            .acknowledge()
            .unwrap_err();
        assert_eq!(err, DhtError::SensorDidNotSwitchToLow);

        pin.done();
    }

    #[test]
    fn test_read_bit_counts_high_samples() {
        let mut pin = PinMock::new(&encode_bit(ONE));
        let mut delay = NoopDelay;

        let mut pin_handle = pin.clone();
        let count = Transceiver::new(&mut pin_handle, &mut delay)
            .read_bit()
            .unwrap();
        assert_eq!(count, ONE);

        pin.done();
    }

    #[test]
    fn test_read_bit_single_sample_pulse() {
        let mut pin = PinMock::new(&[
            PinTx::get(PinState::Low), // still in the 50us low
            PinTx::get(PinState::High),
            PinTx::get(PinState::Low), // high pulse already over
        ]);
        let delay_transactions = vec![DelayTx::delay_us(1)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut pin_handle = pin.clone();
        let count = Transceiver::new(&mut pin_handle, &mut delay)
            .read_bit()
            .unwrap();
        assert_eq!(count, 1);

        pin.done();
        delay.done();
    }

    #[test]
    fn test_read_bit_low_timeout() {
        let mut pin = PinMock::new(&vec![PinTx::get(PinState::Low); BIT_LOW_SAMPLES as usize]);
        let mut delay = NoopDelay;

        let mut pin_handle = pin.clone();
        let err = Transceiver::new(&mut pin_handle, &mut delay)
            .read_bit()
            .unwrap_err();
        assert_eq!(err, DhtError::SensorDidNotSwitchToHigh);

        pin.done();
    }

    #[test]
    fn test_read_bit_high_ceiling() {
        // A pulse of exactly 70 samples is accepted; one more sample is a timeout.
        let mut pin = PinMock::new(&encode_bit(BIT_HIGH_SAMPLES));
        let mut delay = NoopDelay;
        let mut pin_handle = pin.clone();
        let count = Transceiver::new(&mut pin_handle, &mut delay)
            .read_bit()
            .unwrap();
        assert_eq!(count, BIT_HIGH_SAMPLES);
        pin.done();

        let mut expect = vec![PinTx::get(PinState::High)];
        expect.extend(vec![PinTx::get(PinState::High); BIT_HIGH_SAMPLES as usize]);
        let mut pin = PinMock::new(&expect);
        let mut pin_handle = pin.clone();
        let err = Transceiver::new(&mut pin_handle, &mut delay)
            .read_bit()
            .unwrap_err();
        assert_eq!(err, DhtError::SensorDidNotSwitchToLow);
        pin.done();
    }

    #[test]
    fn test_read_frame() {
        // 65.3 %RH, 23.1 C, checksum 0x76
        let bytes = [0x02, 0x8D, 0x00, 0xE7, 0x76];

        let mut expect = start_sequence();
        expect.extend(acknowledge());
        expect.extend(encode_bytes(bytes));

        let mut pin = PinMock::new(&expect);
        pin.set_high().unwrap();

        let mut delay = NoopDelay;
        let mut pin_handle = pin.clone();
        let frame = Transceiver::new(&mut pin_handle, &mut delay)
            .read_frame()
            .unwrap();

        assert_eq!(frame, RawFrame::from_bytes(bytes, ZERO, ONE));

        pin.done();
    }

    #[test]
    fn test_read_frame_aborts_mid_transmission() {
        let mut expect = start_sequence();
        expect.extend(acknowledge());
        // Three good bits, then the sensor lets go of the line (pulled up forever).
        expect.extend(encode_bit(ONE));
        expect.extend(encode_bit(ZERO));
        expect.extend(encode_bit(ONE));
        expect.push(PinTx::get(PinState::High));
        expect.extend(vec![PinTx::get(PinState::High); BIT_HIGH_SAMPLES as usize]);

        let mut pin = PinMock::new(&expect);
        pin.set_high().unwrap();

        let mut delay = NoopDelay;
        let mut pin_handle = pin.clone();
        let err = Transceiver::new(&mut pin_handle, &mut delay)
            .read_frame()
            .unwrap_err();
        assert_eq!(err, DhtError::SensorDidNotSwitchToLow);

        pin.done();
    }
}
