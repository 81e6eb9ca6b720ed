//! Raw frame storage and decoding.
//!
//! A DHT22 transmission is 40 bits, high bit first:
//!
//! ```text
//!  index  39 ........ 24 | 23 | 22 ........ 8 | 7 ..... 0
//!         humidity (16)  |sign| temperature(15)| checksum
//! ```
//!
//! The protocol engine stores one duration counter per bit with the first bit
//! received at index 39. Bits are resolved here by comparing each counter against a
//! threshold, so the threshold can be tuned without touching acquisition.

use core::fmt;

use crate::logging::{debug, error};

/// Number of bits in one transmission.
pub const FRAME_BITS: usize = 40;

/// Mask of the sign flag in the raw temperature field.
const TEMPERATURE_SIGN: u16 = 0x8000;

/// The 40 pulse-duration counters captured during one read.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawFrame {
    counts: [u8; FRAME_BITS],
}

impl RawFrame {
    /// Creates a frame from counters in storage order (index 39 = first bit).
    pub const fn from_counts(counts: [u8; FRAME_BITS]) -> Self {
        Self { counts }
    }

    /// Builds the frame a sensor transmitting `bytes` would produce, using
    /// `zero_count` for `0` bits and `one_count` for `1` bits.
    pub fn from_bytes(bytes: [u8; 5], zero_count: u8, one_count: u8) -> Self {
        let mut frame = Self::default();
        for bit in 0..FRAME_BITS {
            let set = bytes[bit / 8] & (1 << (7 - bit % 8)) != 0;
            frame.record(bit, if set { one_count } else { zero_count });
        }
        frame
    }

    /// Stores the counter of the `bit`-th received bit (0 = first received).
    pub(crate) fn record(&mut self, bit: usize, count: u8) {
        self.counts[FRAME_BITS - 1 - bit] = count;
    }

    /// Counters in storage order.
    pub fn counts(&self) -> &[u8; FRAME_BITS] {
        &self.counts
    }

    /// Mutable access to the counters, for fault injection and calibration.
    pub fn counts_mut(&mut self) -> &mut [u8; FRAME_BITS] {
        &mut self.counts
    }

    /// Resolves every counter against `threshold` and packs the bits, in
    /// transmission order, into five bytes.
    pub fn to_bytes(&self, threshold: u8) -> [u8; 5] {
        let mut bytes = [0; 5];
        for (bit, count) in self.counts.iter().rev().enumerate() {
            if *count > threshold {
                bytes[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        bytes
    }

    /// Splits the frame into its three fields without validating the checksum.
    pub fn fields(&self, threshold: u8) -> Fields {
        let [hum_hi, hum_lo, temp_hi, temp_lo, checksum] = self.to_bytes(threshold);
        Fields {
            humidity: u16::from_be_bytes([hum_hi, hum_lo]),
            temperature: u16::from_be_bytes([temp_hi, temp_lo]),
            checksum,
        }
    }

    /// Logs the counters as five rows of eight, in transmission order.
    pub(crate) fn dump(&self) {
        const LABELS: [&str; 5] = ["RH", "RH", "TP", "TP", "CS"];
        for (row, label) in LABELS.iter().enumerate() {
            let hi = FRAME_BITS - 1 - row * 8;
            let c = &self.counts;
            debug!(
                "{}: [{}] [{}] [{}] [{}] [{}] [{}] [{}] [{}]",
                label,
                c[hi],
                c[hi - 1],
                c[hi - 2],
                c[hi - 3],
                c[hi - 4],
                c[hi - 5],
                c[hi - 6],
                c[hi - 7]
            );
        }
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::from_counts([0; FRAME_BITS])
    }
}

/// The three fields of a frame after bit resolution.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fields {
    /// Relative humidity in tenths of a percent.
    pub humidity: u16,
    /// Temperature field as transmitted: sign flag plus 15-bit magnitude in tenths
    /// of a degree Celsius.
    pub temperature: u16,
    /// Checksum byte as transmitted.
    pub checksum: u8,
}

impl Fields {
    /// Signed temperature in tenths of a degree Celsius.
    pub fn temperature(&self) -> i16 {
        let magnitude = (self.temperature & !TEMPERATURE_SIGN) as i16;
        if self.temperature & TEMPERATURE_SIGN != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Low byte of the sum of the four data bytes, as the sensor computes it.
    pub fn expected_checksum(&self) -> u8 {
        let [hum_hi, hum_lo] = self.humidity.to_be_bytes();
        let [temp_hi, temp_lo] = self.temperature.to_be_bytes();
        [hum_hi, hum_lo, temp_hi, temp_lo]
            .iter()
            .fold(0u8, |sum, v| sum.wrapping_add(*v))
    }

    pub fn is_valid(&self) -> bool {
        self.checksum == self.expected_checksum()
    }
}

/// The frame's checksum byte did not match its data bytes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub received: u8,
    pub calculated: u8,
}

/// A validated reading as integer fixed-point pairs.
///
/// Each pair's value is `whole + fraction / 10` for humidity and
/// `whole + fraction / 100` for the temperatures. Both halves carry the sign the
/// truncating arithmetic produced, so a pair such as `(32, -18)` means 31.82.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub humidity_whole: u16,
    pub humidity_fraction: u16,
    pub celsius_whole: i16,
    pub celsius_fraction: i16,
    pub fahrenheit_whole: i16,
    pub fahrenheit_fraction: i16,
}

impl Measurement {
    /// Converts validated fields into fixed-point units.
    ///
    /// Fahrenheit is derived from the Celsius tenths as `((t * 100) / 50) * 9`,
    /// in that order, with truncating division.
    pub fn from_fields(fields: &Fields) -> Self {
        let humidity = fields.humidity;
        let temperature = i32::from(fields.temperature());

        let fahrenheit = temperature * 100 / 50 * 9;

        Self {
            humidity_whole: humidity / 10,
            humidity_fraction: humidity % 10,
            celsius_whole: (temperature / 10) as i16,
            celsius_fraction: (temperature * 10 % 100) as i16,
            fahrenheit_whole: (fahrenheit / 100 + 32) as i16,
            fahrenheit_fraction: (fahrenheit % 100) as i16,
        }
    }

    /// Relative humidity in tenths of a percent.
    pub fn humidity_tenths(&self) -> u16 {
        self.humidity_whole * 10 + self.humidity_fraction
    }

    /// Temperature in hundredths of a degree Celsius.
    pub fn celsius_hundredths(&self) -> i32 {
        i32::from(self.celsius_whole) * 100 + i32::from(self.celsius_fraction)
    }

    /// Temperature in hundredths of a degree Fahrenheit.
    pub fn fahrenheit_hundredths(&self) -> i32 {
        i32::from(self.fahrenheit_whole) * 100 + i32::from(self.fahrenheit_fraction)
    }
}

fn write_hundredths(f: &mut fmt::Formatter<'_>, value: i32) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hundredths(f, self.fahrenheit_hundredths())?;
        f.write_str(" F (")?;
        write_hundredths(f, self.celsius_hundredths())?;
        write!(
            f,
            " C), Relative Humidity {}.{}%",
            self.humidity_whole, self.humidity_fraction
        )
    }
}

/// Resolves, validates and converts a raw frame.
///
/// # Errors
///
/// Returns [`ChecksumMismatch`] when the received checksum differs from the low
/// byte of the sum of the data bytes. No measurement is produced in that case.
pub fn decode(frame: &RawFrame, threshold: u8) -> Result<Measurement, ChecksumMismatch> {
    let fields = frame.fields(threshold);
    let calculated = fields.expected_checksum();
    if fields.checksum != calculated {
        error!(
            "checksum failure: received={:?} calculated={:?}",
            fields.checksum, calculated
        );
        return Err(ChecksumMismatch {
            received: fields.checksum,
            calculated,
        });
    }

    debug!(
        "RH = {}, TEMP = {} C/10, checksum = {}",
        fields.humidity,
        fields.temperature(),
        fields.checksum
    );
    Ok(Measurement::from_fields(&fields))
}
