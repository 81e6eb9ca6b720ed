use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::config::{Config, Throttle};
use crate::error::DhtError;
use crate::frame::{self, Measurement, RawFrame};
use crate::logging::{error, info, warn};
use crate::protocol::{DataLine, Transceiver};
use crate::rate::RateLimiter;

/// Longest sensor name kept, in bytes.
pub const MAX_NAME_LEN: usize = 31;

/// Driver for the DHT22 temperature and humidity sensor.
///
/// The handle owns its data pin, so no other handle can drive the same line while it
/// is alive. Dropping it, or calling [`release`](Self::release), ends its lifetime.
pub struct Dht22<PIN, DELAY> {
    pin_id: u8,
    name: String<MAX_NAME_LEN>,
    pin: PIN,
    delay: DELAY,
    config: Config,
    limiter: RateLimiter,
    stats: ReadStats,
}

/// Outcome counters of a handle's reads.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Reads that produced a valid frame.
    pub successes: u32,
    /// Reads that reached the sensor but failed on timing, pin or checksum errors.
    pub failures: u32,
    /// Reads rejected by the rate limiter before touching the line.
    pub throttled: u32,
}

impl<PIN, DELAY, E> Dht22<PIN, DELAY>
where
    PIN: DataLine<Error = E>,
    DELAY: DelayNs,
{
    /// Creates a handle with the default [`Config`].
    ///
    /// # Arguments
    ///
    /// * `pin_id` - GPIO number of the data line, checked against [`Config::max_pin`].
    /// * `name` - Display name used in log messages. Cut at the first NUL; names
    ///   longer than [`MAX_NAME_LEN`] bytes are truncated with a warning.
    /// * `pin` - The GPIO pin connected to the DHT22 data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `now_ms` - Current time; the first read is allowed one read interval later.
    pub fn new(
        pin_id: u8,
        name: &str,
        pin: PIN,
        delay: DELAY,
        now_ms: u64,
    ) -> Result<Self, DhtError<E>> {
        Self::with_config(pin_id, name, pin, delay, Config::default(), now_ms)
    }

    /// Creates a handle with an explicit [`Config`].
    ///
    /// # Errors
    ///
    /// * `DhtError::InvalidInput` for an out-of-range pin id or an empty name.
    /// * `DhtError::PinMode` if the pull-up cannot be enabled.
    ///
    /// The pin and delay are dropped on error. To keep them for a retry, pass
    /// `&mut` references; both traits are implemented for them.
    pub fn with_config(
        pin_id: u8,
        name: &str,
        mut pin: PIN,
        delay: DELAY,
        config: Config,
        now_ms: u64,
    ) -> Result<Self, DhtError<E>> {
        if pin_id > config.max_pin {
            error!("pin '{}' is not valid", pin_id);
            return Err(DhtError::InvalidInput);
        }

        let Some(name) = clip_name(name) else {
            error!("'name' invalid, cannot be empty");
            return Err(DhtError::InvalidInput);
        };

        if let Err(e) = pin.enable_pull_up() {
            error!("failed to set pin '{}' to pull-up", pin_id);
            return Err(DhtError::PinMode(e));
        }

        info!("sensor '{}' initialized on pin {}", name.as_str(), pin_id);

        Ok(Dht22 {
            pin_id,
            name,
            pin,
            delay,
            config,
            limiter: RateLimiter::new(config.min_read_interval_ms, config.throttle, now_ms),
            stats: ReadStats::default(),
        })
    }

    /// Reads a temperature and humidity measurement from the DHT22 sensor.
    ///
    /// This method performs the complete DHT22 communication sequence:
    /// checking the read interval, sending the start signal, waiting for the
    /// sensor's response, timing all 40 bits, validating the checksum and
    /// converting the result.
    ///
    /// # Returns
    ///
    /// * `Ok(Measurement)` if the read is successful and the checksum is valid.
    /// * `Err(DhtError)` if the read came too early, a communication error occurred
    ///   or the checksum did not match. The handle stays usable in every case.
    pub fn read(&mut self, now_ms: u64) -> Result<Measurement, DhtError<E>> {
        let threshold = self.config.bit_threshold;
        let result = self.acquire(now_ms).and_then(|raw| {
            frame::decode(&raw, threshold).map_err(|_| DhtError::InvalidChecksum)
        });
        self.account(now_ms, result.as_ref().err());
        result
    }

    /// Like [`read`](Self::read) but stops after acquisition and returns the raw
    /// pulse counters, for calibrating [`Config::bit_threshold`].
    ///
    /// A frame whose checksum does not match under the configured threshold is still
    /// returned, but counts as a failed read in [`stats`](Self::stats) and does not
    /// advance a [`Throttle::PerSuccess`] limiter.
    pub fn read_raw(&mut self, now_ms: u64) -> Result<RawFrame, DhtError<E>> {
        let threshold = self.config.bit_threshold;
        let result = self.acquire(now_ms);
        let checksum_error = DhtError::InvalidChecksum;
        let error = match &result {
            Ok(raw) if raw.fields(threshold).is_valid() => None,
            Ok(_) => Some(&checksum_error),
            Err(e) => Some(e),
        };
        self.account(now_ms, error);
        result
    }

    /// Consumes the handle and hands back the pin and delay.
    pub fn release(self) -> (PIN, DELAY) {
        info!("sensor '{}' released", self.name.as_str());
        (self.pin, self.delay)
    }

    fn acquire(&mut self, now_ms: u64) -> Result<RawFrame, DhtError<E>> {
        self.limiter
            .gate(now_ms)
            .map_err(|_| DhtError::TooFrequent)?;

        let frame = Transceiver::new(&mut self.pin, &mut self.delay).read_frame()?;
        frame.dump();
        Ok(frame)
    }

    fn account(&mut self, now_ms: u64, error: Option<&DhtError<E>>) {
        match error {
            None => {
                self.stats.successes = self.stats.successes.wrapping_add(1);
                if self.config.throttle == Throttle::PerSuccess {
                    self.limiter.record(now_ms);
                }
            }
            Some(DhtError::TooFrequent) => {
                self.stats.throttled = self.stats.throttled.wrapping_add(1);
            }
            Some(e) => {
                self.stats.failures = self.stats.failures.wrapping_add(1);
                warn!("sensor '{}' read failed: {}", self.name.as_str(), e.kind());
            }
        }
    }
}

impl<PIN, DELAY> Dht22<PIN, DELAY> {
    pub fn pin_id(&self) -> u8 {
        self.pin_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Timestamp the rate limiter measures the next read against.
    pub fn last_read_ms(&self) -> u64 {
        self.limiter.last_ms()
    }
}

/// Cuts `name` at the first NUL and to [`MAX_NAME_LEN`] bytes on a char boundary.
///
/// Returns `None` if nothing is left.
fn clip_name(name: &str) -> Option<String<MAX_NAME_LEN>> {
    let name = name.split('\0').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }

    let mut clipped = String::new();
    for c in name.chars() {
        if clipped.push(c).is_err() {
            warn!(
                "'name' longer than {} bytes, clipping to '{}'",
                MAX_NAME_LEN,
                clipped.as_str()
            );
            break;
        }
    }
    Some(clipped)
}
