//! Driver configuration.

/// Default sample count above which a bit period is read as a `1`.
///
/// Calibrated for a busy-wait loop that takes roughly 3.5 us per iteration, which
/// separates the ~28 us "zero" pulse from the ~70 us "one" pulse.
pub const DEFAULT_BIT_THRESHOLD: u8 = 19;

/// The DHT22 datasheet asks for at least two seconds between reads.
pub const DEFAULT_MIN_READ_INTERVAL_MS: u32 = 2000;

/// Highest GPIO number accepted by default (GPIO0..=GPIO16 on the ESP8266).
pub const DEFAULT_MAX_PIN: u8 = 16;

/// When the rate limiter advances its timestamp.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Throttle {
    /// Every admitted read attempt advances the timestamp, successful or not.
    #[default]
    PerAttempt,
    /// Only reads that decode successfully advance the timestamp.
    PerSuccess,
}

/// Tunables for a [`Dht22`](crate::Dht22) handle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Bit-period sample count above which a bit resolves to `1`.
    pub bit_threshold: u8,
    /// Minimum spacing between reads in milliseconds.
    pub min_read_interval_ms: u32,
    /// Timestamp update policy of the rate limiter.
    pub throttle: Throttle,
    /// Highest valid GPIO number.
    pub max_pin: u8,
}

impl Config {
    /// The datasheet defaults.
    pub const fn new() -> Self {
        Self {
            bit_threshold: DEFAULT_BIT_THRESHOLD,
            min_read_interval_ms: DEFAULT_MIN_READ_INTERVAL_MS,
            throttle: Throttle::PerAttempt,
            max_pin: DEFAULT_MAX_PIN,
        }
    }

    pub const fn with_bit_threshold(mut self, bit_threshold: u8) -> Self {
        self.bit_threshold = bit_threshold;
        self
    }

    pub const fn with_min_read_interval_ms(mut self, min_read_interval_ms: u32) -> Self {
        self.min_read_interval_ms = min_read_interval_ms;
        self
    }

    pub const fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub const fn with_max_pin(mut self, max_pin: u8) -> Self {
        self.max_pin = max_pin;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
