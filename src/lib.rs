//! DHT22 Sensor Driver and Read Pipeline for Embedded Rust
//!
//! This crate reads the DHT22 (AM2302) temperature and humidity sensor over its
//! single-wire, pulse-width encoded protocol, built on top of the [`embedded-hal`]
//! traits.
//!
//! # Layers
//! - [`protocol`]: the timing engine. Sends the start signal, waits out the sensor's
//!   acknowledge and measures the high pulse of all 40 bits into a [`RawFrame`].
//! - [`frame`]: resolves the pulse counters against a threshold, checks the checksum
//!   and converts to fixed-point [`Measurement`]s. No floating point.
//! - [`rate`]: enforces the sensor's minimum interval between reads.
//! - [`Dht22`]: the sensor handle tying the above together.
//! - [`registry`]: fixed-capacity, generation-checked storage for several handles.
//! - `pipeline` (feature `std`): producer and consumer threads joined by a bounded
//!   queue.
//!
//! # Features
//! - `std` (default): the read pipeline; implies `log`.
//! - `log`: log through the [`log`] facade.
//! - `defmt`: log through `defmt` and implement `defmt::Format` for public types.
//! - `sim`: a simulated sensor on a virtual clock, for running the protocol engine
//!   without hardware.
//!
//! Without `std` the crate is `no_std`.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal
//! [`log`]: https://docs.rs/log

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod logging;

pub mod config;
pub mod dht22;
pub mod error;
pub mod frame;
#[cfg(feature = "std")]
pub mod pipeline;
pub mod protocol;
pub mod rate;
pub mod registry;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{Config, Throttle};
pub use dht22::{Dht22, ReadStats};
pub use error::{DhtError, ErrorKind};
pub use frame::{Measurement, RawFrame};
pub use protocol::DataLine;
pub use rate::RateLimiter;
pub use registry::{SensorId, SensorRegistry};
