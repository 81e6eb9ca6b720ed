//! Crate-internal logging macros.
//!
//! Messages go to [`defmt`] when the `defmt` feature is enabled, otherwise to the
//! [`log`] facade when the `log` feature is enabled. With neither, the arguments are
//! evaluated and discarded.
//!
//! Format strings must stay within the subset both backends accept (`{}` and `{:?}`).
//!
//! [`defmt`]: https://docs.rs/defmt
//! [`log`]: https://docs.rs/log

#[cfg(feature = "defmt")]
macro_rules! debug {
    ($($arg:tt)*) => {{
        ::defmt::debug!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! info {
    ($($arg:tt)*) => {{
        ::defmt::info!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        ::defmt::warn!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! error {
    ($($arg:tt)*) => {{
        ::defmt::error!($($arg)*);
    }};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! debug {
    ($($arg:tt)*) => {{
        ::log::debug!(target: "dht22", $($arg)*);
    }};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! info {
    ($($arg:tt)*) => {{
        ::log::info!(target: "dht22", $($arg)*);
    }};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        ::log::warn!(target: "dht22", $($arg)*);
    }};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! error {
    ($($arg:tt)*) => {{
        ::log::error!(target: "dht22", $($arg)*);
    }};
}

// No backend: keep the arguments "used" so callers don't trip unused warnings.
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! debug {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! info {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! error {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

pub(crate) use {debug, error, info, log_warn as warn};
