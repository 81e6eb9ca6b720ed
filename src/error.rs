use thiserror::Error;

/// Possible errors from the DHT22 driver.
///
/// `E` is the error type of the GPIO pin.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DhtError<E> {
    /// A pin id, name or sensor id was rejected.
    #[error("invalid input")]
    InvalidInput,
    /// No room left to hold another sensor handle.
    #[error("no free sensor slot")]
    AllocationFailed,
    /// The pull-up could not be enabled on the data pin.
    #[error("failed to set pin mode: {0:?}")]
    PinMode(E),
    /// The data pin could not be switched between input and output.
    #[error("failed to set pin direction: {0:?}")]
    PinDirection(E),
    /// Error from the GPIO pin while driving or sampling the line.
    #[error("failed to drive or sample pin level: {0:?}")]
    PinLevel(E),
    /// A read was attempted before the minimum interval elapsed.
    #[error("read attempted before the minimum interval elapsed")]
    TooFrequent,
    /// The sensor kept the line low past its timing window.
    #[error("sensor did not switch to high")]
    SensorDidNotSwitchToHigh,
    /// The sensor kept the line high past its timing window.
    #[error("sensor did not switch to low")]
    SensorDidNotSwitchToLow,
    /// Checksum did not match the received data.
    #[error("invalid checksum")]
    InvalidChecksum,
}

/// Broad classification of a [`DhtError`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("input validation")]
    InputValidation,
    #[error("resource allocation")]
    ResourceAllocation,
    #[error("hardware configuration")]
    HardwareConfig,
    #[error("protocol timing")]
    ProtocolTiming,
    #[error("rate limit")]
    RateLimit,
    #[error("data integrity")]
    DataIntegrity,
}

impl<E> DhtError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput => ErrorKind::InputValidation,
            Self::AllocationFailed => ErrorKind::ResourceAllocation,
            Self::PinMode(_) | Self::PinDirection(_) | Self::PinLevel(_) => {
                ErrorKind::HardwareConfig
            }
            Self::TooFrequent => ErrorKind::RateLimit,
            Self::SensorDidNotSwitchToHigh | Self::SensorDidNotSwitchToLow => {
                ErrorKind::ProtocolTiming
            }
            Self::InvalidChecksum => ErrorKind::DataIntegrity,
        }
    }

    /// Whether the error only spoils the current read attempt.
    ///
    /// Transient errors leave the handle usable; the next scheduled read proceeds
    /// normally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProtocolTiming | ErrorKind::RateLimit | ErrorKind::DataIntegrity
        )
    }
}

impl<E> From<E> for DhtError<E> {
    fn from(value: E) -> Self {
        Self::PinLevel(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(DhtError::<()>::InvalidInput.kind(), ErrorKind::InputValidation);
        assert_eq!(
            DhtError::<()>::AllocationFailed.kind(),
            ErrorKind::ResourceAllocation
        );
        assert_eq!(DhtError::PinMode(()).kind(), ErrorKind::HardwareConfig);
        assert_eq!(DhtError::<()>::TooFrequent.kind(), ErrorKind::RateLimit);
        assert_eq!(
            DhtError::<()>::SensorDidNotSwitchToLow.kind(),
            ErrorKind::ProtocolTiming
        );
        assert_eq!(
            DhtError::<()>::InvalidChecksum.kind(),
            ErrorKind::DataIntegrity
        );
    }

    #[test]
    fn test_transient() {
        assert!(DhtError::<()>::InvalidChecksum.is_transient());
        assert!(DhtError::<()>::SensorDidNotSwitchToHigh.is_transient());
        assert!(DhtError::<()>::TooFrequent.is_transient());
        assert!(!DhtError::<()>::InvalidInput.is_transient());
        assert!(!DhtError::PinDirection(()).is_transient());
    }

    #[test]
    fn test_from_pin_error() {
        let err: DhtError<u8> = 7.into();
        assert_eq!(err, DhtError::PinLevel(7));
    }
}
