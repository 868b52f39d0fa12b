//! Error types for the relay protocol

use std::time::Duration;

use thiserror::Error;

use crate::{Location, RunnerId};

/// Core relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    // Bootstrap errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Directory errors
    #[error("Runner not found in directory: {0}")]
    NotFound(RunnerId),

    #[error("Runner already registered: {0}")]
    AlreadyRegistered(RunnerId),

    // Mobility errors
    #[error("Relocation of {runner} to {destination} failed: {reason}")]
    Relocation {
        runner: RunnerId,
        destination: Location,
        reason: String,
    },

    // Messaging errors
    #[error("Message to {0} could not be delivered")]
    Undeliverable(RunnerId),

    #[error("Invalid payload: expected {expected} bytes, got {actual}")]
    InvalidPayload { expected: usize, actual: usize },

    #[error("Mailbox of {0} closed")]
    Shutdown(RunnerId),

    // Protocol errors
    #[error("Hand-off from {runner} to {target} not acknowledged within {waited:?}")]
    ProtocolStalled {
        runner: RunnerId,
        target: RunnerId,
        waited: Duration,
    },

    #[error("Trial {attempt} did not complete within {waited:?}")]
    TrialTimedOut { attempt: u32, waited: Duration },
}

impl RelayError {
    /// Is this error fatal to the runner that hit it?
    ///
    /// Everything but a malformed payload kills the runner; a bad payload
    /// is logged and the message dropped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::InvalidPayload { .. })
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::NotFound(RunnerId::new("r2"));
        assert_eq!(err.to_string(), "Runner not found in directory: r2");

        let err = RelayError::TrialTimedOut {
            attempt: 3,
            waited: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Trial 3 did not complete within 2s");
    }

    #[test]
    fn test_fatality() {
        assert!(RelayError::Config("bad".into()).is_fatal());
        assert!(RelayError::NotFound(RunnerId::new("x")).is_fatal());
        assert!(!RelayError::InvalidPayload {
            expected: 4,
            actual: 0
        }
        .is_fatal());
    }
}
