//! JacobiError: Unified error type for laplace-jacobi public APIs
//!
//! Every fallible operation in the crate returns this type. Configuration
//! errors are detected before any computation starts; communication and
//! device errors are fatal for the whole run and are never retried.

use std::fmt::Debug;
use thiserror::Error;

/// Leaf error carrying transport-level detail for [`JacobiError::CommError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommError(pub String);

/// Unified error type for laplace-jacobi operations.
#[derive(Debug, Error)]
pub enum JacobiError {
    /// `side * side` does not match the number of participating workers.
    #[error("Configuration error: topology side {side} squared does not equal worker count {workers}")]
    TopologyMismatch { workers: usize, side: usize },
    /// The global dimension cannot be split evenly across the topology.
    #[error("Configuration error: topology side {side} does not evenly divide dimension {dimension}")]
    IndivisibleDimension { dimension: usize, side: usize },
    /// Any other out-of-range solver parameter.
    #[error("Configuration error: {0}")]
    InvalidParameter(String),
    /// A halo exchange or reduction with `neighbor` could not complete.
    #[error("Communication failure with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The compute device could not be initialized or rejected a dispatch.
    #[error("Device error on device {device}: {reason}")]
    DeviceError { device: usize, reason: String },
    /// A worker thread panicked before reporting.
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
    /// An internal invariant (e.g. fixed boundary values) was broken.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl JacobiError {
    /// Shorthand for a communication failure with a plain message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        JacobiError::CommError {
            neighbor,
            source: Box::new(CommError(msg.into())),
        }
    }

    /// True for the errors the bootstrap reports as a usage error.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            JacobiError::TopologyMismatch { .. }
                | JacobiError::IndivisibleDimension { .. }
                | JacobiError::InvalidParameter(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_classification() {
        assert!(JacobiError::TopologyMismatch { workers: 3, side: 2 }.is_configuration());
        assert!(JacobiError::IndivisibleDimension { dimension: 5, side: 2 }.is_configuration());
        assert!(!JacobiError::comm(1, "gone").is_configuration());
        assert!(
            !JacobiError::DeviceError {
                device: 0,
                reason: "x".into()
            }
            .is_configuration()
        );
    }

    #[test]
    fn comm_error_keeps_source() {
        use std::error::Error as _;
        let err = JacobiError::comm(3, "timed out");
        assert_eq!(err.to_string(), "Communication failure with rank 3: timed out");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("timed out"));
    }
}
