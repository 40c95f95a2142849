//! Server error types.

use thiserror::Error;

/// Server errors.
///
/// Only transport-fatal conditions surface here; protocol violations and
/// per-connection failures are absorbed by the event loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] dutd_protocol::ProtocolError),

    #[error("driver error: {0}")]
    Driver(#[from] crate::driver::DriverError),
}
