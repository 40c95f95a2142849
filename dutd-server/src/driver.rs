//! Hardware driver boundary.
//!
//! Message handlers do not touch hardware themselves: every side effect goes
//! through [`DriverControl`], which a platform integration implements on top
//! of its driver/firmware control channel. The core only interprets success
//! or failure.

use dutd_protocol::MsgId;
use thiserror::Error;

/// Errors surfaced by a driver backend.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no connection with hardware #{0}")]
    NotConnected(u8),

    #[error("driver rejected command: status {0}")]
    Rejected(i32),

    #[error("driver backend unavailable: {0}")]
    Unavailable(String),
}

/// Control surface of the platform driver for one or more radios.
///
/// Raw command methods receive the request payload and may rewrite it in
/// place with the reply block; the caller sends whatever the buffer holds
/// afterwards.
pub trait DriverControl: Send + Sync {
    /// Whether the given radio is attached and reachable.
    fn is_connected(&self, hw_index: u8) -> bool;

    /// Stops the driver, optionally performing a full hardware reset.
    fn stop(&self, full_reset: bool) -> Result<(), DriverError>;

    /// Starts the driver, optionally performing a full hardware reset.
    fn start(&self, full_reset: bool) -> Result<(), DriverError>;

    /// Uploads one program image by name.
    fn upload_program(&self, hw_index: u8, name: &str) -> Result<(), DriverError>;

    /// Forwards a typed core command; `data` is rewritten with the reply.
    fn core_command(&self, msg: MsgId, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError>;

    /// Sends a raw firmware command block; `data` is rewritten with the reply.
    fn firmware_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError>;

    /// Sends a raw driver command block; `data` is rewritten with the reply.
    fn driver_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError>;

    /// Sends a raw platform command block; `data` is rewritten with the reply.
    fn platform_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError>;

    /// Prepares an EEPROM staging area of `size` bytes in flash.
    fn prepare_eeprom(&self, hw_index: u8, size: u32) -> Result<(), DriverError>;
}

/// Driver stand-in that accepts every command without touching hardware.
///
/// Used when no platform backend is wired in, and by tests that only care
/// about the protocol core.
pub struct NullDriver;

impl DriverControl for NullDriver {
    fn is_connected(&self, _hw_index: u8) -> bool {
        true
    }

    fn stop(&self, full_reset: bool) -> Result<(), DriverError> {
        tracing::debug!("driver stop (full_reset={})", full_reset);
        Ok(())
    }

    fn start(&self, full_reset: bool) -> Result<(), DriverError> {
        tracing::debug!("driver start (full_reset={})", full_reset);
        Ok(())
    }

    fn upload_program(&self, hw_index: u8, name: &str) -> Result<(), DriverError> {
        tracing::debug!("upload program '{}' for hw #{}", name, hw_index);
        Ok(())
    }

    fn core_command(&self, msg: MsgId, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError> {
        tracing::debug!("{} for hw #{} ({} bytes)", msg, hw_index, data.len());
        Ok(())
    }

    fn firmware_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError> {
        tracing::debug!("firmware command for hw #{} ({} bytes)", hw_index, data.len());
        Ok(())
    }

    fn driver_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError> {
        tracing::debug!("driver command for hw #{} ({} bytes)", hw_index, data.len());
        Ok(())
    }

    fn platform_command(&self, hw_index: u8, data: &mut [u8]) -> Result<(), DriverError> {
        tracing::debug!("platform command for hw #{} ({} bytes)", hw_index, data.len());
        Ok(())
    }

    fn prepare_eeprom(&self, hw_index: u8, size: u32) -> Result<(), DriverError> {
        tracing::debug!("prepare {} byte EEPROM area for hw #{}", size, hw_index);
        Ok(())
    }
}
