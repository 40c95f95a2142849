//! # dutd-server
//!
//! TCP server for dutd.
//!
//! This crate provides:
//! - The single-client connection/event loop
//! - Frame reassembly over the client socket
//! - The message dispatch table and per-message handlers
//! - The driver collaborator boundary
//! - Configuration loading

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod server;

pub use config::{Config, NetworkConfig};
pub use dispatch::{DispatchTable, MessageHandler, Outcome};
pub use driver::{DriverControl, DriverError, NullDriver};
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerStats};
