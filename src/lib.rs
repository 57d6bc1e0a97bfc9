//! Client core for Rocket.Chat servers.
//!
//! The crate is organized by transport surface:
//! - `realtime`: DDP over websocket, with a background pump that owns the
//!   socket and ordered queues on either side of it.
//! - `rest`: authenticated HTTP calls for channel listing and posting.
//! - `config`: server address and credentials.
//! - `telemetry`: subscriber setup for the command-line tool.

/// Server address and credential loading.
pub mod config;
/// Realtime client, DDP protocol types, and the connection pump.
pub mod realtime;
/// REST client and request/response types.
pub mod rest;
/// Tracing subscriber setup.
pub mod telemetry;

pub use config::{Config, ConfigError};
