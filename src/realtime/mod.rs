//! Realtime transport modules.
//!
//! - `client`: connection setup and the outbound request surface.
//! - `ids`: correlation id generator.
//! - `proto`: outbound frames and optional inbound decoding.
//! - `pump`: duplex send/receive loops and connection state.
//! - `queue`: outbound and inbound FIFO queues.

/// Websocket connection setup and request sender.
pub mod client;
/// Correlation identifiers.
pub mod ids;
/// Realtime protocol frames.
pub mod proto;
/// Duplex pump and connection lifecycle.
pub mod pump;
/// Frame queues between callers and the pump.
pub mod queue;

pub use client::{RealtimeClient, RealtimeConnection, RealtimeError, RealtimeSender};
pub use ids::CorrelationId;
pub use proto::{ClientMessage, InboundFrame, ServerMessage};
pub use pump::{ConnectionState, PumpHandle, PumpOutcome, StateWatch};
pub use queue::{InboundQueue, TryRecvError};
