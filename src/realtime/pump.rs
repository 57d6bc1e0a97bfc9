//! Duplex pump driving one realtime connection.
//!
//! The receiver loop moves frames from the transport into the inbound queue;
//! the sender loop moves queued frames onto the transport. Both run inside a
//! single supervisor task and the first one to finish ends the session: the
//! other loop is dropped on the spot and the connection moves to
//! [`ConnectionState::Closed`]. There is no half-open mode.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn, Instrument, Span};

/// Upper bound on sending the close frame and flushing the sink.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

use crate::realtime::proto::InboundFrame;
use crate::realtime::queue::{InboundFeed, OutboundDrain};

/// Lifecycle of one connection. States only move forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a pump stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PumpOutcome {
    /// The server closed the socket or the stream ended.
    RemoteClosed,
    /// Reading or writing failed.
    TransportError(String),
    /// Every sender handle was dropped and the outbound queue drained.
    OutboundClosed,
    /// The caller asked for the connection to close.
    LocalClose,
    /// The supervisor task was aborted or panicked.
    Aborted,
}

/// Read-only view of a connection's state.
#[derive(Clone, Debug)]
pub struct StateWatch {
    rx: watch::Receiver<ConnectionState>,
}

impl StateWatch {
    pub(crate) fn new(rx: watch::Receiver<ConnectionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Resolves once the connection has reached `Closed`.
    pub async fn wait_closed(&mut self) {
        // The pump publishes `Closed` before its sender can be dropped, so an
        // error here also means the connection is gone.
        let _ = self
            .rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

/// Publishes `Closed` when dropped, including when the supervisor is aborted.
struct ClosedOnDrop(watch::Sender<ConnectionState>);

impl ClosedOnDrop {
    fn set(&self, state: ConnectionState) {
        self.0.send_replace(state);
    }
}

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(ConnectionState::Closed);
    }
}

/// Handle to the supervisor task.
#[derive(Debug)]
pub struct PumpHandle {
    task: JoinHandle<PumpOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PumpHandle {
    /// Asks the pump to send a close frame and stop. Frames still queued are
    /// not transmitted.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Cancels the supervisor, and with it both loops, without a close frame.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the pump to stop.
    pub async fn join(self) -> PumpOutcome {
        self.task.await.unwrap_or(PumpOutcome::Aborted)
    }
}

/// Spawns the supervisor for an already-open transport.
///
/// The connection is `Open` when this returns, and reaches `Closed` however
/// the supervisor ends, including an abort before its first poll.
pub(crate) fn spawn<W, R, E>(
    sink: W,
    stream: R,
    outbound: OutboundDrain,
    inbound: InboundFeed,
    state: watch::Sender<ConnectionState>,
    span: Span,
) -> PumpHandle
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let state = ClosedOnDrop(state);
    state.set(ConnectionState::Open);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(
        run_duplex(sink, stream, outbound, inbound, shutdown_rx, state).instrument(span),
    );
    PumpHandle {
        task,
        shutdown: Some(shutdown_tx),
    }
}

async fn run_duplex<W, R, E>(
    mut sink: W,
    mut stream: R,
    mut outbound: OutboundDrain,
    inbound: InboundFeed,
    shutdown: oneshot::Receiver<()>,
    state: ClosedOnDrop,
) -> PumpOutcome
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    debug!(event = "realtime_pump_started");

    let outcome = tokio::select! {
        outcome = receive_loop(&mut stream, &inbound) => outcome,
        outcome = send_loop(&mut sink, &mut outbound) => outcome,
        () = close_requested(shutdown) => PumpOutcome::LocalClose,
    };

    state.set(ConnectionState::Closing);
    let unsent = outbound.len();
    if unsent > 0 {
        warn!(event = "realtime_outbound_dropped", frames = unsent);
    }

    if matches!(
        outcome,
        PumpOutcome::LocalClose | PumpOutcome::OutboundClosed
    ) {
        let handshake = async {
            if let Err(err) = sink.send(Message::Close(None)).await {
                trace!(event = "realtime_close_frame_failed", error = %err);
            }
            if let Err(err) = sink.close().await {
                trace!(event = "realtime_sink_close_failed", error = %err);
            }
        };
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, handshake)
            .await
            .is_err()
        {
            warn!(
                event = "realtime_close_timed_out",
                timeout_ms = CLOSE_HANDSHAKE_TIMEOUT.as_millis() as u64
            );
        }
    }

    debug!(event = "realtime_pump_stopped", outcome = ?outcome);
    outcome
}

async fn close_requested(shutdown: oneshot::Receiver<()>) {
    if shutdown.await.is_err() {
        // Handle dropped without asking; the pump keeps running until the
        // transport or the outbound queue ends it.
        std::future::pending::<()>().await;
    }
}

async fn receive_loop<R, E>(stream: &mut R, inbound: &InboundFeed) -> PumpOutcome
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let Some(item) = stream.next().await else {
            debug!(event = "realtime_stream_ended");
            return PumpOutcome::RemoteClosed;
        };

        match item {
            Ok(Message::Text(text)) => {
                trace!(event = "realtime_frame_received", bytes = text.len());
                if !inbound.push(InboundFrame::Text(text.as_str().to_owned())) {
                    trace!(event = "realtime_inbound_consumer_gone");
                }
            }
            Ok(Message::Binary(bytes)) => {
                trace!(event = "realtime_frame_received", bytes = bytes.len());
                if !inbound.push(InboundFrame::Binary(bytes.to_vec())) {
                    trace!(event = "realtime_inbound_consumer_gone");
                }
            }
            // Control frames are answered by the websocket library.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                debug!(event = "realtime_remote_close", frame = ?frame);
                return PumpOutcome::RemoteClosed;
            }
            Err(err) => {
                warn!(event = "realtime_receive_failed", error = %err);
                return PumpOutcome::TransportError(err.to_string());
            }
        }
    }
}

async fn send_loop<W>(sink: &mut W, outbound: &mut OutboundDrain) -> PumpOutcome
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(text) = outbound.next().await {
        let bytes = text.len();
        if let Err(err) = sink.send(Message::text(text)).await {
            warn!(event = "realtime_send_failed", error = %err);
            return PumpOutcome::TransportError(err.to_string());
        }
        trace!(event = "realtime_frame_sent", bytes);
    }
    PumpOutcome::OutboundClosed
}
