//! Realtime websocket client and outbound request builder.
//!
//! [`RealtimeClient::connect`] opens the socket and spawns the duplex pump;
//! the returned [`RealtimeConnection`] queues requests through a cloneable
//! [`RealtimeSender`] and hands inbound frames back in arrival order. No
//! request method waits on the network.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, info_span, warn, Span};

use crate::config::Config;
use crate::realtime::ids::{CorrelationId, CorrelationIds};
use crate::realtime::proto::{ClientMessage, InboundFrame};
use crate::realtime::pump::{self, ConnectionState, PumpHandle, PumpOutcome, StateWatch};
use crate::realtime::queue::{inbound_queue, outbound_queue, InboundQueue, OutboundQueue};

/// Path of the realtime endpoint on a chat server.
pub const WEBSOCKET_PATH: &str = "/websocket";

/// Entry point for opening realtime connections.
#[derive(Clone, Debug)]
pub struct RealtimeClient {
    endpoint: String,
    span: Span,
}

impl RealtimeClient {
    /// Creates a client for `wss://<server>/websocket`.
    ///
    /// `server` may carry its own scheme (`ws://`, `wss://`, `http://`,
    /// `https://`); plain hosts default to `wss://`.
    pub fn new(server: &str) -> Self {
        let endpoint = realtime_endpoint(server);
        let span = info_span!("realtime", endpoint = %endpoint);
        Self { endpoint, span }
    }

    /// Creates a client for the server named in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server)
    }

    /// Sets an explicit websocket URL, bypassing server-name derivation.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = endpoint.trim_end().to_string();
        self
    }

    /// Emits this client's logs and pump task inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Opens a new connection.
    ///
    /// The `connect` frame is queued before the socket opens, so it is always
    /// the first frame on the wire. Each call yields an independent
    /// connection with its own correlation ids; a closed connection is never
    /// reopened.
    pub async fn connect(&self) -> Result<RealtimeConnection, RealtimeError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Unconnected);
        let (outbound, drain) = outbound_queue();
        let (feed, inbound) = inbound_queue();

        let sender = RealtimeSender::new(outbound);
        sender.send(ClientMessage::connect())?;

        state_tx.send_replace(ConnectionState::Connecting);
        debug!(parent: &self.span, event = "realtime_connecting");

        let socket = match connect_async(self.endpoint.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(err) => {
                state_tx.send_replace(ConnectionState::Closed);
                warn!(parent: &self.span, event = "realtime_connect_failed", error = %err);
                return Err(RealtimeError::Connection(err));
            }
        };

        let (sink, stream) = socket.split();
        // Publishes `Open`: the handshake is complete by now.
        let pump = pump::spawn(sink, stream, drain, feed, state_tx, self.span.clone());

        Ok(RealtimeConnection {
            sender,
            inbound,
            state: StateWatch::new(state_rx),
            pump,
        })
    }
}

fn realtime_endpoint(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    let base = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server.starts_with("wss://") || server.starts_with("ws://") {
        server.to_string()
    } else {
        format!("wss://{server}")
    };
    format!("{base}{WEBSOCKET_PATH}")
}

/// An open realtime session.
///
/// Owns the inbound queue and the pump handle. Dropping it without calling
/// [`close`](Self::close) leaves the pump running for as long as cloned
/// senders exist.
#[derive(Debug)]
pub struct RealtimeConnection {
    sender: RealtimeSender,
    inbound: InboundQueue,
    state: StateWatch,
    pump: PumpHandle,
}

impl RealtimeConnection {
    /// Returns a cloneable sender for outbound requests.
    pub fn sender(&self) -> RealtimeSender {
        self.sender.clone()
    }

    /// Queues a `method` frame. See [`RealtimeSender::call`].
    pub fn call(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<CorrelationId, RealtimeError> {
        self.sender.call(method, params)
    }

    /// Queues a `sub` frame. See [`RealtimeSender::subscribe`].
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<CorrelationId, RealtimeError> {
        self.sender.subscribe(name, params)
    }

    /// Queues an `unsub` frame. See [`RealtimeSender::unsubscribe`].
    pub fn unsubscribe(
        &self,
        id: impl Into<CorrelationId>,
    ) -> Result<CorrelationId, RealtimeError> {
        self.sender.unsubscribe(id)
    }

    /// Receives the next inbound frame.
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.inbound.recv().await
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Returns a watcher that outlives [`split`](Self::split).
    pub fn state_watch(&self) -> StateWatch {
        self.state.clone()
    }

    /// Requests an orderly close. Idempotent.
    pub fn close(&mut self) {
        self.pump.close();
    }

    /// Closes the connection and waits for the pump to stop.
    pub async fn shutdown(mut self) -> PumpOutcome {
        self.pump.close();
        self.pump.join().await
    }

    /// Splits into sender, inbound queue, state watcher and pump handle.
    pub fn split(self) -> (RealtimeSender, InboundQueue, StateWatch, PumpHandle) {
        (self.sender, self.inbound, self.state, self.pump)
    }
}

/// Cloneable producer of outbound frames for one connection.
///
/// Every clone shares the connection's correlation id sequence.
#[derive(Clone, Debug)]
pub struct RealtimeSender {
    queue: OutboundQueue,
    ids: Arc<CorrelationIds>,
}

impl RealtimeSender {
    pub(crate) fn new(queue: OutboundQueue) -> Self {
        Self {
            queue,
            ids: Arc::new(CorrelationIds::new()),
        }
    }

    /// Queues a raw client frame.
    pub fn send(&self, message: ClientMessage) -> Result<(), RealtimeError> {
        self.queue.push(&message)
    }

    /// Queues a remote method call and returns its correlation id.
    ///
    /// The reply, if any, arrives later on the inbound queue as a `result`
    /// frame carrying the same id. There is no timeout.
    pub fn call(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<CorrelationId, RealtimeError> {
        let id = self.ids.next();
        self.send(ClientMessage::Method {
            id: id.clone(),
            method: method.into(),
            params,
        })?;
        Ok(id)
    }

    /// Queues a subscription and returns its correlation id.
    ///
    /// The server keeps pushing events for the subscription until
    /// [`unsubscribe`](Self::unsubscribe) is called with the same id.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<CorrelationId, RealtimeError> {
        let id = self.ids.next();
        self.send(ClientMessage::Sub {
            id: id.clone(),
            name: name.into(),
            params,
        })?;
        Ok(id)
    }

    /// Queues an `unsub` for `id` and returns it.
    ///
    /// The id is forwarded as-is; unknown ids are not rejected locally.
    pub fn unsubscribe(
        &self,
        id: impl Into<CorrelationId>,
    ) -> Result<CorrelationId, RealtimeError> {
        let id = id.into();
        self.send(ClientMessage::Unsub { id: id.clone() })?;
        Ok(id)
    }

    /// Answers a server keep-alive `ping`, echoing its id when present.
    pub fn pong(&self, id: Option<String>) -> Result<(), RealtimeError> {
        self.send(ClientMessage::Pong { id })
    }

    /// True once the connection's sender loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Errors produced by the realtime transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The socket could not be opened or failed mid-session.
    #[error("connection error: {0}")]
    Connection(#[from] WsError),

    /// A frame could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection's sender loop has stopped.
    #[error("send queue is closed")]
    SendQueueClosed,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{realtime_endpoint, RealtimeClient, RealtimeError, RealtimeSender};
    use crate::realtime::ids::CorrelationId;
    use crate::realtime::proto::ClientMessage;
    use crate::realtime::queue::{outbound_queue, OutboundDrain};

    async fn next_frame(drain: &mut OutboundDrain) -> serde_json::Value {
        let text = drain.next().await.expect("queued frame");
        serde_json::from_str(&text).expect("frame is json")
    }

    #[test]
    fn endpoint_defaults_to_wss() {
        assert_eq!(
            realtime_endpoint("chat.example.com"),
            "wss://chat.example.com/websocket"
        );
        assert_eq!(
            RealtimeClient::new("chat.example.com/").endpoint(),
            "wss://chat.example.com/websocket"
        );
    }

    #[test]
    fn endpoint_maps_http_schemes() {
        assert_eq!(
            realtime_endpoint("https://chat.example.com"),
            "wss://chat.example.com/websocket"
        );
        assert_eq!(
            realtime_endpoint("http://127.0.0.1:3000"),
            "ws://127.0.0.1:3000/websocket"
        );
        assert_eq!(
            realtime_endpoint("ws://localhost:3000"),
            "ws://localhost:3000/websocket"
        );
    }

    #[test]
    fn endpoint_override_takes_precedence() {
        let client = RealtimeClient::new("chat.example.com")
            .with_endpoint("ws://127.0.0.1:9/custom   \n");
        assert_eq!(client.endpoint(), "ws://127.0.0.1:9/custom");
    }

    #[tokio::test]
    async fn call_queues_method_frame() {
        let (queue, mut drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);

        let id = sender
            .call("sendMessage", vec![json!({"_id": "abc"})])
            .expect("call");

        assert_eq!(
            next_frame(&mut drain).await,
            json!({"msg": "method", "id": id.as_str(), "method": "sendMessage", "params": [{"_id": "abc"}]})
        );
        assert_eq!(drain.len(), 0);
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_reuses_id() {
        let (queue, mut drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);

        let id = sender
            .subscribe("stream-notify-room", vec![json!("ROOM123"), json!("typing")])
            .expect("subscribe");
        let returned = sender.unsubscribe(&id).expect("unsubscribe");

        assert_eq!(returned, id);
        assert_eq!(
            next_frame(&mut drain).await,
            json!({"msg": "sub", "id": id.as_str(), "name": "stream-notify-room", "params": ["ROOM123", "typing"]})
        );
        let unsub = drain.next().await.expect("unsub frame");
        assert_eq!(unsub, format!(r#"{{"msg":"unsub","id":"{id}"}}"#));
    }

    #[tokio::test]
    async fn unsubscribe_forwards_unknown_ids() {
        let (queue, mut drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);

        let id = sender.unsubscribe("never-issued").expect("unsubscribe");

        assert_eq!(id, CorrelationId::new("never-issued"));
        assert_eq!(
            next_frame(&mut drain).await,
            json!({"msg": "unsub", "id": "never-issued"})
        );
    }

    #[test]
    fn ids_are_distinct_and_increasing_across_operations() {
        let (queue, _drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);
        let clone = sender.clone();

        let ids: Vec<u64> = [
            sender.call("a", vec![]).expect("call"),
            sender.subscribe("b", vec![]).expect("subscribe"),
            clone.call("c", vec![]).expect("call"),
            clone.subscribe("d", vec![]).expect("subscribe"),
        ]
        .iter()
        .map(|id| id.as_str().parse().expect("numeric"))
        .collect();

        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn operations_fail_once_sender_loop_is_gone() {
        let (queue, drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);
        drop(drain);

        assert!(sender.is_closed());
        assert!(matches!(
            sender.call("x", vec![]),
            Err(RealtimeError::SendQueueClosed)
        ));
        assert!(matches!(
            sender.send(ClientMessage::connect()),
            Err(RealtimeError::SendQueueClosed)
        ));
    }

    #[tokio::test]
    async fn pong_echoes_server_id() {
        let (queue, mut drain) = outbound_queue();
        let sender = RealtimeSender::new(queue);

        sender.pong(Some("k1".to_string())).expect("pong");
        sender.pong(None).expect("pong");

        assert_eq!(next_frame(&mut drain).await, json!({"msg": "pong", "id": "k1"}));
        assert_eq!(next_frame(&mut drain).await, json!({"msg": "pong"}));
    }

    #[tokio::test]
    async fn connect_failure_is_a_connection_error() {
        let client = RealtimeClient::new("unused").with_endpoint("ws://127.0.0.1:1/websocket");
        let error = client.connect().await.expect_err("nothing listens on port 1");
        assert!(matches!(error, RealtimeError::Connection(_)));
    }
}
