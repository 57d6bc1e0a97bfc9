//! Realtime wire frames.
//!
//! Outbound frames are a closed set built by [`RealtimeSender`]. Inbound frames
//! are kept as raw text and only decoded when a consumer asks for it.
//!
//! [`RealtimeSender`]: crate::realtime::client::RealtimeSender

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::realtime::ids::CorrelationId;

/// Protocol version announced in the `connect` frame.
pub const PROTOCOL_VERSION: &str = "1";

/// Frames the client writes to the realtime transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientMessage {
    Connect {
        version: String,
        support: Vec<String>,
    },
    Method {
        id: CorrelationId,
        method: String,
        params: Vec<Value>,
    },
    Sub {
        id: CorrelationId,
        name: String,
        params: Vec<Value>,
    },
    Unsub {
        id: CorrelationId,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientMessage {
    /// The `connect` frame for [`PROTOCOL_VERSION`].
    pub fn connect() -> Self {
        Self::Connect {
            version: PROTOCOL_VERSION.to_string(),
            support: vec![PROTOCOL_VERSION.to_string()],
        }
    }

    /// Correlation id carried by the frame, if any.
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Self::Method { id, .. } | Self::Sub { id, .. } | Self::Unsub { id } => Some(id),
            Self::Connect { .. } | Self::Pong { .. } => None,
        }
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One frame received from the server, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl InboundFrame {
    /// Returns the frame as text when it is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Decodes the frame into a [`ServerMessage`].
    ///
    /// Frames without a `msg` field (the server's initial `server_id` banner,
    /// for example) fail to decode; the raw frame stays available to the
    /// caller either way.
    pub fn parse(&self) -> Result<ServerMessage, serde_json::Error> {
        match self {
            Self::Text(text) => serde_json::from_str(text),
            Self::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// Known inbound message shapes.
///
/// Every variant keeps the fields it does not name in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected {
        session: String,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Failed {
        version: String,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Ready {
        subs: Vec<CorrelationId>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Nosub {
        id: CorrelationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Added {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Changed {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleared: Option<Vec<String>>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Removed {
        collection: String,
        id: String,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Result {
        id: CorrelationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Updated {
        methods: Vec<CorrelationId>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    /// A `msg` value this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Correlation id of a method reply or subscription failure.
    pub fn reply_to(&self) -> Option<&CorrelationId> {
        match self {
            Self::Result { id, .. } | Self::Nosub { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
