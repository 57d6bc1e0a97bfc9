use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info_span, warn, Span};

use crate::config::Config;
use crate::rest::types::{
    Channel, ChannelList, ChatMessage, HistoryQuery, MessageHistory, OnlineUsers,
    PostMessageRequest, PostMessageResponse, SpotlightResult, UserProfile, UserSummary,
};

const ERROR_BODY_SNIPPET_LEN: usize = 220;

pub const CHANNELS_LIST_JOINED: &str = "/api/v1/channels.list.joined";
pub const CHANNELS_LIST: &str = "/api/v1/channels.list";
pub const CHAT_POST_MESSAGE: &str = "/api/v1/chat.postMessage";
pub const CHANNELS_HISTORY: &str = "/api/v1/channels.history";
pub const CHANNELS_ONLINE: &str = "/api/v1/channels.online";
pub const SPOTLIGHT: &str = "/api/v1/spotlight";
pub const ME: &str = "/api/v1/me";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RestDefaults;

impl RestDefaults {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

#[derive(Clone, Debug)]
pub struct RestClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RestClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: RestDefaults::CONNECT_TIMEOUT,
            request_timeout: RestDefaults::REQUEST_TIMEOUT,
        }
    }
}

/// Authenticated REST client.
///
/// Every call is a single request: no retries, no backoff. A reply without
/// `"success": true` becomes [`RestError::Api`].
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    user_id: String,
    token: SecretString,
    span: Span,
}

impl RestClient {
    pub fn new(config: &Config) -> Result<Self, RestError> {
        Self::with_options(config, RestClientOptions::default())
    }

    pub fn with_options(config: &Config, options: RestClientOptions) -> Result<Self, RestError> {
        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(RestError::Client)?;

        let base_url = rest_base_url(&config.server);
        let span = info_span!("rest", base_url = %base_url);
        Ok(Self {
            http,
            base_url,
            user_id: config.user_id.clone(),
            token: config.token.clone(),
            span,
        })
    }

    /// Sets an explicit base URL, bypassing server-name derivation.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end().trim_end_matches('/').to_string();
        self
    }

    /// Emits this client's logs inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `call` with `query` parameters; returns the decoded reply.
    pub async fn get(&self, call: &str, query: &[(&str, String)]) -> Result<Value, RestError> {
        let payload = (!query.is_empty()).then(|| query_payload(query));
        let builder = self.http.get(self.endpoint(call)).query(query);
        self.execute(call, builder, payload).await
    }

    /// POST `payload` as JSON to `call`; returns the decoded reply.
    pub async fn post(&self, call: &str, payload: &Value) -> Result<Value, RestError> {
        let builder = self.http.post(self.endpoint(call)).body(payload.to_string());
        self.execute(call, builder, Some(payload.clone())).await
    }

    /// Channels the user has joined.
    pub async fn list_joined_channels(&self) -> Result<Vec<Channel>, RestError> {
        let reply = self.get(CHANNELS_LIST_JOINED, &[]).await?;
        Ok(decode::<ChannelList>(CHANNELS_LIST_JOINED, reply)?.channels)
    }

    /// Every channel visible to the user.
    pub async fn list_channels(&self) -> Result<Vec<Channel>, RestError> {
        let reply = self.get(CHANNELS_LIST, &[]).await?;
        Ok(decode::<ChannelList>(CHANNELS_LIST, reply)?.channels)
    }

    /// Looks a joined channel up by name, with or without the leading `#`.
    pub async fn find_joined_channel(&self, name: &str) -> Result<Option<Channel>, RestError> {
        let name = name.trim_start_matches('#');
        Ok(self
            .list_joined_channels()
            .await?
            .into_iter()
            .find(|channel| channel.name == name))
    }

    pub async fn post_message(
        &self,
        channel: &Channel,
        text: impl Into<String>,
    ) -> Result<PostMessageResponse, RestError> {
        let request = PostMessageRequest::for_channel(channel, text);
        let payload = serde_json::to_value(&request).map_err(|source| RestError::Decode {
            call: CHAT_POST_MESSAGE.to_string(),
            source,
        })?;
        let reply = self.post(CHAT_POST_MESSAGE, &payload).await?;
        decode(CHAT_POST_MESSAGE, reply)
    }

    pub async fn channel_history(&self, query: &HistoryQuery) -> Result<Vec<ChatMessage>, RestError> {
        let reply = self.get(CHANNELS_HISTORY, &query.query_pairs()).await?;
        Ok(decode::<MessageHistory>(CHANNELS_HISTORY, reply)?.messages)
    }

    /// Users currently online in a channel.
    pub async fn channel_online(&self, room_id: &str) -> Result<Vec<UserSummary>, RestError> {
        let filter = serde_json::json!({ "_id": room_id }).to_string();
        let reply = self.get(CHANNELS_ONLINE, &[("query", filter)]).await?;
        Ok(decode::<OnlineUsers>(CHANNELS_ONLINE, reply)?.online)
    }

    /// Searches users and rooms.
    pub async fn spotlight(&self, query: &str) -> Result<SpotlightResult, RestError> {
        let reply = self.get(SPOTLIGHT, &[("query", query.to_string())]).await?;
        decode(SPOTLIGHT, reply)
    }

    pub async fn me(&self) -> Result<UserProfile, RestError> {
        let reply = self.get(ME, &[]).await?;
        decode(ME, reply)
    }

    fn endpoint(&self, call: &str) -> String {
        format!("{}{}", self.base_url, call)
    }

    async fn execute(
        &self,
        call: &str,
        builder: RequestBuilder,
        payload: Option<Value>,
    ) -> Result<Value, RestError> {
        let transport = |source| RestError::Transport {
            call: call.to_string(),
            source,
        };

        let response = builder
            .header("X-Auth-Token", self.token.expose_secret())
            .header("X-User-Id", &self.user_id)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let result = check_success(call, payload, status, body);
        match &result {
            Ok(_) => debug!(parent: &self.span, event = "rest_call_ok", call, status = status.as_u16()),
            Err(err) => warn!(parent: &self.span, event = "rest_call_failed", call, error = %err),
        }
        result
    }
}

fn rest_base_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("https://") || server.starts_with("http://") {
        server.to_string()
    } else {
        format!("https://{server}")
    }
}

fn query_payload(query: &[(&str, String)]) -> Value {
    let map: Map<String, Value> = query
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.clone())))
        .collect();
    Value::Object(map)
}

/// Accepts the reply only when it is a JSON object with `"success": true`.
fn check_success(
    call: &str,
    payload: Option<Value>,
    status: StatusCode,
    body: String,
) -> Result<Value, RestError> {
    if let Ok(reply) = serde_json::from_str::<Value>(&body) {
        if reply.get("success") == Some(&Value::Bool(true)) {
            return Ok(reply);
        }
    }

    Err(RestError::Api {
        call: call.to_string(),
        payload,
        status,
        response: body,
    })
}

fn decode<T: DeserializeOwned>(call: &str, reply: Value) -> Result<T, RestError> {
    serde_json::from_value(reply).map_err(|source| RestError::Decode {
        call: call.to_string(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum RestError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error("request to {call} failed: {source}")]
    Transport {
        call: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered without `"success": true`.
    #[error("api call {call} failed (http {status}): {}", summarize_error_body(.response))]
    Api {
        call: String,
        payload: Option<Value>,
        status: StatusCode,
        /// Raw response body.
        response: String,
    },

    #[error("unexpected payload shape for {call}: {source}")]
    Decode {
        call: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RestError {
    /// Endpoint the failing request targeted.
    pub fn call(&self) -> Option<&str> {
        match self {
            Self::Client(_) => None,
            Self::Transport { call, .. } | Self::Api { call, .. } | Self::Decode { call, .. } => {
                Some(call)
            }
        }
    }
}

fn summarize_error_body(body: &str) -> String {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message).or(parsed.reason) {
            return message;
        }
    }

    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}
