use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A channel as returned by the channel list endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Channel {
    /// Name in `#channel` form, as the post endpoint expects it.
    pub fn display_name(&self) -> String {
        format!("#{}", self.name)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ChannelList {
    pub channels: Vec<Channel>,
}

/// Body of `chat.postMessage`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostMessageRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub channel: String,
    pub text: String,
}

impl PostMessageRequest {
    pub fn for_channel(channel: &Channel, text: impl Into<String>) -> Self {
        Self {
            room_id: channel.id.clone(),
            channel: channel.display_name(),
            text: text.into(),
        }
    }
}

/// Reply of `chat.postMessage`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostMessageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One chat message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "rid", default)]
    pub room_id: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<UserSummary>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChatMessage {
    /// Username of the author, falling back to the display name.
    pub fn author_name(&self) -> Option<&str> {
        let author = self.author.as_ref()?;
        author.username.as_deref().or(author.name.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct MessageHistory {
    pub messages: Vec<ChatMessage>,
}

/// Parameters of `channels.history`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub room_id: String,
    /// Upper timestamp bound (ISO-8601).
    pub latest: Option<String>,
    /// Lower timestamp bound (ISO-8601).
    pub oldest: Option<String>,
    pub offset: Option<u32>,
    pub count: Option<u32>,
    pub unreads: Option<bool>,
}

impl HistoryQuery {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("roomId", self.room_id.clone())];
        if let Some(latest) = &self.latest {
            pairs.push(("latest", latest.clone()));
        }
        if let Some(oldest) = &self.oldest {
            pairs.push(("oldest", oldest.clone()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(count) = self.count {
            pairs.push(("count", count.to_string()));
        }
        if let Some(unreads) = self.unreads {
            pairs.push(("unreads", unreads.to_string()));
        }
        pairs
    }
}

/// Minimal user record used in message authors, online lists and search.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct OnlineUsers {
    pub online: Vec<UserSummary>,
}

/// Room record returned by `spotlight`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoomSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Reply of `spotlight`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SpotlightResult {
    #[serde(default)]
    pub users: Vec<UserSummary>,
    #[serde(default)]
    pub rooms: Vec<RoomSummary>,
}

/// The authenticated user's profile from `me`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Channel, ChatMessage, HistoryQuery, PostMessageRequest};

    #[test]
    fn channel_keeps_unrecognized_fields() {
        let channel: Channel = serde_json::from_value(json!({
            "_id": "GENERAL",
            "name": "general",
            "t": "c",
            "usersCount": 12
        }))
        .expect("decode channel");

        assert_eq!(channel.id, "GENERAL");
        assert_eq!(channel.display_name(), "#general");
        assert_eq!(channel.extra.get("usersCount"), Some(&json!(12)));
    }

    #[test]
    fn post_request_uses_wire_names() {
        let channel = Channel {
            id: "ROOM1".to_string(),
            name: "dev".to_string(),
            extra: Default::default(),
        };
        let value = serde_json::to_value(PostMessageRequest::for_channel(&channel, "hello"))
            .expect("encode");
        assert_eq!(
            value,
            json!({"roomId": "ROOM1", "channel": "#dev", "text": "hello"})
        );
    }

    #[test]
    fn message_author_name_prefers_username() {
        let message: ChatMessage = serde_json::from_value(json!({
            "_id": "m1",
            "rid": "ROOM1",
            "msg": "hi",
            "u": {"_id": "u1", "username": "alice", "name": "Alice"}
        }))
        .expect("decode message");

        assert_eq!(message.author_name(), Some("alice"));
        assert_eq!(message.room_id, "ROOM1");
    }

    #[test]
    fn history_query_only_sends_set_fields() {
        let query = HistoryQuery::new("ROOM1").with_count(20);
        assert_eq!(
            query.query_pairs(),
            vec![("roomId", "ROOM1".to_string()), ("count", "20".to_string())]
        );

        let query = HistoryQuery {
            latest: Some("2024-01-01T00:00:00.000Z".to_string()),
            unreads: Some(true),
            offset: Some(5),
            ..HistoryQuery::new("ROOM2")
        };
        let keys: Vec<&str> = query.query_pairs().iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["roomId", "latest", "offset", "unreads"]);
    }
}
