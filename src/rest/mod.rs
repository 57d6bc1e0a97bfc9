//! REST collaborator for the calls the realtime protocol does not cover.
//!
//! Requests are authenticated with the `X-Auth-Token` and `X-User-Id`
//! headers. A reply counts as successful only when its body carries
//! `"success": true`; the HTTP status alone is never trusted.

pub mod client;
pub mod types;

pub use client::{RestClient, RestClientOptions, RestError};
pub use types::{
    Channel, ChatMessage, HistoryQuery, PostMessageRequest, PostMessageResponse, RoomSummary,
    SpotlightResult, UserProfile, UserSummary,
};
