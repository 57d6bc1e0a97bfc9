//! Correlation identifiers for outbound requests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier attached to a `method`, `sub` or `unsub` frame.
///
/// Replies and subscription events from the server carry the same value, so
/// callers match them against the id returned when the request was queued.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps an arbitrary id, e.g. one read back from an inbound frame.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&CorrelationId> for CorrelationId {
    fn from(id: &CorrelationId) -> Self {
        id.clone()
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Monotonic id source scoped to one connection.
///
/// The first id issued is `"1"`. Ids are never reused for the lifetime of the
/// generator.
#[derive(Debug)]
pub struct CorrelationIds {
    next: AtomicU64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Issues the next id.
    pub fn next(&self) -> CorrelationId {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId(value.to_string())
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}
