//! Wire messages exchanged with HMR clients.

use serde::{Deserialize, Serialize};

/// Server → client notification.
///
/// Serialized as `{"type":"update","url":"/src/app.js"}` or `{"type":"reload"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HmrMessage {
    /// Re-import the module served at `url`.
    Update { url: String },
    /// Reload the whole page.
    Reload,
}

impl HmrMessage {
    pub fn update(url: impl Into<String>) -> Self {
        HmrMessage::Update { url: url.into() }
    }

    pub fn is_reload(&self) -> bool {
        matches!(self, HmrMessage::Reload)
    }
}

/// Client → server message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// The module `id` registered itself as an update boundary.
    HotAccept { id: String },
}

/// Collapse a flushed batch: a batch made only of reloads becomes a single
/// reload, anything else is delivered as-is in enqueue order.
pub fn collapse_batch(batch: Vec<HmrMessage>) -> Vec<HmrMessage> {
    if !batch.is_empty() && batch.iter().all(HmrMessage::is_reload) {
        vec![HmrMessage::Reload]
    } else {
        batch
    }
}
