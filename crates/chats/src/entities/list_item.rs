use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Message;
use crate::types::{ListId, ListItemId, MessageId};

/// Membership of a message in a list, stored in the `listItems` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: ListItemId,
    pub list_id: ListId,
    pub message_id: MessageId,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub added_at: DateTime<Utc>,
    /// Only meaningful for checklists.
    #[serde(default)]
    pub completed: bool,
}

/// A list item with its message resolved. `message` is `None` when the
/// message no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemWithMessage {
    #[serde(flatten)]
    pub item: ListItem,
    pub message: Option<Message>,
}
