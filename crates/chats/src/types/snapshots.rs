//! Read-only views the engines publish after every state change.

use serde::Serialize;

use crate::entities::{List, ListItemWithMessage, MessageWithReply};
use crate::types::ListId;

/// State of the message feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Older pages followed by the live window, oldest first.
    pub messages: Vec<MessageWithReply>,
    /// True until the first live delivery has been applied.
    pub loading: bool,
    pub loading_more: bool,
    pub has_more: bool,
    /// Last subscription or query failure. Cleared by the next good delivery.
    pub error: Option<String>,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            loading: true,
            loading_more: false,
            has_more: false,
            error: None,
        }
    }
}

/// Which list, if any, is open together with its items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    Unselected,
    #[serde(rename_all = "camelCase")]
    Selected {
        list_id: ListId,
        items: Vec<ListItemWithMessage>,
        loading: bool,
        error: Option<String>,
    },
}

impl Selection {
    pub fn list_id(&self) -> Option<&str> {
        match self {
            Selection::Unselected => None,
            Selection::Selected { list_id, .. } => Some(list_id),
        }
    }

    pub fn items(&self) -> &[ListItemWithMessage] {
        match self {
            Selection::Unselected => &[],
            Selection::Selected { items, .. } => items,
        }
    }
}

/// State of the collections engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionsSnapshot {
    /// Lists visible to the session identity, newest first.
    pub lists: Vec<List>,
    pub loading: bool,
    pub error: Option<String>,
    pub selection: Selection,
    /// List awaiting delete confirmation.
    pub pending_delete: Option<ListId>,
}

impl Default for CollectionsSnapshot {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            loading: true,
            error: None,
            selection: Selection::Unselected,
            pending_delete: None,
        }
    }
}
