use chrono::{DateTime, Utc};
use duo_store::Patch;
use serde::{Deserialize, Serialize};

use crate::types::ListId;

/// Who can see a list besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Collection,
    /// Items carry a completed flag.
    Checklist,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Collection => "collection",
            ListKind::Checklist => "checklist",
        }
    }
}

/// A named list of messages, stored in the `lists` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: ListId,
    pub name: String,
    pub owner_id: String,
    pub visibility: Visibility,
    pub kind: ListKind,
    pub emoji: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

/// Request to create a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewList {
    pub name: String,
    pub visibility: Visibility,
    pub kind: ListKind,
    /// Falls back to the configured default glyph when empty.
    pub emoji: Option<String>,
}

impl NewList {
    pub fn new(name: impl Into<String>, visibility: Visibility, kind: ListKind) -> Self {
        Self {
            name: name.into(),
            visibility,
            kind,
            emoji: None,
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

/// Partial update of a list. Omitted fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPatch {
    pub name: Option<String>,
    pub visibility: Option<Visibility>,
    pub kind: Option<ListKind>,
    pub emoji: Option<String>,
}

impl ListPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.visibility.is_none() && self.kind.is_none() && self.emoji.is_none()
    }

    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(name) = self.name {
            patch = patch.set("name", name);
        }
        if let Some(visibility) = self.visibility {
            patch = patch.set("visibility", visibility.as_str());
        }
        if let Some(kind) = self.kind {
            patch = patch.set("kind", kind.as_str());
        }
        if let Some(emoji) = self.emoji {
            patch = patch.set("emoji", emoji);
        }
        patch
    }
}
