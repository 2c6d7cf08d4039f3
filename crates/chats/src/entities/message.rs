use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use duo_auth::Identity;
use duo_store::NewDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::MessageId;

/// A message as stored in the `messages` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    /// Text body. `None` for drawings.
    #[serde(default)]
    pub content: Option<String>,
    /// Reference to the uploaded drawing. `None` for text.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Store-assigned creation time.
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub timestamp: DateTime<Utc>,
    /// Message this one replies to. May point at a message that no longer exists.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    /// Identities that liked the message.
    #[serde(default)]
    pub likes: BTreeSet<String>,
}

impl Message {
    pub fn is_drawing(&self) -> bool {
        self.image_url.is_some()
    }

    pub fn is_liked_by(&self, identity: &Identity) -> bool {
        self.likes.contains(identity.as_str())
    }

    /// Flip the like of `identity` locally.
    pub(crate) fn set_liked(&mut self, identity: &Identity, liked: bool) {
        if liked {
            self.likes.insert(identity.to_string());
        } else {
            self.likes.remove(identity.as_str());
        }
    }
}

/// Body of a new message. Exactly one of text or drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Drawing { image_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: Identity,
    pub body: MessageBody,
    pub reply_to: Option<MessageId>,
}

impl NewMessage {
    pub fn text(sender_id: Identity, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            body: MessageBody::Text(content.into()),
            reply_to: None,
        }
    }

    pub fn drawing(sender_id: Identity, image_url: impl Into<String>) -> Self {
        Self {
            sender_id,
            body: MessageBody::Drawing {
                image_url: image_url.into(),
            },
            reply_to: None,
        }
    }

    pub fn replying_to(mut self, reply_to: Option<MessageId>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn into_document(self) -> NewDocument {
        let (content, image_url) = match self.body {
            MessageBody::Text(content) => (Value::String(content), Value::Null),
            MessageBody::Drawing { image_url } => (Value::Null, Value::String(image_url)),
        };

        let mut fields = Map::new();
        fields.insert("senderId".to_string(), Value::from(self.sender_id.as_str()));
        fields.insert("content".to_string(), content);
        fields.insert("imageUrl".to_string(), image_url);
        fields.insert("replyTo".to_string(), Value::from(self.reply_to));
        fields.insert("likes".to_string(), Value::Array(Vec::new()));

        NewDocument::new(fields).with_server_timestamp("timestamp")
    }
}

/// A message with its reply target resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithReply {
    #[serde(flatten)]
    pub message: Message,
    pub reply_to_message: Option<Message>,
}

impl MessageWithReply {
    pub fn id(&self) -> &str {
        &self.message.id
    }
}
