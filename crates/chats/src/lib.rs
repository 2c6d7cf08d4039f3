//! # Duo Chats Crate
//!
//! This crate provides the two sync engines of the Duo client: the message
//! feed (live window plus cursor pagination over the shared message stream)
//! and the collections engine (live visible lists plus on-demand list items).
//!
//! ## Architecture
//!
//! - **Entities**: Domain models (Message, List, ListItem)
//! - **Repositories**: Typed access to the document store collections
//! - **Services**: The engines
//! - **Types**: Errors and published snapshots
//! - **Utils**: Validation, drawing decoding and reference resolution
//!
//! ## Usage
//!
//! ```no_run
//! # async fn example(
//! #     session: duo_auth::Session,
//! #     store: std::sync::Arc<dyn duo_store::DocumentStore>,
//! #     objects: std::sync::Arc<dyn duo_store::ObjectStorage>,
//! # ) -> duo_chats::ChatResult<()> {
//! use duo_chats::MessageFeed;
//!
//! let feed = MessageFeed::activate(session, store, objects, &Default::default()).await?;
//! feed.send_message("hi", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod repositories;
pub mod services;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use entities::{
    List, ListItem, ListItemWithMessage, ListKind, ListPatch, Message, MessageBody, MessageWithReply,
    NewList, NewMessage, Visibility,
};
pub use services::{Collections, MessageFeed};
pub use types::{
    ChatError, ChatResult, CollectionsSnapshot, FeedSnapshot, ListId, ListItemId, MessageId, Selection,
};
