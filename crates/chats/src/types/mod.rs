//! Shared types for the engines.
//!
//! Error definitions, identifier aliases and the snapshots the engines
//! publish to their consumers.

pub mod errors;
pub mod snapshots;

pub use errors::{ChatError, ChatResult};
pub use snapshots::{CollectionsSnapshot, FeedSnapshot, Selection};

// Common type aliases
pub type MessageId = String;
pub type ListId = String;
pub type ListItemId = String;
