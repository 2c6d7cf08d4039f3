//! Typed access to the document store collections.

pub mod list_item_repository;
pub mod list_repository;
pub mod message_repository;

pub use list_item_repository::ListItemRepository;
pub use list_repository::ListRepository;
pub use message_repository::MessageRepository;

use duo_store::Document;
use serde::de::DeserializeOwned;
use tracing::warn;

pub const MESSAGES: &str = "messages";
pub const LISTS: &str = "lists";
pub const LIST_ITEMS: &str = "listItems";

/// Decode a result set, skipping documents that do not have the expected shape.
pub(crate) fn decode_documents<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|document| match document.decode() {
            Ok(entity) => Some(entity),
            Err(error) => {
                warn!(document_id = %document.id, %error, "skipping malformed document");
                None
            }
        })
        .collect()
}
