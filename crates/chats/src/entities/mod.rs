//! Domain entities stored in the document store.

pub mod list;
pub mod list_item;
pub mod message;

pub use list::{List, ListKind, ListPatch, NewList, Visibility};
pub use list_item::{ListItem, ListItemWithMessage};
pub use message::{Message, MessageBody, MessageWithReply, NewMessage};
