//! Batched reference resolution.
//!
//! Distinct ids are looked up with parallel point reads and collected into an
//! id table. A failed lookup only leaves its own reference unresolved.

use std::collections::{BTreeSet, HashMap};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::entities::{Message, MessageWithReply};
use crate::repositories::MessageRepository;
use crate::types::MessageId;

pub async fn resolve_messages<'a, I>(repository: &MessageRepository, ids: I) -> HashMap<MessageId, Message>
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<&str> = ids.into_iter().collect();
    if distinct.is_empty() {
        return HashMap::new();
    }

    let lookups = distinct.iter().map(|id| async move { (*id, repository.find_by_id(id).await) });
    let results = join_all(lookups).await;

    let mut table = HashMap::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(Some(message)) => {
                table.insert(message.id.clone(), message);
            }
            Ok(None) => debug!(message_id = id, "referenced message no longer exists"),
            Err(error) => warn!(message_id = id, %error, "failed to resolve referenced message"),
        }
    }
    table
}

/// Attach reply targets to `messages`, keeping their order.
pub async fn with_replies(repository: &MessageRepository, messages: Vec<Message>) -> Vec<MessageWithReply> {
    let table = resolve_messages(
        repository,
        messages.iter().filter_map(|message| message.reply_to.as_deref()),
    )
    .await;

    messages
        .into_iter()
        .map(|message| {
            let reply_to_message = message
                .reply_to
                .as_ref()
                .and_then(|id| table.get(id))
                .cloned();
            MessageWithReply {
                message,
                reply_to_message,
            }
        })
        .collect()
}
