mod common;

use std::sync::Arc;

use tokio_test::assert_ok;

use common::*;
use duo_chats::{ListKind, MessageWithReply, NewList, NewMessage, Visibility};
use duo_store::{DocumentStore, MemoryStore, StoreError};

fn ids(messages: &[MessageWithReply]) -> Vec<String> {
    messages.iter().map(|m| m.message.id.clone()).collect()
}

fn outage() -> StoreError {
    StoreError::ConnectionError("connection reset".to_string())
}

#[tokio::test]
async fn delivery_during_first_page_keeps_the_message_it_evicts() {
    let store = InstrumentedStore::new();
    let seeded = seed_messages(store.as_ref(), "bob", 7).await;
    let alice = sign_in("alice");
    let feed = open_feed(&alice, store.clone(), 3).await;
    assert_eq!(ids(&feed.messages()), seeded[4..].to_vec());

    let release = store.hold_next_query();
    let (loaded, racer) = tokio::join!(feed.load_more(), async {
        store.query_parked().await;
        let racer = store
            .insert("messages", NewMessage::text(identity("bob"), "racer").into_document())
            .await
            .expect("racer insert");
        wait_for_feed(&feed, |s| s.messages.iter().any(|m| m.message.id == racer.id)).await;
        let _ = release.send(());
        racer.id
    });
    assert_ok!(loaded);

    let mut expected = seeded[1..].to_vec();
    expected.push(racer.clone());
    let messages = feed.messages();
    assert_eq!(ids(&messages), expected);
    assert!(messages
        .iter()
        .any(|m| m.message.content.as_deref() == Some("message 4")));
    assert!(feed.has_more());

    feed.load_more().await.unwrap();
    let mut everything = seeded;
    everything.push(racer);
    assert_eq!(ids(&feed.messages()), everything);
    assert!(!feed.has_more());
}

#[tokio::test]
async fn failed_page_sets_error_and_keeps_messages() {
    let store = InstrumentedStore::new();
    let seeded = seed_messages(store.as_ref(), "bob", 5).await;
    let alice = sign_in("alice");
    let feed = open_feed(&alice, store.clone(), 3).await;
    let before = feed.messages();

    store.fail_queries(true);
    assert_ok!(feed.load_more().await);

    assert!(feed.error().is_some());
    assert!(!feed.loading_more());
    assert!(feed.has_more());
    assert_eq!(feed.messages(), before);

    // The cursor survives the failure, so a retry picks up where it left off.
    store.fail_queries(false);
    assert_ok!(feed.load_more().await);
    assert_eq!(ids(&feed.messages()), seeded);
    assert!(!feed.loading_more());
}

#[tokio::test]
async fn load_more_in_flight_rejects_a_second_request() {
    let store = InstrumentedStore::new();
    seed_messages(store.as_ref(), "bob", 8).await;
    let alice = sign_in("alice");
    let feed = open_feed(&alice, store.clone(), 3).await;
    let queries = store.queries();

    let release = store.hold_next_query();
    let (first, second) = tokio::join!(feed.load_more(), async {
        store.query_parked().await;
        assert!(feed.loading_more());
        let second = feed.load_more().await;
        assert_eq!(store.queries(), queries + 1);
        let _ = release.send(());
        second
    });
    assert_ok!(first);
    assert_ok!(second);

    assert_eq!(store.queries(), queries + 1);
    assert_eq!(feed.messages().len(), 6);
    assert!(!feed.loading_more());
}

#[tokio::test]
async fn live_failure_sets_feed_error_until_the_next_delivery() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let seeded = seed_messages(store.as_ref(), "bob", 2).await;
    let alice = sign_in("alice");
    let feed = open_feed(&alice, Arc::clone(&store), 10).await;

    memory.interrupt("messages", outage);
    let failed = wait_for_feed(&feed, |s| s.error.is_some()).await;
    assert_eq!(ids(&failed.messages), seeded);
    assert!(!failed.loading);

    let fresh = feed.send_message("back online", None).await.unwrap().unwrap();
    let recovered = wait_for_feed(&feed, |s| s.messages.iter().any(|m| m.message.id == fresh.id)).await;
    assert_eq!(recovered.error, None);
    assert_eq!(recovered.messages.len(), 3);
}

#[tokio::test]
async fn ended_subscription_leaves_feed_state_in_place() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let seeded = seed_messages(store.as_ref(), "bob", 4).await;
    let alice = sign_in("alice");
    let feed = open_feed(&alice, Arc::clone(&store), 3).await;

    memory.disconnect();
    let ended = wait_for_feed(&feed, |s| s.error.is_some()).await;
    assert_eq!(ended.error.as_deref(), Some("live subscription ended"));
    assert_eq!(ids(&ended.messages), seeded[1..].to_vec());
    assert!(ended.has_more);
}

#[tokio::test]
async fn live_failure_sets_collections_error_and_keeps_lists() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let bob = sign_in("bob");
    let collections = open_collections(&bob, Arc::clone(&store)).await;
    collections
        .create_list(NewList::new("Groceries", Visibility::Public, ListKind::Checklist))
        .await
        .unwrap();
    wait_for_collections(&collections, |s| s.lists.len() == 1).await;

    memory.interrupt("lists", outage);
    let failed = wait_for_collections(&collections, |s| s.error.is_some()).await;
    assert_eq!(failed.lists.len(), 1);
    assert_eq!(failed.lists[0].name, "Groceries");

    collections
        .create_list(NewList::new("Films", Visibility::Private, ListKind::Collection))
        .await
        .unwrap();
    let recovered = wait_for_collections(&collections, |s| s.lists.len() == 2).await;
    assert_eq!(recovered.error, None);

    memory.disconnect();
    let ended = wait_for_collections(&collections, |s| s.error.is_some()).await;
    assert_eq!(ended.error.as_deref(), Some("Subscription closed"));
    assert_eq!(ended.lists.len(), 2);
}
