//! Sync engines.
//!
//! Each engine owns one live subscription scoped to its session, processes
//! deliveries in arrival order on a spawned task and publishes a snapshot
//! after every state change.

pub mod collections;
pub mod feed;

pub use collections::Collections;
pub use feed::MessageFeed;
