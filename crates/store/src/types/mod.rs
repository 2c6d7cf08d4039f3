//! Shared types for the store layer

pub mod errors;

pub use errors::{StorageError, StoreError};

pub type StoreResult<T> = Result<T, StoreError>;
pub type StorageResult<T> = Result<T, StorageError>;

pub type DocumentId = String;
