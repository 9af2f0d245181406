//! Persistence layer: the `MessageStore` transactional repository and the
//! `IdempotencyIndex` at-most-once guard (§4.2, §4.8), both backed by
//! `rusqlite` by default, following the synchronous-connection-behind-an-
//! async-mutex pattern the teacher's own storage backends use.

pub mod idempotency_index;
pub mod message_store;

pub use idempotency_index::{IdempotencyIndex, InMemoryIdempotencyIndex, SqliteIdempotencyIndex};
pub use message_store::{epoch_seconds, MessageStore, SqliteMessageStore};
