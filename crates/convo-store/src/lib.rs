//! # convo-store
//!
//! Persistent storage for Convo, backed by SQLite.
//!
//! [`Database`] is the synchronous handle wrapping a `rusqlite::Connection`
//! with typed helpers per table. [`Store`] is the cloneable async handle the
//! server uses: it serialises access to one `Database` and runs each call on
//! the blocking pool.
//!
//! Besides conversations and messages, the store also answers the directory
//! questions the delivery pipeline asks (block lists and display profiles).

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod store;
pub mod users;

mod error;
mod row;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use store::Store;
