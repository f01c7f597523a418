//! SQLite backend for the property store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Conditional updates are a single
//! `UPDATE … WHERE version = ?` inside one transaction, so the
//! compare-and-swap is atomic at the storage layer.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
