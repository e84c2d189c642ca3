//! Session storage for the migration wizard.
//!
//! Sessions are short-lived and live in a key/value cache with per-entry
//! time-to-live rather than in the relational store. Two backends are
//! provided: an in-memory map for tests and single-node use, and a
//! PostgreSQL table with an `expires_at` column.

pub mod cache;
pub mod error;
pub mod keys;
pub mod memory;
pub mod postgres;
pub mod store;

pub use cache::CacheBackend;
pub use error::{Result, SessionStoreError};
pub use keys::{IDEMPOTENCY_TTL_SECS, idempotency_ttl};
pub use memory::InMemoryCache;
pub use postgres::PostgresCache;
pub use store::SessionStore;
