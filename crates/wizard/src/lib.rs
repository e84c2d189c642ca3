//! Migration wizard for expired shopping-list items.
//!
//! When flyer offers on a shopping list expire, the wizard proposes
//! replacement offers for each expired item and lets the user decide per
//! item before applying everything in one transaction:
//! 1. Start: find alternatives (two-pass search), rank them and pick at most
//!    two stores that cover the most items
//! 2. Decide: REPLACE with a suggestion, SKIP, or REMOVE each item
//! 3. Confirm: revalidate chosen offers, then snapshot and relink the items
//!
//! Sessions are kept in a TTL cache and expire 30 minutes after they
//! start. While a session is live its list is locked to it, and its
//! migration commits at most once. A confirm retried with the same
//! idempotency key returns the original outcome.

pub mod commit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod finder;
pub mod services;
pub mod telemetry;

pub use config::{LogFormat, WizardConfig};
pub use coordinator::WizardCoordinator;
pub use error::{ErrorKind, Result, WizardError};
pub use finder::AlternativeFinder;
pub use services::{
    InMemorySearchService, MatchType, SearchHit, SearchProduct, SearchRequest, SearchResponse,
    SearchService,
};
pub use telemetry::init_tracing;
