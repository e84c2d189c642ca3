//! Domain layer for the shopping-list migration wizard.
//!
//! This crate holds the pure parts of the wizard:
//! - the session aggregate with its expired items, suggestions and decisions
//! - the deterministic scoring engine and ranking order
//! - the greedy store coverage optimizer
//!
//! Nothing here performs I/O; persistence and search live in sibling crates.

pub mod decision;
pub mod error;
pub mod item;
pub mod optimizer;
pub mod scoring;
pub mod session;

pub use decision::{Decision, DecisionAction, ItemDecision};
pub use error::DomainError;
pub use item::{ScoreBreakdown, Suggestion, WizardItem};
pub use optimizer::{MAX_STORES, StoreAssignment, StoreCoverage, optimize_stores};
pub use scoring::{OriginalProduct, ScoringWeights, UserStorePreferences, rank, score, score_breakdown};
pub use session::{
    ConfirmOutcome, SESSION_TTL_SECS, SessionStatus, StoreSelection, WizardSession, session_ttl,
};
