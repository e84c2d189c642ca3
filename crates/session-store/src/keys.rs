//! Cache key space and lifetimes.
//!
//! | key | value | ttl |
//! |-----|-------|-----|
//! | `wizard:session:{id}` | serialized session | 30 min |
//! | `wizard:idempotency:{key}` | session id | 24 h |
//! | `wizard:result:{id}` | serialized confirm outcome | 24 h |

use chrono::Duration;
use common::SessionId;

pub use domain::{SESSION_TTL_SECS, session_ttl};

/// Lifetime of idempotency mappings and cached confirm results.
pub const IDEMPOTENCY_TTL_SECS: i64 = 24 * 60 * 60;

pub fn idempotency_ttl() -> Duration {
    Duration::seconds(IDEMPOTENCY_TTL_SECS)
}

pub fn session_key(id: SessionId) -> String {
    format!("wizard:session:{id}")
}

pub fn idempotency_key(key: &str) -> String {
    format!("wizard:idempotency:{key}")
}

pub fn result_key(id: SessionId) -> String {
    format!("wizard:result:{id}")
}
