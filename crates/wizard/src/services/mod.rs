//! External service traits consumed by the wizard.
//!
//! Each service has a trait and an in-memory implementation for testing.

pub mod search;

pub use search::{
    InMemorySearchService, MatchType, SearchHit, SearchProduct, SearchRequest, SearchResponse,
    SearchService,
};
