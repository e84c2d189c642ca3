//! Product search trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FlyerProductId, Money, ProductMasterId, StoreId};
use serde::{Deserialize, Serialize};

use crate::error::WizardError;

/// A search query over current flyer offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Restrict results to these stores; `None` searches every store.
    pub store_ids: Option<Vec<StoreId>>,
    pub limit: usize,
    pub offset: usize,
    pub prefer_fuzzy: bool,
}

impl SearchRequest {
    /// Creates a fuzzy query across all stores.
    pub fn fuzzy(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            store_ids: None,
            limit,
            offset: 0,
            prefer_fuzzy: true,
        }
    }
}

/// An offer as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProduct {
    pub flyer_product_id: FlyerProductId,
    pub product_master_id: Option<ProductMasterId>,
    pub name: String,
    pub brand: Option<String>,
    pub store_id: StoreId,
    pub store_name: String,
    pub price: Money,
    pub unit: Option<String>,
    pub size_value: Option<f64>,
    pub size_unit: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl SearchProduct {
    pub fn new(
        flyer_product_id: FlyerProductId,
        name: impl Into<String>,
        store_id: StoreId,
        store_name: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            flyer_product_id,
            product_master_id: None,
            name: name.into(),
            brand: None,
            store_id,
            store_name: store_name.into(),
            price,
            unit: None,
            size_value: None,
            size_unit: None,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn valid_until(mut self, valid_to: DateTime<Utc>) -> Self {
        self.valid_to = Some(valid_to);
        self
    }
}

/// How a hit matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub product: SearchProduct,
    pub score: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub query_time_ms: u64,
}

/// Trait for product search.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Runs a search. Results are ordered best match first.
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, WizardError>;
}

#[derive(Debug, Default)]
struct InMemorySearchState {
    catalog: Vec<SearchProduct>,
    queries: Vec<SearchRequest>,
    failing_queries: HashSet<String>,
    fail_all: bool,
}

/// In-memory search over a fixed catalog for testing.
///
/// A product matches when every query term occurs in its brand and name
/// (exact), or, for fuzzy requests, when at least one term does.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchService {
    state: Arc<RwLock<InMemorySearchState>>,
}

fn terms(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

impl InMemorySearchService {
    /// Creates a new in-memory search service with an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemorySearchState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemorySearchState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds an offer to the catalog.
    pub fn add_product(&self, product: SearchProduct) {
        self.write().catalog.push(product);
    }

    /// Configures the service to fail every query equal to `query`.
    pub fn fail_on_query(&self, query: impl Into<String>) {
        self.write().failing_queries.insert(query.into());
    }

    /// Configures the service to fail every query.
    pub fn set_fail_all(&self, fail: bool) {
        self.write().fail_all = fail;
    }

    /// Returns every request received so far.
    pub fn queries(&self) -> Vec<SearchRequest> {
        self.read().queries.clone()
    }

    fn match_product(
        product: &SearchProduct,
        query_terms: &[String],
        fuzzy: bool,
    ) -> Option<(f64, MatchType)> {
        let haystack = terms(&format!(
            "{} {}",
            product.brand.as_deref().unwrap_or_default(),
            product.name
        ));
        let matched = query_terms
            .iter()
            .filter(|t| haystack.iter().any(|h| h.contains(t.as_str())))
            .count();

        if matched == query_terms.len() {
            Some((1.0, MatchType::Exact))
        } else if fuzzy && matched > 0 {
            Some((matched as f64 / query_terms.len() as f64, MatchType::Fuzzy))
        } else {
            None
        }
    }
}

#[async_trait]
impl SearchService for InMemorySearchService {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, WizardError> {
        let start = std::time::Instant::now();
        let mut state = self.write();
        state.queries.push(request.clone());

        if state.fail_all || state.failing_queries.contains(&request.query) {
            return Err(WizardError::Search(format!(
                "search for '{}' failed",
                request.query
            )));
        }

        let query_terms = terms(&request.query);
        if query_terms.is_empty() {
            return Ok(SearchResponse {
                results: vec![],
                query_time_ms: 0,
            });
        }

        let mut results: Vec<SearchHit> = state
            .catalog
            .iter()
            .filter(|p| {
                request
                    .store_ids
                    .as_ref()
                    .is_none_or(|stores| stores.contains(&p.store_id))
            })
            .filter_map(|p| {
                Self::match_product(p, &query_terms, request.prefer_fuzzy).map(
                    |(score, match_type)| SearchHit {
                        product: p.clone(),
                        score,
                        match_type,
                    },
                )
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.product.flyer_product_id.cmp(&b.product.flyer_product_id))
        });
        let results = results
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        Ok(SearchResponse {
            results,
            query_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
