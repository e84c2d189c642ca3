//! Two-pass alternative search for expired items.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::FlyerProductId;
use domain::{Suggestion, WizardItem};

use crate::services::search::{SearchProduct, SearchRequest, SearchService};

/// Finds replacement offers for expired items.
///
/// Pass 1 searches `brand + " " + name` when the item has a brand, pass 2
/// searches the name alone. Pass 1 results always come first in the
/// merged list and pass 2 only adds offers not already seen, so a broad
/// name query never pushes same-brand matches out.
pub struct AlternativeFinder<S: SearchService> {
    search: S,
    brand_pass_limit: usize,
    name_pass_limit: usize,
}

impl<S: SearchService> AlternativeFinder<S> {
    pub fn new(search: S, brand_pass_limit: usize, name_pass_limit: usize) -> Self {
        Self {
            search,
            brand_pass_limit,
            name_pass_limit,
        }
    }

    /// Returns the underlying search service.
    pub fn search_service(&self) -> &S {
        &self.search
    }

    /// Returns deduplicated, unranked candidates for `item`.
    ///
    /// Search failures never fail the caller: a failed pass is logged and
    /// skipped, and if both fail the item gets no candidates. Offers already
    /// past their validity at `now`, and the item's own offer, are dropped.
    #[tracing::instrument(skip(self, item), fields(item_id = %item.item_id))]
    pub async fn find(&self, item: &WizardItem, now: DateTime<Utc>) -> Vec<Suggestion> {
        let mut seen: HashSet<FlyerProductId> = HashSet::new();
        let mut merged: Vec<SearchProduct> = Vec::new();

        if let Some(brand) = item.brand.as_deref().filter(|b| !b.trim().is_empty()) {
            let query = format!("{} {}", brand, item.product_name);
            self.run_pass("brand", query, self.brand_pass_limit, &mut seen, &mut merged)
                .await;
        }

        self.run_pass(
            "name",
            item.product_name.clone(),
            self.name_pass_limit,
            &mut seen,
            &mut merged,
        )
        .await;

        let suggestions: Vec<Suggestion> = merged
            .into_iter()
            .filter(|p| Some(p.flyer_product_id) != item.original_offer)
            .filter(|p| p.valid_to.is_none_or(|valid_to| valid_to >= now))
            .map(into_suggestion)
            .collect();

        let same_brand = item.brand.as_deref().is_some_and(|brand| {
            suggestions
                .iter()
                .any(|s| s.brand.as_deref() == Some(brand))
        });
        metrics::histogram!(
            "wizard_alternatives_found",
            "same_brand" => if same_brand { "true" } else { "false" }
        )
        .record(suggestions.len() as f64);
        tracing::debug!(count = suggestions.len(), same_brand, "alternatives found");

        suggestions
    }

    async fn run_pass(
        &self,
        pass: &'static str,
        query: String,
        limit: usize,
        seen: &mut HashSet<FlyerProductId>,
        merged: &mut Vec<SearchProduct>,
    ) {
        match self.search.search(SearchRequest::fuzzy(query, limit)).await {
            Ok(response) => {
                for hit in response.results {
                    if seen.insert(hit.product.flyer_product_id) {
                        merged.push(hit.product);
                    }
                }
            }
            Err(e) => {
                metrics::counter!("wizard_search_failures_total", "pass" => pass).increment(1);
                tracing::warn!(pass, error = %e, "alternative search failed");
            }
        }
    }
}

fn into_suggestion(product: SearchProduct) -> Suggestion {
    Suggestion {
        product_master_id: product.product_master_id,
        brand: product.brand,
        unit: product.unit,
        size_value: product.size_value,
        size_unit: product.size_unit,
        valid_from: product.valid_from,
        valid_to: product.valid_to,
        ..Suggestion::new(
            product.flyer_product_id,
            product.name,
            product.store_id,
            product.store_name,
            product.price,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::InMemorySearchService;
    use chrono::Duration;
    use common::{ItemId, Money, StoreId};

    fn item(brand: Option<&str>, name: &str) -> WizardItem {
        WizardItem {
            item_id: ItemId::new(),
            product_name: name.to_string(),
            brand: brand.map(str::to_string),
            original_price: Money::from_cents(300),
            quantity: 1,
            unit: None,
            expiry_date: Utc::now() - Duration::days(1),
            original_store: Some(StoreId::new(1)),
            original_offer: Some(FlyerProductId::new(100)),
            suggestions: vec![],
        }
    }

    fn product(id: i64, brand: Option<&str>, name: &str, store: i64) -> SearchProduct {
        let p = SearchProduct::new(
            FlyerProductId::new(id),
            name,
            StoreId::new(store),
            format!("Store {store}"),
            Money::from_cents(250),
        );
        match brand {
            Some(b) => p.with_brand(b),
            None => p,
        }
    }

    fn finder(search: InMemorySearchService) -> AlternativeFinder<InMemorySearchService> {
        AlternativeFinder::new(search, 20, 30)
    }

    #[tokio::test]
    async fn test_brand_pass_results_come_first_and_deduplicate() {
        let search = InMemorySearchService::new();
        search.add_product(product(5, Some("Store Brand"), "Cola", 1));
        search.add_product(product(9, Some("Coca-Cola"), "Cola", 2));
        let finder = finder(search.clone());

        let found = finder.find(&item(Some("Coca-Cola"), "Cola"), Utc::now()).await;

        let ids: Vec<i64> = found.iter().map(|s| s.flyer_product_id.as_i64()).collect();
        // Offer 9 matches every term of the brand query and leads.
        assert_eq!(ids[0], 9);
        assert_eq!(ids.len(), 2);

        let queries = search.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "Coca-Cola Cola");
        assert_eq!(queries[0].limit, 20);
        assert_eq!(queries[1].query, "Cola");
        assert_eq!(queries[1].limit, 30);
        assert!(queries.iter().all(|q| q.prefer_fuzzy && q.store_ids.is_none()));
    }

    #[tokio::test]
    async fn test_no_brand_runs_only_name_pass() {
        let search = InMemorySearchService::new();
        search.add_product(product(1, None, "Bananas", 1));
        let finder = finder(search.clone());

        let found = finder.find(&item(None, "Bananas"), Utc::now()).await;

        assert_eq!(found.len(), 1);
        assert_eq!(search.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_brand_pass_falls_back_to_name_pass() {
        let search = InMemorySearchService::new();
        search.add_product(product(1, Some("Heinz"), "Ketchup", 1));
        search.fail_on_query("Heinz Ketchup");
        let finder = finder(search);

        let found = finder.find(&item(Some("Heinz"), "Ketchup"), Utc::now()).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_both_passes_failing_yields_no_candidates() {
        let search = InMemorySearchService::new();
        search.add_product(product(1, Some("Heinz"), "Ketchup", 1));
        search.set_fail_all(true);
        let finder = finder(search);

        assert!(finder.find(&item(Some("Heinz"), "Ketchup"), Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_drops_expired_offers_and_own_offer() {
        let now = Utc::now();
        let search = InMemorySearchService::new();
        search.add_product(product(100, None, "Milk", 1));
        search.add_product(product(2, None, "Milk", 1).valid_until(now - Duration::hours(1)));
        search.add_product(product(3, None, "Milk", 2).valid_until(now + Duration::days(3)));
        let finder = finder(search);

        let found = finder.find(&item(None, "Milk"), now).await;

        let ids: Vec<i64> = found.iter().map(|s| s.flyer_product_id.as_i64()).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(found[0].store_name, "Store 2");
    }
}
