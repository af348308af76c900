//! Chooses one product from a results page for a shopping-list item.

pub mod prompt;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use cartwright_core_types::{CandidateProduct, Item};
use thiserror::Error;
use tracing::{debug, warn};

pub use prompt::{build_prompt, parse_reply};

pub const BEST_SELLER_BADGE: &str = "best seller";
pub const POPULAR_BADGE: &str = "popular";

/// Results beyond this many are never considered.
pub const MAX_CANDIDATES: usize = 12;

pub fn matches_brand(candidate: &CandidateProduct, brand: &str) -> bool {
    let needle = brand.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    candidate.title.to_lowercase().contains(&needle)
        || candidate.brand.to_lowercase().contains(&needle)
}

/// Unknown prices pass the ceiling; ranking puts them last.
pub fn within_budget(candidate: &CandidateProduct, max_price: Option<f64>) -> bool {
    match (candidate.price, max_price) {
        (Some(price), Some(ceiling)) => price <= ceiling,
        _ => true,
    }
}

/// Hard constraints only: brand and price ceiling.
pub fn qualifies(candidate: &CandidateProduct, item: &Item) -> bool {
    item.brand
        .as_deref()
        .map(|brand| matches_brand(candidate, brand))
        .unwrap_or(true)
        && within_budget(candidate, item.max_price)
}

fn badge_rank(candidate: &CandidateProduct) -> u8 {
    if candidate.has_badge(BEST_SELLER_BADGE) {
        0
    } else if candidate.has_badge(POPULAR_BADGE) {
        1
    } else {
        2
    }
}

fn compare_price(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Rule-based pick. Survivors of the brand and price filters are narrowed
/// to unsponsored entries when any exist, then ranked best seller, popular,
/// lowest price, page order.
pub fn select(candidates: &[CandidateProduct], item: &Item) -> Option<usize> {
    let survivors: Vec<usize> = candidates
        .iter()
        .take(MAX_CANDIDATES)
        .enumerate()
        .filter(|(_, candidate)| qualifies(candidate, item))
        .map(|(idx, _)| idx)
        .collect();

    let organic: Vec<usize> = survivors
        .iter()
        .copied()
        .filter(|idx| !candidates[*idx].sponsored)
        .collect();
    let pool = if organic.is_empty() { survivors } else { organic };

    pool.into_iter().min_by(|a, b| {
        let (ca, cb) = (&candidates[*a], &candidates[*b]);
        badge_rank(ca)
            .cmp(&badge_rank(cb))
            .then_with(|| compare_price(ca.price, cb.price))
            .then_with(|| a.cmp(b))
    })
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),
    #[error("judge reply unusable: {0}")]
    BadReply(String),
    #[error("judge request failed: {0}")]
    Upstream(String),
}

/// Model-backed chooser. `Ok(None)` means it found nothing suitable.
#[async_trait]
pub trait ProductJudge: Send + Sync {
    async fn judge(
        &self,
        candidates: &[CandidateProduct],
        item: &Item,
    ) -> Result<Option<usize>, JudgeError>;
}

/// Combines an optional judge with the rule policy. The rules always have
/// the last word on hard constraints: a judge pick that breaks them, an
/// abstention, or an error all defer to [`select`].
#[derive(Clone, Default)]
pub struct ProductSelector {
    judge: Option<Arc<dyn ProductJudge>>,
}

impl ProductSelector {
    pub fn new(judge: Option<Arc<dyn ProductJudge>>) -> Self {
        Self { judge }
    }

    pub fn rules_only() -> Self {
        Self::default()
    }

    pub async fn choose(&self, candidates: &[CandidateProduct], item: &Item) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let considered = &candidates[..candidates.len().min(MAX_CANDIDATES)];

        if let Some(judge) = &self.judge {
            match judge.judge(considered, item).await {
                Ok(Some(idx)) if idx < considered.len() && qualifies(&considered[idx], item) => {
                    debug!(item = %item.name, idx, "judge pick accepted");
                    return Some(idx);
                }
                Ok(Some(idx)) => {
                    warn!(item = %item.name, idx, "judge pick violates constraints");
                }
                Ok(None) => debug!(item = %item.name, "judge found no match"),
                Err(err) => warn!(item = %item.name, error = %err, "judge failed"),
            }
        }
        select(considered, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, brand: &str, price: Option<f64>) -> CandidateProduct {
        CandidateProduct {
            title: title.into(),
            brand: brand.into(),
            price,
            url: format!("https://www.shop.test/en/ip/{}", title.replace(' ', "-")),
            ..CandidateProduct::default()
        }
    }

    fn badged(mut p: CandidateProduct, badge: &str) -> CandidateProduct {
        p.badges.push(badge.into());
        p
    }

    fn sponsored(mut p: CandidateProduct) -> CandidateProduct {
        p.sponsored = true;
        p
    }

    #[test]
    fn picks_the_qualifying_best_seller_among_decoys() {
        let candidates = vec![
            sponsored(badged(product("Indomie Mi Goreng", "Indomie", Some(4.0)), "Best seller")),
            badged(product("Nissin Cup Noodles", "Nissin", Some(2.0)), "Best seller"),
            badged(product("Indomie Chicken 5pk", "Indomie", Some(9.0)), "Best seller"),
            product("Indomie Soto", "Indomie", Some(3.0)),
            badged(product("Indomie Chicken 10pk", "Indomie", Some(6.5)), "Best Seller"),
        ];
        let item = Item::new("noodles", 1)
            .with_brand("indomie")
            .with_max_price(7.0);
        assert_eq!(select(&candidates, &item), Some(4));
    }

    #[test]
    fn missing_brand_is_no_match() {
        let candidates = vec![
            product("Store Milk 4L", "Great Value", Some(5.0)),
            product("Organic Milk", "Natrel", Some(7.0)),
        ];
        let item = Item::new("milk", 1).with_brand("Lactantia");
        assert_eq!(select(&candidates, &item), None);
    }

    #[test]
    fn sponsored_only_when_nothing_else_qualifies() {
        let candidates = vec![
            sponsored(product("Eggs 12", "Burnbrae", Some(3.0))),
            product("Eggs 30", "Gray Ridge", Some(9.0)),
        ];
        let item = Item::new("eggs", 1).with_max_price(5.0);
        assert_eq!(select(&candidates, &item), Some(0));

        let item = Item::new("eggs", 1);
        assert_eq!(select(&candidates, &item), Some(1));
    }

    #[test]
    fn unconstrained_prefers_popularity_then_price() {
        let candidates = vec![
            product("Bread A", "", Some(2.0)),
            badged(product("Bread B", "", Some(3.5)), "Popular pick"),
            product("Bread C", "", None),
        ];
        assert_eq!(select(&candidates, &Item::new("bread", 1)), Some(1));

        let plain = vec![
            product("Bread C", "", None),
            product("Bread A", "", Some(2.5)),
            product("Bread D", "", Some(2.0)),
        ];
        assert_eq!(select(&plain, &Item::new("bread", 1)), Some(2));
    }

    #[test]
    fn brand_matches_title_or_brand_field() {
        let p = product("Dempster's Whole Wheat", "", Some(3.0));
        assert!(matches_brand(&p, "dempster's"));
        let p = product("Whole Wheat Bread", "DEMPSTER'S", Some(3.0));
        assert!(matches_brand(&p, "Dempster's"));
    }

    #[test]
    fn empty_list_is_no_match() {
        assert_eq!(select(&[], &Item::new("milk", 1)), None);
    }

    struct FixedJudge(Result<Option<usize>, ()>);

    #[async_trait]
    impl ProductJudge for FixedJudge {
        async fn judge(
            &self,
            _candidates: &[CandidateProduct],
            _item: &Item,
        ) -> Result<Option<usize>, JudgeError> {
            self.0.map_err(|_| JudgeError::Upstream("offline".into()))
        }
    }

    fn milk_shelf() -> Vec<CandidateProduct> {
        vec![
            product("Natrel Milk 4L", "Natrel", Some(7.9)),
            badged(product("Great Value Milk 4L", "Great Value", Some(5.5)), "Best seller"),
            product("Lactantia Milk 4L", "Lactantia", Some(6.2)),
        ]
    }

    #[tokio::test]
    async fn judge_pick_within_constraints_is_kept() {
        let selector = ProductSelector::new(Some(Arc::new(FixedJudge(Ok(Some(2))))));
        let item = Item::new("milk", 1).with_max_price(7.0);
        assert_eq!(selector.choose(&milk_shelf(), &item).await, Some(2));
    }

    #[tokio::test]
    async fn judge_pick_over_budget_is_overruled() {
        let selector = ProductSelector::new(Some(Arc::new(FixedJudge(Ok(Some(0))))));
        let item = Item::new("milk", 1).with_max_price(7.0);
        assert_eq!(selector.choose(&milk_shelf(), &item).await, Some(1));
    }

    #[tokio::test]
    async fn judge_errors_and_out_of_range_fall_back() {
        let item = Item::new("milk", 1);
        let failing = ProductSelector::new(Some(Arc::new(FixedJudge(Err(())))));
        assert_eq!(failing.choose(&milk_shelf(), &item).await, Some(1));

        let wild = ProductSelector::new(Some(Arc::new(FixedJudge(Ok(Some(40))))));
        assert_eq!(wild.choose(&milk_shelf(), &item).await, Some(1));
    }

    #[tokio::test]
    async fn abstention_still_runs_rules() {
        let selector = ProductSelector::new(Some(Arc::new(FixedJudge(Ok(None)))));
        let item = Item::new("milk", 1).with_brand("Lactantia");
        assert_eq!(selector.choose(&milk_shelf(), &item).await, Some(2));
        let item = Item::new("milk", 1).with_brand("Beatrice");
        assert_eq!(selector.choose(&milk_shelf(), &item).await, None);
    }
}
