//! Structured prompt and reply handling for model-backed judges.

use cartwright_core_types::{CandidateProduct, Item};
use serde_json::json;

const TITLE_CHARS: usize = 80;

/// Renders the candidate list and the selection rules as a single prompt
/// asking for one integer index, or -1.
pub fn build_prompt(candidates: &[CandidateProduct], item: &Item, site: &str) -> String {
    let mut constraints = Vec::new();
    if let Some(brand) = item.brand.as_deref() {
        constraints.push(format!("Brand must match: \"{brand}\""));
    }
    if let Some(ceiling) = item.max_price {
        constraints.push(format!("Price must be <= ${ceiling:.2}"));
    }
    if constraints.is_empty() {
        constraints.push("Pick the most affordable OR best-seller product".to_string());
    }

    let display: Vec<_> = candidates
        .iter()
        .enumerate()
        .map(|(index, product)| {
            json!({
                "index": index,
                "title": product.title.chars().take(TITLE_CHARS).collect::<String>(),
                "brand": product.brand,
                "price": product.price,
                "badges": product.badges,
                "sponsored": product.sponsored,
            })
        })
        .collect();
    let listing = serde_json::to_string_pretty(&display).unwrap_or_else(|_| "[]".into());

    format!(
        "{site} search results for: \"{name}\"\n\
         Requirements: {requirements}\n\n\
         Products:\n{listing}\n\n\
         Rules:\n\
         1. If brand is required, only consider products whose title or brand field contains that brand name\n\
         2. Exclude any product priced above the max price\n\
         3. Among qualifying products prefer: best seller badge > popular badge > lowest price\n\
         4. Avoid sponsored products unless they are the only option\n\
         5. Reply with ONLY the integer index of the best product, or -1 if no product qualifies\n\
         \nAnswer:",
        name = item.name,
        requirements = constraints.join("; "),
    )
}

/// Reads the first token of a reply. `None` when the reply is not an
/// integer at all; `Some(None)` for an explicit -1 or an out-of-range index.
pub fn parse_reply(reply: &str, len: usize) -> Option<Option<usize>> {
    let token = reply.split_whitespace().next()?;
    let token = token.trim_matches(|c: char| !(c.is_ascii_digit() || c == '-'));
    let value: i64 = token.parse().ok()?;
    if value < 0 || value as usize >= len {
        return Some(None);
    }
    Some(Some(value as usize))
}
