//! Search-result extraction: the embedded page payload first, product tiles
//! second.

use cartwright_core_types::CandidateProduct;
use cdp_adapter::{AdapterError, Cdp};
use serde_json::Value;
use tracing::debug;

use crate::site::SiteConfig;

pub const MAX_RESULTS: usize = 12;

const NEXT_DATA_SCRIPT: &str = r#"(() => {
  try {
    const el = document.getElementById('__NEXT_DATA__');
    if (!el) { return null; }
    const data = JSON.parse(el.textContent);
    const initial = data && data.props && data.props.pageProps && data.props.pageProps.initialData;
    if (!initial) { return null; }
    const stacks = (initial.searchResult && initial.searchResult.itemStacks) ||
      (initial.contentLayout && initial.contentLayout.modules);
    if (!stacks || !stacks.length) { return null; }
    const out = [];
    for (const stack of stacks) {
      const items = stack.items || stack.products || (stack.configs && stack.configs.products) || [];
      for (const raw of items) {
        const p = raw.item || raw;
        if (!p || !p.name) { continue; }
        const current = p.priceInfo && p.priceInfo.currentPrice && p.priceInfo.currentPrice.price;
        const price = current ?? p.salePrice ?? p.price ?? null;
        const flags = (p.badges && p.badges.flags) || [];
        out.push({
          title: p.name,
          brand: p.brand || '',
          price: typeof price === 'number' ? price : null,
          badges: flags.map((f) => f && f.text).filter(Boolean),
          url: p.canonicalUrl || '',
          sponsored: !!(p.sponsoredProduct || p.isAd),
        });
        if (out.length >= __LIMIT__) { return out; }
      }
    }
    return out.length ? out : null;
  } catch (e) { return null; }
})()"#;

const DOM_SCRIPT: &str = r#"(() => {
  const cards = Array.from(document.querySelectorAll(
    '[data-item-id], [data-testid="list-view"], [class*="product-tile"]'
  )).slice(0, __LIMIT__);
  return cards.map((card) => {
    const titleEl = card.querySelector('[data-automation-id="product-title"]') ||
      card.querySelector('[class*="product-title"]');
    const priceEl = card.querySelector('[itemprop="price"]') ||
      card.querySelector('[data-automation-id*="price"]') ||
      card.querySelector('[class*="price-main"]');
    const badgeEl = card.querySelector('[data-automation-id*="badge"]') ||
      card.querySelector('[class*="badge"]') ||
      card.querySelector('[class*="flag"]');
    const link = card.querySelector('a[href*="/en/ip/"], a[href*="/ip/"]');
    const rawPrice = (priceEl && (priceEl.getAttribute('content') || priceEl.innerText)) || '';
    const numeric = parseFloat(rawPrice.replace(/[^0-9.]/g, ''));
    return {
      title: ((titleEl && titleEl.innerText) || '').trim(),
      brand: '',
      price: Number.isFinite(numeric) ? numeric : null,
      badges: badgeEl ? [badgeEl.innerText.trim()] : [],
      url: (link && link.getAttribute('href')) || '',
      sponsored: false,
    };
  }).filter((p) => p.title && p.url);
})()"#;

/// Scrapes the current results page.
pub async fn scrape_results(
    cdp: &dyn Cdp,
    site: &SiteConfig,
) -> Result<Vec<CandidateProduct>, AdapterError> {
    let limit = MAX_RESULTS.to_string();
    let structured = cdp
        .evaluate(&NEXT_DATA_SCRIPT.replace("__LIMIT__", &limit))
        .await
        .map(|value| parse_candidates(&value, site))
        .unwrap_or_else(|err| {
            debug!(target: "session", error = %err, "page payload unreadable");
            Vec::new()
        });
    if !structured.is_empty() {
        debug!(target: "session", count = structured.len(), "results from page payload");
        return Ok(structured);
    }

    let tiles = cdp
        .evaluate(&DOM_SCRIPT.replace("__LIMIT__", &limit))
        .await?;
    let products = parse_candidates(&tiles, site);
    debug!(target: "session", count = products.len(), "results from product tiles");
    Ok(products)
}

/// Converts the script output into candidates, resolving relative links
/// and dropping entries without a title.
pub fn parse_candidates(value: &Value, site: &SiteConfig) -> Vec<CandidateProduct> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let title = entry.get("title")?.as_str()?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            let url = entry
                .get("url")
                .and_then(Value::as_str)
                .and_then(|href| site.absolutize(href))
                .unwrap_or_default();
            Some(CandidateProduct {
                title,
                brand: entry
                    .get("brand")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                price: entry.get("price").and_then(Value::as_f64),
                badges: entry
                    .get("badges")
                    .and_then(Value::as_array)
                    .map(|badges| {
                        badges
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                url,
                sponsored: entry
                    .get("sponsored")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        })
        .take(MAX_RESULTS)
        .collect()
}
