//! Turns shopping-list text into [`Item`]s.
//!
//! Each line yields, in order: a price ceiling (`max $8`, `under $10`,
//! `up to $5`, `at most $3`), an explicit `brand:X`, then a quantity from a
//! trailing `x<N>`, a leading `<N>x`, or a bare trailing integer that does
//! not follow a unit word (`eggs dozen 12` stays one item of "eggs dozen 12").

use async_trait::async_trait;
use cartwright_core_types::{clamp_quantity, Item};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// Lines starting with this are comments.
pub const COMMENT_MARKER: char = '/';

/// Words that describe a package size rather than how many to buy.
pub static UNIT_WORDS: &[&str] = &[
    "pack", "pk", "ct", "count", "piece", "pcs", "set", "kg", "g", "mg", "lb", "lbs", "oz", "l",
    "ml", "litre", "liter", "liters", "litres", "dozen", "box", "bag", "can", "bottle", "roll",
    "rolls", "sheet", "sheets", "pod", "pods", "tab", "tabs",
];

static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(?\s*\b(?:max(?:imum)?|under|up\s+to|at\s+most)\s*:?\s*\$?([\d.]+)\s*\)?")
        .expect("valid price pattern")
});
static BRAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(?\s*\bbrand\s*:\s*([^\s),]+)\s*\)?")
        .expect("valid brand pattern")
});
static QTY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+[xX×](\d+)$").expect("valid suffix pattern")
});
static QTY_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*[xX×]\s+(.+)$").expect("valid prefix pattern")
});
static QTY_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(-?\d+)$").expect("valid bare pattern"));
static SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\n,]+").expect("valid split pattern"));
static SPACES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid space pattern"));

fn collapse(text: &str) -> String {
    SPACES_RE.replace_all(text, " ").trim().to_string()
}

fn cut(text: &str, start: usize, end: usize) -> String {
    collapse(&format!("{} {}", &text[..start], &text[end..]))
}

fn parse_count(digits: &str) -> u32 {
    // Out-of-range literals fall back to the default of one.
    digits.parse::<i64>().map(clamp_quantity).unwrap_or(1)
}

fn is_unit_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    UNIT_WORDS.contains(&lower.as_str()) || UNIT_WORDS.contains(&singular)
}

/// Parses one line. The returned name may be empty when the line held only
/// constraints.
pub fn parse_item(raw: &str) -> Item {
    let mut text = collapse(raw);
    let mut max_price = None;
    let mut brand = None;

    if let Some(caps) = PRICE_RE.captures(&text) {
        if let (Some(whole), Ok(price)) = (caps.get(0), caps[1].parse::<f64>()) {
            max_price = Some(price);
            text = cut(&text, whole.start(), whole.end());
        }
    }

    if let Some(caps) = BRAND_RE.captures(&text) {
        if let Some(whole) = caps.get(0) {
            let value = caps[1].trim().to_string();
            if !value.is_empty() {
                brand = Some(value);
            }
            text = cut(&text, whole.start(), whole.end());
        }
    }

    let mut quantity = 1;
    if let Some(caps) = QTY_SUFFIX_RE.captures(&text) {
        quantity = parse_count(&caps[1]);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
        text = text[..start].trim().to_string();
    } else if let Some(caps) = QTY_PREFIX_RE.captures(&text) {
        quantity = parse_count(&caps[1]);
        text = caps[2].trim().to_string();
    } else if let Some(caps) = QTY_BARE_RE.captures(&text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
        let preceding = text[..start].trim();
        let unit_before = preceding
            .split_whitespace()
            .last()
            .map(is_unit_word)
            .unwrap_or(false);
        if !unit_before {
            quantity = parse_count(&caps[1]);
            text = preceding.to_string();
        }
    }

    let name = collapse(&text)
        .trim_matches(|c: char| matches!(c, ' ' | ',' | '(' | ')' | '[' | ']'))
        .to_string();

    Item {
        name,
        quantity: quantity.max(1),
        brand,
        max_price,
    }
}

/// Splits on newlines and commas, drops blanks and comment lines.
pub fn split_lines(text: &str) -> Vec<String> {
    SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect()
}

/// Parses a batch, keeping only items with a non-empty name.
pub fn parse_items(text: &str) -> Vec<Item> {
    split_lines(text)
        .iter()
        .map(|line| parse_item(line))
        .filter(|item| !item.name.is_empty())
        .collect()
}

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
    #[error("interpreter returned malformed output: {0}")]
    Malformed(String),
    #[error("interpreter request failed: {0}")]
    Upstream(String),
}

/// Model-backed parser that understands phrasing like "a dozen eggs".
#[async_trait]
pub trait ItemInterpreter: Send + Sync {
    async fn interpret(&self, lines: &[String]) -> Result<Vec<Item>, InterpretError>;
}

/// Uses `interpreter` when given and falls back to [`parse_items`] when it
/// fails or comes back empty for non-empty input.
pub async fn parse_with_fallback(
    interpreter: Option<&dyn ItemInterpreter>,
    text: &str,
) -> Vec<Item> {
    let lines = split_lines(text);
    if lines.is_empty() {
        return Vec::new();
    }
    if let Some(interpreter) = interpreter {
        match interpreter.interpret(&lines).await {
            Ok(items) => {
                let items = normalize(items);
                if !items.is_empty() {
                    debug!(count = items.len(), "items interpreted");
                    return items;
                }
                warn!("interpreter returned no items, using rule parser");
            }
            Err(err) => warn!(error = %err, "interpreter failed, using rule parser"),
        }
    }
    lines
        .iter()
        .map(|line| parse_item(line))
        .filter(|item| !item.name.is_empty())
        .collect()
}

fn normalize(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .filter_map(|mut item| {
            item.name = collapse(&item.name);
            if item.name.is_empty() {
                return None;
            }
            item.quantity = item.quantity.max(1);
            item.brand = item.brand.filter(|b| !b.trim().is_empty());
            Some(item)
        })
        .collect()
}
