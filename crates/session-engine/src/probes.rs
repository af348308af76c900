//! Data-driven element lookup. Each capability (add to cart, location
//! button, ...) is an ordered list of probes tried until one resolves to a
//! visible element. The table can be replaced from a YAML file when the
//! storefront markup shifts.

use std::path::Path;
use std::time::Duration;

use cdp_adapter::{AdapterError, Anchor, Cdp};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::SessionError;

const PROBE_POLL: Duration = Duration::from_millis(150);

fn default_timeout_ms() -> u64 {
    1500
}

/// One candidate way to find an element.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Probe {
    pub selector: String,
    /// Case-insensitive substring the element's text must contain.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Probe {
    pub fn css(selector: &str, timeout_ms: u64) -> Self {
        Self {
            selector: selector.to_string(),
            text: None,
            timeout_ms,
        }
    }

    pub fn with_text(selector: &str, text: &str, timeout_ms: u64) -> Self {
        Self {
            selector: selector.to_string(),
            text: Some(text.to_string()),
            timeout_ms,
        }
    }

    fn accepts(&self, anchor: &Anchor) -> bool {
        if !anchor.visible {
            return false;
        }
        match self.text.as_deref() {
            Some(needle) => anchor
                .text
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Probe lists per capability.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorTable {
    pub add_to_cart: Vec<Probe>,
    pub overlays: Vec<Probe>,
    pub location_button: Vec<Probe>,
    pub postal_input: Vec<Probe>,
    pub quantity_input: Vec<Probe>,
    pub product_link: Vec<Probe>,
    pub logged_in: Vec<Probe>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            add_to_cart: vec![
                Probe::css(r#"[data-automation-id="add-to-cart-btn"]"#, 1500),
                Probe::css(r#"button[aria-label*="Add to cart"]"#, 500),
                Probe::css(r#"button[aria-label*="add to cart"]"#, 500),
                Probe::with_text("button", "add to cart", 500),
            ],
            overlays: vec![
                Probe::css(r#"button[aria-label="Close"]"#, 0),
                Probe::css(r#"button[aria-label="close"]"#, 0),
                Probe::css(r#"[data-automation-id="close-modal"]"#, 0),
                Probe::with_text("button", "continue shopping", 0),
                Probe::with_text("button", "no thanks", 0),
                Probe::css(r#"[data-automation-id="modal-close-btn"]"#, 0),
            ],
            location_button: vec![
                Probe::css(r#"[data-automation-id="store-finder-link"]"#, 2000),
                Probe::css(r#"button[aria-label*="location"]"#, 2000),
                Probe::css(r#"button[aria-label*="store"]"#, 2000),
                Probe::with_text("button", "find a store", 2000),
                Probe::css(r#"[data-automation="store-selector"]"#, 2000),
            ],
            postal_input: vec![
                Probe::css(r#"input[placeholder*="postal"]"#, 2000),
                Probe::css(r#"input[placeholder*="Postal"]"#, 2000),
                Probe::css(r#"input[name*="postal"]"#, 2000),
                Probe::css(r#"input[id*="postal"]"#, 2000),
                Probe::css(r#"input[type="text"]"#, 2000),
            ],
            quantity_input: vec![
                Probe::css(r#"input[aria-label*="Quantity"]"#, 1000),
                Probe::css(r#"input[aria-label*="quantity"]"#, 0),
                Probe::css(r#"input[name="quantity"]"#, 0),
                Probe::css(r#"[data-automation-id="quantity-input"]"#, 0),
            ],
            product_link: vec![
                Probe::css(r#"[data-automation-id="product-title"] a"#, 1000),
                Probe::css(r#"a[data-automation-id="product-link"]"#, 0),
                Probe::css(r#"a[href*="/en/ip/"]"#, 0),
                Probe::css(r#"a[href*="/ip/"]"#, 0),
            ],
            logged_in: vec![
                Probe::css(r#"[data-automation-id="account-menu"]"#, 0),
                Probe::css(r#"a[href*="/account/"]"#, 0),
                Probe::css(r#"a[href*="sign-out"]"#, 0),
                Probe::css(r#"a[href*="logout"]"#, 0),
                Probe::css(r#"button[aria-label*="My Account"]"#, 0),
            ],
        }
    }
}

impl SelectorTable {
    /// Reads a YAML (or JSON) override. Capabilities missing from the file
    /// keep their built-in probes.
    pub fn from_path(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, SessionError> {
        serde_yaml::from_str(raw).map_err(|err| SessionError::Config(err.to_string()))
    }
}

/// Polls one probe until it resolves or its timeout lapses. A zero timeout
/// checks once.
pub async fn locate(cdp: &dyn Cdp, probe: &Probe) -> Result<Option<Anchor>, AdapterError> {
    let deadline = Instant::now() + Duration::from_millis(probe.timeout_ms);
    loop {
        let anchors = cdp.query(&probe.selector).await?;
        if let Some(anchor) = anchors.into_iter().find(|anchor| probe.accepts(anchor)) {
            return Ok(Some(anchor));
        }
        if Instant::now() + PROBE_POLL > deadline {
            return Ok(None);
        }
        sleep(PROBE_POLL).await;
    }
}

/// Tries `probes` in order and returns the first hit. Probe errors count as
/// misses so a malformed selector cannot hide the ones after it.
pub async fn first_match<'p>(cdp: &dyn Cdp, probes: &'p [Probe]) -> Option<(&'p Probe, Anchor)> {
    for probe in probes {
        match locate(cdp, probe).await {
            Ok(Some(anchor)) => return Some((probe, anchor)),
            Ok(None) => {}
            Err(err) => {
                trace!(target: "session", selector = %probe.selector, error = %err, "probe errored");
            }
        }
    }
    None
}
