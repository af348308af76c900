use serde::{Deserialize, Serialize};
use url::Url;

/// Storefront addresses. Paths are joined onto `base_url`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub display_name: String,
    pub locale_path: String,
    pub search_path: String,
    pub cart_path: String,
    pub signin_path: String,
    pub account_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.walmart.ca".into(),
            display_name: "Walmart.ca".into(),
            locale_path: "/en".into(),
            search_path: "/en/search".into(),
            cart_path: "/en/cart".into(),
            signin_path: "/en/signin".into(),
            account_path: "/en/account".into(),
        }
    }
}

impl SiteConfig {
    pub fn home_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    /// Origin used to pick stealth policy, e.g. `https://www.walmart.ca`.
    pub fn origin(&self) -> String {
        Url::parse(&self.base_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_else(|_| self.home_url())
    }

    pub fn locale_url(&self) -> String {
        self.join(&self.locale_path)
    }

    pub fn search_url(&self, query: &str) -> String {
        let base = self.join(&self.search_path);
        match Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("q", query.trim());
                url.to_string()
            }
            Err(_) => format!("{base}?q={}", query.trim().replace(' ', "+")),
        }
    }

    pub fn cart_url(&self) -> String {
        self.join(&self.cart_path)
    }

    pub fn signin_url(&self) -> String {
        self.join(&self.signin_path)
    }

    pub fn account_url(&self) -> String {
        self.join(&self.account_path)
    }

    /// Resolves a scraped href, which may be site-relative.
    pub fn absolutize(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        let base = Url::parse(&self.base_url).ok()?;
        base.join(href).ok().map(|url| url.to_string())
    }

    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.home_url(), path.trim_start_matches('/'))
    }
}
