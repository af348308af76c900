//! Browser session engine for the storefront.
//!
//! Sessions drive one page through human-paced search, add-to-cart and cart
//! steps. Selector candidates live in a [`SelectorTable`] so markup changes
//! are a configuration edit. Steps that a bot challenge can interrupt return
//! [`Outcome`](cartwright_core_types::Outcome); optional steps return
//! `Option` and never fail the caller.

pub mod error;
pub mod human;
pub mod probes;
pub mod scrape;
pub mod session;
pub mod site;
pub mod visible;

#[cfg(test)]
mod testing;

pub use error::SessionError;
pub use probes::{Probe, SelectorTable};
pub use scrape::MAX_RESULTS;
pub use session::{
    prepare_page, BrowserPage, BrowserSession, BrowserSessionFactory, CartSession, EngineConfig,
    ProductRef, SessionFactory,
};
pub use site::SiteConfig;
pub use visible::{silent_refresh, VisibleSession, VisibleStart};
