//! Cartwright: turns a chat's grocery list into a filled online cart.
//!
//! The binary wires these modules together; integration tests drive them
//! through [`services::Services::assemble`] with fake browser sessions.

pub mod cli;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod recovery;
pub mod server;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use errors::{CartError, CartResult};
pub use ingest::ChatDesk;
pub use lifecycle::JobLifecycle;
pub use orchestrator::{BuildOutcome, CartBuild, CartBuilder, RetryPolicy};
pub use recovery::{NoRefresh, SessionRefresher, VisibleRefresher};
pub use services::Services;
