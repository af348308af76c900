//! `cartwright` command line.

mod app;
mod commands;
mod context;
mod dispatch;
mod env;
mod items;
mod jobs;
mod link;
mod output;
mod runtime;
mod serve;

pub use app::run;
pub use output::OutputFormat;
pub use runtime::{init_logging, load_config, LoadedConfig};
