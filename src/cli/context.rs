use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::config::AppConfig;
use crate::services::Services;

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: Option<PathBuf>,
    output: OutputFormat,
    services: OnceCell<Arc<Services>>,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
            services: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Opens the store and wires the pipeline on first use.
    pub async fn services(&self) -> Result<Arc<Services>> {
        self.services
            .get_or_try_init(|| async {
                Services::from_config(&self.config)
                    .await
                    .map(Arc::new)
                    .context("failed to initialise services")
            })
            .await
            .map(Arc::clone)
    }
}
