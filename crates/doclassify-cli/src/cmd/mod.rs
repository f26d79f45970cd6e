pub mod classify;
pub mod scan;
pub mod show;

use std::path::PathBuf;

use anyhow::{Context, Result};
use doclassify::{load_config_or_default, Config, Database};

/// Flags shared by every subcommand.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub retries: Option<u32>,
    pub json_only: bool,
}

impl GlobalOptions {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = load_config_or_default(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(database) = &self.database {
            config.database_path = Some(database.to_string_lossy().to_string());
        }
        if let Some(dir) = &self.reports_dir {
            config.reports_directory = dir.to_string_lossy().to_string();
        }
        if let Some(batch_size) = self.batch_size {
            anyhow::ensure!(batch_size > 0, "--batch-size must be at least 1");
            config.batch.batch_size = batch_size;
        }
        if let Some(retries) = self.retries {
            config.batch.retry_count = retries;
        }
        if self.json_only {
            config.api.json_only = true;
        }
        Ok(config)
    }
}

pub fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .database_path()
        .context("no database path configured and no home directory found")?;
    Database::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}
