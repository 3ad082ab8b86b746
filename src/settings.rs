use config::{Config, Environment, File};
use serde::Deserialize;

use std::path::PathBuf;
use std::time::Duration;

use crate::construct::SessionMode;
use crate::error::Result;
use crate::persist::PersistenceMode;

pub const DEFAULT_SETTINGS_FILE: &str = "seedling.toml";
pub const ENV_PREFIX: &str = "SEEDLING";

/// Settings of the `seedling` binary: an optional settings file layered
/// under `SEEDLING_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub document: PathBuf,
    pub schema: PathBuf,
    /// SQLite file, in-memory when absent.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub session: SessionMode,
    /// Seed for reproducible template functions.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_progress_interval() -> u64 {
    5
}
fn default_log_filter() -> String {
    "info".into()
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Settings> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
    pub fn persistence(&self) -> PersistenceMode {
        match &self.database {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}
