use std::path::PathBuf;

use rocket::figment::Figment;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_LEDGER_PATH: &str = "data/finance.db";

/// Read from `Rocket.toml` or `ROCKET_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        figment.extract().unwrap_or_else(|err| {
            warn!(error = %err, "invalid ledger configuration, using defaults");
            Self::default()
        })
    }
}
