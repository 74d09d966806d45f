/// Service configuration for forecast requests.
///
/// The defaults point at the public National Water Model data service and
/// the fixtures bundled with this crate. A TOML file can override either,
/// e.g. to read fixtures from a different directory or to talk to a mirror:
///
/// ```toml
/// base_url = "https://nwmdata.nohrsc.noaa.gov/latest/forecasts"
/// fixture_dir = "/srv/nwm/fixtures"
/// user_agent = "nwm_forecast/0.1"
/// ```
///
/// No environment variables are consulted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::ForecastError;

/// Base of every forecast endpoint.
pub const NWM_REST_BASE: &str = "https://nwmdata.nohrsc.noaa.gov/latest/forecasts";

/// Directory holding `short_range.json`, `medium_range.json` and `long_range.json`.
pub const BUNDLED_FIXTURE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

const DEFAULT_USER_AGENT: &str = concat!("nwm_forecast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub base_url: String,
    pub fixture_dir: PathBuf,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: NWM_REST_BASE.to_string(),
            fixture_dir: PathBuf::from(BUNDLED_FIXTURE_DIR),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ForecastError> {
        let mut config: ServiceConfig = toml::from_str(content)
            .map_err(|e| ForecastError::Configuration(format!("invalid config: {}", e)))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        if config.base_url.is_empty() {
            return Err(ForecastError::Configuration(
                "base_url must not be empty".to_string(),
            ));
        }
        Ok(config)
    }

    /// Loads configuration from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ForecastError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Path of the fixture file for a forecast product.
    pub fn fixture_path(&self, product: &str) -> PathBuf {
        self.fixture_dir.join(format!("{}.json", product))
    }
}
