//! Mapper configuration.
//!
//! Loaded from (in priority order):
//! 1. Environment variables (`OGM_` prefix) via [`OgmConfig::from_env`]
//! 2. A JSON document via [`OgmConfig::from_json`]
//! 3. Defaults

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level mapper configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OgmConfig {
    /// Name the store is pooled under (default: "default").
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Location of the remote store; unused by `MemoryStore`.
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Reject naive datetimes instead of assuming UTC.
    #[serde(default)]
    pub force_timezone: bool,

    /// Index holding one category node per class.
    #[serde(default = "default_category_index")]
    pub category_index: String,
}

fn default_store_name() -> String {
    "default".to_string()
}

fn default_store_url() -> String {
    "http://localhost:7474/db/data/".to_string()
}

fn default_category_index() -> String {
    "category".to_string()
}

impl Default for OgmConfig {
    fn default() -> Self {
        Self {
            store_name: default_store_name(),
            store_url: default_store_url(),
            force_timezone: false,
            category_index: default_category_index(),
        }
    }
}

impl OgmConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Defaults overridden by `OGM_STORE_NAME`, `OGM_STORE_URL` and
    /// `OGM_FORCE_TIMEZONE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(name) = lookup("OGM_STORE_NAME") {
            config.store_name = name;
        }
        if let Some(url) = lookup("OGM_STORE_URL") {
            config.store_url = url;
        }
        if let Some(flag) = lookup("OGM_FORCE_TIMEZONE") {
            config.force_timezone = parse_flag(&flag)
                .ok_or_else(|| Error::ConfigError(format!("OGM_FORCE_TIMEZONE: not a boolean: '{flag}'")))?;
        }
        Ok(config)
    }

    /// Install the process-wide switches this configuration controls.
    pub fn apply(&self) {
        crate::properties::set_force_timezone(self.force_timezone);
        tracing::debug!(force_timezone = self.force_timezone, "applied mapper configuration");
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
