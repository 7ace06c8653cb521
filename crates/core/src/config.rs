//! Explorer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Tunables for paging, viewport geometry and call monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Items fetched on first expansion and per "show more" page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pixel height of one row.
    #[serde(default = "default_row_height")]
    pub row_height: u32,

    /// Extra pixels kept materialized above and below the viewport.
    #[serde(default = "default_guard_zone")]
    pub guard_zone: u32,

    /// Margin added on both sides when the window is rebuilt.
    #[serde(default = "default_hysteresis")]
    pub hysteresis: u32,

    /// Period of the long-running-call probe.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Bytes per text chunk streamed into the snapshot loader.
    #[serde(default = "default_load_chunk_size")]
    pub load_chunk_size: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            page_size: 100,
            row_height: 16,
            guard_zone: 40,
            hysteresis: 500,
            probe_interval_ms: 300,
            load_chunk_size: 65_536,
        }
    }

    /// Parse from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::TomlParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::invalid_config("page_size must be greater than 0"));
        }
        if self.row_height == 0 {
            return Err(Error::invalid_config("row_height must be greater than 0"));
        }
        if self.probe_interval_ms == 0 {
            return Err(Error::invalid_config("probe_interval_ms must be greater than 0"));
        }
        if self.load_chunk_size == 0 {
            return Err(Error::invalid_config("load_chunk_size must be greater than 0"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Config for tests: small pages, unit row height.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            page_size: 10,
            row_height: 1,
            guard_zone: 2,
            hysteresis: 5,
            probe_interval_ms: 10,
            load_chunk_size: 64,
        }
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub const fn with_row_height(mut self, row_height: u32) -> Self {
        self.row_height = row_height;
        self
    }
}

const fn default_page_size() -> usize {
    100
}

const fn default_row_height() -> u32 {
    16
}

const fn default_guard_zone() -> u32 {
    40
}

const fn default_hysteresis() -> u32 {
    500
}

const fn default_probe_interval_ms() -> u64 {
    300
}

const fn default_load_chunk_size() -> usize {
    65_536
}
