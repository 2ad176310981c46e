//! Codec configuration
//!
//! Buffer sizes, retry limits and the policy for record tags the decoder
//! does not recognise. Loadable from JSON so a host application can tune
//! page sizes without rebuilding.

use crate::error::{DevCtlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with a record whose version/type tag is not recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownVariantPolicy {
    /// Skip the record and keep it as a diagnostic
    #[default]
    Report,
    /// Stop the enumeration with an error
    Fail,
}

/// Configuration for a [`Device`](crate::Device)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Calls allowed per operation while negotiating the output size
    pub max_size_attempts: usize,
    /// Output buffer for each USN enumeration or journal read call
    pub usn_page_size: usize,
    /// Output buffer for each retrieval pointer call
    pub extent_page_size: usize,
    /// Output buffer for each allocated range call
    pub range_page_size: usize,
    /// First guess for filesystem statistics (grown by doubling)
    pub statistics_initial_size: usize,
    /// First volume bitmap call; only needs to fit the header
    pub bitmap_probe_size: usize,
    /// Oldest USN record version requested from the driver
    pub usn_min_major_version: u16,
    /// Newest USN record version requested from the driver
    pub usn_max_major_version: u16,
    /// Stop paginated queries after this many pages
    pub max_pages: Option<usize>,
    pub unknown_variants: UnknownVariantPolicy,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_size_attempts: 2,
            usn_page_size: 64 * 1024,
            extent_page_size: 4 * 1024,
            range_page_size: 4 * 1024,
            statistics_initial_size: 16 * 1024,
            bitmap_probe_size: 128,
            usn_min_major_version: 2,
            usn_max_major_version: 3,
            max_pages: None,
            unknown_variants: UnknownVariantPolicy::Report,
        }
    }
}

impl CodecConfig {
    /// Parse from JSON; missing keys take their default
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject settings that could never produce a successful call
    pub fn validate(&self) -> Result<()> {
        if self.max_size_attempts == 0 {
            return Err(DevCtlError::ConfigError(
                "max_size_attempts must be at least 1".to_string(),
            ));
        }

        let sizes = [
            ("usn_page_size", self.usn_page_size, 8),
            ("extent_page_size", self.extent_page_size, 32),
            ("range_page_size", self.range_page_size, 16),
            ("statistics_initial_size", self.statistics_initial_size, 1),
            ("bitmap_probe_size", self.bitmap_probe_size, 16),
        ];
        for (name, value, minimum) in sizes {
            if value < minimum {
                return Err(DevCtlError::ConfigError(format!(
                    "{} must be at least {} bytes, got {}",
                    name, minimum, value
                )));
            }
        }

        if self.usn_min_major_version > self.usn_max_major_version {
            return Err(DevCtlError::ConfigError(format!(
                "USN version range {}..={} is empty",
                self.usn_min_major_version, self.usn_max_major_version
            )));
        }

        if self.max_pages == Some(0) {
            return Err(DevCtlError::ConfigError("max_pages must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn with_max_size_attempts(mut self, attempts: usize) -> Self {
        self.max_size_attempts = attempts;
        self
    }

    pub fn with_usn_page_size(mut self, size: usize) -> Self {
        self.usn_page_size = size;
        self
    }

    pub fn with_extent_page_size(mut self, size: usize) -> Self {
        self.extent_page_size = size;
        self
    }

    pub fn with_range_page_size(mut self, size: usize) -> Self {
        self.range_page_size = size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_unknown_variants(mut self, policy: UnknownVariantPolicy) -> Self {
        self.unknown_variants = policy;
        self
    }
}
