//! Reader configuration.
//!
//! Settings load from TOML; every field has a default so an empty file is
//! a valid configuration.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Deepest heading level the reader distinguishes.
pub const MAX_HEADING_LEVELS: u8 = 6;

/// Settings shared by the parser, the navigator and the phrase pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Heading-level navigation setting (0..=6). Advisory only.
    pub heading_levels: u8,
    /// Prepended to alt text when an image is announced.
    pub image_prefix: String,
    /// Prefix for ids generated for elements with alt text but no id.
    pub generated_id_prefix: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            heading_levels: MAX_HEADING_LEVELS,
            image_prefix: "Image. ".to_string(),
            generated_id_prefix: "talkbook-alt-".to_string(),
        }
    }
}

impl ReaderConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config.validated())
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    fn validated(mut self) -> Self {
        if self.heading_levels > MAX_HEADING_LEVELS {
            warn!(
                heading_levels = self.heading_levels,
                "heading_levels out of range, clamping to {MAX_HEADING_LEVELS}"
            );
            self.heading_levels = MAX_HEADING_LEVELS;
        }
        if self.generated_id_prefix.is_empty() {
            self.generated_id_prefix = ReaderConfig::default().generated_id_prefix;
        }
        self
    }
}
