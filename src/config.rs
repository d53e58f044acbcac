//! Expansion settings.
//!
//! Settings come from a YAML file (`--config`, or `cmacro.yaml` in the working
//! directory when present) and are then overridden by command-line flags.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```yaml
//! max_steps: 10000
//! gensym_prefix: cmacro
//! unit_tags: false
//! include_dirs: [macros/]
//! preserve_layout: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CmacroError, Result};

pub const DEFAULT_MAX_STEPS: usize = 10_000;
pub const DEFAULT_GENSYM_PREFIX: &str = "cmacro";
pub const DEFAULT_CONFIG_FILE: &str = "cmacro.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Ceiling on expansion steps per unit.
    pub max_steps: usize,
    /// First component of every generated identifier.
    pub gensym_prefix: String,
    /// Mix a hash of the unit name into generated identifiers, so units
    /// expanded separately never produce the same name.
    pub unit_tags: bool,
    /// Directories searched for `cmacro_import` paths after the importing
    /// file's own directory.
    pub include_dirs: Vec<PathBuf>,
    /// Copy original whitespace and comments around untouched code.
    pub preserve_layout: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            gensym_prefix: DEFAULT_GENSYM_PREFIX.to_string(),
            unit_tags: false,
            include_dirs: Vec::new(),
            preserve_layout: true,
        }
    }
}

impl ExpansionConfig {
    /// Parses a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: ExpansionConfig =
            serde_yaml::from_str(text).map_err(|e| CmacroError::Config {
                message: e.to_string(),
                source: Some(e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| CmacroError::io("read", path, e))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_yaml(&text)
    }

    /// Loads `path` if given, else `cmacro.yaml` from the working directory if
    /// it exists, else the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            tracing::debug!("using configuration from {}", fallback.display());
            return Self::load(fallback);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(CmacroError::Config {
                message: "`max_steps` must be at least 1".into(),
                source: None,
            });
        }
        let prefix_ok = self
            .gensym_prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && self
                .gensym_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !prefix_ok {
            return Err(CmacroError::Config {
                message: format!(
                    "`gensym_prefix` must be a C identifier, got `{}`",
                    self.gensym_prefix
                ),
                source: None,
            });
        }
        Ok(())
    }
}
