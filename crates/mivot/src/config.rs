//! Viewer configuration.
//!
//! [`ViewerConfig`] is passed explicitly to every [`crate::ModelViewer`];
//! there is no process-wide switch. It implements [`serde::Deserialize`]
//! and can be loaded from TOML.
//!
//! # Example
//!
//! ```
//! # use mivot::config::{MatchPolicy, ViewerConfig};
//! let config = ViewerConfig::from_toml_str(r#"
//!     tableref = "Results"
//!     dynamic_match = "first"
//! "#).unwrap();
//!
//! assert!(config.enabled());
//! assert_eq!(config.tableref(), Some("Results"));
//! assert_eq!(config.dynamic_match(), MatchPolicy::First);
//! assert_eq!(config.max_resolution_passes(), 32);
//! ```

use std::{fs, path::Path};

use log::info;
use serde::Deserialize;

use crate::error::MivotError;

/// How a dynamic reference handles several matching foreign rows or items.
///
/// No match at all is always a resolution error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// The first match in table or collection order wins.
    First,
    /// More than one match is a resolution error.
    #[default]
    Unique,
}

fn default_enabled() -> bool {
    true
}

fn default_max_resolution_passes() -> usize {
    32
}

/// Settings of a [`crate::ModelViewer`].
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Whether annotations are interpreted at all.
    #[serde(default = "default_enabled")]
    enabled: bool,

    /// Index of the RESOURCE holding the annotated tables.
    #[serde(default)]
    resource_number: usize,

    /// Table connected when the viewer is built; the first table when absent.
    #[serde(default)]
    tableref: Option<String>,

    /// Policy for dynamic references matching several foreign rows.
    #[serde(default)]
    dynamic_match: MatchPolicy,

    /// Ceiling on resolution passes per row.
    #[serde(default = "default_max_resolution_passes")]
    max_resolution_passes: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            resource_number: 0,
            tableref: None,
            dynamic_match: MatchPolicy::default(),
            max_resolution_passes: default_max_resolution_passes(),
        }
    }
}

impl ViewerConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Config`] if the text is not valid TOML for this structure.
    pub fn from_toml_str(content: &str) -> Result<Self, MivotError> {
        toml::from_str(content).map_err(|err| MivotError::Config(err.to_string()))
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Io`] if the file cannot be read and
    /// [`MivotError::Config`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MivotError> {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading viewer configuration");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// A configuration that refuses to interpret annotations.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_resource_number(mut self, resource_number: usize) -> Self {
        self.resource_number = resource_number;
        self
    }

    pub fn with_tableref(mut self, tableref: impl Into<String>) -> Self {
        self.tableref = Some(tableref.into());
        self
    }

    pub fn with_dynamic_match(mut self, policy: MatchPolicy) -> Self {
        self.dynamic_match = policy;
        self
    }

    pub fn with_max_resolution_passes(mut self, passes: usize) -> Self {
        self.max_resolution_passes = passes;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn resource_number(&self) -> usize {
        self.resource_number
    }

    pub fn tableref(&self) -> Option<&str> {
        self.tableref.as_deref()
    }

    pub fn dynamic_match(&self) -> MatchPolicy {
        self.dynamic_match
    }

    pub fn max_resolution_passes(&self) -> usize {
        self.max_resolution_passes
    }
}
