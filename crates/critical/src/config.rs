//! Filter configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FilterResult;

/// Which rendition of the bootstrap script to embed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptVariant {
    /// Minified, for production
    #[default]
    Compact,
    /// Readable, logs to the console
    Debug,
}

/// Names used when talking to the property store, plus output options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Cohort holding the critical selector set
    pub beacon_cohort: String,
    /// Cohort holding the cached critical CSS
    pub dom_cohort: String,
    /// Property name of the critical selector set
    pub selectors_property: String,
    /// Property name of the cached critical CSS entry
    pub summary_property: String,
    /// `id` of the `<noscript>` element holding the deferred styles
    pub deferred_styles_id: String,
    pub script_variant: ScriptVariant,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            beacon_cohort: "beacon".to_string(),
            dom_cohort: "dom".to_string(),
            selectors_property: "critical_selectors".to_string(),
            summary_property: "critical_css_summary".to_string(),
            deferred_styles_id: "fl_deferred_styles".to_string(),
            script_variant: ScriptVariant::Compact,
        }
    }
}

impl FilterConfig {
    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> FilterResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> FilterResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
