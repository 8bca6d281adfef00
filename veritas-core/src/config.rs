//! Pipeline configuration.
//!
//! Controls how rules are catalogued and how quality summaries are rendered.
//! Constraint values themselves live in the constraint files loaded into a
//! [`crate::constraints::ConstraintSet`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::VeritasError;

/// Largest supported number of decimal places in summaries.
pub const MAX_DISPLAY_PRECISION: u32 = 10;

/// Quality pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// List inactive rules in the rules catalog
    pub include_inactive_rules: bool,
    /// Decimal places of summary percentages
    pub display_precision: u32,
    /// Link echoed into the dataset summary, overriding the document's own
    pub reference_url: Option<String>,
    /// Trust annotated primary keys even when two tables share one
    pub use_annotations: bool,
}

/// Validation errors for pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("display_precision must be at most 10, got {0}")]
    InvalidPrecision(u32),
    #[error("reference_url must not be blank, got {0:?}")]
    BlankReferenceUrl(String),
}

impl From<ConfigValidationError> for VeritasError {
    fn from(error: ConfigValidationError) -> Self {
        Self::configuration(error.to_string())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            include_inactive_rules: true,
            display_precision: 2,
            reference_url: None,
            use_annotations: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a new pipeline config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to list or hide inactive rules.
    pub fn with_include_inactive_rules(mut self, include: bool) -> Self {
        self.include_inactive_rules = include;
        self
    }

    /// Builder method to set summary precision.
    pub fn with_display_precision(mut self, precision: u32) -> Self {
        if precision > MAX_DISPLAY_PRECISION {
            tracing::warn!(
                "display_precision {} clamped to {}",
                precision,
                MAX_DISPLAY_PRECISION
            );
        }
        self.display_precision = precision.min(MAX_DISPLAY_PRECISION);
        self
    }

    /// Builder method to set the summary reference URL.
    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    /// Builder method to trust annotated primary keys.
    pub fn with_use_annotations(mut self, use_annotations: bool) -> Self {
        self.use_annotations = use_annotations;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.display_precision > MAX_DISPLAY_PRECISION {
            return Err(ConfigValidationError::InvalidPrecision(
                self.display_precision,
            ));
        }
        if let Some(url) = &self.reference_url {
            if url.trim().is_empty() {
                return Err(ConfigValidationError::BlankReferenceUrl(url.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.include_inactive_rules);
        assert_eq!(config.display_precision, 2);
        assert!(!config.use_annotations);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_clamps_precision() {
        let config = PipelineConfig::new().with_display_precision(40);
        assert_eq!(config.display_precision, MAX_DISPLAY_PRECISION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let config = PipelineConfig {
            display_precision: 11,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidPrecision(11))
        ));

        let config = PipelineConfig::new().with_reference_url("  ");
        let error: VeritasError = config.validate().unwrap_err().into();
        assert!(matches!(error, VeritasError::Configuration { .. }));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "include_inactive_rules": false }"#).unwrap();
        assert!(!config.include_inactive_rules);
        assert_eq!(config.display_precision, 2);
    }
}
