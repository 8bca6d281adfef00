//! Error types for the rule engine.
//!
//! The variants follow the engine's recovery policy: configuration errors are
//! fatal for the run, validation errors are fatal for the offending rule or
//! key only, lookups of optional entries surface as `NotFound`, and
//! `InvariantViolation` signals an upstream logic bug rather than bad input.

use thiserror::Error;

/// Main error type for Veritas operations.
#[derive(Debug, Error)]
pub enum VeritasError {
    /// Malformed or missing configuration (constraint files, required entries)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A key, relationship or rule parameter failed validation
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// An optional entry was looked up without an existence check
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// An internal invariant was broken by upstream logic
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Scorecard distillation failed for a specific table
    #[error("Quality distillation failed for table '{table}'")]
    Distillation {
        table: String,
        #[source]
        source: Box<VeritasError>,
    },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// CSV reading or writing failed
    #[error("CSV processing failed: {context}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },
}

/// Convenience type alias for Results with VeritasError
pub type Result<T> = std::result::Result<T, VeritasError>;

impl VeritasError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an invariant violation
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Wraps an error raised while distilling the named table's scorecard
    pub fn distillation(table: impl Into<String>, source: VeritasError) -> Self {
        Self::Distillation {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Creates a CSV error with context
    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    /// Returns true for errors that abort only the offending rule or key.
    pub fn is_rule_scoped(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}
