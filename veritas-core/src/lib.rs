//! Core rule engine for Veritas.
//!
//! Veritas characterizes the data quality of a multi-table dataset. Rules are
//! generated from an annotated metadata document and a constraint store,
//! executed against the tables to produce per-record error states with
//! calibrated probabilities, and distilled into accuracy, completeness and
//! overall quality scorecards per table and for the dataset.
//!
//! # Guarantees
//! - Offline operation, every input is a local file
//! - Deterministic rule ids and report ordering for a given document
//! - Error-state merging is idempotent and order independent within a table
//!
//! # Architecture
//! - Error states come from an immutable registry passed into the engine
//! - Rule parameters are a sum type, one variant per rule type
//! - Execution strategies are resolved from an enum-keyed registry validated
//!   at startup
//! - Tables are reached only through the [`table::DatasetTable`] trait

pub mod config;
pub mod constraints;
pub mod error;
pub mod error_state;
pub mod execution;
pub mod keys;
pub mod logging;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod quality;
pub mod rules;
pub mod table;
pub mod values;

// Re-export commonly used types
pub use config::{ConfigValidationError, PipelineConfig};
pub use constraints::{ConstraintSet, Constraints};
pub use error::{Result, VeritasError};
pub use error_state::{ErrorState, ErrorStateRegistry};
pub use execution::{ExecutionReport, RuleBookExecution};
pub use metadata::{DataQualityClass, DatasetMetadata};
pub use pipeline::{PipelineOutcome, QualityPipeline, load_dataset};
pub use quality::{DataQuality, DatasetQualityCharacterization};
pub use rules::{RuleBook, RuleType};
pub use table::{Dataset, DatasetTable, InMemoryTable};
