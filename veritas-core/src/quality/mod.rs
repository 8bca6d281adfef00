//! Quality distillation.
//!
//! After execution every table carries per-record error bits, error
//! probabilities and a fractional count of records missing from it. This
//! module reduces them to:
//! - **Accuracy**: share of present records that are correct
//! - **Completeness**: share of expected records that are present
//! - **Overall quality**: share of expected records present and correct
//!
//! Dataset figures are recomputed from summed table counts. A metric that
//! cannot be computed, such as the accuracy of an empty table, fails with
//! the offending table's name.
//!
//! # Example
//! ```rust,ignore
//! use veritas_core::quality::{DatasetQualityCharacterization, QualitySummary};
//!
//! let characterization = DatasetQualityCharacterization::from_dataset(&dataset, &registry)?;
//! let scorecard = characterization.dataset_scorecard("my-dataset")?;
//! println!("Overall quality: {:.2}%", scorecard.percent_overall);
//! ```

mod characterization;
mod models;
mod summary;

pub use characterization::{DatasetQualityCharacterization, TableQuality, characterize_table};
pub use models::{DataQuality, Scorecard};
pub use summary::{Measure, QualitySummary, round_to};
