//! Distills per-record error states into table and dataset quality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::models::{DataQuality, Scorecard};
use crate::error::VeritasError;
use crate::error_state::ErrorStateRegistry;
use crate::table::{Dataset, DatasetTable};
use crate::Result;

/// Reads the raw quality counts off an executed table.
pub fn characterize_table(table: &dyn DatasetTable, registry: &ErrorStateRegistry) -> DataQuality {
    let missing_mask = registry.missing_mask();
    let states = table.error_states();
    DataQuality {
        record_count: table.num_rows() as f64,
        error_affected_count: states.iter().filter(|&&state| state != 0).count() as f64,
        erroneous_count: table.error_probabilities().iter().sum(),
        missing_affected_count: states
            .iter()
            .filter(|&&state| state & missing_mask != 0)
            .count() as f64,
        missing_count: table.missing_records(),
    }
}

/// Quality of one table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableQuality {
    /// Raw counts
    pub quality: DataQuality,
    /// Derived metrics
    pub scorecard: Scorecard,
}

/// Quality of every table and of the dataset as a whole.
///
/// The dataset figures are recomputed from summed counts rather than
/// averaged from table percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetQualityCharacterization {
    tables: BTreeMap<String, TableQuality>,
    dataset: DataQuality,
}

impl DatasetQualityCharacterization {
    /// Creates an empty characterization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Characterizes every table of an executed dataset.
    ///
    /// # Errors
    /// `Distillation` naming the first table whose metrics break an
    /// invariant, such as an empty table.
    pub fn from_dataset(dataset: &Dataset, registry: &ErrorStateRegistry) -> Result<Self> {
        let mut characterization = Self::new();
        for table in dataset.iter() {
            characterization.add_table(table.table_name(), characterize_table(table, registry))?;
        }
        tracing::info!(
            "Characterized {} tables with {} records",
            characterization.tables.len(),
            characterization.dataset.record_count
        );
        Ok(characterization)
    }

    /// Adds a table's counts and folds them into the dataset totals.
    ///
    /// # Errors
    /// `Distillation` if the counts break a metric invariant; the dataset
    /// totals are left untouched.
    pub fn add_table(&mut self, table_name: &str, quality: DataQuality) -> Result<()> {
        let scorecard = quality
            .scorecard()
            .map_err(|e| VeritasError::distillation(table_name, e))?;
        tracing::debug!(
            "Table {}: accuracy {:.2}%, completeness {:.2}%",
            table_name,
            scorecard.accuracy,
            scorecard.completeness
        );
        self.dataset.add(&quality);
        self.tables
            .insert(table_name.to_string(), TableQuality { quality, scorecard });
        Ok(())
    }

    /// Summed counts over all tables.
    pub fn dataset(&self) -> &DataQuality {
        &self.dataset
    }

    /// Derived metrics over all tables.
    ///
    /// # Errors
    /// `Distillation` under `dataset_name` if the totals break an invariant.
    pub fn dataset_scorecard(&self, dataset_name: &str) -> Result<Scorecard> {
        self.dataset
            .scorecard()
            .map_err(|e| VeritasError::distillation(dataset_name, e))
    }

    /// Quality of one table.
    ///
    /// # Errors
    /// `NotFound` if the table was not characterized.
    pub fn get_data_quality_for_table(&self, table_name: &str) -> Result<&TableQuality> {
        self.tables.get(table_name).ok_or_else(|| {
            VeritasError::not_found(format!("No data quality recorded for table '{}'", table_name))
        })
    }

    /// Tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableQuality)> {
        self.tables.iter().map(|(name, quality)| (name.as_str(), quality))
    }
}
