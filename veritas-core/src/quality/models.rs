//! Raw quality counts and the metrics derived from them.
//!
//! Counts stay fractional: erroneous and missing records are expectations
//! built from error probabilities. Every derived metric rounds them half to
//! even before use and checks its invariants at read time.

use serde::{Deserialize, Serialize};

use crate::error::VeritasError;
use crate::Result;

/// Quality counts of a table or of a whole dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Number of records
    pub record_count: f64,
    /// Records with any error bit set
    pub error_affected_count: f64,
    /// Sum of error probabilities
    pub erroneous_count: f64,
    /// Records flagged with an orphaned foreign key
    pub missing_affected_count: f64,
    /// Expected records missing from the table
    pub missing_count: f64,
}

fn round(value: f64) -> f64 {
    value.round_ties_even()
}

impl DataQuality {
    /// Creates a quality record from raw counts.
    pub fn new(
        record_count: f64,
        error_affected_count: f64,
        erroneous_count: f64,
        missing_affected_count: f64,
        missing_count: f64,
    ) -> Self {
        Self {
            record_count,
            error_affected_count,
            erroneous_count,
            missing_affected_count,
            missing_count,
        }
    }

    /// Adds another record's counts field by field.
    pub fn add(&mut self, other: &Self) {
        self.record_count += other.record_count;
        self.error_affected_count += other.error_affected_count;
        self.erroneous_count += other.erroneous_count;
        self.missing_affected_count += other.missing_affected_count;
        self.missing_count += other.missing_count;
    }

    /// Records present plus records expected to be missing.
    fn expected_record_count(&self) -> f64 {
        self.record_count + round(self.missing_count)
    }

    fn require_records(&self, metric: &str) -> Result<()> {
        if self.record_count > 0.0 {
            Ok(())
        } else {
            Err(VeritasError::invariant(format!(
                "{} is undefined for a record count of {}",
                metric, self.record_count
            )))
        }
    }

    fn require_expected_records(&self, metric: &str) -> Result<()> {
        if self.missing_count < 0.0 {
            return Err(VeritasError::invariant(format!(
                "Missing count {} is negative",
                self.missing_count
            )));
        }
        if self.expected_record_count() > 0.0 {
            Ok(())
        } else {
            Err(VeritasError::invariant(format!(
                "{} is undefined without present or missing records",
                metric
            )))
        }
    }

    fn require_erroneous_within_records(&self) -> Result<()> {
        if round(self.erroneous_count) > self.record_count {
            return Err(VeritasError::invariant(format!(
                "Erroneous count {} exceeds record count {}",
                self.erroneous_count, self.record_count
            )));
        }
        Ok(())
    }

    /// Share of present records that are correct.
    ///
    /// # Errors
    /// `InvariantViolation` for an empty table or more erroneous than present
    /// records.
    pub fn accuracy(&self) -> Result<f64> {
        self.require_records("Accuracy")?;
        self.require_erroneous_within_records()?;
        Ok((self.record_count - round(self.erroneous_count)) / self.record_count * 100.0)
    }

    /// Share of expected records that are present.
    pub fn completeness(&self) -> Result<f64> {
        self.require_expected_records("Completeness")?;
        Ok(self.record_count / self.expected_record_count() * 100.0)
    }

    /// Share of present records with any error bit set.
    pub fn percent_error_affected(&self) -> Result<f64> {
        self.require_records("Error affected percentage")?;
        if self.error_affected_count > self.record_count {
            return Err(VeritasError::invariant(format!(
                "Error affected count {} exceeds record count {}",
                self.error_affected_count, self.record_count
            )));
        }
        Ok(round(self.error_affected_count) / self.record_count * 100.0)
    }

    /// Share of present records expected to be erroneous.
    pub fn percent_erroneous(&self) -> Result<f64> {
        self.require_records("Erroneous percentage")?;
        self.require_erroneous_within_records()?;
        Ok(round(self.erroneous_count) / self.record_count * 100.0)
    }

    /// Share of expected records with an orphaned foreign key.
    pub fn percent_missing_affected(&self) -> Result<f64> {
        self.require_expected_records("Missing affected percentage")?;
        if self.missing_affected_count > self.record_count {
            return Err(VeritasError::invariant(format!(
                "Missing affected count {} exceeds record count {}",
                self.missing_affected_count, self.record_count
            )));
        }
        Ok(round(self.missing_affected_count) / self.expected_record_count() * 100.0)
    }

    /// Share of expected records that are missing.
    pub fn percent_missing(&self) -> Result<f64> {
        self.require_expected_records("Missing percentage")?;
        Ok(round(self.missing_count) / self.expected_record_count() * 100.0)
    }

    /// Share of expected records that are present and correct.
    pub fn percent_overall(&self) -> Result<f64> {
        self.require_expected_records("Overall quality")?;
        self.require_erroneous_within_records()?;
        Ok((self.record_count - round(self.erroneous_count)) / self.expected_record_count() * 100.0)
    }
}

/// Every derived metric of a [`DataQuality`], in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// Records with any error bit set
    pub percent_error_affected: f64,
    /// Records expected to be erroneous
    pub percent_erroneous: f64,
    /// Records with an orphaned foreign key
    pub percent_missing_affected: f64,
    /// Records expected to be missing
    pub percent_missing: f64,
    /// Present records that are correct
    pub accuracy: f64,
    /// Expected records that are present
    pub completeness: f64,
    /// Expected records that are present and correct
    pub percent_overall: f64,
}

impl DataQuality {
    /// Computes every derived metric at once.
    ///
    /// # Errors
    /// The first `InvariantViolation` raised by any metric.
    pub fn scorecard(&self) -> Result<Scorecard> {
        Ok(Scorecard {
            percent_error_affected: self.percent_error_affected()?,
            percent_erroneous: self.percent_erroneous()?,
            percent_missing_affected: self.percent_missing_affected()?,
            percent_missing: self.percent_missing()?,
            accuracy: self.accuracy()?,
            completeness: self.completeness()?,
            percent_overall: self.percent_overall()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 0.01
    }

    #[test]
    fn test_derived_metrics() {
        let quality = DataQuality::new(100.0, 10.0, 2.4, 3.0, 5.0);
        assert!(close(quality.accuracy().unwrap(), 98.0));
        assert!(close(quality.completeness().unwrap(), 100.0 / 105.0 * 100.0));
        assert!(close(quality.percent_error_affected().unwrap(), 10.0));
        assert!(close(quality.percent_erroneous().unwrap(), 2.0));
        assert!(close(quality.percent_missing_affected().unwrap(), 3.0 / 105.0 * 100.0));
        assert!(close(quality.percent_missing().unwrap(), 5.0 / 105.0 * 100.0));
        assert!(close(quality.percent_overall().unwrap(), 98.0 / 105.0 * 100.0));

        let scorecard = quality.scorecard().unwrap();
        assert!(close(scorecard.accuracy, 98.0));
        assert!(close(scorecard.percent_missing, 5.0 / 105.0 * 100.0));
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        let quality = DataQuality::new(10.0, 0.0, 2.5, 0.0, 0.0);
        assert!(close(quality.accuracy().unwrap(), 80.0));
        let quality = DataQuality::new(10.0, 0.0, 3.5, 0.0, 0.0);
        assert!(close(quality.accuracy().unwrap(), 60.0));
    }

    #[test]
    fn test_dataset_rollup_recomputes_from_counts() {
        let mut dataset = DataQuality::default();
        dataset.add(&DataQuality::new(100.0, 2.0, 2.0, 0.0, 0.0));
        dataset.add(&DataQuality::new(50.0, 1.0, 1.0, 0.0, 5.0));

        assert!(close(dataset.accuracy().unwrap(), 98.0));
        assert!(close(dataset.completeness().unwrap(), 96.77));
    }

    #[test]
    fn test_empty_table_is_an_invariant_violation() {
        let quality = DataQuality::default();
        assert!(matches!(
            quality.accuracy(),
            Err(VeritasError::InvariantViolation { .. })
        ));
        assert!(quality.completeness().is_err());

        let only_missing = DataQuality::new(0.0, 0.0, 0.0, 0.0, 3.0);
        assert!(close(only_missing.completeness().unwrap(), 0.0));
    }

    #[test]
    fn test_invariants_are_checked() {
        let quality = DataQuality::new(2.0, 0.0, 3.0, 0.0, 0.0);
        assert!(quality.accuracy().is_err());
        assert!(quality.percent_overall().is_err());

        let quality = DataQuality::new(2.0, 0.0, 0.0, 0.0, -1.0);
        assert!(quality.completeness().is_err());
    }
}
