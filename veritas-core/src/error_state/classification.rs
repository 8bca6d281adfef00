//! Group and location classification of detected issues.
//!
//! A group says how many records an issue affects, a location says what kind
//! of issue it is. Together they select an [`super::ErrorState`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VeritasError;
use crate::Result;

/// Upper bound, in percent of rows, for the `few` group.
pub const FEW_RECORDS_PERCENT: f64 = 0.01;
/// Upper bound, in percent of rows, for the `some` group.
pub const SOME_RECORDS_PERCENT: f64 = 5.0;
/// Upper bound, in percent of rows, for the `many` group.
pub const MANY_RECORDS_PERCENT: f64 = 100.0;

/// Magnitude of an issue as a share of the table's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralGroup {
    /// At most 0.01% of rows
    AffectsFewRecords,
    /// At most 5% of rows
    AffectsSomeRecords,
    /// More than 5% of rows
    AffectsManyRecords,
}

impl GeneralGroup {
    /// Classifies a percentage of affected rows.
    ///
    /// # Errors
    /// Percentages above 100 (or not a number) are an `InvariantViolation`.
    pub fn from_percent(percent: f64) -> Result<Self> {
        if percent <= FEW_RECORDS_PERCENT {
            Ok(Self::AffectsFewRecords)
        } else if percent <= SOME_RECORDS_PERCENT {
            Ok(Self::AffectsSomeRecords)
        } else if percent <= MANY_RECORDS_PERCENT {
            Ok(Self::AffectsManyRecords)
        } else {
            Err(VeritasError::invariant(format!(
                "Erroneous row percentage {} exceeds 100%",
                percent
            )))
        }
    }

    /// Classifies `affected` rows out of `total`.
    pub fn from_counts(affected: usize, total: usize) -> Result<Self> {
        if total == 0 {
            return Err(VeritasError::invariant(format!(
                "Cannot classify {} affected rows of an empty table",
                affected
            )));
        }
        Self::from_percent(affected as f64 / total as f64 * 100.0)
    }
}

/// How widely a missing foreign key value is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceGroup {
    /// One row of one table
    SingleRecord,
    /// Several rows, all in one table
    MultiRecord,
    /// Rows in more than one table
    MultiTable,
}

impl ReferenceGroup {
    /// Classifies a missing value from its occurrence count within the
    /// referring table and across all referring tables of a group.
    pub fn classify(within_table: usize, across_tables: usize) -> Self {
        if across_tables > within_table {
            Self::MultiTable
        } else if within_table > 1 {
            Self::MultiRecord
        } else {
            Self::SingleRecord
        }
    }

    /// All reference groups in registry order.
    pub const ALL: [Self; 3] = [Self::SingleRecord, Self::MultiRecord, Self::MultiTable];
}

/// Number of categorical values below the frequency threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowFrequencyGroup {
    /// Exactly one value
    SingleSubThreshold,
    /// Two or three values
    FewSubThreshold,
    /// More than three values
    MultipleSubThreshold,
}

impl LowFrequencyGroup {
    /// Classifies a count of sub-threshold categories.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 | 1 => Self::SingleSubThreshold,
            2 | 3 => Self::FewSubThreshold,
            _ => Self::MultipleSubThreshold,
        }
    }
}

/// Any group classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupId {
    /// Row-share based
    General(GeneralGroup),
    /// Reference-pattern based
    Reference(ReferenceGroup),
    /// Sub-threshold category count based
    LowFrequency(LowFrequencyGroup),
}

impl From<GeneralGroup> for GroupId {
    fn from(group: GeneralGroup) -> Self {
        Self::General(group)
    }
}

impl From<ReferenceGroup> for GroupId {
    fn from(group: ReferenceGroup) -> Self {
        Self::Reference(group)
    }
}

impl From<LowFrequencyGroup> for GroupId {
    fn from(group: LowFrequencyGroup) -> Self {
        Self::LowFrequency(group)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General(GeneralGroup::AffectsFewRecords) => "affects_few_records",
            Self::General(GeneralGroup::AffectsSomeRecords) => "affects_some_records",
            Self::General(GeneralGroup::AffectsManyRecords) => "affects_many_records",
            Self::Reference(ReferenceGroup::SingleRecord) => "single_record",
            Self::Reference(ReferenceGroup::MultiRecord) => "multi_record",
            Self::Reference(ReferenceGroup::MultiTable) => "multi_table",
            Self::LowFrequency(LowFrequencyGroup::SingleSubThreshold) => "single_sub_threshold",
            Self::LowFrequency(LowFrequencyGroup::FewSubThreshold) => "few_sub_threshold",
            Self::LowFrequency(LowFrequencyGroup::MultipleSubThreshold) => "multiple_sub_threshold",
        };
        f.write_str(name)
    }
}

/// Kind of issue detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationId {
    /// Foreign key value absent from the referenced primary key
    OrphanForeignKey,
    /// Duplicate primary key value
    UniquenessViolation,
    /// Rare categorical value
    LowFrequency,
    /// Value outside its unit's valid range
    UnitOutlier,
    /// Value 3 to 4 standard deviations from the mean
    OutsideThreeStdDev,
    /// Value beyond 4 standard deviations from the mean
    OutsideFourStdDev,
    /// Year outside the configured range
    DateOutlier,
    /// Hour outside the configured range
    TimeOutlier,
    /// Value not matching the declared format
    FormatOutlier,
    /// Value breaking a sequence
    SequentialOutlier,
}

impl LocationId {
    /// Snake-case name used in descriptions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanForeignKey => "orphan_foreign_key",
            Self::UniquenessViolation => "uniqueness_violation",
            Self::LowFrequency => "low_frequency",
            Self::UnitOutlier => "unit_outlier",
            Self::OutsideThreeStdDev => "outside_three_std_dev",
            Self::OutsideFourStdDev => "outside_four_std_dev",
            Self::DateOutlier => "date_outlier",
            Self::TimeOutlier => "time_outlier",
            Self::FormatOutlier => "format_outlier",
            Self::SequentialOutlier => "sequential_outlier",
        }
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_threshold_boundaries() {
        assert_eq!(GeneralGroup::from_percent(0.0).unwrap(), GeneralGroup::AffectsFewRecords);
        assert_eq!(GeneralGroup::from_percent(0.01).unwrap(), GeneralGroup::AffectsFewRecords);
        assert_eq!(GeneralGroup::from_percent(0.0101).unwrap(), GeneralGroup::AffectsSomeRecords);
        assert_eq!(GeneralGroup::from_percent(5.0).unwrap(), GeneralGroup::AffectsSomeRecords);
        assert_eq!(GeneralGroup::from_percent(5.01).unwrap(), GeneralGroup::AffectsManyRecords);
        assert_eq!(GeneralGroup::from_percent(100.0).unwrap(), GeneralGroup::AffectsManyRecords);
        assert!(matches!(
            GeneralGroup::from_percent(100.01),
            Err(VeritasError::InvariantViolation { .. })
        ));
        assert!(GeneralGroup::from_percent(f64::NAN).is_err());
    }

    #[test]
    fn test_group_from_counts() {
        assert_eq!(GeneralGroup::from_counts(2, 3).unwrap(), GeneralGroup::AffectsManyRecords);
        assert_eq!(GeneralGroup::from_counts(1, 100).unwrap(), GeneralGroup::AffectsSomeRecords);
        assert_eq!(GeneralGroup::from_counts(1, 20_000).unwrap(), GeneralGroup::AffectsFewRecords);
        assert!(GeneralGroup::from_counts(0, 0).is_err());
    }

    #[test]
    fn test_low_frequency_groups() {
        assert_eq!(LowFrequencyGroup::from_count(1), LowFrequencyGroup::SingleSubThreshold);
        assert_eq!(LowFrequencyGroup::from_count(2), LowFrequencyGroup::FewSubThreshold);
        assert_eq!(LowFrequencyGroup::from_count(3), LowFrequencyGroup::FewSubThreshold);
        assert_eq!(LowFrequencyGroup::from_count(4), LowFrequencyGroup::MultipleSubThreshold);
    }

    #[test]
    fn test_reference_classification() {
        assert_eq!(ReferenceGroup::classify(1, 1), ReferenceGroup::SingleRecord);
        assert_eq!(ReferenceGroup::classify(3, 3), ReferenceGroup::MultiRecord);
        assert_eq!(ReferenceGroup::classify(1, 2), ReferenceGroup::MultiTable);
        assert_eq!(ReferenceGroup::classify(2, 5), ReferenceGroup::MultiTable);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(GroupId::from(ReferenceGroup::MultiTable).to_string(), "multi_table");
        assert_eq!(LocationId::OutsideFourStdDev.to_string(), "outside_four_std_dev");
    }
}
