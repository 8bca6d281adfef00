//! Per-rule-type parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::RuleType;
use crate::constraints::ConstraintRange;
use crate::keys::{ForeignKey, Key};
use crate::table::NormalDistribution;

/// A unit constraint resolved from the unit constraint store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConstraint {
    /// Unit name as declared on the attribute
    pub unit_name: String,
    /// Accepted value range for the unit
    pub range: ConstraintRange,
}

/// Parameters of a rule, one variant per rule type.
///
/// Each variant carries exactly what its rule needs to execute and to decide
/// whether it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleParameters {
    /// Duplicate check over a single or composite primary key
    Uniqueness {
        primary_key: Key,
        /// Another attribute of the composite key owns the check
        covered_under_another_rule: bool,
    },
    /// Orphan check of a foreign key against its primary key table
    Reference { foreign_key: ForeignKey },
    /// Categories whose frequency fails the threshold
    LowFrequency { low_frequency_values: Vec<Value> },
    /// Normal distribution fitted from the attribute's statistics
    NormalOutlier {
        normal_distribution: Option<NormalDistribution>,
    },
    /// Unit range check
    UnitOutlier {
        unit_constraint: Option<UnitConstraint>,
        /// Observed minimum and maximum already fall inside the range
        no_values_fall_outside_range: bool,
    },
    /// Accepted year range
    DateOutlier { date_range: ConstraintRange },
    /// Accepted hour range, when configured
    TimeOutlier { time_range: Option<ConstraintRange> },
    /// Declared strftime-style format
    FormatOutlier { format: Option<String> },
    /// Whether the monotonicity ratio satisfies the `Monotonicity` constraint
    SequentialOutlier { satisfies_monotonicity: bool },
}

impl RuleParameters {
    /// The rule type these parameters belong to.
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Uniqueness { .. } => RuleType::PrimaryKeyIsUnique,
            Self::Reference { .. } => RuleType::ReferencedPrimaryKeyExists,
            Self::LowFrequency { .. } => RuleType::LowFrequency,
            Self::NormalOutlier { .. } => RuleType::NormalOutlier,
            Self::UnitOutlier { .. } => RuleType::UnitOutlier,
            Self::DateOutlier { .. } => RuleType::DateOutlier,
            Self::TimeOutlier { .. } => RuleType::TimeOutlier,
            Self::FormatOutlier { .. } => RuleType::FormatOutlier,
            Self::SequentialOutlier { .. } => RuleType::SequentialOutlier,
        }
    }

    /// Whether a rule with these parameters should execute.
    pub fn is_active(&self) -> bool {
        match self {
            Self::Uniqueness {
                covered_under_another_rule,
                ..
            } => !covered_under_another_rule,
            Self::Reference { .. } | Self::DateOutlier { .. } => true,
            Self::LowFrequency {
                low_frequency_values,
            } => !low_frequency_values.is_empty(),
            Self::NormalOutlier {
                normal_distribution,
            } => normal_distribution.is_some(),
            Self::UnitOutlier {
                unit_constraint,
                no_values_fall_outside_range,
            } => unit_constraint.is_some() && !no_values_fall_outside_range,
            Self::TimeOutlier { time_range } => time_range.is_some(),
            Self::FormatOutlier { format } => format.is_some(),
            Self::SequentialOutlier {
                satisfies_monotonicity,
            } => *satisfies_monotonicity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_rules() {
        let key = Key::single("t", "id");
        assert!(
            RuleParameters::Uniqueness {
                primary_key: key.clone(),
                covered_under_another_rule: false
            }
            .is_active()
        );
        assert!(
            !RuleParameters::Uniqueness {
                primary_key: key,
                covered_under_another_rule: true
            }
            .is_active()
        );

        assert!(
            !RuleParameters::LowFrequency {
                low_frequency_values: vec![]
            }
            .is_active()
        );
        assert!(
            RuleParameters::LowFrequency {
                low_frequency_values: vec![json!("rare")]
            }
            .is_active()
        );

        let unit = UnitConstraint {
            unit_name: "percent".into(),
            range: ConstraintRange::new(0.0, 100.0),
        };
        assert!(
            RuleParameters::UnitOutlier {
                unit_constraint: Some(unit.clone()),
                no_values_fall_outside_range: false
            }
            .is_active()
        );
        assert!(
            !RuleParameters::UnitOutlier {
                unit_constraint: Some(unit),
                no_values_fall_outside_range: true
            }
            .is_active()
        );
        assert!(
            !RuleParameters::UnitOutlier {
                unit_constraint: None,
                no_values_fall_outside_range: false
            }
            .is_active()
        );

        assert!(!RuleParameters::FormatOutlier { format: None }.is_active());
        assert!(!RuleParameters::TimeOutlier { time_range: None }.is_active());
        assert!(
            RuleParameters::DateOutlier {
                date_range: ConstraintRange::new(1900.0, 2100.0)
            }
            .is_active()
        );
    }

    #[test]
    fn test_rule_type_follows_variant() {
        let parameters = RuleParameters::SequentialOutlier {
            satisfies_monotonicity: true,
        };
        assert_eq!(parameters.rule_type(), RuleType::SequentialOutlier);
        assert!(parameters.is_active());
    }
}
