//! Rule type and codependent group identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of check a rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Primary key values must be unique
    PrimaryKeyIsUnique,
    /// Foreign key values must exist in the referenced table
    ReferencedPrimaryKeyExists,
    /// Categories must be more frequent than the threshold
    LowFrequency,
    /// Values must lie within three standard deviations
    NormalOutlier,
    /// Values must lie within the unit's accepted range
    UnitOutlier,
    /// Years must lie within the configured date range
    DateOutlier,
    /// Hours must lie within the configured time range
    TimeOutlier,
    /// Values must follow the declared date/time format
    FormatOutlier,
    /// Values must not jump away from their neighbors
    SequentialOutlier,
}

impl RuleType {
    /// All rule types.
    pub const ALL: [RuleType; 9] = [
        Self::PrimaryKeyIsUnique,
        Self::ReferencedPrimaryKeyExists,
        Self::LowFrequency,
        Self::NormalOutlier,
        Self::UnitOutlier,
        Self::DateOutlier,
        Self::TimeOutlier,
        Self::FormatOutlier,
        Self::SequentialOutlier,
    ];

    /// Identifier used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrimaryKeyIsUnique => "PRIMARY_KEY_IS_UNIQUE",
            Self::ReferencedPrimaryKeyExists => "REFERENCED_PRIMARY_KEY_EXISTS",
            Self::LowFrequency => "LOW_FREQUENCY",
            Self::NormalOutlier => "NORMAL_OUTLIER",
            Self::UnitOutlier => "UNIT_OUTLIER",
            Self::DateOutlier => "DATE_OUTLIER",
            Self::TimeOutlier => "TIME_OUTLIER",
            Self::FormatOutlier => "FORMAT_OUTLIER",
            Self::SequentialOutlier => "SEQUENTIAL_OUTLIER",
        }
    }

    /// Human-readable description written to the rules catalog.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PrimaryKeyIsUnique => "Primary key must be unique",
            Self::ReferencedPrimaryKeyExists => "Foreign key must have corresponding primary key",
            Self::LowFrequency => "Categorical frequency must be above threshold",
            Self::NormalOutlier => "Value must be within standard deviation limit",
            Self::UnitOutlier => "Value must be within unit constraints",
            Self::DateOutlier => "Date must be within range",
            Self::TimeOutlier => "Time must be within range",
            Self::FormatOutlier => "Date/Time must be within format",
            Self::SequentialOutlier => {
                "Value abnormally distant from its immediate, sequential neighbors"
            }
        }
    }

    /// True for rule types executed in codependent groups.
    pub fn is_codependent(&self) -> bool {
        matches!(self, Self::ReferencedPrimaryKeyExists)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a codependent rule group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodependentRuleGroupKind {
    /// References to a single-attribute primary key
    PrimaryKeyReferenceChecks,
    /// References to a composite primary key
    CompositePrimaryKeyReferenceChecks,
}

impl CodependentRuleGroupKind {
    /// All group kinds.
    pub const ALL: [CodependentRuleGroupKind; 2] = [
        Self::PrimaryKeyReferenceChecks,
        Self::CompositePrimaryKeyReferenceChecks,
    ];

    /// Group kind for a reference over a key of the given shape.
    pub fn for_key(is_composite: bool) -> Self {
        if is_composite {
            Self::CompositePrimaryKeyReferenceChecks
        } else {
            Self::PrimaryKeyReferenceChecks
        }
    }
}

impl fmt::Display for CodependentRuleGroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKeyReferenceChecks => f.write_str("PRIMARY_KEY_REFERENCE_CHECKS"),
            Self::CompositePrimaryKeyReferenceChecks => {
                f.write_str("COMPOSITE_PRIMARY_KEY_REFERENCE_CHECKS")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptions_are_distinct() {
        let descriptions: HashSet<&str> = RuleType::ALL.iter().map(RuleType::description).collect();
        assert_eq!(descriptions.len(), RuleType::ALL.len());
    }

    #[test]
    fn test_only_references_are_codependent() {
        let codependent: Vec<RuleType> = RuleType::ALL
            .into_iter()
            .filter(RuleType::is_codependent)
            .collect();
        assert_eq!(codependent, vec![RuleType::ReferencedPrimaryKeyExists]);
    }

    #[test]
    fn test_group_kind_for_key() {
        assert_eq!(
            CodependentRuleGroupKind::for_key(true),
            CodependentRuleGroupKind::CompositePrimaryKeyReferenceChecks
        );
        assert_eq!(
            CodependentRuleGroupKind::for_key(false).to_string(),
            "PRIMARY_KEY_REFERENCE_CHECKS"
        );
    }
}
