//! The closed registry of error states.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::classification::{
    GeneralGroup, GroupId, LocationId, LowFrequencyGroup, ReferenceGroup,
};
use crate::error::VeritasError;
use crate::Result;

/// One error bit with its calibrated probability of being a genuine error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorState {
    /// Power-of-two bit
    pub error_state: u64,
    /// Probability in `[0, 1]` that a flagged record is erroneous
    pub probability_for_state: f64,
    /// Unique human-readable name
    pub description: String,
}

impl ErrorState {
    /// Creates an error state.
    pub fn new(error_state: u64, probability_for_state: f64, description: impl Into<String>) -> Self {
        Self {
            error_state,
            probability_for_state,
            description: description.into(),
        }
    }

    /// Zero-based position of the bit.
    pub fn bit_position(&self) -> u32 {
        self.error_state.trailing_zeros()
    }
}

/// Immutable lookup from `(group, location)` to [`ErrorState`].
///
/// Built once at startup and passed by reference to the execution engine.
#[derive(Debug, Clone)]
pub struct ErrorStateRegistry {
    states: BTreeMap<(GroupId, LocationId), ErrorState>,
    highest_current_bit: u32,
}

/// Outlier locations sharing the many/some/few triad, in bit order.
const OUTLIER_LOCATIONS: [(LocationId, &str); 7] = [
    (LocationId::UnitOutlier, "unit"),
    (LocationId::OutsideThreeStdDev, "3_std"),
    (LocationId::OutsideFourStdDev, "4_std"),
    (LocationId::DateOutlier, "date"),
    (LocationId::TimeOutlier, "time"),
    (LocationId::FormatOutlier, "format"),
    (LocationId::SequentialOutlier, "sequential"),
];

impl ErrorStateRegistry {
    /// The calibrated registry used by the engine.
    ///
    /// Bits are assigned in this order: orphan foreign keys, uniqueness, low
    /// frequency, unit, 3 and 4 standard deviations, date, time, format and
    /// sequential outliers.
    pub fn standard() -> Self {
        let mut entries: Vec<(GroupId, LocationId, f64, String)> = vec![
            (
                ReferenceGroup::SingleRecord.into(),
                LocationId::OrphanForeignKey,
                1.0,
                "single_record_orphan".to_string(),
            ),
            (
                ReferenceGroup::MultiRecord.into(),
                LocationId::OrphanForeignKey,
                0.2,
                "multi_record_orphan".to_string(),
            ),
            (
                ReferenceGroup::MultiTable.into(),
                LocationId::OrphanForeignKey,
                0.0,
                "multi_table_orphan".to_string(),
            ),
        ];

        let triad = |entries: &mut Vec<(GroupId, LocationId, f64, String)>,
                     location: LocationId,
                     suffix: &str| {
            for (group, probability, prefix) in [
                (GeneralGroup::AffectsManyRecords, 0.0, "affects_many"),
                (GeneralGroup::AffectsSomeRecords, 0.1, "affects_some"),
                (GeneralGroup::AffectsFewRecords, 1.0, "affects_few"),
            ] {
                entries.push((
                    group.into(),
                    location,
                    probability,
                    format!("{}_{}", prefix, suffix),
                ));
            }
        };

        triad(&mut entries, LocationId::UniquenessViolation, "uniqueness");
        for (group, probability, description) in [
            (LowFrequencyGroup::MultipleSubThreshold, 0.0, "multiple_sub_threshold_frequency"),
            (LowFrequencyGroup::FewSubThreshold, 0.1, "few_sub_threshold_frequency"),
            (LowFrequencyGroup::SingleSubThreshold, 1.0, "single_sub_threshold_frequency"),
        ] {
            entries.push((
                group.into(),
                LocationId::LowFrequency,
                probability,
                description.to_string(),
            ));
        }
        for (location, suffix) in OUTLIER_LOCATIONS {
            triad(&mut entries, location, suffix);
        }

        let states = entries
            .into_iter()
            .enumerate()
            .map(|(bit, (group, location, probability, description))| {
                ((group, location), ErrorState::new(1 << bit, probability, description))
            })
            .collect::<BTreeMap<_, _>>();
        let highest_current_bit = states.len() as u32;
        Self {
            states,
            highest_current_bit,
        }
    }

    /// Builds a registry from explicit entries, validating bit uniqueness.
    ///
    /// # Errors
    /// `Validation` if a bit is not a power of two, is reused, a probability
    /// lies outside `[0, 1]`, or a `(group, location)` pair repeats.
    pub fn from_states(
        entries: impl IntoIterator<Item = (GroupId, LocationId, ErrorState)>,
    ) -> Result<Self> {
        let mut states = BTreeMap::new();
        let mut used_bits = 0u64;
        for (group, location, state) in entries {
            if !state.error_state.is_power_of_two() {
                return Err(VeritasError::validation(format!(
                    "Error state '{}' has bit value {} which is not a power of two",
                    state.description, state.error_state
                )));
            }
            if used_bits & state.error_state != 0 {
                return Err(VeritasError::validation(format!(
                    "Error state '{}' reuses bit {}",
                    state.description,
                    state.bit_position()
                )));
            }
            if !(0.0..=1.0).contains(&state.probability_for_state) {
                return Err(VeritasError::validation(format!(
                    "Error state '{}' has probability {} outside [0, 1]",
                    state.description, state.probability_for_state
                )));
            }
            used_bits |= state.error_state;
            if states.insert((group, location), state).is_some() {
                return Err(VeritasError::validation(format!(
                    "Duplicate error state for ({}, {})",
                    group, location
                )));
            }
        }
        let highest_current_bit = 64 - used_bits.leading_zeros();
        Ok(Self {
            states,
            highest_current_bit,
        })
    }

    /// Resolves the error state for a classification pair.
    ///
    /// # Errors
    /// An unregistered pair is an `InvariantViolation`: rule execution only
    /// produces pairs the registry defines.
    pub fn get_error_state(&self, group: impl Into<GroupId>, location: LocationId) -> Result<&ErrorState> {
        let group = group.into();
        self.states.get(&(group, location)).ok_or_else(|| {
            VeritasError::invariant(format!(
                "No error state registered for ({}, {})",
                group, location
            ))
        })
    }

    /// One past the highest assigned bit position.
    pub fn highest_current_bit(&self) -> u32 {
        self.highest_current_bit
    }

    /// Bits marking records whose foreign key is missing from its table.
    pub fn missing_mask(&self) -> u64 {
        self.states
            .iter()
            .filter(|((_, location), _)| *location == LocationId::OrphanForeignKey)
            .fold(0, |mask, (_, state)| mask | state.error_state)
    }

    /// Iterates over all registered pairs and their states.
    pub fn iter(&self) -> impl Iterator<Item = (&(GroupId, LocationId), &ErrorState)> {
        self.states.iter()
    }

    /// Looks up a state by its description.
    pub fn by_description(&self, description: &str) -> Option<&ErrorState> {
        self.states.values().find(|s| s.description == description)
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no states are registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for ErrorStateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_registry_layout() {
        let registry = ErrorStateRegistry::standard();
        assert_eq!(registry.len(), 30);
        assert_eq!(registry.highest_current_bit(), 30);

        let single = registry
            .get_error_state(ReferenceGroup::SingleRecord, LocationId::OrphanForeignKey)
            .unwrap();
        assert_eq!(single.error_state, 1);
        assert_eq!(single.probability_for_state, 1.0);

        let many = registry
            .get_error_state(GeneralGroup::AffectsManyRecords, LocationId::UniquenessViolation)
            .unwrap();
        assert_eq!(many.error_state, 1 << 3);
        assert_eq!(many.probability_for_state, 0.0);

        let single_low = registry
            .get_error_state(LowFrequencyGroup::SingleSubThreshold, LocationId::LowFrequency)
            .unwrap();
        assert_eq!(single_low.error_state, 1 << 8);

        let few_format = registry
            .get_error_state(GeneralGroup::AffectsFewRecords, LocationId::FormatOutlier)
            .unwrap();
        assert_eq!(few_format.error_state, 1 << 26);
        assert_eq!(few_format.description, "affects_few_format");

        let few_sequential = registry
            .get_error_state(GeneralGroup::AffectsFewRecords, LocationId::SequentialOutlier)
            .unwrap();
        assert_eq!(few_sequential.error_state, 1 << 29);
    }

    #[test]
    fn test_bits_and_descriptions_are_unique() {
        let registry = ErrorStateRegistry::standard();
        let mut bits = 0u64;
        let mut descriptions = HashSet::new();
        for (_, state) in registry.iter() {
            assert!(state.error_state.is_power_of_two());
            assert_eq!(bits & state.error_state, 0);
            bits |= state.error_state;
            assert!(descriptions.insert(state.description.clone()));
        }
        assert_eq!(bits, (1 << 30) - 1);
    }

    #[test]
    fn test_missing_mask() {
        assert_eq!(ErrorStateRegistry::standard().missing_mask(), 0b111);
    }

    #[test]
    fn test_unregistered_pair() {
        let registry = ErrorStateRegistry::standard();
        assert!(matches!(
            registry.get_error_state(ReferenceGroup::MultiTable, LocationId::UnitOutlier),
            Err(VeritasError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_custom_registry_validation() {
        let small = ErrorStateRegistry::from_states([(
            GroupId::from(GeneralGroup::AffectsFewRecords),
            LocationId::UnitOutlier,
            ErrorState::new(1 << 4, 1.0, "few_unit"),
        )])
        .unwrap();
        assert_eq!(small.highest_current_bit(), 5);
        assert_eq!(small.missing_mask(), 0);

        let clash = ErrorStateRegistry::from_states([
            (
                GroupId::from(GeneralGroup::AffectsFewRecords),
                LocationId::UnitOutlier,
                ErrorState::new(2, 1.0, "a"),
            ),
            (
                GroupId::from(GeneralGroup::AffectsSomeRecords),
                LocationId::UnitOutlier,
                ErrorState::new(2, 0.1, "b"),
            ),
        ]);
        assert!(matches!(clash, Err(VeritasError::Validation { .. })));

        let not_power = ErrorStateRegistry::from_states([(
            GroupId::from(GeneralGroup::AffectsFewRecords),
            LocationId::UnitOutlier,
            ErrorState::new(3, 1.0, "a"),
        )]);
        assert!(not_power.is_err());
    }
}
