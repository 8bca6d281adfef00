//! Strategies for rules that run against a single table.

use super::strategy::IndependentRuleStrategy;
use crate::error::VeritasError;
use crate::error_state::{ErrorStateRegistry, GeneralGroup, LocationId, LowFrequencyGroup};
use crate::rules::{Rule, RuleParameters, RuleType};
use crate::table::{AffectedRows, DatasetTable, compile_format};
use crate::Result;

fn parameters_mismatch(rule: &Rule, expected: RuleType) -> VeritasError {
    VeritasError::invariant(format!(
        "Rule {} carries {} parameters but was dispatched to the {} strategy",
        rule.rule_id(),
        rule.rule_type(),
        expected
    ))
}

fn checked_attribute(rule: &Rule) -> Result<&str> {
    rule.attribute_name().ok_or_else(|| {
        VeritasError::invariant(format!(
            "Rule {} of type {} has no attribute to check",
            rule.rule_id(),
            rule.rule_type()
        ))
    })
}

/// Classifies the rows by share of the table and merges the resulting state.
fn assign_general(
    table: &mut dyn DatasetTable,
    attribute_name: &str,
    rows: Option<AffectedRows>,
    location: LocationId,
    registry: &ErrorStateRegistry,
) -> Result<()> {
    let Some(rows) = rows else {
        return Ok(());
    };
    let group = GeneralGroup::from_counts(rows.len(), table.num_rows())?;
    let error_state = registry.get_error_state(group, location)?;
    tracing::debug!(
        "{} rows of {}.{} classified as {}",
        rows.len(),
        table.table_name(),
        attribute_name,
        error_state.description
    );
    table.change_record_probability_lookup_index(attribute_name, Some(&rows), error_state)
}

/// Flags every record sharing its primary key value with another record.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyUniquenessStrategy;

impl KeyUniquenessStrategy {
    fn check_duplicates(
        table: &mut dyn DatasetTable,
        key_name: &str,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let rows = table.get_rows_with_duplicate_values(key_name)?;
        assign_general(table, key_name, rows, LocationId::UniquenessViolation, registry)
    }
}

impl IndependentRuleStrategy for KeyUniquenessStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::Uniqueness { primary_key, .. } = rule.parameters() else {
            return Err(parameters_mismatch(rule, RuleType::PrimaryKeyIsUnique));
        };
        if !primary_key.is_composite() {
            return Self::check_duplicates(table, primary_key.key_name(), registry);
        }

        table.create_composite_key(primary_key.attribute_names())?;
        let outcome = Self::check_duplicates(table, primary_key.key_name(), registry);
        table.drop_composite_key();
        outcome
    }
}

/// Flags records holding a category below the frequency threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowFrequencyStrategy;

impl IndependentRuleStrategy for LowFrequencyStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::LowFrequency {
            low_frequency_values,
        } = rule.parameters()
        else {
            return Err(parameters_mismatch(rule, RuleType::LowFrequency));
        };
        let attribute_name = checked_attribute(rule)?;
        let Some(rows) =
            table.get_rows_where_attribute_values_equal(attribute_name, low_frequency_values)?
        else {
            return Ok(());
        };
        let group = LowFrequencyGroup::from_count(low_frequency_values.len());
        let error_state = registry.get_error_state(group, LocationId::LowFrequency)?;
        table.change_record_probability_lookup_index(attribute_name, Some(&rows), error_state)
    }
}

/// Flags values between three and four, and beyond four, standard
/// deviations from the mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalOutlierStrategy;

impl IndependentRuleStrategy for NormalOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::NormalOutlier {
            normal_distribution,
        } = rule.parameters()
        else {
            return Err(parameters_mismatch(rule, RuleType::NormalOutlier));
        };
        let Some(distribution) = normal_distribution else {
            return Ok(());
        };
        let attribute_name = checked_attribute(rule)?;

        for (std_devs, bounded, location) in [
            (3, true, LocationId::OutsideThreeStdDev),
            (4, false, LocationId::OutsideFourStdDev),
        ] {
            let (lower, higher) = distribution.bands(std_devs, bounded);
            let rows = table.get_values_outside_std_dev(attribute_name, &lower, &higher)?;
            assign_general(table, attribute_name, rows, location, registry)?;
        }
        Ok(())
    }
}

/// Flags numeric values outside the declared unit's range.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitOutlierStrategy;

impl IndependentRuleStrategy for UnitOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::UnitOutlier {
            unit_constraint, ..
        } = rule.parameters()
        else {
            return Err(parameters_mismatch(rule, RuleType::UnitOutlier));
        };
        let Some(unit_constraint) = unit_constraint else {
            return Ok(());
        };
        let attribute_name = checked_attribute(rule)?;
        let rows =
            table.get_rows_outside_numerical_constraint(attribute_name, &unit_constraint.range)?;
        assign_general(table, attribute_name, rows, LocationId::UnitOutlier, registry)
    }
}

/// Flags dates whose year falls outside the accepted range.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateOutlierStrategy;

impl IndependentRuleStrategy for DateOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::DateOutlier { date_range } = rule.parameters() else {
            return Err(parameters_mismatch(rule, RuleType::DateOutlier));
        };
        let attribute_name = checked_attribute(rule)?;
        let rows = table.get_rows_outside_date_constraint(attribute_name, date_range)?;
        assign_general(table, attribute_name, rows, LocationId::DateOutlier, registry)
    }
}

/// Flags times whose hour falls outside the accepted range.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOutlierStrategy;

impl IndependentRuleStrategy for TimeOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::TimeOutlier { time_range } = rule.parameters() else {
            return Err(parameters_mismatch(rule, RuleType::TimeOutlier));
        };
        let Some(time_range) = time_range else {
            return Ok(());
        };
        let attribute_name = checked_attribute(rule)?;
        let rows = table.get_rows_outside_time_constraint(attribute_name, time_range)?;
        assign_general(table, attribute_name, rows, LocationId::TimeOutlier, registry)
    }
}

/// Flags non-null values that do not match the declared format.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOutlierStrategy;

impl IndependentRuleStrategy for FormatOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let RuleParameters::FormatOutlier { format } = rule.parameters() else {
            return Err(parameters_mismatch(rule, RuleType::FormatOutlier));
        };
        let Some(format) = format else {
            return Ok(());
        };
        let attribute_name = checked_attribute(rule)?;
        let format_regex = compile_format(format)?;
        let rows = table.get_rows_outside_format_constraint(attribute_name, &format_regex)?;
        assign_general(table, attribute_name, rows, LocationId::FormatOutlier, registry)
    }
}

/// Flags records that break an otherwise monotonic sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialOutlierStrategy;

impl IndependentRuleStrategy for SequentialOutlierStrategy {
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        if !matches!(rule.parameters(), RuleParameters::SequentialOutlier { .. }) {
            return Err(parameters_mismatch(rule, RuleType::SequentialOutlier));
        }
        let attribute_name = checked_attribute(rule)?;
        let rows = table.identify_sequential_outliers(attribute_name)?;
        assign_general(table, attribute_name, rows, LocationId::SequentialOutlier, registry)
    }
}
