//! Orphaned foreign key detection across a codependent rule group.
//!
//! Every foreign key of a group references the same primary key. A missing
//! value is classified by how often it occurs in its own table and across
//! all tables of the group, so the whole group is queried before any error
//! state is assigned.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::strategy::CodependentRuleStrategy;
use crate::error::VeritasError;
use crate::error_state::{ErrorState, ErrorStateRegistry, LocationId, ReferenceGroup};
use crate::keys::ForeignKey;
use crate::rules::{CodependentRuleGroup, Rule, RuleParameters};
use crate::table::{CompositeKeyScope, MissingRecords};
use crate::Result;

/// Missing values found for one foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyMissing {
    /// The checked foreign key
    pub foreign_key: ForeignKey,
    /// Its rows and values absent from the primary key table
    pub records: MissingRecords,
}

/// Findings of a reference group, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingResult {
    primary_table_name: Option<String>,
    entries: Vec<ForeignKeyMissing>,
}

impl MissingResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of checking one foreign key.
    pub fn add_to_result(&mut self, foreign_key: &ForeignKey, records: Option<MissingRecords>) {
        if self.primary_table_name.is_none() {
            self.primary_table_name = Some(foreign_key.primary_key_table_name().to_string());
        }
        if let Some(records) = records {
            self.entries.push(ForeignKeyMissing {
                foreign_key: foreign_key.clone(),
                records,
            });
        }
    }

    /// Table whose primary key the group references.
    pub fn primary_table_name(&self) -> Option<&str> {
        self.primary_table_name.as_deref()
    }

    /// Foreign keys with at least one missing value.
    pub fn entries(&self) -> &[ForeignKeyMissing] {
        &self.entries
    }

    /// Returns true if no foreign key has missing values.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occurrences of each missing value summed over all foreign keys.
    fn across_table_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            for (key, missing) in entry.records.values() {
                *counts.entry(key.as_str()).or_default() += missing.count;
            }
        }
        counts
    }

    /// The values falling into one reference group.
    pub fn subset(&self, group: ReferenceGroup) -> MissingSubset<'_> {
        let across = self.across_table_counts();
        let mut distinct = BTreeSet::new();
        let mut by_foreign_key = Vec::new();
        for entry in &self.entries {
            let values: Vec<Value> = entry
                .records
                .values()
                .iter()
                .filter(|(key, missing)| {
                    let across_tables = across.get(key.as_str()).copied().unwrap_or(missing.count);
                    ReferenceGroup::classify(missing.count, across_tables) == group
                })
                .map(|(key, missing)| {
                    distinct.insert(key.clone());
                    missing.value.clone()
                })
                .collect();
            if !values.is_empty() {
                by_foreign_key.push((&entry.foreign_key, values));
            }
        }
        MissingSubset {
            group,
            distinct_count: distinct.len(),
            by_foreign_key,
        }
    }
}

/// Missing values of one reference group, by foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSubset<'a> {
    group: ReferenceGroup,
    distinct_count: usize,
    by_foreign_key: Vec<(&'a ForeignKey, Vec<Value>)>,
}

impl<'a> MissingSubset<'a> {
    /// The reference group.
    pub fn group(&self) -> ReferenceGroup {
        self.group
    }

    /// Number of distinct missing values in the group.
    pub fn distinct_count(&self) -> usize {
        self.distinct_count
    }

    /// Foreign keys and their missing values in this group.
    pub fn by_foreign_key(&self) -> &[(&'a ForeignKey, Vec<Value>)] {
        &self.by_foreign_key
    }

    /// Expected number of primary key records genuinely missing.
    ///
    /// Each distinct value stands for one referenced record, which is missing
    /// unless the reference itself is the error.
    pub fn num_records_missing(&self, error_state: &ErrorState) -> f64 {
        self.distinct_count as f64 * (1.0 - error_state.probability_for_state)
    }
}

fn reference_key(rule: &Rule) -> Result<&ForeignKey> {
    match rule.parameters() {
        RuleParameters::Reference { foreign_key } => Ok(foreign_key),
        other => Err(VeritasError::invariant(format!(
            "Rule {} carries {} parameters inside a reference group",
            rule.rule_id(),
            other.rule_type()
        ))),
    }
}

fn materialize_foreign(scope: &mut CompositeKeyScope<'_>, foreign_key: &ForeignKey) -> Result<()> {
    if foreign_key.is_composite() {
        scope.materialize(
            foreign_key.table_name(),
            &foreign_key.foreign_attributes_ordered_by_primary_key(),
        )?;
    }
    Ok(())
}

/// Checks that every foreign key of a group exists in its primary key table.
///
/// Composite keys are compared through materialized composite columns. The
/// primary side is built once in the precondition; the foreign side is
/// rebuilt per foreign key since one table may hold several keys of the same
/// group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKeyStrategy;

impl CodependentRuleStrategy for ReferenceKeyStrategy {
    fn precondition_data(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        group: &CodependentRuleGroup,
    ) -> Result<()> {
        let Some(first) = group.iterate(false).next() else {
            return Ok(());
        };
        let primary_key = reference_key(first)?;
        for rule in group.iterate(false) {
            let foreign_key = reference_key(rule)?;
            if foreign_key.is_composite()
                && foreign_key.table_name() == foreign_key.primary_key_table_name()
            {
                return Err(VeritasError::validation(format!(
                    "Composite foreign key {} of table {} references its own table",
                    foreign_key.key().full_key_name(),
                    foreign_key.table_name()
                )));
            }
            scope.dataset().get(foreign_key.table_name())?;
        }
        if primary_key.is_composite() {
            scope.materialize(
                primary_key.primary_key_table_name(),
                &primary_key.alphabetized_primary_key(),
            )?;
        } else {
            scope.dataset().get(primary_key.primary_key_table_name())?;
        }
        Ok(())
    }

    fn execute_rule(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        group: &CodependentRuleGroup,
    ) -> Result<MissingResult> {
        let mut result = MissingResult::new();
        for rule in group.iterate(false) {
            let foreign_key = reference_key(rule)?;
            materialize_foreign(scope, foreign_key)?;

            let dataset = scope.dataset();
            let foreign = dataset.get(foreign_key.table_name())?;
            let primary = dataset.get(foreign_key.primary_key_table_name())?;
            let missing = foreign.get_rows_with_missing_values_from_compared(primary, foreign_key)?;
            if let Some(records) = &missing {
                tracing::debug!(
                    "{} rows of {} reference {} values missing from {}",
                    records.rows().len(),
                    foreign_key.table_name(),
                    records.distinct_count(),
                    foreign_key.primary_key_table_name()
                );
            }
            result.add_to_result(foreign_key, missing);
        }
        Ok(result)
    }

    fn assign_error_values(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        result: &MissingResult,
        registry: &ErrorStateRegistry,
    ) -> Result<()> {
        let Some(primary_table_name) = result.primary_table_name() else {
            return Ok(());
        };
        if result.is_empty() {
            return Ok(());
        }

        for group in ReferenceGroup::ALL {
            let subset = result.subset(group);
            if subset.distinct_count() == 0 {
                continue;
            }
            let error_state = registry.get_error_state(group, LocationId::OrphanForeignKey)?;
            scope
                .dataset_mut()
                .get_mut(primary_table_name)?
                .add_missing(subset.num_records_missing(error_state));

            for (foreign_key, values) in subset.by_foreign_key() {
                materialize_foreign(scope, foreign_key)?;
                scope
                    .dataset_mut()
                    .get_mut(foreign_key.table_name())?
                    .change_record_probability_for_missing(
                        foreign_key.key_name(),
                        values,
                        error_state,
                        &foreign_key.key().full_key_name(),
                    )?;
            }
        }
        Ok(())
    }
}
