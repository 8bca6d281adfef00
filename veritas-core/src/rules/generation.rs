//! Rule generation from annotated metadata.
//!
//! Each attribute's data-quality class selects the rule types that apply to
//! it; parameter builders read the attribute's statistics and the constraint
//! store to decide whether each generated rule is active. Table relationships
//! produce one reference rule per referenced key, grouped with every other
//! reference to the same primary key.

use std::collections::HashMap;

use super::book::{CodependentRuleGroup, Rule, RuleBook, RuleIdGenerator};
use super::parameters::{RuleParameters, UnitConstraint};
use super::types::{CodependentRuleGroupKind, RuleType};
use crate::constraints::{Constraint, ConstraintSet, Constraints, names};
use crate::error::VeritasError;
use crate::keys::Key;
use crate::metadata::{AttributeMetadata, DataQualityClass, DatasetMetadata, TableMetadata, metrics};
use crate::table::{NormalDistribution, format_pattern};
use crate::Result;

/// Rule types generated for an attribute of the given class.
pub fn rule_types_for(class: DataQualityClass) -> &'static [RuleType] {
    match class {
        DataQualityClass::PrimaryKey
        | DataQualityClass::CompositePrimaryKey
        | DataQualityClass::CompositePrimaryKeyForeignKey => &[RuleType::PrimaryKeyIsUnique],
        DataQualityClass::Categorical => &[RuleType::LowFrequency],
        DataQualityClass::Numerical => &[RuleType::NormalOutlier, RuleType::UnitOutlier],
        DataQualityClass::Date | DataQualityClass::DateTime => {
            &[RuleType::DateOutlier, RuleType::FormatOutlier]
        }
        DataQualityClass::Time => &[RuleType::TimeOutlier, RuleType::FormatOutlier],
        DataQualityClass::Sequence => &[RuleType::SequentialOutlier],
        DataQualityClass::ForeignKey
        | DataQualityClass::CompositeForeignKey
        | DataQualityClass::None => &[],
    }
}

/// Looks up a general constraint the rule cannot be built without.
fn required_constraint<'c>(constraints: &'c Constraints, name: &str) -> Result<&'c Constraint> {
    constraints.get_constraint(name).map_err(|_| {
        VeritasError::configuration(format!(
            "{} constraint not set within the general constraints",
            name
        ))
    })
}

/// Accumulates rules into a [`RuleBook`].
///
/// Rule identifiers come from one counter shared by attribute and table
/// rules, so the order in which rules are added fixes their identifiers.
#[derive(Debug)]
pub struct RuleBookBuilder<'a> {
    constraints: &'a ConstraintSet,
    rule_ids: RuleIdGenerator,
    codependent: Vec<CodependentRuleGroup>,
    group_positions: HashMap<String, usize>,
    independent: Vec<Rule>,
}

impl<'a> RuleBookBuilder<'a> {
    /// Creates a builder whose first rule id is 0.
    pub fn new(constraints: &'a ConstraintSet) -> Self {
        Self {
            constraints,
            rule_ids: RuleIdGenerator::new(0),
            codependent: Vec::new(),
            group_positions: HashMap::new(),
            independent: Vec::new(),
        }
    }

    /// Generates the rules for one attribute.
    ///
    /// # Errors
    /// `Configuration` if a required general constraint is missing;
    /// `Validation` if the attribute's key annotations are inconsistent.
    pub fn add_attribute_rules(
        &mut self,
        table: &TableMetadata,
        attribute: &AttributeMetadata,
    ) -> Result<()> {
        for &rule_type in rule_types_for(attribute.data_quality_class) {
            let parameters = self.attribute_parameters(rule_type, table, attribute)?;
            let rule = Rule::for_attribute(
                self.rule_ids.generate_next_id(),
                &table.name,
                &attribute.name,
                parameters,
            );
            tracing::debug!(
                "Generated rule {} {} for {}.{} (active: {})",
                rule.rule_id(),
                rule_type,
                table.name,
                attribute.name,
                rule.is_active()
            );
            self.independent.push(rule);
        }
        Ok(())
    }

    /// Generates one reference rule per key the table refers to.
    ///
    /// # Errors
    /// `Validation` if a reference's attribute pairings do not form a key.
    /// Rules for earlier references are kept.
    pub fn add_table_rules(&mut self, table: &TableMetadata) -> Result<()> {
        for (primary_table, key_id) in table.primary_key_table_references() {
            let foreign_key = table.foreign_key(&primary_table, &key_id)?;
            let group_id = foreign_key.codependent_group_id();
            let kind = CodependentRuleGroupKind::for_key(foreign_key.is_composite());
            let rule = Rule::for_table(
                self.rule_ids.generate_next_id(),
                &table.name,
                RuleParameters::Reference { foreign_key },
            );
            tracing::debug!(
                "Generated rule {} {} for {} in group {}",
                rule.rule_id(),
                RuleType::ReferencedPrimaryKeyExists,
                table.name,
                group_id
            );

            let position = match self.group_positions.get(&group_id) {
                Some(&position) => position,
                None => {
                    self.codependent.push(CodependentRuleGroup::new(group_id.clone(), kind));
                    self.group_positions.insert(group_id, self.codependent.len() - 1);
                    self.codependent.len() - 1
                }
            };
            if let Some(group) = self.codependent.get_mut(position) {
                group.add_rule(rule);
            }
        }
        Ok(())
    }

    /// Identifier the next generated rule will receive.
    pub fn peek_next_id(&self) -> u64 {
        self.rule_ids.peek_next_id()
    }

    /// Finishes the rule book.
    pub fn build(self) -> RuleBook {
        RuleBook::new(self.codependent, self.independent)
    }

    fn attribute_parameters(
        &self,
        rule_type: RuleType,
        table: &TableMetadata,
        attribute: &AttributeMetadata,
    ) -> Result<RuleParameters> {
        match rule_type {
            RuleType::PrimaryKeyIsUnique => uniqueness_parameters(table, attribute),
            RuleType::LowFrequency => self.low_frequency_parameters(attribute),
            RuleType::NormalOutlier => self.normal_outlier_parameters(table, attribute),
            RuleType::UnitOutlier => self.unit_outlier_parameters(attribute),
            RuleType::DateOutlier => Ok(RuleParameters::DateOutlier {
                date_range: required_constraint(&self.constraints.general, names::DATE)?.range(),
            }),
            RuleType::TimeOutlier => Ok(RuleParameters::TimeOutlier {
                time_range: self
                    .constraints
                    .general
                    .get_constraint(names::TIME)
                    .ok()
                    .map(Constraint::range),
            }),
            RuleType::FormatOutlier => self.format_outlier_parameters(table, attribute),
            RuleType::SequentialOutlier => self.sequential_outlier_parameters(attribute),
            RuleType::ReferencedPrimaryKeyExists => Err(VeritasError::invariant(format!(
                "Reference rules are generated from table relationships, not attribute {}",
                attribute.name
            ))),
        }
    }

    fn low_frequency_parameters(&self, attribute: &AttributeMetadata) -> Result<RuleParameters> {
        let threshold = required_constraint(&self.constraints.general, names::FREQUENCY_THRESHOLD)?;
        let low_frequency_values = match attribute.frequencies() {
            Ok(frequencies) => frequencies
                .iter()
                .filter(|f| !threshold.within_constraint(&f.frequency_percent))
                .map(|f| f.name.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        Ok(RuleParameters::LowFrequency {
            low_frequency_values,
        })
    }

    fn normal_outlier_parameters(
        &self,
        table: &TableMetadata,
        attribute: &AttributeMetadata,
    ) -> Result<RuleParameters> {
        let skewness_constraint = required_constraint(&self.constraints.general, names::SKEWNESS)?;
        let kurtosis_constraint = required_constraint(&self.constraints.general, names::KURTOSIS)?;
        let inactive = RuleParameters::NormalOutlier {
            normal_distribution: None,
        };

        let (Some(skewness), Some(kurtosis)) = (
            attribute.metric_number(metrics::SKEWNESS),
            attribute.metric_number(metrics::KURTOSIS),
        ) else {
            return Ok(inactive);
        };
        if skewness == 0.0 || kurtosis == 0.0 {
            tracing::debug!(
                "Zero skewness or kurtosis for {}.{}, normal outlier rule disabled",
                table.name,
                attribute.name
            );
            return Ok(inactive);
        }
        if !skewness_constraint.range().contains(skewness) || !kurtosis_constraint.range().contains(kurtosis) {
            return Ok(inactive);
        }

        match (
            attribute.metric_number(metrics::MEAN),
            attribute.metric_number(metrics::STANDARD_DEVIATION),
        ) {
            (Some(mean), Some(std_dev)) => Ok(RuleParameters::NormalOutlier {
                normal_distribution: Some(NormalDistribution::new(mean, std_dev)),
            }),
            _ => {
                tracing::debug!(
                    "Mean or standard deviation missing for {}.{}, normal outlier rule disabled",
                    table.name,
                    attribute.name
                );
                Ok(inactive)
            }
        }
    }

    fn unit_outlier_parameters(&self, attribute: &AttributeMetadata) -> Result<RuleParameters> {
        let inactive = RuleParameters::UnitOutlier {
            unit_constraint: None,
            no_values_fall_outside_range: false,
        };
        let Some(unit_name) = attribute.declared_units() else {
            return Ok(inactive);
        };
        let unit_constraints = &self.constraints.unit;
        if !unit_constraints.in_constraints(unit_name)
            || attribute.metric_number(metrics::COUNT) == Some(0.0)
        {
            return Ok(inactive);
        }

        let constraint = unit_constraints.get_constraint(unit_name)?;
        let observed_within = |metric: &str| {
            attribute
                .metric_value(metric)
                .is_ok_and(|value| constraint.within_constraint(value))
        };
        let no_values_fall_outside_range =
            observed_within(metrics::MINIMUM_VALUE) && observed_within(metrics::MAXIMUM_VALUE);

        Ok(RuleParameters::UnitOutlier {
            unit_constraint: Some(UnitConstraint {
                unit_name: unit_name.to_string(),
                range: constraint.range(),
            }),
            no_values_fall_outside_range,
        })
    }

    fn format_outlier_parameters(
        &self,
        table: &TableMetadata,
        attribute: &AttributeMetadata,
    ) -> Result<RuleParameters> {
        let Some(format) = attribute.declared_units() else {
            return Ok(RuleParameters::FormatOutlier { format: None });
        };
        required_constraint(&self.constraints.general, names::DATE_FORMAT)?;
        format_pattern(format).map_err(|e| {
            VeritasError::validation(format!(
                "Unusable format for {}.{}: {}",
                table.name, attribute.name, e
            ))
        })?;
        Ok(RuleParameters::FormatOutlier {
            format: Some(format.to_string()),
        })
    }

    fn sequential_outlier_parameters(&self, attribute: &AttributeMetadata) -> Result<RuleParameters> {
        let monotonicity = required_constraint(&self.constraints.general, names::MONOTONICITY)?;
        let satisfies_monotonicity = attribute
            .metric_number(metrics::MONOTONICITY_RATIO)
            .is_some_and(|ratio| monotonicity.range().contains(ratio));
        Ok(RuleParameters::SequentialOutlier {
            satisfies_monotonicity,
        })
    }
}

fn uniqueness_parameters(table: &TableMetadata, attribute: &AttributeMetadata) -> Result<RuleParameters> {
    if !attribute.data_quality_class.is_composite_primary_key() {
        return Ok(RuleParameters::Uniqueness {
            primary_key: Key::single(&table.name, &attribute.name),
            covered_under_another_rule: false,
        });
    }
    let covered_under_another_rule = table.composite_uniqueness_rule_previously_covered(&attribute.name)?;
    Ok(RuleParameters::Uniqueness {
        primary_key: Key::new(&table.name, table.primary_keys().to_vec())?,
        covered_under_another_rule,
    })
}

impl RuleBook {
    /// Generates the rule book for a metadata document.
    ///
    /// Attribute rules for every table come first, then the reference rules
    /// of every table, all numbered from one counter. A rule whose key
    /// annotations fail validation is skipped with a warning; missing
    /// required constraints abort generation.
    ///
    /// # Errors
    /// `Configuration` if a required general constraint is missing.
    pub fn generate(metadata: &DatasetMetadata, constraints: &ConstraintSet) -> Result<Self> {
        let mut builder = RuleBookBuilder::new(constraints);

        for table in &metadata.objects {
            for attribute in &table.attributes {
                if let Err(e) = builder.add_attribute_rules(table, attribute) {
                    if !e.is_rule_scoped() {
                        return Err(e);
                    }
                    tracing::warn!(
                        "Skipping rules for {}.{}: {}",
                        table.name,
                        attribute.name,
                        e
                    );
                }
            }
        }
        for table in &metadata.objects {
            if let Err(e) = builder.add_table_rules(table) {
                if !e.is_rule_scoped() {
                    return Err(e);
                }
                tracing::warn!("Skipping reference rules for {}: {}", table.name, e);
            }
        }

        let rule_book = builder.build();
        tracing::info!(
            "Generated {} rules ({} active)",
            rule_book.len(),
            rule_book.active_count()
        );
        Ok(rule_book)
    }
}
