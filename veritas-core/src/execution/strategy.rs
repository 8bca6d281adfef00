//! Execution strategy traits and their enum-keyed registry.

use std::collections::BTreeMap;
use std::fmt;

use super::independent::{
    DateOutlierStrategy, FormatOutlierStrategy, KeyUniquenessStrategy, LowFrequencyStrategy,
    NormalOutlierStrategy, SequentialOutlierStrategy, TimeOutlierStrategy, UnitOutlierStrategy,
};
use super::reference::{MissingResult, ReferenceKeyStrategy};
use crate::error::VeritasError;
use crate::error_state::ErrorStateRegistry;
use crate::rules::{CodependentRuleGroup, CodependentRuleGroupKind, Rule, RuleType};
use crate::table::{CompositeKeyScope, DatasetTable};
use crate::Result;

/// Executes one independent rule against its table.
///
/// Implementations read the table's columns and write only through the
/// table's error-state mutators.
pub trait IndependentRuleStrategy: fmt::Debug + Send + Sync {
    /// Runs the rule and merges the resulting error states into `table`.
    ///
    /// # Errors
    /// `InvariantViolation` if the rule's parameters do not belong to this
    /// strategy; query errors from the table are propagated.
    fn execute_rule(
        &self,
        table: &mut dyn DatasetTable,
        rule: &Rule,
        registry: &ErrorStateRegistry,
    ) -> Result<()>;
}

/// Executes a codependent rule group across the tables it touches.
///
/// The engine calls the steps in order and always finishes with
/// [`CodependentRuleStrategy::postcondition_data`], even when an earlier
/// step fails.
pub trait CodependentRuleStrategy: fmt::Debug + Send + Sync {
    /// Prepares the tables, materializing composite keys where needed.
    fn precondition_data(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        group: &CodependentRuleGroup,
    ) -> Result<()>;

    /// Collects the group's findings without touching error states.
    fn execute_rule(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        group: &CodependentRuleGroup,
    ) -> Result<MissingResult>;

    /// Merges the findings into the affected tables.
    fn assign_error_values(
        &self,
        scope: &mut CompositeKeyScope<'_>,
        result: &MissingResult,
        registry: &ErrorStateRegistry,
    ) -> Result<()>;

    /// Releases everything the precondition materialized.
    fn postcondition_data(&self, scope: CompositeKeyScope<'_>) {
        drop(scope);
    }
}

fn standard_independent_strategy(rule_type: RuleType) -> Option<Box<dyn IndependentRuleStrategy>> {
    match rule_type {
        RuleType::PrimaryKeyIsUnique => Some(Box::new(KeyUniquenessStrategy)),
        RuleType::LowFrequency => Some(Box::new(LowFrequencyStrategy)),
        RuleType::NormalOutlier => Some(Box::new(NormalOutlierStrategy)),
        RuleType::UnitOutlier => Some(Box::new(UnitOutlierStrategy)),
        RuleType::DateOutlier => Some(Box::new(DateOutlierStrategy)),
        RuleType::TimeOutlier => Some(Box::new(TimeOutlierStrategy)),
        RuleType::FormatOutlier => Some(Box::new(FormatOutlierStrategy)),
        RuleType::SequentialOutlier => Some(Box::new(SequentialOutlierStrategy)),
        RuleType::ReferencedPrimaryKeyExists => None,
    }
}

fn standard_codependent_strategy(kind: CodependentRuleGroupKind) -> Box<dyn CodependentRuleStrategy> {
    match kind {
        CodependentRuleGroupKind::PrimaryKeyReferenceChecks
        | CodependentRuleGroupKind::CompositePrimaryKeyReferenceChecks => {
            Box::new(ReferenceKeyStrategy)
        }
    }
}

/// Maps rule types and group kinds to their execution strategies.
#[derive(Debug)]
pub struct StrategyRegistry {
    independent: BTreeMap<RuleType, Box<dyn IndependentRuleStrategy>>,
    codependent: BTreeMap<CodependentRuleGroupKind, Box<dyn CodependentRuleStrategy>>,
}

impl StrategyRegistry {
    /// Registry with the built-in strategy for every rule type.
    pub fn standard() -> Self {
        let independent = RuleType::ALL
            .into_iter()
            .filter_map(|rule_type| standard_independent_strategy(rule_type).map(|s| (rule_type, s)))
            .collect();
        let codependent = CodependentRuleGroupKind::ALL
            .into_iter()
            .map(|kind| (kind, standard_codependent_strategy(kind)))
            .collect();
        Self {
            independent,
            codependent,
        }
    }

    /// Creates a registry with no strategies.
    pub fn empty() -> Self {
        Self {
            independent: BTreeMap::new(),
            codependent: BTreeMap::new(),
        }
    }

    /// Builder method to register or replace an independent strategy.
    pub fn with_independent(
        mut self,
        rule_type: RuleType,
        strategy: Box<dyn IndependentRuleStrategy>,
    ) -> Self {
        self.independent.insert(rule_type, strategy);
        self
    }

    /// Builder method to register or replace a codependent strategy.
    pub fn with_codependent(
        mut self,
        kind: CodependentRuleGroupKind,
        strategy: Box<dyn CodependentRuleStrategy>,
    ) -> Self {
        self.codependent.insert(kind, strategy);
        self
    }

    /// Checks that every independent rule type and every group kind has a
    /// strategy.
    ///
    /// # Errors
    /// `Configuration` naming the first uncovered variant.
    pub fn validate(&self) -> Result<()> {
        if let Some(rule_type) = RuleType::ALL
            .into_iter()
            .find(|t| !t.is_codependent() && !self.independent.contains_key(t))
        {
            return Err(VeritasError::configuration(format!(
                "No execution strategy registered for rule type {}",
                rule_type
            )));
        }
        if let Some(kind) = CodependentRuleGroupKind::ALL
            .into_iter()
            .find(|k| !self.codependent.contains_key(k))
        {
            return Err(VeritasError::configuration(format!(
                "No execution strategy registered for rule group {}",
                kind
            )));
        }
        Ok(())
    }

    /// Strategy for an independent rule type.
    pub fn independent(&self, rule_type: RuleType) -> Result<&dyn IndependentRuleStrategy> {
        self.independent
            .get(&rule_type)
            .map(|strategy| strategy.as_ref())
            .ok_or_else(|| {
                VeritasError::configuration(format!("Unrecognized rule type: {}", rule_type))
            })
    }

    /// Strategy for a codependent group kind.
    pub fn codependent(&self, kind: CodependentRuleGroupKind) -> Result<&dyn CodependentRuleStrategy> {
        self.codependent
            .get(&kind)
            .map(|strategy| strategy.as_ref())
            .ok_or_else(|| {
                VeritasError::configuration(format!("Unrecognized rule group: {}", kind))
            })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_is_exhaustive() {
        let registry = StrategyRegistry::standard();
        assert!(registry.validate().is_ok());
        for rule_type in RuleType::ALL {
            assert_eq!(
                registry.independent(rule_type).is_ok(),
                !rule_type.is_codependent()
            );
        }
    }

    #[test]
    fn test_missing_strategy_fails_validation() {
        let registry = StrategyRegistry::empty()
            .with_independent(RuleType::LowFrequency, Box::new(LowFrequencyStrategy));
        assert!(matches!(
            registry.validate(),
            Err(VeritasError::Configuration { .. })
        ));
        assert!(registry.independent(RuleType::DateOutlier).is_err());
    }
}
