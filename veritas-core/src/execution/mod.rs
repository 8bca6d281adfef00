//! Rule book execution.
//!
//! Independent rules run first, each against its own table. Codependent
//! groups follow, each through the precondition, execute, assign and
//! postcondition steps of its strategy. Strategies are resolved from a
//! [`StrategyRegistry`] validated when the engine is built, so an unknown
//! rule type fails at startup rather than mid-run.
//!
//! Failures scoped to one rule (an unknown column, a malformed key) skip that
//! rule and are reported; anything else aborts the run.
//!
//! # Example
//! ```rust,ignore
//! use veritas_core::error_state::ErrorStateRegistry;
//! use veritas_core::execution::RuleBookExecution;
//!
//! let registry = ErrorStateRegistry::standard();
//! let engine = RuleBookExecution::new(&registry)?;
//! let report = engine.execute_rules(&mut dataset, &rule_book)?;
//! println!("{} rules executed, {} skipped", report.executed_rules, report.skipped.len());
//! ```

mod independent;
mod reference;
mod strategy;

use serde::{Deserialize, Serialize};

use crate::error::VeritasError;
use crate::error_state::ErrorStateRegistry;
use crate::rules::{CodependentRuleGroup, Rule, RuleBook};
use crate::table::{CompositeKeyScope, Dataset};
use crate::Result;

pub use independent::{
    DateOutlierStrategy, FormatOutlierStrategy, KeyUniquenessStrategy, LowFrequencyStrategy,
    NormalOutlierStrategy, SequentialOutlierStrategy, TimeOutlierStrategy, UnitOutlierStrategy,
};
pub use reference::{ForeignKeyMissing, MissingResult, MissingSubset, ReferenceKeyStrategy};
pub use strategy::{CodependentRuleStrategy, IndependentRuleStrategy, StrategyRegistry};

/// A rule or group that was skipped after a rule-scoped failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    /// Rule id or codependent group id
    pub scope: String,
    /// Table the rule or group runs against
    pub table_name: String,
    /// Why it was skipped
    pub reason: String,
}

/// Outcome of executing a rule book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Independent rules that ran to completion
    pub executed_rules: usize,
    /// Codependent groups that ran to completion
    pub executed_groups: usize,
    /// Rules and groups skipped
    pub skipped: Vec<SkippedRule>,
}

impl ExecutionReport {
    /// Returns true if nothing was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Runs the active rules of a rule book against a dataset.
#[derive(Debug)]
pub struct RuleBookExecution<'r> {
    registry: &'r ErrorStateRegistry,
    strategies: StrategyRegistry,
}

impl<'r> RuleBookExecution<'r> {
    /// Engine with the standard strategies.
    ///
    /// # Errors
    /// Never for the standard strategies; see [`Self::with_strategies`].
    pub fn new(registry: &'r ErrorStateRegistry) -> Result<Self> {
        Self::with_strategies(registry, StrategyRegistry::standard())
    }

    /// Engine with custom strategies.
    ///
    /// # Errors
    /// `Configuration` if a rule type or group kind has no strategy.
    pub fn with_strategies(
        registry: &'r ErrorStateRegistry,
        strategies: StrategyRegistry,
    ) -> Result<Self> {
        strategies.validate()?;
        Ok(Self {
            registry,
            strategies,
        })
    }

    /// Executes every active rule, independent rules first.
    ///
    /// # Errors
    /// Returns the first error that is not scoped to a single rule.
    pub fn execute_rules(&self, dataset: &mut Dataset, rule_book: &RuleBook) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();

        for rule in rule_book.iterate_independent_rules(false) {
            match self.execute_independent(dataset, rule) {
                Ok(()) => report.executed_rules += 1,
                Err(e) if e.is_rule_scoped() => {
                    tracing::warn!("Skipping rule {}: {}", rule.rule_id(), e);
                    report.skipped.push(SkippedRule {
                        scope: rule.rule_id().to_string(),
                        table_name: rule.table_name().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!("Executed {} independent rules", report.executed_rules);

        for group in rule_book.iterate_codependent_rule_groups(false) {
            match self.execute_codependent(dataset, group) {
                Ok(()) => report.executed_groups += 1,
                Err(e) if e.is_rule_scoped() => {
                    tracing::warn!("Skipping rule group {}: {}", group.group_id(), e);
                    let table_name = group
                        .iterate(false)
                        .next()
                        .map(|rule| rule.table_name().to_string())
                        .unwrap_or_default();
                    report.skipped.push(SkippedRule {
                        scope: group.group_id().to_string(),
                        table_name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!("Executed {} codependent rule groups", report.executed_groups);

        Ok(report)
    }

    fn execute_independent(&self, dataset: &mut Dataset, rule: &Rule) -> Result<()> {
        let strategy = self.strategies.independent(rule.rule_type())?;
        let table = dataset.get_mut(rule.table_name())?;
        tracing::debug!(
            "Executing rule {} ({}) on {}",
            rule.rule_id(),
            rule.rule_type(),
            rule.table_name()
        );
        strategy.execute_rule(table, rule, self.registry)
    }

    fn execute_codependent(&self, dataset: &mut Dataset, group: &CodependentRuleGroup) -> Result<()> {
        let strategy = self.strategies.codependent(group.kind())?;
        if group.rule_type().is_some_and(|rule_type| !rule_type.is_codependent()) {
            return Err(VeritasError::invariant(format!(
                "Rule group {} holds independent rules",
                group.group_id()
            )));
        }
        tracing::debug!(
            "Executing rule group {} ({}) with {} rules",
            group.group_id(),
            group.kind(),
            group.len()
        );

        let mut scope = CompositeKeyScope::new(dataset);
        let outcome = strategy
            .precondition_data(&mut scope, group)
            .and_then(|()| strategy.execute_rule(&mut scope, group))
            .and_then(|result| strategy.assign_error_values(&mut scope, &result, self.registry));
        strategy.postcondition_data(scope);
        outcome
    }
}
