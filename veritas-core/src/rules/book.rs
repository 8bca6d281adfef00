//! Rules, codependent rule groups and the rule book.

use serde::{Deserialize, Serialize};

use super::parameters::RuleParameters;
use super::types::{CodependentRuleGroupKind, RuleType};

/// Attribute name reported for rules scoped to a whole table.
pub const TABLE_RULE_ATTRIBUTE: &str = "N/A";

/// One generated data-quality rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    rule_id: u64,
    table_name: String,
    attribute_name: Option<String>,
    parameters: RuleParameters,
}

impl Rule {
    /// Creates a rule checking an attribute.
    pub fn for_attribute(
        rule_id: u64,
        table_name: impl Into<String>,
        attribute_name: impl Into<String>,
        parameters: RuleParameters,
    ) -> Self {
        Self {
            rule_id,
            table_name: table_name.into(),
            attribute_name: Some(attribute_name.into()),
            parameters,
        }
    }

    /// Creates a rule checking a table relationship.
    pub fn for_table(rule_id: u64, table_name: impl Into<String>, parameters: RuleParameters) -> Self {
        Self {
            rule_id,
            table_name: table_name.into(),
            attribute_name: None,
            parameters,
        }
    }

    /// Unique, monotonically assigned identifier.
    pub fn rule_id(&self) -> u64 {
        self.rule_id
    }

    /// Table the rule runs against.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Attribute the rule checks; `None` for table rules.
    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute_name.as_deref()
    }

    /// Attribute name as written to catalogs.
    pub fn catalog_attribute_name(&self) -> &str {
        self.attribute_name().unwrap_or(TABLE_RULE_ATTRIBUTE)
    }

    /// The rule's parameters.
    pub fn parameters(&self) -> &RuleParameters {
        &self.parameters
    }

    /// The rule's type.
    pub fn rule_type(&self) -> RuleType {
        self.parameters.rule_type()
    }

    /// Whether the rule executes.
    pub fn is_active(&self) -> bool {
        self.parameters.is_active()
    }

    /// The rule's rules-catalog row.
    pub fn catalog_entry(&self) -> RuleCatalogEntry {
        RuleCatalogEntry {
            rule_id: self.rule_id,
            table_name: self.table_name.clone(),
            attribute_name: self.catalog_attribute_name().to_string(),
            is_active: self.is_active(),
            rule_description: self.rule_type().description().to_string(),
        }
    }
}

/// A row of the rules catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalogEntry {
    /// Rule identifier
    pub rule_id: u64,
    /// Table the rule runs against
    pub table_name: String,
    /// Checked attribute, `N/A` for table rules
    pub attribute_name: String,
    /// Whether the rule executes
    pub is_active: bool,
    /// Description of the rule type
    pub rule_description: String,
}

/// Hands out rule identifiers from a single counter.
#[derive(Debug, Clone, Default)]
pub struct RuleIdGenerator {
    next_rule_id: u64,
}

impl RuleIdGenerator {
    /// Creates a generator whose first identifier is `start`.
    pub fn new(start: u64) -> Self {
        Self { next_rule_id: start }
    }

    /// Returns the next identifier and advances the counter.
    pub fn generate_next_id(&mut self) -> u64 {
        let id = self.next_rule_id;
        self.next_rule_id += 1;
        id
    }

    /// Returns the next identifier without advancing.
    pub fn peek_next_id(&self) -> u64 {
        self.next_rule_id
    }
}

/// Rules whose classifications depend on executing them together.
///
/// All foreign keys referencing the same primary key of the same table share
/// a group, since an orphaned value seen from several tables is classified
/// differently than one seen from a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodependentRuleGroup {
    group_id: String,
    kind: CodependentRuleGroupKind,
    rules: Vec<Rule>,
}

impl CodependentRuleGroup {
    /// Creates an empty group.
    pub fn new(group_id: impl Into<String>, kind: CodependentRuleGroupKind) -> Self {
        Self {
            group_id: group_id.into(),
            kind,
            rules: Vec::new(),
        }
    }

    /// The shared join key of the group.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The group's kind, selecting its execution strategy.
    pub fn kind(&self) -> CodependentRuleGroupKind {
        self.kind
    }

    /// Rule type of the group's rules, `None` while empty.
    pub fn rule_type(&self) -> Option<RuleType> {
        self.rules.first().map(Rule::rule_type)
    }

    /// A group is active while any of its rules is.
    pub fn is_active(&self) -> bool {
        self.rules.iter().any(Rule::is_active)
    }

    /// Adds a rule to the group.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Iterates over the group's rules, skipping inactive ones unless asked.
    pub fn iterate(&self, include_inactive: bool) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |rule| include_inactive || rule.is_active())
    }

    /// Number of rules in the group.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the group has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The complete rule set for a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleBook {
    codependent: Vec<CodependentRuleGroup>,
    independent: Vec<Rule>,
}

impl RuleBook {
    /// Creates a rule book from its parts.
    pub fn new(codependent: Vec<CodependentRuleGroup>, independent: Vec<Rule>) -> Self {
        Self {
            codependent,
            independent,
        }
    }

    /// Codependent groups in creation order.
    pub fn iterate_codependent_rule_groups(
        &self,
        include_inactive: bool,
    ) -> impl Iterator<Item = &CodependentRuleGroup> {
        self.codependent
            .iter()
            .filter(move |group| include_inactive || group.is_active())
    }

    /// Independent rules in generation order.
    pub fn iterate_independent_rules(&self, include_inactive: bool) -> impl Iterator<Item = &Rule> {
        self.independent
            .iter()
            .filter(move |rule| include_inactive || rule.is_active())
    }

    /// Rules-catalog rows: codependent groups first, then independent rules.
    pub fn catalog_entries(&self, include_inactive: bool) -> Vec<RuleCatalogEntry> {
        self.iterate_codependent_rule_groups(include_inactive)
            .flat_map(|group| group.iterate(include_inactive))
            .chain(self.iterate_independent_rules(include_inactive))
            .map(Rule::catalog_entry)
            .collect()
    }

    /// Total number of rules, active or not.
    pub fn len(&self) -> usize {
        self.independent.len() + self.codependent.iter().map(CodependentRuleGroup::len).sum::<usize>()
    }

    /// Returns true if no rules were generated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of active rules.
    pub fn active_count(&self) -> usize {
        self.catalog_entries(false).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ForeignKey, Key};
    use serde_json::json;

    fn low_frequency(id: u64, values: Vec<serde_json::Value>) -> Rule {
        Rule::for_attribute(
            id,
            "t",
            "tier",
            RuleParameters::LowFrequency {
                low_frequency_values: values,
            },
        )
    }

    fn reference(id: u64, table: &str) -> Rule {
        let foreign_key =
            ForeignKey::new(table, vec!["customer".into()], "customers", vec!["id".into()]).unwrap();
        Rule::for_table(id, table, RuleParameters::Reference { foreign_key })
    }

    #[test]
    fn test_id_generator() {
        let mut ids = RuleIdGenerator::new(5);
        assert_eq!(ids.peek_next_id(), 5);
        assert_eq!(ids.generate_next_id(), 5);
        assert_eq!(ids.generate_next_id(), 6);
        assert_eq!(ids.peek_next_id(), 7);
    }

    #[test]
    fn test_catalog_entry_for_table_rule() {
        let entry = reference(3, "orders").catalog_entry();
        assert_eq!(entry.attribute_name, "N/A");
        assert_eq!(entry.rule_description, "Foreign key must have corresponding primary key");
        assert!(entry.is_active);
    }

    #[test]
    fn test_group_activity() {
        let mut group = CodependentRuleGroup::new(
            "id_customers",
            CodependentRuleGroupKind::PrimaryKeyReferenceChecks,
        );
        assert!(!group.is_active());
        assert_eq!(group.rule_type(), None);

        group.add_rule(reference(0, "orders"));
        assert!(group.is_active());
        assert_eq!(group.rule_type(), Some(RuleType::ReferencedPrimaryKeyExists));
    }

    #[test]
    fn test_inactive_rules_are_filtered() {
        let mut group = CodependentRuleGroup::new(
            "id_customers",
            CodependentRuleGroupKind::PrimaryKeyReferenceChecks,
        );
        group.add_rule(reference(2, "orders"));
        let book = RuleBook::new(
            vec![group],
            vec![
                low_frequency(0, vec![]),
                low_frequency(1, vec![json!("rare")]),
                Rule::for_attribute(
                    3,
                    "t",
                    "b",
                    RuleParameters::Uniqueness {
                        primary_key: Key::new("t", vec!["a".into(), "b".into()]).unwrap(),
                        covered_under_another_rule: true,
                    },
                ),
            ],
        );

        assert_eq!(book.len(), 4);
        assert_eq!(book.active_count(), 2);
        let ids: Vec<u64> = book.catalog_entries(false).iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![2, 1]);
        let all: Vec<u64> = book.catalog_entries(true).iter().map(|e| e.rule_id).collect();
        assert_eq!(all, vec![2, 0, 1, 3]);
    }
}
