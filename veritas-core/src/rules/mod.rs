//! Rule model, rule book and rule generation.
//!
//! Rules are generated from the annotated metadata and the constraint store.
//! Most rules check a single attribute and run independently of each other.
//! Reference rules check foreign keys against their primary key tables and
//! are collected into codependent groups, one per referenced key, because an
//! orphaned value's classification depends on every table that refers to it.
//!
//! # Example
//! ```rust,ignore
//! use veritas_core::rules::RuleBook;
//!
//! let rule_book = RuleBook::generate(&metadata, &constraints)?;
//! for entry in rule_book.catalog_entries(true) {
//!     println!("{} {} {}", entry.rule_id, entry.table_name, entry.rule_description);
//! }
//! ```

mod book;
mod generation;
mod parameters;
mod types;

pub use book::{
    CodependentRuleGroup, Rule, RuleBook, RuleCatalogEntry, RuleIdGenerator, TABLE_RULE_ATTRIBUTE,
};
pub use generation::{RuleBookBuilder, rule_types_for};
pub use parameters::{RuleParameters, UnitConstraint};
pub use types::{CodependentRuleGroupKind, RuleType};
