//! Primary and foreign key model.
//!
//! A [`Key`] names one or more attributes of a table. Composite keys are
//! materialized on tables as a synthetic column named [`COMPOSITE_KEY_NAME`]
//! while a rule that needs them executes.

use serde::{Deserialize, Serialize};

use crate::error::VeritasError;
use crate::Result;

/// Column name used for materialized composite keys.
pub const COMPOSITE_KEY_NAME: &str = "composite_key";

/// Sorts attribute names case-insensitively, keeping the input order for ties.
pub fn alphabetize(names: &[String]) -> Vec<String> {
    let mut sorted = names.to_vec();
    sorted.sort_by_key(|name| name.to_lowercase());
    sorted
}

/// A key over one or more attributes of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    table_name: String,
    attribute_names: Vec<String>,
}

impl Key {
    /// Creates a key; an empty attribute list is a validation error.
    pub fn new(table_name: impl Into<String>, attribute_names: Vec<String>) -> Result<Self> {
        let table_name = table_name.into();
        if attribute_names.is_empty() {
            return Err(VeritasError::validation(format!(
                "Key on table '{}' has no attributes",
                table_name
            )));
        }
        Ok(Self {
            table_name,
            attribute_names,
        })
    }

    /// Creates a single-attribute key.
    pub fn single(table_name: impl Into<String>, attribute_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            attribute_names: vec![attribute_name.into()],
        }
    }

    /// Name of the table owning the key.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Attribute names in declaration order.
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Attribute names sorted case-insensitively.
    pub fn alphabetized_attribute_names(&self) -> Vec<String> {
        alphabetize(&self.attribute_names)
    }

    /// True for keys spanning more than one attribute.
    pub fn is_composite(&self) -> bool {
        self.attribute_names.len() > 1
    }

    /// Column holding the key's values: the attribute itself or the
    /// composite key column.
    pub fn key_name(&self) -> &str {
        if self.is_composite() {
            COMPOSITE_KEY_NAME
        } else {
            &self.attribute_names[0]
        }
    }

    /// Attribute names joined with `_`.
    pub fn full_key_name(&self) -> String {
        self.attribute_names.join("_")
    }

    /// Alphabetized attribute names joined with `_`.
    pub fn alphabetized_full_key_name(&self) -> String {
        self.alphabetized_attribute_names().join("_")
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.table_name, self.attribute_names.join(", "))
    }
}

/// A foreign key and the primary key it references.
///
/// Attributes correspond positionally: the n-th foreign attribute refers to
/// the n-th primary attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    key: Key,
    primary_key: Key,
}

impl ForeignKey {
    /// Creates a foreign key.
    ///
    /// # Errors
    /// Returns a validation error if either side is empty or the attribute
    /// counts differ.
    pub fn new(
        table_name: impl Into<String>,
        attribute_names: Vec<String>,
        primary_key_table_name: impl Into<String>,
        primary_key_attribute_names: Vec<String>,
    ) -> Result<Self> {
        let key = Key::new(table_name, attribute_names)?;
        let primary_key = Key::new(primary_key_table_name, primary_key_attribute_names)?;
        if key.attribute_names.len() != primary_key.attribute_names.len() {
            return Err(VeritasError::validation(format!(
                "Length of attributes for primary key must equal length of attributes for foreign key table {}: expected {} but got {}",
                key.table_name,
                key.attribute_names.len(),
                primary_key.attribute_names.len()
            )));
        }
        Ok(Self { key, primary_key })
    }

    /// The foreign side of the relationship.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The referenced primary key.
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// Table holding the foreign key.
    pub fn table_name(&self) -> &str {
        self.key.table_name()
    }

    /// Table holding the referenced primary key.
    pub fn primary_key_table_name(&self) -> &str {
        self.primary_key.table_name()
    }

    /// Column holding the foreign key values on the foreign table.
    pub fn key_name(&self) -> &str {
        self.key.key_name()
    }

    /// Column holding the primary key values on the primary table.
    pub fn primary_key_attribute_name(&self) -> &str {
        self.primary_key.key_name()
    }

    /// True when the relationship spans more than one attribute.
    pub fn is_composite(&self) -> bool {
        self.key.is_composite()
    }

    /// Alphabetized full name of the referenced primary key.
    pub fn alphabetized_primary_key_name(&self) -> String {
        self.primary_key.alphabetized_full_key_name()
    }

    /// Primary key attributes sorted case-insensitively.
    pub fn alphabetized_primary_key(&self) -> Vec<String> {
        self.primary_key.alphabetized_attribute_names()
    }

    /// Pairs of `(foreign attribute, primary attribute)`.
    pub fn corresponding_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.key
            .attribute_names
            .iter()
            .zip(self.primary_key.attribute_names.iter())
            .map(|(f, p)| (f.as_str(), p.as_str()))
    }

    /// Looks up the primary attribute a foreign attribute refers to.
    pub fn primary_attribute_for(&self, foreign_attribute: &str) -> Result<&str> {
        self.corresponding_names()
            .find(|(foreign, _)| *foreign == foreign_attribute)
            .map(|(_, primary)| primary)
            .ok_or_else(|| {
                VeritasError::not_found(format!(
                    "(potentially partial) key lookup {} does not exist",
                    foreign_attribute
                ))
            })
    }

    /// Looks up the foreign attribute that refers to a primary attribute.
    pub fn foreign_attribute_for(&self, primary_attribute: &str) -> Result<&str> {
        self.corresponding_names()
            .find(|(_, primary)| *primary == primary_attribute)
            .map(|(foreign, _)| foreign)
            .ok_or_else(|| {
                VeritasError::not_found(format!(
                    "(potentially partial) key lookup {} does not exist",
                    primary_attribute
                ))
            })
    }

    /// Foreign attributes, reordered to follow the alphabetized primary key.
    ///
    /// Composite keys built from this order line up with composite keys built
    /// from [`ForeignKey::alphabetized_primary_key`] on the primary table.
    pub fn foreign_attributes_ordered_by_primary_key(&self) -> Vec<String> {
        self.alphabetized_primary_key()
            .iter()
            .flat_map(|primary| {
                self.corresponding_names()
                    .filter(|(_, p)| *p == primary.as_str())
                    .map(|(f, _)| f.to_string())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Identifier of the codependent rule group this key belongs to.
    pub fn codependent_group_id(&self) -> String {
        format!(
            "{}_{}",
            self.alphabetized_primary_key_name(),
            self.primary_key_table_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_key_names() {
        let key = Key::single("orders", "order_id");
        assert!(!key.is_composite());
        assert_eq!(key.key_name(), "order_id");
        assert_eq!(key.full_key_name(), "order_id");
    }

    #[test]
    fn test_composite_key_names() {
        let key = Key::new("lines", names(&["order_id", "Line", "batch"])).unwrap();
        assert!(key.is_composite());
        assert_eq!(key.key_name(), COMPOSITE_KEY_NAME);
        assert_eq!(key.full_key_name(), "order_id_Line_batch");
        assert_eq!(key.alphabetized_full_key_name(), "batch_Line_order_id");
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(
            Key::new("t", vec![]),
            Err(VeritasError::Validation { .. })
        ));
    }

    #[test]
    fn test_foreign_key_length_mismatch() {
        let result = ForeignKey::new("a", names(&["x", "y"]), "b", names(&["x"]));
        assert!(matches!(result, Err(VeritasError::Validation { .. })));
    }

    #[test]
    fn test_corresponding_names() {
        let fk = ForeignKey::new(
            "shipments",
            names(&["ord", "ln"]),
            "lines",
            names(&["order_id", "line_no"]),
        )
        .unwrap();
        assert_eq!(fk.primary_attribute_for("ln").unwrap(), "line_no");
        assert_eq!(fk.foreign_attribute_for("order_id").unwrap(), "ord");
        assert!(matches!(
            fk.primary_attribute_for("missing"),
            Err(VeritasError::NotFound { .. })
        ));
    }

    #[test]
    fn test_foreign_attributes_follow_alphabetized_primary_key() {
        let fk = ForeignKey::new(
            "shipments",
            names(&["ord", "ln"]),
            "lines",
            names(&["order_id", "line_no"]),
        )
        .unwrap();
        // line_no sorts before order_id
        assert_eq!(fk.alphabetized_primary_key(), names(&["line_no", "order_id"]));
        assert_eq!(fk.foreign_attributes_ordered_by_primary_key(), names(&["ln", "ord"]));
        assert_eq!(fk.codependent_group_id(), "line_no_order_id_lines");
    }

    #[test]
    fn test_single_foreign_key_group_id() {
        let fk = ForeignKey::new("orders", names(&["cust"]), "customers", names(&["id"])).unwrap();
        assert_eq!(fk.key_name(), "cust");
        assert_eq!(fk.primary_key_attribute_name(), "id");
        assert_eq!(fk.codependent_group_id(), "id_customers");
    }
}
