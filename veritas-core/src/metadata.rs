//! Annotated metadata document model.
//!
//! The metadata document describes every table of a dataset: its
//! attributes with their resolved data-quality class, units and precomputed
//! statistics, and the table's key relationships. Unknown fields are kept so
//! the document can be re-emitted with quality summaries attached.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VeritasError;
use crate::keys::ForeignKey;
use crate::values::as_number;
use crate::Result;

/// Well-known statistic names in an attribute's `dataQuality` list.
pub mod metrics {
    /// Number of non-null values
    pub const COUNT: &str = "Count";
    /// Smallest value
    pub const MINIMUM_VALUE: &str = "Minimum Value";
    /// Largest value
    pub const MAXIMUM_VALUE: &str = "Maximum Value";
    /// Arithmetic mean
    pub const MEAN: &str = "Mean";
    /// Median value
    pub const MEDIAN: &str = "Median";
    /// Sample standard deviation
    pub const STANDARD_DEVIATION: &str = "Standard Deviation";
    /// Adjusted Fisher-Pearson skewness
    pub const SKEWNESS: &str = "Skewness";
    /// Excess kurtosis
    pub const KURTOSIS: &str = "Kurtosis";
    /// Ratio of net direction to number of steps
    pub const MONOTONICITY_RATIO: &str = "Monotonicity Ratio";
    /// Categorical metric carrying the frequency table
    pub const NUMBER_OF_CATEGORIES: &str = "Number of Categories";
}

/// Semantic role of a column, driving which rules apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum DataQualityClass {
    /// Single-attribute primary key
    #[serde(rename = "primary_key")]
    PrimaryKey,
    /// Member of a multi-attribute primary key
    #[serde(rename = "composite_primary_key")]
    CompositePrimaryKey,
    /// Single-attribute foreign key
    #[serde(rename = "foreign_key")]
    ForeignKey,
    /// Member of a multi-attribute foreign key
    #[serde(rename = "composite_foreign_key")]
    CompositeForeignKey,
    /// Member of a composite primary key that is also a foreign key
    #[serde(rename = "composite_primary_key_foreign_key")]
    CompositePrimaryKeyForeignKey,
    /// Ordered sequence such as a counter or timestamp series
    #[serde(rename = "sequence")]
    Sequence,
    /// Categorical values with a frequency table
    #[serde(rename = "categorical")]
    Categorical,
    /// Continuous numeric values
    #[serde(rename = "numerical")]
    Numerical,
    /// Calendar dates
    #[serde(rename = "date")]
    Date,
    /// Date and time of day
    #[serde(rename = "date-time")]
    DateTime,
    /// Time of day
    #[serde(rename = "time")]
    Time,
    /// No data-quality semantics
    #[default]
    #[serde(rename = "none")]
    None,
}

impl DataQualityClass {
    /// All classes, in declaration order.
    pub const ALL: [DataQualityClass; 12] = [
        Self::PrimaryKey,
        Self::CompositePrimaryKey,
        Self::ForeignKey,
        Self::CompositeForeignKey,
        Self::CompositePrimaryKeyForeignKey,
        Self::Sequence,
        Self::Categorical,
        Self::Numerical,
        Self::Date,
        Self::DateTime,
        Self::Time,
        Self::None,
    ];

    /// Returns the metadata spelling of the class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "primary_key",
            Self::CompositePrimaryKey => "composite_primary_key",
            Self::ForeignKey => "foreign_key",
            Self::CompositeForeignKey => "composite_foreign_key",
            Self::CompositePrimaryKeyForeignKey => "composite_primary_key_foreign_key",
            Self::Sequence => "sequence",
            Self::Categorical => "categorical",
            Self::Numerical => "numerical",
            Self::Date => "date",
            Self::DateTime => "date-time",
            Self::Time => "time",
            Self::None => "none",
        }
    }

    /// True for classes that make an attribute part of the table's primary key.
    pub fn is_primary_key(&self) -> bool {
        matches!(
            self,
            Self::PrimaryKey | Self::CompositePrimaryKey | Self::CompositePrimaryKeyForeignKey
        )
    }

    /// True for classes whose uniqueness is checked over the whole composite key.
    pub fn is_composite_primary_key(&self) -> bool {
        matches!(
            self,
            Self::CompositePrimaryKey | Self::CompositePrimaryKeyForeignKey
        )
    }
}

impl fmt::Display for DataQualityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataQualityClass {
    type Err = VeritasError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| VeritasError::validation(format!("Unknown data quality class '{}'", s)))
    }
}

/// Identifier distinguishing several keys that reference the same table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    /// Numeric identifier, the common case
    Number(i64),
    /// Free-form identifier
    Text(String),
}

impl Default for KeyId {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One attribute pairing in `refersToPrimaryKeyTables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReference {
    /// Attribute on the referring table
    pub foreign_key: String,
    /// Attribute on the referenced table
    pub foreign_key_refers_to: String,
    /// Groups pairings belonging to the same (possibly composite) key
    #[serde(rename = "keyID", default)]
    pub key_id: KeyId,
}

/// Key relationships of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationships {
    /// Attributes forming the table's primary key, in key order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keys: Option<Vec<String>>,
    /// Referenced table name to attribute pairings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refers_to_primary_key_tables: BTreeMap<String, Vec<KeyReference>>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One categorical value's frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frequency {
    /// Category value
    pub name: Value,
    /// Number of occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Value>,
    /// Share of non-null rows, in percent
    pub frequency_percent: Value,
}

/// A named statistic attached to an attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    /// Statistic name, see [`metrics`]
    pub name: String,
    /// Statistic value
    #[serde(default)]
    pub value: Value,
    /// Frequency table for categorical attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequencies: Option<Vec<Frequency>>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata for one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMetadata {
    /// Column name
    pub name: String,
    /// Resolved data-quality class
    #[serde(default)]
    pub data_quality_class: DataQualityClass,
    /// Unit name, strftime format, or `n/a`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Precomputed statistics
    #[serde(default)]
    pub data_quality: Vec<Metric>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttributeMetadata {
    /// Creates attribute metadata with no statistics.
    pub fn new(name: impl Into<String>, data_quality_class: DataQualityClass) -> Self {
        Self {
            name: name.into(),
            data_quality_class,
            units: None,
            data_quality: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder method to set the units.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Builder method to add a statistic.
    pub fn with_metric(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data_quality.push(Metric {
            name: name.into(),
            value,
            frequencies: None,
            extra: Map::new(),
        });
        self
    }

    /// Builder method to set the categorical frequency table.
    pub fn with_frequencies(mut self, frequencies: Vec<Frequency>) -> Self {
        let count = frequencies.len();
        self.data_quality.push(Metric {
            name: metrics::NUMBER_OF_CATEGORIES.to_string(),
            value: Value::from(count),
            frequencies: Some(frequencies),
            extra: Map::new(),
        });
        self
    }

    /// Looks up a statistic by name. A later duplicate wins.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.data_quality.iter().rev().find(|m| m.name == name)
    }

    /// Returns true if the statistic is present.
    pub fn has_metric(&self, name: &str) -> bool {
        self.metric(name).is_some()
    }

    /// Returns a statistic's raw value; absent statistics are `NotFound`.
    pub fn metric_value(&self, name: &str) -> Result<&Value> {
        self.metric(name).map(|m| &m.value).ok_or_else(|| {
            VeritasError::not_found(format!(
                "Metric '{}' is missing for attribute '{}'",
                name, self.name
            ))
        })
    }

    /// Returns a statistic coerced to a number, if present and numeric.
    pub fn metric_number(&self, name: &str) -> Option<f64> {
        self.metric(name).and_then(|m| as_number(&m.value))
    }

    /// Returns the categorical frequency table.
    pub fn frequencies(&self) -> Result<&[Frequency]> {
        self.metric(metrics::NUMBER_OF_CATEGORIES)
            .and_then(|m| m.frequencies.as_deref())
            .ok_or_else(|| {
                VeritasError::not_found(format!(
                    "Attribute '{}' has no categorical frequencies",
                    self.name
                ))
            })
    }

    /// Units with the `n/a` and empty spellings removed.
    pub fn declared_units(&self) -> Option<&str> {
        self.units
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case(crate::constraints::NOT_APPLICABLE))
    }
}

/// Metadata for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// Table name, matching the dataset table it describes
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object type, usually `table`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Row count recorded by profiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Value>,
    /// Key relationships
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Relationships>,
    /// Quality summary attached after distillation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality_summary: Option<Value>,
    /// Column metadata
    #[serde(default)]
    pub attributes: Vec<AttributeMetadata>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TableMetadata {
    /// Creates table metadata with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            object_type: Some("table".to_string()),
            count: None,
            relationships: None,
            data_quality_summary: None,
            attributes: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder method to add an attribute.
    pub fn with_attribute(mut self, attribute: AttributeMetadata) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Builder method to set the primary key.
    pub fn with_primary_keys(mut self, primary_keys: Vec<String>) -> Self {
        self.relationships
            .get_or_insert_with(Relationships::default)
            .primary_keys = Some(primary_keys);
        self
    }

    /// Builder method to add a reference to another table's primary key.
    pub fn with_reference(
        mut self,
        primary_table: impl Into<String>,
        foreign_key: impl Into<String>,
        refers_to: impl Into<String>,
        key_id: KeyId,
    ) -> Self {
        self.relationships
            .get_or_insert_with(Relationships::default)
            .refers_to_primary_key_tables
            .entry(primary_table.into())
            .or_default()
            .push(KeyReference {
                foreign_key: foreign_key.into(),
                foreign_key_refers_to: refers_to.into(),
                key_id,
            });
        self
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Primary key attributes, empty when none are declared.
    pub fn primary_keys(&self) -> &[String] {
        self.relationships
            .as_ref()
            .and_then(|r| r.primary_keys.as_deref())
            .unwrap_or_default()
    }

    /// Distinct `(referenced table, key id)` pairs, sorted.
    pub fn primary_key_table_references(&self) -> Vec<(String, KeyId)> {
        let Some(relationships) = &self.relationships else {
            return Vec::new();
        };
        let mut references = BTreeSet::new();
        for (table, keys) in &relationships.refers_to_primary_key_tables {
            for key in keys {
                references.insert((table.clone(), key.key_id.clone()));
            }
        }
        references.into_iter().collect()
    }

    /// Foreign and referenced attribute names of one key, in pairing order.
    ///
    /// # Errors
    /// `NotFound` if the table has no reference to `primary_table`.
    pub fn key_attributes(
        &self,
        primary_table: &str,
        key_id: &KeyId,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let references = self
            .relationships
            .as_ref()
            .and_then(|r| r.refers_to_primary_key_tables.get(primary_table))
            .ok_or_else(|| {
                VeritasError::not_found(format!(
                    "Table {} references no primary key table {}",
                    self.name, primary_table
                ))
            })?;

        Ok(references
            .iter()
            .filter(|r| &r.key_id == key_id)
            .map(|r| (r.foreign_key.clone(), r.foreign_key_refers_to.clone()))
            .unzip())
    }

    /// Builds the foreign key referencing `primary_table` with the given id.
    ///
    /// # Errors
    /// `NotFound` if the table has no such reference, `Validation` if the
    /// pairings do not form a valid key.
    pub fn foreign_key(&self, primary_table: &str, key_id: &KeyId) -> Result<ForeignKey> {
        let (foreign, primary) = self.key_attributes(primary_table, key_id)?;
        ForeignKey::new(self.name.clone(), foreign, primary_table, primary)
    }

    /// True if a uniqueness rule for the composite primary key is owned by
    /// another attribute.
    ///
    /// The first attribute listed in `primaryKeys` owns the rule, whatever
    /// the order of the attribute list.
    pub fn composite_uniqueness_rule_previously_covered(&self, attribute_name: &str) -> Result<bool> {
        match self.primary_keys().first() {
            Some(first) => Ok(first != attribute_name),
            None => Err(VeritasError::validation(format!(
                "Table {} has composite primary key attributes but no primaryKeys",
                self.name
            ))),
        }
    }
}

/// The annotated metadata document for a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    /// Dataset name
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Link echoed into the dataset quality summary
    #[serde(rename = "referenceURL", default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    /// Quality summary attached after distillation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality_summary: Option<Value>,
    /// Tables of the dataset
    #[serde(default)]
    pub objects: Vec<TableMetadata>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasetMetadata {
    /// Creates an empty document.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            reference_url: None,
            data_quality_summary: None,
            objects: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder method to add a table.
    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.objects.push(table);
        self
    }

    /// Parses a metadata document from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| VeritasError::serialization("Parsing metadata document", e))
    }

    /// Parses a metadata document from JSON text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| VeritasError::serialization("Parsing metadata document", e))
    }

    /// Loads a metadata document from a file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            VeritasError::io(format!("Failed to open metadata file {}", path.display()), e)
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.objects.iter().find(|t| t.name == name)
    }

    /// Fills `primaryKeys` from attribute classes for tables that lack them.
    ///
    /// Attributes classed as primary keys are listed in attribute order. Two
    /// tables whose derived primary keys are identical are ambiguous for
    /// reference resolution and are rejected unless `use_annotations` is set.
    pub fn map_primary_keys(&mut self, use_annotations: bool) -> Result<()> {
        let mut derived: Vec<(String, Vec<String>)> = Vec::new();

        for table in &mut self.objects {
            if table.relationships.as_ref().is_some_and(|r| r.primary_keys.is_some()) {
                continue;
            }
            let keys: Vec<String> = table
                .attributes
                .iter()
                .filter(|a| a.data_quality_class.is_primary_key())
                .map(|a| a.name.clone())
                .collect();
            if keys.is_empty() {
                continue;
            }
            tracing::debug!("Derived primary key {:?} for table {}", keys, table.name);
            table
                .relationships
                .get_or_insert_with(Relationships::default)
                .primary_keys = Some(keys.clone());
            derived.push((table.name.clone(), keys));
        }

        if use_annotations {
            return Ok(());
        }
        for (index, (table, keys)) in derived.iter().enumerate() {
            if let Some((other, _)) = derived[index + 1..].iter().find(|(_, k)| k == keys) {
                return Err(VeritasError::validation(format!(
                    "Duplicate primary keys from tables {},{}. Manual annotations required.",
                    table, other
                )));
            }
        }
        Ok(())
    }
}
