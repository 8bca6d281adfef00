//! Dataset table abstraction.
//!
//! A [`DatasetTable`] exposes query operations over one table's records and
//! a per-record side channel of error bits and error probabilities that rule
//! execution writes to. Storage is left to implementors; the queries are
//! provided methods built on column access, so every backend answers them
//! the same way. [`InMemoryTable`] is the columnar backend used by the
//! pipeline.
//!
//! Queries that match nothing return `None` instead of an empty row set so
//! callers can skip error-state assignment.

mod dates;
mod format;
mod memory;
mod sequential;
mod statistics;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::ConstraintRange;
use crate::error::VeritasError;
use crate::error_state::ErrorState;
use crate::keys::ForeignKey;
use crate::values::{as_number, display_value, is_missing, value_key};
use crate::Result;

pub use dates::{hour_of, parse_date_time, parse_time, year_of};
pub use format::{compile_format, format_pattern};
pub use memory::InMemoryTable;
pub use sequential::identify_sequential_outliers;
pub use statistics::{
    NormalDistribution, SummaryStatistics, kurtosis, mean, median, monotonicity_ratio,
    sample_std_dev, skewness,
};

/// Row indices matched by a query, sorted and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRows(Vec<usize>);

impl AffectedRows {
    /// Wraps row indices, returning `None` when there are none.
    pub fn new(mut rows: Vec<usize>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        rows.sort_unstable();
        rows.dedup();
        Some(Self(rows))
    }

    /// Builds the row set from a per-row mask.
    pub fn from_mask(mask: &[bool]) -> Option<Self> {
        Self::new(
            mask.iter()
                .enumerate()
                .filter_map(|(row, hit)| hit.then_some(row))
                .collect(),
        )
    }

    /// Sorted row indices.
    pub fn rows(&self) -> &[usize] {
        &self.0
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowest row index.
    pub fn first(&self) -> usize {
        self.0[0]
    }

    /// Iterates over the row indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

/// One foreign key value absent from the referenced table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValue {
    /// The value as first seen
    pub value: Value,
    /// Rows of the referring table holding it
    pub count: usize,
}

/// Rows whose foreign key value is missing from the referenced table.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingRecords {
    rows: AffectedRows,
    values: BTreeMap<String, MissingValue>,
}

impl MissingRecords {
    /// Affected rows of the referring table.
    pub fn rows(&self) -> &AffectedRows {
        &self.rows
    }

    /// Missing values keyed by their comparison key.
    pub fn values(&self) -> &BTreeMap<String, MissingValue> {
        &self.values
    }

    /// Number of distinct missing values.
    pub fn distinct_count(&self) -> usize {
        self.values.len()
    }
}

/// An entry of a table's error catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// Table the error was found in
    pub table_name: String,
    /// Attribute the rule checked
    pub attribute_name: String,
    /// Description of the error state
    pub error_state: String,
    /// Probability that a flagged record is erroneous
    pub probability: f64,
    /// Number of flagged records
    pub num_affected: usize,
    /// Value of the first flagged record
    pub example_affected_value: Value,
}

/// Query and error-state capabilities of one dataset table.
pub trait DatasetTable: fmt::Debug + Send + Sync {
    /// Name of the table.
    fn table_name(&self) -> &str;

    /// Number of records.
    fn num_rows(&self) -> usize;

    /// Data column names in source order, excluding synthetic columns.
    fn column_names(&self) -> Vec<String>;

    /// Values of a column, including a materialized composite key.
    ///
    /// # Errors
    /// `NotFound` if the column does not exist.
    fn column(&self, attribute_name: &str) -> Result<&[Value]>;

    /// Materializes the composite key column from component attributes.
    fn create_composite_key(&mut self, attributes: &[String]) -> Result<()>;

    /// Removes the composite key column, if present.
    fn drop_composite_key(&mut self);

    /// Per-record error bitmasks.
    fn error_states(&self) -> &[u64];

    /// Per-record error probabilities.
    fn error_probabilities(&self) -> &[f64];

    /// Fractional count of records missing from this table.
    fn missing_records(&self) -> f64;

    /// Adds to the fractional missing-record count.
    fn add_missing(&mut self, amount: f64);

    /// The table's error catalog.
    fn errors(&self) -> &[ErrorLogEntry];

    /// ORs the state's bit into the given rows and raises their probability
    /// to the state's probability where it is currently lower.
    fn merge_error_state(&mut self, rows: &AffectedRows, error_state: &ErrorState);

    /// Appends an entry to the error catalog.
    fn log_error(&mut self, entry: ErrorLogEntry);

    /// Returns true if the column exists.
    fn has_column(&self, attribute_name: &str) -> bool {
        self.column(attribute_name).is_ok()
    }

    /// Rows with numeric values outside the range.
    fn get_rows_outside_numerical_constraint(
        &self,
        attribute_name: &str,
        range: &ConstraintRange,
    ) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| as_number(v).is_some_and(|n| !range.contains(n)))
                .collect::<Vec<_>>(),
        ))
    }

    /// Rows with numeric values inside either standard-deviation band.
    ///
    /// The lower band is closed below and open above; the upper band is open
    /// below and closed above.
    fn get_values_outside_std_dev(
        &self,
        attribute_name: &str,
        lower: &ConstraintRange,
        higher: &ConstraintRange,
    ) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| {
                    as_number(v).is_some_and(|n| {
                        (n >= lower.lower_bound && n < lower.upper_bound)
                            || (n > higher.lower_bound && n <= higher.upper_bound)
                    })
                })
                .collect::<Vec<_>>(),
        ))
    }

    /// Rows whose parsed year lies outside the range. Unparsable values are
    /// excluded.
    fn get_rows_outside_date_constraint(
        &self,
        attribute_name: &str,
        range: &ConstraintRange,
    ) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| year_of(v).is_some_and(|year| !range.contains(f64::from(year))))
                .collect::<Vec<_>>(),
        ))
    }

    /// Rows whose parsed hour lies outside the range. Unparsable values are
    /// excluded.
    fn get_rows_outside_time_constraint(
        &self,
        attribute_name: &str,
        range: &ConstraintRange,
    ) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| hour_of(v).is_some_and(|hour| !range.contains(f64::from(hour))))
                .collect::<Vec<_>>(),
        ))
    }

    /// Non-null rows not matching the compiled format.
    fn get_rows_outside_format_constraint(
        &self,
        attribute_name: &str,
        format_regex: &Regex,
    ) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| !v.is_null() && !format_regex.is_match(&display_value(v)))
                .collect::<Vec<_>>(),
        ))
    }

    /// Rows whose value equals any of `values`.
    fn get_rows_where_attribute_values_equal(
        &self,
        attribute_name: &str,
        values: &[Value],
    ) -> Result<Option<AffectedRows>> {
        let wanted: HashSet<String> = values.iter().filter_map(value_key).collect();
        let column = self.column(attribute_name)?;
        Ok(AffectedRows::from_mask(
            &column
                .iter()
                .map(|v| value_key(v).is_some_and(|k| wanted.contains(&k)))
                .collect::<Vec<_>>(),
        ))
    }

    /// Every row sharing its value with another row. Nulls are excluded.
    fn get_rows_with_duplicate_values(&self, attribute_name: &str) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        let keys: Vec<Option<String>> = column.iter().map(value_key).collect();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for key in keys.iter().flatten() {
            *counts.entry(key.as_str()).or_default() += 1;
        }
        Ok(AffectedRows::from_mask(
            &keys
                .iter()
                .map(|k| k.as_deref().is_some_and(|k| counts.get(k).copied().unwrap_or(0) > 1))
                .collect::<Vec<_>>(),
        ))
    }

    /// Distinct non-null values of a column, in first-seen order.
    fn get_list_of_values(&self, attribute_name: &str) -> Result<Vec<Value>> {
        let mut seen = HashSet::new();
        Ok(self
            .column(attribute_name)?
            .iter()
            .filter(|v| value_key(v).is_some_and(|k| seen.insert(k)))
            .cloned()
            .collect())
    }

    /// Occurrence count of each non-null value, most frequent first.
    fn value_counts(&self, attribute_name: &str) -> Result<Vec<(Value, usize)>> {
        let mut counts: BTreeMap<String, (Value, usize)> = BTreeMap::new();
        for value in self.column(attribute_name)? {
            if let Some(key) = value_key(value) {
                counts.entry(key).or_insert_with(|| (value.clone(), 0)).1 += 1;
            }
        }
        let mut counts: Vec<(Value, usize)> = counts.into_values().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counts)
    }

    /// Rows whose non-null foreign key value is absent from the referenced
    /// table's primary key values.
    fn get_rows_with_missing_values_from_compared(
        &self,
        compared: &dyn DatasetTable,
        foreign_key: &ForeignKey,
    ) -> Result<Option<MissingRecords>> {
        let primary_values: HashSet<String> = compared
            .column(foreign_key.primary_key_attribute_name())?
            .iter()
            .filter_map(value_key)
            .collect();

        let mut rows = Vec::new();
        let mut values: BTreeMap<String, MissingValue> = BTreeMap::new();
        for (row, value) in self.column(foreign_key.key_name())?.iter().enumerate() {
            let Some(key) = value_key(value) else {
                continue;
            };
            if primary_values.contains(&key) {
                continue;
            }
            rows.push(row);
            values
                .entry(key)
                .or_insert_with(|| MissingValue {
                    value: value.clone(),
                    count: 0,
                })
                .count += 1;
        }
        Ok(AffectedRows::new(rows).map(|rows| MissingRecords { rows, values }))
    }

    /// Rows breaking the sequence of a column. Null rows always break it.
    fn identify_sequential_outliers(&self, attribute_name: &str) -> Result<Option<AffectedRows>> {
        let column = self.column(attribute_name)?;
        let values: Vec<Option<f64>> = column
            .iter()
            .map(|v| if is_missing(v) { None } else { as_number(v) })
            .collect();
        Ok(AffectedRows::from_mask(&identify_sequential_outliers(&values)))
    }

    /// Summary statistics over the numeric values of a column.
    fn summary_statistics(&self, attribute_name: &str) -> Result<SummaryStatistics> {
        let values: Vec<f64> = self.column(attribute_name)?.iter().filter_map(as_number).collect();
        Ok(SummaryStatistics::from_values(&values))
    }

    /// Merges an error state into the given rows and logs it under
    /// `attribute_name`.
    fn change_record_probability_lookup_index(
        &mut self,
        attribute_name: &str,
        rows: Option<&AffectedRows>,
        error_state: &ErrorState,
    ) -> Result<()> {
        let Some(rows) = rows else {
            return Ok(());
        };
        let example = self
            .column(attribute_name)?
            .get(rows.first())
            .cloned()
            .unwrap_or(Value::Null);
        self.merge_error_state(rows, error_state);
        let entry = ErrorLogEntry {
            table_name: self.table_name().to_string(),
            attribute_name: attribute_name.to_string(),
            error_state: error_state.description.clone(),
            probability: error_state.probability_for_state,
            num_affected: rows.len(),
            example_affected_value: example,
        };
        self.log_error(entry);
        Ok(())
    }

    /// Merges an error state into rows whose `attribute_name` value is one of
    /// `missing_values`, logging it under `logging_attribute`.
    fn change_record_probability_for_missing(
        &mut self,
        attribute_name: &str,
        missing_values: &[Value],
        error_state: &ErrorState,
        logging_attribute: &str,
    ) -> Result<()> {
        let Some(rows) = self.get_rows_where_attribute_values_equal(attribute_name, missing_values)?
        else {
            return Ok(());
        };
        let example = self
            .column(attribute_name)?
            .get(rows.first())
            .cloned()
            .unwrap_or(Value::Null);
        self.merge_error_state(&rows, error_state);
        let entry = ErrorLogEntry {
            table_name: self.table_name().to_string(),
            attribute_name: logging_attribute.to_string(),
            error_state: error_state.description.clone(),
            probability: error_state.probability_for_state,
            num_affected: rows.len(),
            example_affected_value: example,
        };
        self.log_error(entry);
        Ok(())
    }
}

/// The tables of a dataset, by name.
#[derive(Debug, Default)]
pub struct Dataset {
    tables: BTreeMap<String, Box<dyn DatasetTable>>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table of the same name.
    pub fn insert(&mut self, table: Box<dyn DatasetTable>) {
        self.tables.insert(table.table_name().to_string(), table);
    }

    /// Builder method to add a table.
    pub fn with_table(mut self, table: impl DatasetTable + 'static) -> Self {
        self.insert(Box::new(table));
        self
    }

    /// Looks up a table.
    ///
    /// # Errors
    /// `NotFound` if no table has that name.
    pub fn get(&self, table_name: &str) -> Result<&dyn DatasetTable> {
        self.tables
            .get(table_name)
            .map(|table| table.as_ref())
            .ok_or_else(|| VeritasError::not_found(format!("Dataset has no table '{}'", table_name)))
    }

    /// Looks up a table for mutation.
    pub fn get_mut(&mut self, table_name: &str) -> Result<&mut dyn DatasetTable> {
        match self.tables.get_mut(table_name) {
            Some(table) => Ok(table.as_mut()),
            None => Err(VeritasError::not_found(format!(
                "Dataset has no table '{}'",
                table_name
            ))),
        }
    }

    /// Returns true if the table exists.
    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.contains_key(table_name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Iterates over tables in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn DatasetTable> {
        self.tables.values().map(|table| table.as_ref())
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the dataset has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Scoped composite-key columns.
///
/// Composite keys materialized through the scope are dropped when it goes
/// out of scope, on success and error paths alike.
#[derive(Debug)]
pub struct CompositeKeyScope<'a> {
    dataset: &'a mut Dataset,
    tables: BTreeSet<String>,
}

impl<'a> CompositeKeyScope<'a> {
    /// Opens a scope over the dataset.
    pub fn new(dataset: &'a mut Dataset) -> Self {
        Self {
            dataset,
            tables: BTreeSet::new(),
        }
    }

    /// Materializes (or rebuilds) a table's composite key.
    pub fn materialize(&mut self, table_name: &str, attributes: &[String]) -> Result<()> {
        self.dataset.get_mut(table_name)?.create_composite_key(attributes)?;
        self.tables.insert(table_name.to_string());
        tracing::trace!(
            "Materialized composite key on {} from {:?}",
            table_name,
            attributes
        );
        Ok(())
    }

    /// The dataset, for queries.
    pub fn dataset(&self) -> &Dataset {
        &*self.dataset
    }

    /// The dataset, for mutation.
    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut *self.dataset
    }
}

impl Drop for CompositeKeyScope<'_> {
    fn drop(&mut self) {
        for table_name in &self.tables {
            if let Ok(table) = self.dataset.get_mut(table_name) {
                table.drop_composite_key();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::COMPOSITE_KEY_NAME;
    use serde_json::json;

    fn table(name: &str, columns: &[(&str, Vec<Value>)]) -> InMemoryTable {
        InMemoryTable::from_columns(
            name,
            columns
                .iter()
                .map(|(n, v)| ((*n).to_string(), v.clone()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_affected_rows_sentinel() {
        assert!(AffectedRows::new(vec![]).is_none());
        assert!(AffectedRows::from_mask(&[false, false]).is_none());
        let rows = AffectedRows::new(vec![3, 1, 3]).unwrap();
        assert_eq!(rows.rows(), &[1, 3]);
        assert_eq!(rows.first(), 1);
    }

    #[test]
    fn test_duplicate_values_return_all_participants() {
        let t = table("t", &[("id", vec![json!("A"), json!("A"), json!("B")])]);
        let rows = t.get_rows_with_duplicate_values("id").unwrap().unwrap();
        assert_eq!(rows.rows(), &[0, 1]);
    }

    #[test]
    fn test_duplicates_exclude_nulls() {
        let t = table("t", &[("id", vec![json!(null), json!(null), json!(1), json!(1.0)])]);
        let rows = t.get_rows_with_duplicate_values("id").unwrap().unwrap();
        assert_eq!(rows.rows(), &[2, 3]);

        let t = table("t", &[("id", vec![json!(null), json!(null), json!(1)])]);
        assert!(t.get_rows_with_duplicate_values("id").unwrap().is_none());
    }

    #[test]
    fn test_numerical_constraint_skips_non_numeric() {
        let t = table(
            "t",
            &[("v", vec![json!(5), json!(-1), json!("x"), json!(null), json!(101)])],
        );
        let rows = t
            .get_rows_outside_numerical_constraint("v", &ConstraintRange::new(0.0, 100.0))
            .unwrap()
            .unwrap();
        assert_eq!(rows.rows(), &[1, 4]);
    }

    #[test]
    fn test_std_dev_bands() {
        let normal = NormalDistribution::new(0.0, 1.0);
        let (low, high) = normal.bands(3, true);
        let t = table(
            "t",
            &[("v", vec![json!(-4.0), json!(-3.5), json!(-3.0), json!(3.0), json!(3.5), json!(4.0), json!(4.5)])],
        );
        let rows = t.get_values_outside_std_dev("v", &low, &high).unwrap().unwrap();
        // [-4, -3) and (3, 4]
        assert_eq!(rows.rows(), &[0, 1, 4, 5]);
    }

    #[test]
    fn test_date_constraint_excludes_unparsable() {
        let t = table(
            "t",
            &[("d", vec![json!("1850-01-01"), json!("2000-06-01"), json!("garbage"), json!(null)])],
        );
        let rows = t
            .get_rows_outside_date_constraint("d", &ConstraintRange::new(1900.0, 2100.0))
            .unwrap()
            .unwrap();
        assert_eq!(rows.rows(), &[0]);
    }

    #[test]
    fn test_time_constraint() {
        let t = table("t", &[("h", vec![json!("08:00"), json!("23:30"), json!("noon")])]);
        let rows = t
            .get_rows_outside_time_constraint("h", &ConstraintRange::new(6.0, 20.0))
            .unwrap()
            .unwrap();
        assert_eq!(rows.rows(), &[1]);
    }

    #[test]
    fn test_format_constraint() {
        let t = table(
            "t",
            &[("d", vec![json!("2021-01-01"), json!("01/02/2021"), json!(null)])],
        );
        let regex = compile_format("%Y-%m-%d").unwrap();
        let rows = t.get_rows_outside_format_constraint("d", &regex).unwrap().unwrap();
        assert_eq!(rows.rows(), &[1]);
    }

    #[test]
    fn test_values_equal_and_value_counts() {
        let t = table("t", &[("c", vec![json!("a"), json!("b"), json!("a"), json!(null)])]);
        let rows = t
            .get_rows_where_attribute_values_equal("c", &[json!("b")])
            .unwrap()
            .unwrap();
        assert_eq!(rows.rows(), &[1]);
        assert!(t
            .get_rows_where_attribute_values_equal("c", &[json!("z")])
            .unwrap()
            .is_none());

        let counts = t.value_counts("c").unwrap();
        assert_eq!(counts[0], (json!("a"), 2));
        assert_eq!(t.get_list_of_values("c").unwrap(), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_missing_values_from_compared() {
        let customers = table("customers", &[("id", vec![json!(1), json!(2)])]);
        let orders = table(
            "orders",
            &[("cust", vec![json!(1), json!(9), json!(9), json!(null), json!("2")])],
        );
        let fk = ForeignKey::new("orders", vec!["cust".into()], "customers", vec!["id".into()])
            .unwrap();
        let missing = orders
            .get_rows_with_missing_values_from_compared(&customers, &fk)
            .unwrap()
            .unwrap();
        assert_eq!(missing.rows().rows(), &[1, 2]);
        assert_eq!(missing.distinct_count(), 1);
        assert_eq!(missing.values()["9"].count, 2);

        let complete = table("orders", &[("cust", vec![json!(1), json!(null)])]);
        assert!(complete
            .get_rows_with_missing_values_from_compared(&customers, &fk)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_column_is_not_found() {
        let t = table("t", &[("a", vec![json!(1)])]);
        assert!(matches!(
            t.get_rows_with_duplicate_values("b"),
            Err(VeritasError::NotFound { .. })
        ));
    }

    #[test]
    fn test_change_record_probability_for_missing() {
        let registry = crate::error_state::ErrorStateRegistry::standard();
        let state = registry
            .get_error_state(
                crate::error_state::ReferenceGroup::SingleRecord,
                crate::error_state::LocationId::OrphanForeignKey,
            )
            .unwrap();
        let mut orders = table("orders", &[("cust", vec![json!(1), json!(9), json!(9.0)])]);
        orders
            .change_record_probability_for_missing("cust", &[json!(9)], state, "composite_foreign_key")
            .unwrap();
        assert_eq!(orders.error_states(), &[0, 1, 1]);
        assert_eq!(orders.error_probabilities(), &[0.0, 1.0, 1.0]);
        assert_eq!(orders.errors()[0].attribute_name, "composite_foreign_key");
        assert_eq!(orders.errors()[0].num_affected, 2);

        orders
            .change_record_probability_for_missing("cust", &[json!(42)], state, "cust")
            .unwrap();
        assert_eq!(orders.errors().len(), 1);
    }

    #[test]
    fn test_composite_key_scope_drops_on_exit() {
        let mut dataset = Dataset::new().with_table(table(
            "lines",
            &[("a", vec![json!(1), json!(null)]), ("b", vec![json!("x"), json!(null)])],
        ));
        {
            let mut scope = CompositeKeyScope::new(&mut dataset);
            scope.materialize("lines", &["a".into(), "b".into()]).unwrap();
            let column = scope.dataset().get("lines").unwrap().column(COMPOSITE_KEY_NAME).unwrap();
            assert_eq!(column, &[json!("1_x"), Value::Null]);
        }
        assert!(!dataset.get("lines").unwrap().has_column(COMPOSITE_KEY_NAME));
        assert!(matches!(dataset.get("nope"), Err(VeritasError::NotFound { .. })));
    }
}
