//! Columnar in-memory table backend.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use super::{AffectedRows, DatasetTable, ErrorLogEntry};
use crate::error::VeritasError;
use crate::error_state::ErrorState;
use crate::keys::COMPOSITE_KEY_NAME;
use crate::values::value_key;
use crate::Result;

/// A table held in memory column by column.
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    table_name: String,
    column_order: Vec<String>,
    columns: HashMap<String, Vec<Value>>,
    composite_key: Option<Vec<Value>>,
    num_rows: usize,
    error_state: Vec<u64>,
    probability_error: Vec<f64>,
    missing_records: f64,
    errors: Vec<ErrorLogEntry>,
}

impl InMemoryTable {
    /// Creates a table from named columns.
    ///
    /// # Errors
    /// `Validation` if column names repeat or columns differ in length.
    pub fn from_columns(
        table_name: impl Into<String>,
        columns: Vec<(String, Vec<Value>)>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        let num_rows = columns.first().map_or(0, |(_, values)| values.len());

        let mut column_order = Vec::with_capacity(columns.len());
        let mut by_name = HashMap::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != num_rows {
                return Err(VeritasError::validation(format!(
                    "Column '{}' of table {} has {} rows, expected {}",
                    name,
                    table_name,
                    values.len(),
                    num_rows
                )));
            }
            if by_name.contains_key(&name) {
                return Err(VeritasError::validation(format!(
                    "Column '{}' appears twice in table {}",
                    name, table_name
                )));
            }
            column_order.push(name.clone());
            by_name.insert(name, values);
        }

        Ok(Self {
            table_name,
            column_order,
            columns: by_name,
            composite_key: None,
            num_rows,
            error_state: vec![0; num_rows],
            probability_error: vec![0.0; num_rows],
            missing_records: 0.0,
            errors: Vec::new(),
        })
    }

    /// Creates a table from a header and row-major records.
    pub fn from_rows(
        table_name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); headers.len()];
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != headers.len() {
                return Err(VeritasError::validation(format!(
                    "Row {} of table {} has {} cells, expected {}",
                    index + 1,
                    table_name,
                    row.len(),
                    headers.len()
                )));
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell);
            }
        }
        Self::from_columns(table_name, headers.into_iter().zip(columns).collect())
    }

    /// Loads a table from CSV text with a header row.
    ///
    /// Empty cells become null, then integers, floats and strings are tried
    /// in turn. Infinite and NaN spellings are treated as missing.
    pub fn from_csv_reader<R: Read>(table_name: impl Into<String>, reader: R) -> Result<Self> {
        let table_name = table_name.into();
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| VeritasError::csv(format!("Reading header of table {}", table_name), e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record
                .map_err(|e| VeritasError::csv(format!("Reading rows of table {}", table_name), e))?;
            rows.push(record.iter().map(coerce_cell).collect());
        }
        tracing::debug!("Loaded table {} with {} rows", table_name, rows.len());
        Self::from_rows(table_name, headers, rows)
    }

    /// Loads a table from a CSV file.
    pub fn from_csv_path(table_name: impl Into<String>, path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            VeritasError::io(format!("Failed to open table file {}", path.display()), e)
        })?;
        Self::from_csv_reader(table_name, std::io::BufReader::new(file))
    }
}

fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        // from_f64 rejects inf and NaN
        return serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);
    }
    Value::String(trimmed.to_string())
}

impl DatasetTable for InMemoryTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn column_names(&self) -> Vec<String> {
        self.column_order.clone()
    }

    fn column(&self, attribute_name: &str) -> Result<&[Value]> {
        if attribute_name == COMPOSITE_KEY_NAME {
            if let Some(composite) = &self.composite_key {
                return Ok(composite);
            }
        }
        self.columns
            .get(attribute_name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                VeritasError::not_found(format!(
                    "Attribute '{}' does not exist in table {}",
                    attribute_name, self.table_name
                ))
            })
    }

    fn create_composite_key(&mut self, attributes: &[String]) -> Result<()> {
        if attributes.is_empty() {
            return Err(VeritasError::validation(format!(
                "Composite key on table {} needs at least one attribute",
                self.table_name
            )));
        }
        let components = attributes
            .iter()
            .map(|a| self.column(a))
            .collect::<Result<Vec<_>>>()?;

        let composite = (0..self.num_rows)
            .map(|row| {
                let parts: Vec<Option<String>> =
                    components.iter().map(|c| value_key(&c[row])).collect();
                if parts.iter().all(Option::is_none) {
                    Value::Null
                } else {
                    Value::String(
                        parts
                            .into_iter()
                            .map(Option::unwrap_or_default)
                            .collect::<Vec<_>>()
                            .join("_"),
                    )
                }
            })
            .collect();
        self.composite_key = Some(composite);
        Ok(())
    }

    fn drop_composite_key(&mut self) {
        self.composite_key = None;
    }

    fn error_states(&self) -> &[u64] {
        &self.error_state
    }

    fn error_probabilities(&self) -> &[f64] {
        &self.probability_error
    }

    fn missing_records(&self) -> f64 {
        self.missing_records
    }

    fn add_missing(&mut self, amount: f64) {
        self.missing_records += amount;
    }

    fn errors(&self) -> &[ErrorLogEntry] {
        &self.errors
    }

    fn merge_error_state(&mut self, rows: &AffectedRows, error_state: &ErrorState) {
        let probability = error_state.probability_for_state;
        for row in rows.iter() {
            if let Some(mask) = self.error_state.get_mut(row) {
                *mask |= error_state.error_state;
            }
            if probability == 0.0 {
                continue;
            }
            if let Some(current) = self.probability_error.get_mut(row) {
                if *current < probability {
                    *current = probability;
                }
            }
        }
    }

    fn log_error(&mut self, entry: ErrorLogEntry) {
        self.errors.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_state::{ErrorStateRegistry, GeneralGroup, LocationId};
    use serde_json::json;

    const ORDERS: &str = "\
id, amount ,note,when
1,10.5,ok,2021-01-01
2,,  padded  ,2021-01-02
3,-7,inf,
";

    #[test]
    fn test_csv_coercion() {
        let table = InMemoryTable::from_csv_reader("orders", ORDERS.as_bytes()).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), vec!["id", "amount", "note", "when"]);
        assert_eq!(table.column("id").unwrap()[0], json!(1));
        assert_eq!(table.column("amount").unwrap(), &[json!(10.5), Value::Null, json!(-7)]);
        assert_eq!(table.column("note").unwrap()[1], json!("padded"));
        assert_eq!(table.column("note").unwrap()[2], Value::Null);
        assert_eq!(table.column("when").unwrap()[2], Value::Null);
        assert_eq!(table.error_states(), &[0, 0, 0]);
        assert_eq!(table.error_probabilities(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ragged_columns_are_rejected() {
        let result = InMemoryTable::from_columns(
            "t",
            vec![("a".into(), vec![json!(1)]), ("b".into(), vec![])],
        );
        assert!(matches!(result, Err(VeritasError::Validation { .. })));
    }

    #[test]
    fn test_merge_is_idempotent_and_monotonic() {
        let registry = ErrorStateRegistry::standard();
        let few = registry
            .get_error_state(GeneralGroup::AffectsFewRecords, LocationId::UnitOutlier)
            .unwrap();
        let some = registry
            .get_error_state(GeneralGroup::AffectsSomeRecords, LocationId::DateOutlier)
            .unwrap();
        let many = registry
            .get_error_state(GeneralGroup::AffectsManyRecords, LocationId::FormatOutlier)
            .unwrap();

        let mut table =
            InMemoryTable::from_columns("t", vec![("v".into(), vec![json!(1), json!(2)])]).unwrap();
        let rows = AffectedRows::new(vec![0]).unwrap();

        table.merge_error_state(&rows, few);
        let once = (table.error_states().to_vec(), table.error_probabilities().to_vec());
        table.merge_error_state(&rows, few);
        assert_eq!(once, (table.error_states().to_vec(), table.error_probabilities().to_vec()));

        table.merge_error_state(&rows, some);
        table.merge_error_state(&rows, many);
        assert_eq!(table.error_probabilities()[0], 1.0);
        assert_eq!(
            table.error_states()[0],
            few.error_state | some.error_state | many.error_state
        );
        assert_eq!(table.error_states()[1], 0);
    }

    #[test]
    fn test_zero_probability_sets_bit_only() {
        let registry = ErrorStateRegistry::standard();
        let many = registry
            .get_error_state(GeneralGroup::AffectsManyRecords, LocationId::UniquenessViolation)
            .unwrap();
        let mut table =
            InMemoryTable::from_columns("t", vec![("v".into(), vec![json!(1)])]).unwrap();
        table
            .change_record_probability_lookup_index("v", AffectedRows::new(vec![0]).as_ref(), many)
            .unwrap();
        assert_eq!(table.error_states(), &[many.error_state]);
        assert_eq!(table.error_probabilities(), &[0.0]);
        assert_eq!(table.errors().len(), 1);
        assert_eq!(table.errors()[0].example_affected_value, json!(1));

        table.change_record_probability_lookup_index("v", None, many).unwrap();
        assert_eq!(table.errors().len(), 1);
    }

    #[test]
    fn test_composite_key_requires_known_attributes() {
        let mut table =
            InMemoryTable::from_columns("t", vec![("a".into(), vec![json!(1)])]).unwrap();
        assert!(matches!(
            table.create_composite_key(&["a".into(), "zz".into()]),
            Err(VeritasError::NotFound { .. })
        ));
        assert!(table.create_composite_key(&[]).is_err());
        assert!(!table.has_column(COMPOSITE_KEY_NAME));
    }

    #[test]
    fn test_composite_key_with_partial_values() {
        let mut table = InMemoryTable::from_columns(
            "t",
            vec![
                ("a".into(), vec![json!(1), json!(null)]),
                ("b".into(), vec![json!(null), json!(2.0)]),
            ],
        )
        .unwrap();
        table.create_composite_key(&["a".into(), "b".into()]).unwrap();
        assert_eq!(table.column(COMPOSITE_KEY_NAME).unwrap(), &[json!("1_"), json!("_2")]);
        table.drop_composite_key();
        assert!(table.column(COMPOSITE_KEY_NAME).is_err());
    }
}
