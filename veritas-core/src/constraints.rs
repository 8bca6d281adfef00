//! Constraint store.
//!
//! Constraints are named numeric ranges loaded from CSV configuration files,
//! one per line as `name, lower_bound, upper_bound, notes`. A bound spelled
//! `n/a` (any case) is unbounded on that side.
//!
//! Two stores are used by rule generation: the general constraints
//! (`Skewness`, `Kurtosis`, `Frequency_Threshold`, `Monotonicity`, `Date`,
//! `Date-Format`, `Time`) and the unit constraints keyed by unit name.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VeritasError;
use crate::values::as_number;
use crate::Result;

/// Sentinel meaning "no bound on this side".
pub const NOT_APPLICABLE: &str = "n/a";

/// Number of columns every constraint line must carry.
pub const EXPECTED_NUMBER_OF_COLUMNS: usize = 4;

/// Well-known general constraint names.
pub mod names {
    /// Upper/lower bound on a categorical value's frequency percentage
    pub const FREQUENCY_THRESHOLD: &str = "Frequency_Threshold";
    /// Skewness range within which a column is treated as normal
    pub const SKEWNESS: &str = "Skewness";
    /// Kurtosis range within which a column is treated as normal
    pub const KURTOSIS: &str = "Kurtosis";
    /// Monotonicity ratio range that enables sequential outlier checks
    pub const MONOTONICITY: &str = "Monotonicity";
    /// Accepted year range for date columns
    pub const DATE: &str = "Date";
    /// Presence enables format checks on date and time columns
    pub const DATE_FORMAT: &str = "Date-Format";
    /// Accepted hour-of-day range for time columns
    pub const TIME: &str = "Time";
}

/// Closed numeric range `[lower_bound, upper_bound]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRange {
    /// Lower bound, `-inf` when unbounded
    pub lower_bound: f64,
    /// Upper bound, `+inf` when unbounded
    pub upper_bound: f64,
}

impl ConstraintRange {
    /// Creates a new range.
    pub fn new(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Range accepting every value.
    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Parses a pair of textual bounds read from the given 1-based line.
    pub fn parse(lower_bound: &str, upper_bound: &str, line_number: u64) -> Result<Self> {
        Ok(Self::new(
            parse_bound(lower_bound, f64::NEG_INFINITY, line_number)?,
            parse_bound(upper_bound, f64::INFINITY, line_number)?,
        ))
    }

    /// Returns true if `value` lies inside the closed range.
    pub fn contains(&self, value: f64) -> bool {
        self.lower_bound <= value && value <= self.upper_bound
    }
}

impl Default for ConstraintRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

fn parse_bound(raw: &str, unbounded: f64, line_number: u64) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(NOT_APPLICABLE) {
        return Ok(unbounded);
    }
    trimmed.parse::<f64>().map_err(|e| {
        VeritasError::configuration(format!(
            "Could not set constraint on line {}: '{}' is not a number or '{}' ({})",
            line_number, trimmed, NOT_APPLICABLE, e
        ))
    })
}

/// A single named constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    range: ConstraintRange,
    /// Line of the configuration file the constraint was read from
    line_number: Option<u64>,
}

impl Constraint {
    /// Creates a constraint that was not read from a file.
    pub fn new(range: ConstraintRange) -> Self {
        Self {
            range,
            line_number: None,
        }
    }

    /// Returns the constraint's range.
    pub fn range(&self) -> ConstraintRange {
        self.range
    }

    /// Returns the configuration line the constraint came from, if any.
    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    /// Returns true if `value` converts to a number inside the range.
    ///
    /// Non-numeric values are not an error; they are simply outside.
    pub fn within_constraint(&self, value: &Value) -> bool {
        match as_number(value) {
            Some(number) => self.range.contains(number),
            None => {
                tracing::debug!(
                    "Non-numeric value {} compared against constraint (line {:?})",
                    value,
                    self.line_number
                );
                false
            }
        }
    }
}

/// A store of named constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    constraints: BTreeMap<String, Constraint>,
}

impl Constraints {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a constraint.
    pub fn with_constraint(mut self, name: impl Into<String>, range: ConstraintRange) -> Self {
        self.insert(name, range);
        self
    }

    /// Adds or replaces a constraint.
    pub fn insert(&mut self, name: impl Into<String>, range: ConstraintRange) {
        self.constraints.insert(name.into(), Constraint::new(range));
    }

    /// Loads constraints from CSV text with a header row.
    ///
    /// Later lines override earlier lines with the same name.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut constraints = BTreeMap::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| VeritasError::csv("Reading constraint file", e))?;
            let line_number = record.position().map_or(0, csv::Position::line);

            if record.len() != EXPECTED_NUMBER_OF_COLUMNS {
                return Err(VeritasError::configuration(format!(
                    "Constraint line {} has {} columns, expected {}",
                    line_number,
                    record.len(),
                    EXPECTED_NUMBER_OF_COLUMNS
                )));
            }

            let name = record.get(0).unwrap_or_default().to_string();
            let range = ConstraintRange::parse(
                record.get(1).unwrap_or_default(),
                record.get(2).unwrap_or_default(),
                line_number,
            )?;
            constraints.insert(
                name,
                Constraint {
                    range,
                    line_number: Some(line_number),
                },
            );
        }

        tracing::debug!("Loaded {} constraints", constraints.len());
        Ok(Self { constraints })
    }

    /// Loads constraints from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            VeritasError::io(format!("Failed to open constraint file {}", path.display()), e)
        })?;
        Self::from_reader(file).map_err(|e| match e {
            VeritasError::Configuration { message } => VeritasError::configuration(format!(
                "{} in {}",
                message,
                path.display()
            )),
            other => other,
        })
    }

    /// Returns true if a constraint with this name exists.
    pub fn in_constraints(&self, name: &str) -> bool {
        self.constraints.contains_key(name)
    }

    /// Looks up a constraint; absent names are `NotFound`.
    pub fn get_constraint(&self, name: &str) -> Result<&Constraint> {
        self.constraints
            .get(name)
            .ok_or_else(|| VeritasError::not_found(format!("Constraint is missing: {}", name)))
    }

    /// Tests `value` against the named constraint.
    pub fn within_constraint(&self, name: &str, value: &Value) -> Result<bool> {
        Ok(self.get_constraint(name)?.within_constraint(value))
    }

    /// Numeric shortcut for [`Constraints::within_constraint`].
    pub fn within_constraint_f64(&self, name: &str, value: f64) -> Result<bool> {
        Ok(self.get_constraint(name)?.range().contains(value))
    }

    /// Number of constraints held.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if no constraints are held.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// The general and unit constraint stores used for rule generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Statistical and date thresholds
    pub general: Constraints,
    /// Accepted value ranges keyed by unit name
    pub unit: Constraints,
}

impl ConstraintSet {
    /// Creates a constraint set from its two stores.
    pub fn new(general: Constraints, unit: Constraints) -> Self {
        Self { general, unit }
    }

    /// Loads both stores from files.
    pub fn from_paths(general: &Path, unit: &Path) -> Result<Self> {
        Ok(Self::new(
            Constraints::from_path(general)?,
            Constraints::from_path(unit)?,
        ))
    }
}
