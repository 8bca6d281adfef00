//! Catalog and report rendering.
//!
//! Writers target any [`std::io::Write`]; [`render_outputs`] collects every
//! report of a finished run as named byte buffers so callers decide where and
//! how they are persisted.

use std::io::Write;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::PipelineConfig;
use crate::error::VeritasError;
use crate::error_state::bitmask_to_positions;
use crate::metadata::DatasetMetadata;
use crate::quality::{DatasetQualityCharacterization, QualitySummary};
use crate::rules::RuleBook;
use crate::table::{Dataset, DatasetTable};
use crate::values::display_value;
use crate::Result;

/// File name of the rules catalog.
pub const RULES_FILE_NAME: &str = "rules.csv";
/// File name of the error catalog.
pub const ERRORS_FILE_NAME: &str = "errors.csv";

const ERROR_CATALOG_HEADER: [&str; 6] = [
    "table_name",
    "attribute_name",
    "error_state",
    "probability",
    "num_affected",
    "example_affected_value",
];

fn flush<W: Write>(writer: &mut csv::Writer<W>, context: &str) -> Result<()> {
    writer
        .flush()
        .map_err(|e| VeritasError::io(format!("Flushing {}", context), e))
}

/// Writes the rules catalog, codependent groups first.
pub fn write_rules_catalog<W: Write>(writer: W, rule_book: &RuleBook, include_inactive: bool) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let entries = rule_book.catalog_entries(include_inactive);
    if entries.is_empty() {
        csv_writer
            .write_record(["rule_id", "table_name", "attribute_name", "is_active", "rule_description"])
            .map_err(|e| VeritasError::csv("Writing rules catalog header", e))?;
    }
    for entry in &entries {
        csv_writer
            .serialize(entry)
            .map_err(|e| VeritasError::csv(format!("Writing rule {}", entry.rule_id), e))?;
    }
    flush(&mut csv_writer, "rules catalog")
}

/// Writes the error logs of every table.
pub fn write_error_catalog<W: Write>(writer: W, dataset: &Dataset) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(ERROR_CATALOG_HEADER)
        .map_err(|e| VeritasError::csv("Writing error catalog header", e))?;
    for entry in dataset.iter().flat_map(|table| table.errors()) {
        csv_writer
            .write_record([
                entry.table_name.clone(),
                entry.attribute_name.clone(),
                entry.error_state.clone(),
                entry.probability.to_string(),
                entry.num_affected.to_string(),
                display_value(&entry.example_affected_value),
            ])
            .map_err(|e| {
                VeritasError::csv(format!("Writing error entry of table {}", entry.table_name), e)
            })?;
    }
    flush(&mut csv_writer, "error catalog")
}

/// Writes a table's data columns followed by its error annotations.
///
/// `error_state` is rendered as set bit positions, highest first.
pub fn write_annotated_table<W: Write>(
    writer: W,
    table: &dyn DatasetTable,
    highest_bit: u32,
) -> Result<()> {
    let columns = table.column_names();
    let values = columns
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<Vec<_>>>()?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut header = columns.clone();
    header.push("error_state".to_string());
    header.push("probability_error".to_string());
    csv_writer
        .write_record(&header)
        .map_err(|e| VeritasError::csv(format!("Writing header of table {}", table.table_name()), e))?;

    let states = table.error_states();
    let probabilities = table.error_probabilities();
    for row in 0..table.num_rows() {
        let mut record: Vec<String> = values
            .iter()
            .map(|column| column.get(row).map(display_value).unwrap_or_default())
            .collect();
        record.push(bitmask_to_positions(
            states.get(row).copied().unwrap_or(0),
            highest_bit,
        )?);
        record.push(probabilities.get(row).copied().unwrap_or(0.0).to_string());
        csv_writer.write_record(&record).map_err(|e| {
            VeritasError::csv(format!("Writing row {} of table {}", row, table.table_name()), e)
        })?;
    }
    flush(&mut csv_writer, table.table_name())
}

/// Output file name of an annotated table.
pub fn table_file_name(table_name: &str) -> String {
    let stem = table_name.strip_suffix(".csv").unwrap_or(table_name);
    format!("{}.csv", stem)
}

/// Copies the metadata document with quality summaries attached to every
/// characterized table and to the dataset.
///
/// # Errors
/// `Distillation` if the dataset totals break a metric invariant.
pub fn annotate_metadata(
    metadata: &DatasetMetadata,
    characterization: &DatasetQualityCharacterization,
    config: &PipelineConfig,
) -> Result<DatasetMetadata> {
    let mut annotated = metadata.clone();
    for table in &mut annotated.objects {
        match characterization.get_data_quality_for_table(&table.name) {
            Ok(quality) => {
                let summary = QualitySummary::for_table(
                    &quality.quality,
                    &quality.scorecard,
                    config.display_precision,
                );
                table.data_quality_summary = Some(summary.to_value()?);
            }
            Err(_) => tracing::warn!("No data quality summary for table {}", table.name),
        }
    }

    let scorecard = characterization.dataset_scorecard(&metadata.name)?;
    let reference_url = config
        .reference_url
        .clone()
        .or_else(|| metadata.reference_url.clone());
    let summary = QualitySummary::for_dataset(
        characterization.dataset(),
        &scorecard,
        reference_url,
        config.display_precision,
    );
    annotated.data_quality_summary = Some(summary.to_value()?);
    Ok(annotated)
}

/// The dataset summary excerpt of an annotated document.
pub fn summary_excerpt(annotated: &DatasetMetadata) -> Value {
    json!({ "dataQualitySummary": annotated.data_quality_summary.clone().unwrap_or(Value::Null) })
}

/// Serializes a value as indented JSON.
pub fn to_pretty_json<T: Serialize>(value: &T, context: &str) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| VeritasError::serialization(context, e))
}

/// A rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// File name relative to the output directory
    pub file_name: String,
    /// File contents
    pub contents: Vec<u8>,
}

impl OutputFile {
    fn new(file_name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            contents,
        }
    }
}

/// Renders every report of a finished run.
///
/// Produces the rules and error catalogs, one annotated CSV per table, the
/// annotated metadata as `<metadata_stem>.json` and its summary excerpt as
/// `<metadata_stem>.summary.json`.
pub fn render_outputs(
    rule_book: &RuleBook,
    dataset: &Dataset,
    annotated: &DatasetMetadata,
    config: &PipelineConfig,
    highest_bit: u32,
    metadata_stem: &str,
) -> Result<Vec<OutputFile>> {
    let mut files = Vec::with_capacity(dataset.len() + 4);

    let mut rules = Vec::new();
    write_rules_catalog(&mut rules, rule_book, config.include_inactive_rules)?;
    files.push(OutputFile::new(RULES_FILE_NAME, rules));

    let mut errors = Vec::new();
    write_error_catalog(&mut errors, dataset)?;
    files.push(OutputFile::new(ERRORS_FILE_NAME, errors));

    for table in dataset.iter() {
        let mut contents = Vec::new();
        write_annotated_table(&mut contents, table, highest_bit)?;
        files.push(OutputFile::new(table_file_name(table.table_name()), contents));
    }

    files.push(OutputFile::new(
        format!("{}.json", metadata_stem),
        to_pretty_json(annotated, "Serializing annotated metadata")?,
    ));
    files.push(OutputFile::new(
        format!("{}.summary.json", metadata_stem),
        to_pretty_json(&summary_excerpt(annotated), "Serializing quality summary")?,
    ));
    Ok(files)
}
