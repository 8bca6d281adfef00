//! End-to-end quality pipeline.
//!
//! Wires the phases together in order: primary-key mapping, rule
//! generation, rule execution and distillation. Each phase is also exposed on
//! its own for callers that only need part of the run.

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::constraints::ConstraintSet;
use crate::error_state::ErrorStateRegistry;
use crate::execution::{ExecutionReport, RuleBookExecution};
use crate::metadata::DatasetMetadata;
use crate::output::{OutputFile, annotate_metadata, render_outputs};
use crate::quality::DatasetQualityCharacterization;
use crate::rules::RuleBook;
use crate::table::{Dataset, InMemoryTable};
use crate::Result;

/// Everything a pipeline run produces.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Metadata with quality summaries attached
    pub metadata: DatasetMetadata,
    /// Generated rules
    pub rule_book: RuleBook,
    /// Executed and skipped rules
    pub execution: ExecutionReport,
    /// Table and dataset quality
    pub characterization: DatasetQualityCharacterization,
    /// Tables carrying their error annotations
    pub dataset: Dataset,
}

/// Runs the rule engine over a dataset.
#[derive(Debug)]
pub struct QualityPipeline {
    config: PipelineConfig,
    registry: ErrorStateRegistry,
}

impl QualityPipeline {
    /// Creates a pipeline with the standard error-state registry.
    ///
    /// # Errors
    /// `Configuration` if the config fails validation.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: ErrorStateRegistry::standard(),
        })
    }

    /// Builder method to substitute the error-state registry.
    pub fn with_registry(mut self, registry: ErrorStateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The error-state registry in use.
    pub fn registry(&self) -> &ErrorStateRegistry {
        &self.registry
    }

    /// Resolves primary keys from attribute classes where not annotated.
    pub fn prepare_metadata(&self, metadata: &mut DatasetMetadata) -> Result<()> {
        metadata.map_primary_keys(self.config.use_annotations)
    }

    /// Generates the rule book.
    pub fn generate_rules(
        &self,
        metadata: &DatasetMetadata,
        constraints: &ConstraintSet,
    ) -> Result<RuleBook> {
        RuleBook::generate(metadata, constraints)
    }

    /// Executes the active rules against the dataset.
    pub fn execute(&self, dataset: &mut Dataset, rule_book: &RuleBook) -> Result<ExecutionReport> {
        RuleBookExecution::new(&self.registry)?.execute_rules(dataset, rule_book)
    }

    /// Distills table and dataset quality from an executed dataset.
    pub fn distill(&self, dataset: &Dataset) -> Result<DatasetQualityCharacterization> {
        DatasetQualityCharacterization::from_dataset(dataset, &self.registry)
    }

    /// Runs every phase.
    ///
    /// # Errors
    /// Configuration errors, invariant violations and distillation failures
    /// abort the run; rules failing on their own are skipped and reported in
    /// [`PipelineOutcome::execution`].
    pub fn run(
        &self,
        mut metadata: DatasetMetadata,
        constraints: &ConstraintSet,
        mut dataset: Dataset,
    ) -> Result<PipelineOutcome> {
        tracing::info!("Running quality pipeline for dataset {}", metadata.name);
        self.prepare_metadata(&mut metadata)?;

        let rule_book = self.generate_rules(&metadata, constraints)?;
        let execution = self.execute(&mut dataset, &rule_book)?;
        if !execution.is_complete() {
            tracing::warn!("{} rules or rule groups were skipped", execution.skipped.len());
        }

        let characterization = self.distill(&dataset)?;
        let metadata = annotate_metadata(&metadata, &characterization, &self.config)?;
        Ok(PipelineOutcome {
            metadata,
            rule_book,
            execution,
            characterization,
            dataset,
        })
    }

    /// Renders every report of a finished run.
    pub fn render(&self, outcome: &PipelineOutcome, metadata_stem: &str) -> Result<Vec<OutputFile>> {
        render_outputs(
            &outcome.rule_book,
            &outcome.dataset,
            &outcome.metadata,
            &self.config,
            self.registry.highest_current_bit(),
            metadata_stem,
        )
    }
}

/// Locates the data file of a table: `<dir>/<name>`, then `<dir>/<name>.csv`.
pub fn table_path(data_dir: &Path, table_name: &str) -> Option<PathBuf> {
    let exact = data_dir.join(table_name);
    if exact.is_file() {
        return Some(exact);
    }
    let with_extension = data_dir.join(format!("{}.csv", table_name));
    with_extension.is_file().then_some(with_extension)
}

/// Loads the CSV file of every table named in the metadata.
///
/// Tables without a data file are skipped with a warning; rules against them
/// are skipped at execution.
///
/// # Errors
/// I/O and CSV errors of files that exist.
pub fn load_dataset(metadata: &DatasetMetadata, data_dir: &Path) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    for table in &metadata.objects {
        let Some(path) = table_path(data_dir, &table.name) else {
            tracing::warn!(
                "No data file for table {} in {}",
                table.name,
                data_dir.display()
            );
            continue;
        };
        dataset.insert(Box::new(InMemoryTable::from_csv_path(&table.name, &path)?));
    }
    tracing::info!("Loaded {} tables from {}", dataset.len(), data_dir.display());
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VeritasError;
    use crate::table::DatasetTable;
    use std::io::Write;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            display_precision: 99,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            QualityPipeline::new(config),
            Err(VeritasError::Configuration { .. })
        ));
    }

    #[test]
    fn test_table_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.csv"), "id\n1\n").unwrap();
        std::fs::write(dir.path().join("raw"), "id\n1\n").unwrap();

        assert_eq!(table_path(dir.path(), "orders"), Some(dir.path().join("orders.csv")));
        assert_eq!(table_path(dir.path(), "raw"), Some(dir.path().join("raw")));
        assert_eq!(table_path(dir.path(), "missing"), None);
    }

    #[test]
    fn test_load_dataset_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("orders.csv")).unwrap();
        writeln!(file, "id,amount\n1,2.5\n2,").unwrap();

        let metadata = DatasetMetadata::new("ds")
            .with_table(crate::metadata::TableMetadata::new("orders"))
            .with_table(crate::metadata::TableMetadata::new("ghost"));
        let dataset = load_dataset(&metadata, dir.path()).unwrap();

        assert_eq!(dataset.table_names(), vec!["orders".to_string()]);
        let orders = dataset.get("orders").unwrap();
        assert_eq!(orders.num_rows(), 2);
        assert!(orders.column("amount").unwrap()[1].is_null());
    }
}
