//! Data quality rule engine.
//!
//! Generates data-quality rules from an annotated metadata document and a
//! pair of constraint files, executes them against the dataset's CSV tables
//! and writes the rules catalog, the error catalog, annotated tables and
//! quality scorecards.
//!
//! # Guarantees
//! - Offline operation, inputs are read from local files only
//! - Input files are never modified; every output goes to the output directory

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use veritas_core::logging::init_logging;
use veritas_core::output::{OutputFile, RULES_FILE_NAME, write_rules_catalog};
use veritas_core::{ConstraintSet, DatasetMetadata, PipelineConfig, QualityPipeline, load_dataset};

#[derive(Parser)]
#[command(name = "veritas")]
#[command(about = "Data quality rule generation, execution and scorecards")]
#[command(version)]
#[command(long_about = "
Veritas - data quality characterization for tabular datasets

Rules are generated from each attribute's data-quality class and executed
against the tables named in the metadata document. Every record is annotated
with error bits and a calibrated error probability, then rolled up into
accuracy, completeness and overall quality scores.

EXAMPLES:
  veritas run --data ./tables --metadata dataset.json \\
      --general-constraints general.csv --unit-constraints units.csv --output ./out
  veritas rules --metadata dataset.json \\
      --general-constraints general.csv --unit-constraints units.csv --output ./out
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full pipeline and write every report
    Run(RunArgs),
    /// Generate and write the rules catalog only
    Rules(RulesArgs),
}

#[derive(Args)]
pub struct InputArgs {
    /// Annotated metadata document
    #[arg(long, help = "Annotated metadata JSON document")]
    pub metadata: PathBuf,

    /// General constraints file
    #[arg(long, help = "General constraints CSV (name,lower_bound,upper_bound,notes)")]
    pub general_constraints: PathBuf,

    /// Unit constraints file
    #[arg(long, help = "Unit constraints CSV (name,lower_bound,upper_bound,notes)")]
    pub unit_constraints: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "veritas-output", help = "Directory receiving the reports")]
    pub output: PathBuf,

    /// List active rules only
    #[arg(long, help = "Leave inactive rules out of the rules catalog")]
    pub active_only: bool,

    /// Trust annotated primary keys
    #[arg(long, help = "Accept tables sharing an identical derived primary key")]
    pub use_annotations: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory holding one CSV file per table
    #[arg(long, help = "Directory with <table> or <table>.csv files")]
    pub data: PathBuf,

    #[command(flatten)]
    pub input: InputArgs,

    /// Decimal places of summary percentages
    #[arg(long, default_value = "2", help = "Decimal places of summary percentages")]
    pub precision: u32,

    /// Reference URL for the dataset summary
    #[arg(long, env = "VERITAS_REFERENCE_URL", help = "URL echoed into the dataset summary")]
    pub reference_url: Option<String>,
}

#[derive(Args)]
pub struct RulesArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    match &cli.command {
        Command::Run(args) => run(args).await,
        Command::Rules(args) => rules(args).await,
    }
}

impl InputArgs {
    fn config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_include_inactive_rules(!self.active_only)
            .with_use_annotations(self.use_annotations)
    }

    /// Stem naming the metadata outputs, `dataset` for `dataset.json`.
    fn metadata_stem(&self) -> String {
        self.metadata
            .file_stem()
            .map_or_else(|| "metadata".to_string(), |stem| stem.to_string_lossy().into_owned())
    }

    async fn load_metadata(&self) -> Result<DatasetMetadata> {
        let bytes = tokio::fs::read(&self.metadata)
            .await
            .with_context(|| format!("Failed to read metadata {}", self.metadata.display()))?;
        DatasetMetadata::from_reader(bytes.as_slice())
            .with_context(|| format!("Failed to parse metadata {}", self.metadata.display()))
    }

    fn load_constraints(&self) -> Result<ConstraintSet> {
        ConstraintSet::from_paths(&self.general_constraints, &self.unit_constraints)
            .context("Failed to load constraints")
    }
}

/// Runs every phase and writes all reports.
async fn run(args: &RunArgs) -> Result<()> {
    let mut config = args.input.config().with_display_precision(args.precision);
    if let Some(url) = &args.reference_url {
        config = config.with_reference_url(url);
    }
    let pipeline = QualityPipeline::new(config).context("Invalid pipeline configuration")?;

    let metadata = args.input.load_metadata().await?;
    let constraints = args.input.load_constraints()?;
    let dataset = load_dataset(&metadata, &args.data)
        .with_context(|| format!("Failed to load tables from {}", args.data.display()))?;

    info!("Running rules over {} tables", dataset.len());
    let outcome = pipeline.run(metadata, &constraints, dataset)?;
    let files = pipeline.render(&outcome, &args.input.metadata_stem())?;
    write_outputs(&args.input.output, &files).await?;

    let scorecard = outcome
        .characterization
        .dataset_scorecard(&outcome.metadata.name)?;
    println!("Rules generated: {}", outcome.rule_book.len());
    println!("Rules skipped: {}", outcome.execution.skipped.len());
    println!("Accuracy: {:.2}%", scorecard.accuracy);
    println!("Completeness: {:.2}%", scorecard.completeness);
    println!("Overall quality: {:.2}%", scorecard.percent_overall);
    println!("Output: {}", args.input.output.display());
    Ok(())
}

/// Generates the rule book and writes the rules catalog.
async fn rules(args: &RulesArgs) -> Result<()> {
    let config = args.input.config();
    let pipeline = QualityPipeline::new(config).context("Invalid pipeline configuration")?;

    let mut metadata = args.input.load_metadata().await?;
    let constraints = args.input.load_constraints()?;
    pipeline.prepare_metadata(&mut metadata)?;
    let rule_book = pipeline.generate_rules(&metadata, &constraints)?;

    let mut contents = Vec::new();
    write_rules_catalog(&mut contents, &rule_book, pipeline.config().include_inactive_rules)?;
    let file = OutputFile {
        file_name: RULES_FILE_NAME.to_string(),
        contents,
    };
    write_outputs(&args.input.output, std::slice::from_ref(&file)).await?;

    println!(
        "Rules generated: {} ({} active)",
        rule_book.len(),
        rule_book.active_count()
    );
    println!("Output: {}", args.input.output.join(RULES_FILE_NAME).display());
    Ok(())
}

async fn write_outputs(output_dir: &Path, files: &[OutputFile]) -> Result<()> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    for file in files {
        let path = output_dir.join(&file.file_name);
        tokio::fs::write(&path, &file.contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn input_flags() -> Vec<&'static str> {
        vec![
            "--metadata",
            "shop.json",
            "--general-constraints",
            "general.csv",
            "--unit-constraints",
            "units.csv",
        ]
    }

    #[test]
    fn test_parse_run() {
        let mut argv = vec!["veritas", "-vv", "run", "--data", "tables"];
        argv.extend(input_flags());
        argv.extend(["--output", "out", "--active-only"]);
        let cli = Cli::try_parse_from(argv).unwrap();

        assert_eq!(cli.global.verbose, 2);
        let Command::Run(args) = cli.command else {
            unreachable!("parsed a run command");
        };
        assert_eq!(args.data, PathBuf::from("tables"));
        assert_eq!(args.precision, 2);
        assert!(args.input.active_only);
        assert!(!args.input.config().include_inactive_rules);
        assert_eq!(args.input.metadata_stem(), "shop");
    }

    #[test]
    fn test_parse_rules_with_global_flag_after_subcommand() {
        let mut argv = vec!["veritas", "rules", "-q"];
        argv.extend(input_flags());
        let cli = Cli::try_parse_from(argv).unwrap();

        assert!(cli.global.quiet);
        assert!(matches!(cli.command, Command::Rules(_)));
    }

    #[test]
    fn test_missing_required_flag() {
        assert!(Cli::try_parse_from(["veritas", "run", "--data", "tables"]).is_err());
        assert!(Cli::try_parse_from(["veritas"]).is_err());
    }

    #[tokio::test]
    async fn test_rules_command_writes_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("general.csv"),
            "name,lower,upper,notes\nFrequency_Threshold,5,100,\nSkewness,-2,2,\nKurtosis,-7,7,\n\
             Monotonicity,0.9,1,\nDate,1900,2100,\nDate-Format,n/a,n/a,\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("units.csv"), "name,lower,upper,notes\n").unwrap();
        std::fs::write(
            dir.path().join("shop.json"),
            serde_json::json!({
                "name": "shop",
                "objects": [{
                    "name": "customers",
                    "attributes": [{ "name": "id", "dataQualityClass": "primary_key" }]
                }]
            })
            .to_string(),
        )
        .unwrap();

        let output = dir.path().join("out");
        let args = RulesArgs {
            input: InputArgs {
                metadata: dir.path().join("shop.json"),
                general_constraints: dir.path().join("general.csv"),
                unit_constraints: dir.path().join("units.csv"),
                output: output.clone(),
                active_only: false,
                use_annotations: false,
            },
        };
        rules(&args).await.unwrap();

        let catalog = std::fs::read_to_string(output.join(RULES_FILE_NAME)).unwrap();
        let lines: Vec<&str> = catalog.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0,customers,id,true,"));
    }
}
