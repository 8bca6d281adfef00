//! End-to-end tests of the quality pipeline over files on disk.
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Value, json};
use tempfile::TempDir;
use veritas_core::error_state::positions_to_bitmask;
use veritas_core::output::{ERRORS_FILE_NAME, RULES_FILE_NAME};
use veritas_core::{
    ConstraintSet, DatasetMetadata, DatasetTable, PipelineConfig, QualityPipeline, VeritasError,
    load_dataset,
};

const GENERAL_CONSTRAINTS: &str = "\
name,lower_bound,upper_bound,notes
Frequency_Threshold,5,100,percent of non-null rows
Skewness,-2,2,
Kurtosis,-7,7,
Monotonicity,0.9,1,
Date,1900,2100,
Date-Format,n/a,n/a,
";

const UNIT_CONSTRAINTS: &str = "\
name,lower_bound,upper_bound,notes
percent,0,100,
";

fn metadata_document() -> Value {
    json!({
        "name": "shop",
        "referenceURL": "https://example.org/shop",
        "objects": [
            {
                "name": "customers",
                "type": "table",
                "relationships": { "primaryKeys": ["id"] },
                "attributes": [
                    { "name": "id", "dataQualityClass": "primary_key", "units": "n/a" },
                    {
                        "name": "tier",
                        "dataQualityClass": "categorical",
                        "dataQuality": [
                            { "name": "Number of Categories", "value": 2, "frequencies": [
                                { "name": "gold", "count": 1, "frequencyPercent": 1.0 },
                                { "name": "basic", "count": 99, "frequencyPercent": 99.0 }
                            ]}
                        ]
                    },
                    {
                        "name": "score",
                        "dataQualityClass": "numerical",
                        "units": "percent",
                        "dataQuality": [
                            { "name": "Count", "value": 4 },
                            { "name": "Minimum Value", "value": 50 },
                            { "name": "Maximum Value", "value": 400 }
                        ]
                    }
                ]
            },
            {
                "name": "orders",
                "relationships": {
                    "refersToPrimaryKeyTables": {
                        "customers": [ { "foreignKey": "customer", "foreignKeyRefersTo": "id", "keyID": 0 } ]
                    }
                },
                "attributes": [
                    { "name": "order_id", "dataQualityClass": "primary_key" },
                    { "name": "customer", "dataQualityClass": "foreign_key" },
                    { "name": "amount", "dataQualityClass": "none" }
                ]
            },
            {
                "name": "payments",
                "relationships": {
                    "refersToPrimaryKeyTables": {
                        "customers": [ { "foreignKey": "customer", "foreignKeyRefersTo": "id", "keyID": 0 } ]
                    }
                },
                "attributes": [
                    { "name": "pay_id", "dataQualityClass": "primary_key" },
                    { "name": "customer", "dataQualityClass": "foreign_key" }
                ]
            }
        ]
    })
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(
            data.join("customers.csv"),
            "id,tier,score\n1,gold,50\n2,basic,60\n2,basic,400\n4,basic,70\n",
        )
        .unwrap();
        std::fs::write(data.join("orders.csv"), "order_id,customer,amount\n10,1,5\n11,9,6\n12,2,7\n").unwrap();
        std::fs::write(data.join("payments.csv"), "pay_id,customer\n100,7\n101,7\n102,1\n").unwrap();

        std::fs::write(dir.path().join("general.csv"), GENERAL_CONSTRAINTS).unwrap();
        std::fs::write(dir.path().join("units.csv"), UNIT_CONSTRAINTS).unwrap();
        std::fs::write(
            dir.path().join("shop.json"),
            serde_json::to_vec_pretty(&metadata_document()).unwrap(),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn constraints(&self) -> ConstraintSet {
        ConstraintSet::from_paths(&self.path("general.csv"), &self.path("units.csv")).unwrap()
    }

    fn metadata(&self) -> DatasetMetadata {
        DatasetMetadata::from_path(&self.path("shop.json")).unwrap()
    }
}

fn read_csv(contents: &[u8]) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(contents)
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn column(table: &dyn DatasetTable, attribute: &str) -> Vec<Value> {
    table.column(attribute).unwrap().to_vec()
}

#[test]
fn test_full_run_annotates_records() {
    let fixture = Fixture::new();
    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();

    let outcome = pipeline.run(metadata, &fixture.constraints(), dataset).unwrap();
    assert!(outcome.execution.is_complete());
    assert_eq!(outcome.execution.executed_rules, 5);
    assert_eq!(outcome.execution.executed_groups, 1);

    let registry = pipeline.registry();
    let state = |description: &str| registry.by_description(description).unwrap().error_state;

    let customers = outcome.dataset.get("customers").unwrap();
    assert_eq!(column(customers, "id"), vec![json!(1), json!(2), json!(2), json!(4)]);
    assert_eq!(
        customers.error_states(),
        &[
            state("single_sub_threshold_frequency"),
            state("affects_many_uniqueness"),
            state("affects_many_uniqueness") | state("affects_many_unit"),
            0,
        ]
    );
    assert_eq!(customers.error_probabilities(), &[1.0, 0.0, 0.0, 0.0]);
    assert!((customers.missing_records() - 0.8).abs() < 1e-9);

    let orders = outcome.dataset.get("orders").unwrap();
    assert_eq!(orders.error_states(), &[0, state("single_record_orphan"), 0]);
    assert_eq!(orders.error_probabilities(), &[0.0, 1.0, 0.0]);

    let payments = outcome.dataset.get("payments").unwrap();
    let multi = state("multi_record_orphan");
    assert_eq!(payments.error_states(), &[multi, multi, 0]);
    assert_eq!(payments.error_probabilities(), &[0.2, 0.2, 0.0]);
}

#[test]
fn test_full_run_distills_quality() {
    let fixture = Fixture::new();
    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();
    let outcome = pipeline.run(metadata, &fixture.constraints(), dataset).unwrap();

    let customers = outcome
        .characterization
        .get_data_quality_for_table("customers")
        .unwrap();
    assert_eq!(customers.scorecard.accuracy, 75.0);
    assert_eq!(customers.scorecard.completeness, 80.0);
    assert_eq!(customers.scorecard.percent_overall, 60.0);

    let payments = outcome
        .characterization
        .get_data_quality_for_table("payments")
        .unwrap();
    // 0.4 expected erroneous records round to none
    assert_eq!(payments.scorecard.accuracy, 100.0);

    let dataset = outcome.characterization.dataset();
    assert_eq!(dataset.record_count, 10.0);
    assert!((dataset.erroneous_count - 2.4).abs() < 1e-9);
    let scorecard = outcome.characterization.dataset_scorecard("shop").unwrap();
    assert_eq!(scorecard.accuracy, 80.0);
    assert!((scorecard.completeness - 1000.0 / 11.0).abs() < 1e-9);

    let summary = outcome.metadata.data_quality_summary.as_ref().unwrap();
    assert_eq!(summary["referenceURL"], "https://example.org/shop");
    assert_eq!(summary["measures"][3]["value"], json!(90.91));
    assert_eq!(summary["measures"][5]["name"], "Overall Quality Metric");
    assert_eq!(summary["measures"][5]["value"], json!(72.73));
    assert_eq!(summary["measures"][5]["showAsSummary"], json!(true));

    let table_summary = outcome
        .metadata
        .table("orders")
        .and_then(|table| table.data_quality_summary.as_ref())
        .unwrap();
    assert_eq!(table_summary["measures"][4]["value"], json!(66.67));
}

#[test]
fn test_rendered_reports() {
    let fixture = Fixture::new();
    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();
    let outcome = pipeline.run(metadata, &fixture.constraints(), dataset).unwrap();

    let files: BTreeMap<String, Vec<u8>> = pipeline
        .render(&outcome, "shop")
        .unwrap()
        .into_iter()
        .map(|file| (file.file_name, file.contents))
        .collect();
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "customers.csv",
            ERRORS_FILE_NAME,
            "orders.csv",
            "payments.csv",
            RULES_FILE_NAME,
            "shop.json",
            "shop.summary.json",
        ]
    );

    let rules = read_csv(&files[RULES_FILE_NAME]);
    assert_eq!(
        rules[0],
        vec!["rule_id", "table_name", "attribute_name", "is_active", "rule_description"]
    );
    assert_eq!(rules.len(), 9);
    // reference rules come first and share one group
    assert_eq!(rules[1][0], "6");
    assert_eq!(rules[1][1], "orders");
    assert_eq!(rules[2][0], "7");
    let normal = rules.iter().find(|row| row[0] == "2").unwrap();
    assert_eq!(normal[2], "score");
    assert_eq!(normal[3], "false");

    let errors = read_csv(&files[ERRORS_FILE_NAME]);
    assert_eq!(errors.len(), 6);
    assert_eq!(
        errors[1],
        vec!["customers", "id", "affects_many_uniqueness", "0", "2", "2"]
    );
    assert_eq!(
        errors[2],
        vec!["customers", "tier", "single_sub_threshold_frequency", "1", "1", "gold"]
    );
    assert_eq!(errors[3][2], "affects_many_unit");
    assert_eq!(errors[3][5], "400");
    assert_eq!(
        errors[4],
        vec!["orders", "customer", "single_record_orphan", "1", "1", "9"]
    );

    let customers = read_csv(&files["customers.csv"]);
    assert_eq!(
        customers[0],
        vec!["id", "tier", "score", "error_state", "probability_error"]
    );
    assert_eq!(customers[3][3], "9,3");
    assert_eq!(positions_to_bitmask(&customers[3][3]).unwrap(), (1 << 9) | (1 << 3));
    assert_eq!(customers[4][3], "");
    assert_eq!(customers[1][4], "1");

    let summary: Value = serde_json::from_slice(&files["shop.summary.json"]).unwrap();
    assert_eq!(summary["dataQualitySummary"]["measures"].as_array().unwrap().len(), 6);

    let annotated = DatasetMetadata::from_reader(files["shop.json"].as_slice()).unwrap();
    assert!(annotated
        .objects
        .iter()
        .all(|table| table.data_quality_summary.is_some()));
}

#[test]
fn test_active_only_catalog() {
    let fixture = Fixture::new();
    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline =
        QualityPipeline::new(PipelineConfig::new().with_include_inactive_rules(false)).unwrap();
    let outcome = pipeline.run(metadata, &fixture.constraints(), dataset).unwrap();

    let rules = pipeline
        .render(&outcome, "shop")
        .unwrap()
        .into_iter()
        .find(|file| file.file_name == RULES_FILE_NAME)
        .unwrap();
    let rows = read_csv(&rules.contents);
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().skip(1).all(|row| row[3] == "true"));
}

#[test]
fn test_missing_table_file_skips_its_rules() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.path("data").join("payments.csv")).unwrap();
    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    assert!(!dataset.contains("payments"));

    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();
    let outcome = pipeline.run(metadata, &fixture.constraints(), dataset).unwrap();
    assert!(!outcome.execution.is_complete());
    assert!(outcome
        .execution
        .skipped
        .iter()
        .any(|skipped| skipped.table_name == "payments"));
    assert!(outcome.metadata.table("payments").unwrap().data_quality_summary.is_none());
}

#[test]
fn test_missing_general_constraint_aborts() {
    let fixture = Fixture::new();
    let general: String = GENERAL_CONSTRAINTS
        .lines()
        .filter(|line| !line.starts_with("Frequency_Threshold"))
        .map(|line| format!("{}\n", line))
        .collect();
    std::fs::write(fixture.path("general.csv"), general).unwrap();

    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();
    let result = pipeline.run(metadata, &fixture.constraints(), dataset);
    assert!(matches!(result, Err(VeritasError::Configuration { .. })));
}

#[test]
fn test_empty_table_fails_distillation() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("data").join("orders.csv"), "order_id,customer,amount\n").unwrap();

    let metadata = fixture.metadata();
    let dataset = load_dataset(&metadata, &fixture.path("data")).unwrap();
    let pipeline = QualityPipeline::new(PipelineConfig::default()).unwrap();
    let result = pipeline.run(metadata, &fixture.constraints(), dataset);
    assert!(
        matches!(&result, Err(VeritasError::Distillation { table, .. }) if table == "orders"),
        "unexpected result: {:?}",
        result.map(|outcome| outcome.execution)
    );
}

#[test]
fn test_malformed_constraint_file() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("units.csv"), "name,lower,upper,notes\npercent,zero,100,\n").unwrap();
    let result = ConstraintSet::from_paths(&fixture.path("general.csv"), &fixture.path("units.csv"));
    assert!(matches!(result, Err(VeritasError::Configuration { .. })));
}

#[test]
fn test_missing_metadata_file() {
    let result = DatasetMetadata::from_path(Path::new("/nonexistent/metadata.json"));
    assert!(result.is_err());
}
