//! Quality summary blocks embedded in the metadata document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{DataQuality, Scorecard};
use crate::error::VeritasError;
use crate::Result;

const PERCENT: &str = "%";

/// One reported measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    /// Display name
    pub name: String,
    /// Value rounded to the display precision
    pub value: f64,
    /// Units of the value
    pub units: String,
    /// Raw count behind a percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Rendered as a chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_as_graphic: Option<bool>,
    /// Rendered in the dataset overview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_as_summary: Option<bool>,
    /// Chart label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic_legend: Option<String>,
}

impl Measure {
    fn percent(name: &str, value: f64, precision: u32) -> Self {
        Self {
            name: name.to_string(),
            value: round_to(value, precision),
            units: PERCENT.to_string(),
            notes: None,
            show_as_graphic: None,
            show_as_summary: None,
            graphic_legend: None,
        }
    }

    fn with_count_note(mut self, count: f64) -> Self {
        self.notes = Some(format!("{} records/rows", count.round_ties_even()));
        self
    }

    fn with_graphic(mut self, legend: &str) -> Self {
        self.show_as_graphic = Some(true);
        self.graphic_legend = Some(legend.to_string());
        self
    }
}

/// Rounds half away from zero to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(precision).unwrap_or(i32::MAX));
    if !factor.is_finite() {
        return value;
    }
    (value * factor).round() / factor
}

/// The `dataQualitySummary` block of a table or dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    /// Measures in report order
    pub measures: Vec<Measure>,
    /// Link to the full report, dataset blocks only
    #[serde(rename = "referenceURL", default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
}

impl QualitySummary {
    /// Summary block of a table.
    pub fn for_table(quality: &DataQuality, scorecard: &Scorecard, precision: u32) -> Self {
        Self {
            measures: vec![
                Measure::percent(
                    "Error Affected Records/Rows",
                    scorecard.percent_error_affected,
                    precision,
                )
                .with_count_note(quality.error_affected_count),
                Measure::percent("Erroneous Records/Rows", scorecard.percent_erroneous, precision)
                    .with_count_note(quality.erroneous_count),
                Measure::percent("Missing Records/Rows", scorecard.percent_missing, precision)
                    .with_count_note(quality.missing_count),
                Measure::percent("Completeness Metric", scorecard.completeness, precision)
                    .with_graphic("Completeness"),
                Measure::percent("Accuracy Metric", scorecard.accuracy, precision)
                    .with_graphic("Accuracy"),
                Measure::percent("Overall Quality Metric", scorecard.percent_overall, precision),
            ],
            reference_url: None,
        }
    }

    /// Summary block of a dataset: the table block plus the reference URL,
    /// with the overall measure promoted to the dataset's headline.
    pub fn for_dataset(
        quality: &DataQuality,
        scorecard: &Scorecard,
        reference_url: Option<String>,
        precision: u32,
    ) -> Self {
        let mut summary = Self::for_table(quality, scorecard, precision);
        summary.reference_url = reference_url;
        if let Some(overall) = summary.measures.last_mut() {
            overall.show_as_graphic = Some(true);
            overall.show_as_summary = Some(true);
            overall.graphic_legend = Some("Overall".to_string());
        }
        summary
    }

    /// Looks up a measure by name.
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// The block as a JSON value.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| VeritasError::serialization("Serializing quality summary", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DataQuality, Scorecard) {
        let quality = DataQuality::new(3.0, 2.0, 1.0, 1.0, 1.0);
        let scorecard = quality.scorecard().unwrap();
        (quality, scorecard)
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(96.774_19, 2) - 96.77).abs() < 1e-9);
        assert!((round_to(66.666_6, 0) - 67.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_summary_layout() {
        let (quality, scorecard) = sample();
        let summary = QualitySummary::for_table(&quality, &scorecard, 2);
        let names: Vec<&str> = summary.measures.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Error Affected Records/Rows",
                "Erroneous Records/Rows",
                "Missing Records/Rows",
                "Completeness Metric",
                "Accuracy Metric",
                "Overall Quality Metric",
            ]
        );

        let affected = summary.measure("Error Affected Records/Rows").unwrap();
        assert!((affected.value - 66.67).abs() < 1e-9);
        assert_eq!(affected.notes.as_deref(), Some("2 records/rows"));
        assert_eq!(
            summary.measure("Accuracy Metric").unwrap().graphic_legend.as_deref(),
            Some("Accuracy")
        );

        let value = summary.to_value().unwrap();
        assert!(value.get("referenceURL").is_none());
        assert!(value["measures"][5].get("showAsGraphic").is_none());
        assert_eq!(value["measures"][3]["showAsGraphic"], serde_json::json!(true));
    }

    #[test]
    fn test_dataset_summary_headline() {
        let (quality, scorecard) = sample();
        let summary = QualitySummary::for_dataset(
            &quality,
            &scorecard,
            Some("https://example.org/report".into()),
            2,
        );
        let value = summary.to_value().unwrap();
        assert_eq!(value["referenceURL"], "https://example.org/report");
        assert_eq!(value["measures"][5]["showAsSummary"], serde_json::json!(true));
        assert_eq!(value["measures"][5]["graphicLegend"], "Overall");
        // 2 of 4 expected records present and correct
        assert!((summary.measures[5].value - 50.0).abs() < 1e-9);
    }
}
