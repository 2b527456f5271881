use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{schema_version::SchemaVersion, validation::ValidationReport};

/// Reporter for rendering migration run summaries in various formats
pub struct MigrationReporter {
    output_format: ReportFormat,
}

/// Available output formats for migration reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Console,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Summary of one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub schema_version: SchemaVersion,
    pub generated_at: DateTime<Utc>,
    pub row_counts: Vec<TableCount>,
    pub transformations: TransformationSummary,
    pub validation_summary: ValidationSummary,
    pub validation: ValidationReport,
}

/// Rows written to one destination table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// How often each field transformation was applied during the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationSummary {
    pub ratings_inverted: usize,
    pub booleans_parsed: usize,
    pub urls_cleaned: usize,
    pub continents_reclassified: usize,
}

/// Summary of validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub is_valid: bool,
}

impl MigrationReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Assemble the run summary from the migration outcome.
    pub fn generate_report(
        &self,
        schema_version: SchemaVersion,
        row_counts: Vec<(String, i64)>,
        transformations: TransformationSummary,
        validation: ValidationReport,
    ) -> MigrationReport {
        let validation_summary = ValidationSummary {
            total_errors: validation.errors.len(),
            total_warnings: validation.warnings.len(),
            is_valid: validation.is_valid,
        };
        MigrationReport {
            schema_version,
            generated_at: Utc::now(),
            row_counts: row_counts
                .into_iter()
                .map(|(table, rows)| TableCount { table, rows })
                .collect(),
            transformations,
            validation_summary,
            validation,
        }
    }

    /// Format the report according to the configured output format
    pub fn format_report(&self, report: &MigrationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => self.format_console_report(report),
            ReportFormat::Json => self.format_json_report(report),
        }
    }

    fn format_console_report(&self, report: &MigrationReport) -> Result<String, ReportError> {
        let mut output = String::new();

        output.push_str("=== Migration Report ===\n\n");
        output.push_str(&format!("Schema Version: {}\n", report.schema_version));
        output.push_str(&format!(
            "Generated At: {}\n\n",
            report.generated_at.to_rfc3339()
        ));

        output.push_str("Rows Written:\n");
        for count in &report.row_counts {
            output.push_str(&format!("  {}: {}\n", count.table, count.rows));
        }

        output.push_str("\nTransformations Applied:\n");
        output.push_str(&format!(
            "  Ratings inverted: {}\n",
            report.transformations.ratings_inverted
        ));
        output.push_str(&format!(
            "  Booleans parsed: {}\n",
            report.transformations.booleans_parsed
        ));
        output.push_str(&format!(
            "  URLs cleaned: {}\n",
            report.transformations.urls_cleaned
        ));
        output.push_str(&format!(
            "  Continents reclassified: {}\n",
            report.transformations.continents_reclassified
        ));

        output.push_str(&format!(
            "\nValidation Status: {}\n",
            if report.validation_summary.is_valid {
                "VALID"
            } else {
                "INVALID"
            }
        ));

        if !report.validation.errors.is_empty() {
            output.push_str("\nErrors:\n");
            for error in &report.validation.errors {
                output.push_str(&format!("  • {}\n", error.message));
            }
        }

        if !report.validation.warnings.is_empty() {
            output.push_str("\nWarnings:\n");
            for warning in &report.validation.warnings {
                output.push_str(&format!("  • {}\n", warning.message));
            }
        }

        Ok(output)
    }

    fn format_json_report(&self, report: &MigrationReport) -> Result<String, ReportError> {
        serde_json::to_string_pretty(report)
            .map_err(|e| ReportError::SerializationError(e.to_string()))
    }
}

impl Default for MigrationReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown report format: {0}")]
    UnknownFormat(String),
}
