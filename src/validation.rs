use serde::{Deserialize, Serialize};

use crate::destination::{DestinationStore, StoreError};

/// Result of the post-migration referential-integrity check.
///
/// Errors mark the report invalid and fail the run; warnings are surfaced in
/// the report but do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A child row whose experience reference is broken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub table: String,
    pub row_id: i64,
    pub error_type: ReferenceErrorType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceErrorType {
    /// Both foreign keys are NULL
    MissingReference,
    /// Both foreign keys are set
    AmbiguousReference,
    /// The referenced experience row does not exist
    DanglingReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub warning_type: ValidationWarningType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarningType {
    /// Natural-key dedup collapsed university rows with differing countries
    DedupCountryMismatch,
    /// A deduplicable row was stored without its natural key
    MissingNaturalKey,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationError {
    pub fn new(table: &str, row_id: i64, error_type: ReferenceErrorType) -> Self {
        let message = match error_type {
            ReferenceErrorType::MissingReference => {
                format!("{} row {} references no experience", table, row_id)
            }
            ReferenceErrorType::AmbiguousReference => {
                format!("{} row {} references both experience kinds", table, row_id)
            }
            ReferenceErrorType::DanglingReference => {
                format!("{} row {} references a missing experience", table, row_id)
            }
        };
        Self {
            table: table.to_string(),
            row_id,
            error_type,
            message,
        }
    }
}

impl ValidationWarning {
    pub fn new(warning_type: ValidationWarningType, message: impl Into<String>) -> Self {
        Self {
            warning_type,
            message: message.into(),
        }
    }
}

/// Walk every child table and check that each row references exactly one
/// experience row that exists. Also flags universities stored without a
/// name, since those escape natural-key dedup.
pub fn validate(store: &DestinationStore) -> Result<ValidationReport, StoreError> {
    let mut report = ValidationReport::new();
    let study_ids = store.study_experience_ids()?;
    let internship_ids = store.internship_experience_ids()?;

    for link in store.child_links()? {
        match (link.study_experience_id, link.internship_experience_id) {
            (None, None) => report.add_error(ValidationError::new(
                link.table,
                link.row_id,
                ReferenceErrorType::MissingReference,
            )),
            (Some(_), Some(_)) => report.add_error(ValidationError::new(
                link.table,
                link.row_id,
                ReferenceErrorType::AmbiguousReference,
            )),
            (Some(id), None) => {
                if !study_ids.contains(&id) {
                    report.add_error(ValidationError::new(
                        link.table,
                        link.row_id,
                        ReferenceErrorType::DanglingReference,
                    ));
                }
            }
            (None, Some(id)) => {
                if !internship_ids.contains(&id) {
                    report.add_error(ValidationError::new(
                        link.table,
                        link.row_id,
                        ReferenceErrorType::DanglingReference,
                    ));
                }
            }
        }
    }

    let mut stmt = store
        .connection()
        .prepare("SELECT id FROM universities WHERE name IS NULL")?;
    let nameless = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    for id in nameless {
        report.add_warning(ValidationWarning::new(
            ValidationWarningType::MissingNaturalKey,
            format!("universities row {} has no name and was not deduplicated", id?),
        ));
    }

    Ok(report)
}
