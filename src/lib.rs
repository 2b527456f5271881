// Abroad-Experience Database Migration
pub mod destination;
pub mod engine;
pub mod field_mapping;
pub mod legacy;
pub mod reporter;
pub mod schema_version;
pub mod validation;

// Re-export core types for convenience
pub use destination::{DestinationStore, ExperienceRef};
pub use engine::{MigrationEngine, MigrationError, MigrationOutcome};
pub use legacy::LegacySource;
pub use reporter::{MigrationReport, MigrationReporter, ReportFormat};
pub use schema_version::SchemaVersion;
pub use validation::{ValidationError, ValidationReport, ValidationWarning};
