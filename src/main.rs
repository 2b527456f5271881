use clap::Parser;
use std::process;

use abroad_migrate::destination::DestinationStore;
use abroad_migrate::engine::MigrationEngine;
use abroad_migrate::legacy::LegacySource;
use abroad_migrate::reporter::{MigrationReporter, ReportFormat};
use abroad_migrate::schema_version::SchemaVersion;

#[derive(Parser, Debug)]
#[command(name = "abroad-migrate")]
#[command(about = "Migrate legacy study-abroad and internship records to the normalized experience schema")]
struct Args {
    /// Path to the legacy SQLite database
    source_db: String,

    /// Path to the destination SQLite database (recreated on every run)
    dest_db: String,

    /// Destination schema version to write (e.g., v1, v2) - defaults to the latest
    #[arg(long, value_name = "VERSION")]
    schema_version: Option<String>,

    /// Report output format: console or json
    #[arg(long, value_name = "FORMAT", default_value = "console")]
    report_format: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let version = match args.schema_version.as_deref() {
        Some(raw) => match raw.parse::<SchemaVersion>() {
            Ok(version) => version,
            Err(e) => {
                eprintln!("\n❌ Error: {}", e);
                eprintln!("\nSupported schema versions: v1, v2");
                process::exit(1);
            }
        },
        None => SchemaVersion::LATEST,
    };

    let format = match args.report_format.parse::<ReportFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            eprintln!("\nSupported report formats: console, json");
            process::exit(1);
        }
    };

    let source = match LegacySource::open(&args.source_db) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("\n❌ Error: failed to open source database: {}", e);
            process::exit(1);
        }
    };

    let dest = match DestinationStore::open(&args.dest_db, version) {
        Ok(dest) => dest,
        Err(e) => {
            eprintln!("\n❌ Error: failed to open destination database: {}", e);
            process::exit(1);
        }
    };

    let engine = MigrationEngine::new(source, dest);
    let outcome = match engine.run() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(1);
        }
    };

    let reporter = MigrationReporter::new().with_format(format);
    let report = reporter.generate_report(
        version,
        outcome.row_counts,
        outcome.transformations,
        outcome.validation,
    );
    match reporter.format_report(&report) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(1);
        }
    }

    if !report.validation_summary.is_valid {
        eprintln!("\n❌ Validation failed: the destination has referential-integrity errors");
        process::exit(1);
    }

    if format == ReportFormat::Console {
        println!("=== Migration Complete ===");
        println!("  ✓ Destination: {}", args.dest_db);
    }
}
