use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::destination::{
    DestinationStore, ExperienceRef, NewCourse, NewEntryRegulation, NewFinance, NewHousing,
    NewInternshipExperience, NewOrganisation, NewStudyExperience, NewUniversity, NewUser,
    NewVaccination, StoreError,
};
use crate::field_mapping::{clean_url, invert_rating, parse_bool, reclassify_continent};
use crate::legacy::{LegacyInternship, LegacySource, LegacyStudent, SourceError};
use crate::reporter::TransformationSummary;
use crate::validation::{self, ValidationReport, ValidationWarning, ValidationWarningType};

/// Drives the migration: reads the legacy groups in order, reshapes their
/// rows through the field mappings and writes the normalized tables.
pub struct MigrationEngine {
    source: LegacySource,
    dest: DestinationStore,
}

/// What a completed run produced, as input for the reporter.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub row_counts: Vec<(String, i64)>,
    pub transformations: TransformationSummary,
    pub validation: ValidationReport,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to read the legacy database: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to write the destination database: {0}")]
    Store(#[from] StoreError),
}

impl MigrationEngine {
    pub fn new(source: LegacySource, dest: DestinationStore) -> Self {
        Self { source, dest }
    }

    pub fn destination(&self) -> &DestinationStore {
        &self.dest
    }

    /// Run the full migration: recreate the destination, migrate the
    /// study-abroad group, then the internship group, then validate.
    pub fn run(&self) -> Result<MigrationOutcome, MigrationError> {
        info!(
            "recreating destination schema (version {})",
            self.dest.version()
        );
        self.dest.recreate()?;

        let mut counters = TransformationSummary::default();
        let mut dedup_warnings = Vec::new();

        info!("migrating study-abroad records");
        self.migrate_students(&mut counters, &mut dedup_warnings)?;

        info!("migrating internship records");
        self.migrate_internships()?;

        info!("validating destination referential integrity");
        let mut validation = validation::validate(&self.dest)?;
        for warning in dedup_warnings {
            validation.add_warning(warning);
        }

        Ok(MigrationOutcome {
            row_counts: self.dest.row_counts()?,
            transformations: counters,
            validation,
        })
    }

    fn migrate_students(
        &self,
        counters: &mut TransformationSummary,
        dedup_warnings: &mut Vec<ValidationWarning>,
    ) -> Result<(), MigrationError> {
        for student in self.source.students()? {
            // A student without a university row has no experience worth
            // migrating; the legacy app produced such rows when a report
            // was abandoned half-way.
            let Some(uni) = self.source.university_for_student(student.id)? else {
                debug!("student {} has no university row, skipping", student.id);
                continue;
            };

            let user_id = self.dest.insert_user(&user_from_student(&student))?;

            let new_uni = NewUniversity {
                legacy_id: Some(uni.id),
                name: uni.name.clone(),
                country: uni.country.clone(),
                city: uni.city.clone(),
                continent: mapped_continent(counters, uni.country.as_deref(), uni.continent),
                postcode: uni.postcode.clone(),
                homepage: mapped_url(counters, uni.homepage),
                department_homepage: mapped_url(counters, uni.department_homepage),
            };
            let upsert = self.dest.upsert_university(&new_uni)?;
            if upsert.deduplicated && upsert.existing_country != new_uni.country {
                dedup_warnings.push(ValidationWarning::new(
                    ValidationWarningType::DedupCountryMismatch,
                    format!(
                        "university {:?} collapsed rows with countries {:?} and {:?}",
                        new_uni.name, upsert.existing_country, new_uni.country
                    ),
                ));
            }

            let experience_id = self.dest.insert_study_experience(&NewStudyExperience {
                user_id,
                university_id: upsert.id,
                tuition_fees: mapped_bool(counters, uni.tuition_fees),
                fees_per_semester: uni.fees_per_semester,
                stay_period: uni.stay_period,
            })?;
            let parent = ExperienceRef::Study(experience_id);
            debug!(
                "student {} -> user {}, study experience {}",
                student.id, user_id, experience_id
            );

            for course in self.source.courses_for_university(uni.id)? {
                self.dest.insert_course(
                    parent,
                    &NewCourse {
                        name: course.name,
                        coordinator: course.coordinator,
                        exam_type: course.exam_type,
                        difficulty: course.difficulty,
                        notes: course.notes,
                        email: course.email,
                        internships: course.internships,
                    },
                )?;
            }

            if let Some(housing) = self.source.housing_for_student(student.id)? {
                self.dest.insert_housing(
                    parent,
                    &NewHousing {
                        housing_type: housing.housing_type,
                        homepage: mapped_url(counters, housing.homepage),
                        quality: mapped_rating(counters, housing.quality),
                        notes: housing.notes,
                        costs: housing.costs,
                    },
                )?;
            }

            if let Some(entry) = self.source.entry_regulation_for_student(student.id)? {
                self.dest.insert_entry_regulation(
                    parent,
                    &NewEntryRegulation {
                        visa_required: mapped_bool(counters, entry.visa_required),
                        costs: entry.costs,
                        embassy_name: entry.embassy_name,
                        embassy_city: entry.embassy_city,
                        processing_time: entry.processing_time,
                        remarks: entry.remarks,
                        embassy_homepage: mapped_url(counters, entry.embassy_homepage),
                        embassy_email: entry.embassy_email,
                        embassy_phone: entry.embassy_phone,
                    },
                )?;
            }

            for vaccination in self.source.vaccinations_for_student(student.id)? {
                self.dest.insert_vaccination(
                    parent,
                    &NewVaccination {
                        kind: vaccination.kind,
                        costs: vaccination.costs,
                        notes: vaccination.notes,
                    },
                )?;
            }

            if let Some(financing) = self.source.financing_for_student(student.id)? {
                self.dest.insert_finance(
                    parent,
                    &NewFinance {
                        institution: financing.institution,
                        amount: financing.amount,
                    },
                )?;
            }
        }
        Ok(())
    }

    // Internship reports arrived through a web form and are already clean;
    // no field transformations apply here.
    fn migrate_internships(&self) -> Result<(), MigrationError> {
        for internship in self.source.internships()? {
            let (first_name, last_name) = split_name(internship.name.as_deref());
            let user_id = self.dest.insert_user(&NewUser {
                first_name,
                last_name,
                email: internship.contact_email.clone(),
                phone: None,
                class_year: None,
            })?;

            let organisation_id = self.dest.upsert_organisation(&NewOrganisation {
                name: internship.organisation.clone(),
                country: internship.country.clone(),
                city: internship.city.clone(),
            })?;

            let experience_id = self
                .dest
                .insert_internship_experience(&NewInternshipExperience {
                    user_id,
                    organisation_id,
                    country: internship.country.clone(),
                    city: internship.city.clone(),
                    duration: internship.duration.clone(),
                    work_description: internship.work_description.clone(),
                    skills_learned: internship.skills_learned.clone(),
                    application_tips: internship.application_tips.clone(),
                    general_comments: internship.general_comments.clone(),
                    overall_experience: internship.overall_experience.clone(),
                    submission_date: internship
                        .submission_date
                        .as_deref()
                        .and_then(parse_submission_date),
                })?;
            debug!(
                "internship report -> user {}, internship experience {}",
                user_id, experience_id
            );

            if has_financing(&internship) {
                self.dest.insert_finance(
                    ExperienceRef::Internship(experience_id),
                    &NewFinance {
                        institution: internship.financing_methods.clone(),
                        amount: internship.stipend_amount.clone(),
                    },
                )?;
            }
        }
        Ok(())
    }
}

fn user_from_student(student: &LegacyStudent) -> NewUser {
    NewUser {
        first_name: student.first_name.clone(),
        last_name: student.last_name.clone(),
        email: student.email.clone(),
        phone: student.phone.clone(),
        class_year: student.class_year.clone(),
    }
}

fn has_financing(internship: &LegacyInternship) -> bool {
    internship.financing_methods.is_some() || internship.stipend_amount.is_some()
}

/// The internship form collected a single free-text name; split it on the
/// last space into first and last name, a bare token becoming the last name.
fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    match name {
        Some(full) => match full.rsplit_once(' ') {
            Some((first, last)) => (Some(first.to_string()), Some(last.to_string())),
            None => (None, Some(full.to_string())),
        },
        None => (None, None),
    }
}

fn parse_submission_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(midnight, Utc));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn mapped_bool(counters: &mut TransformationSummary, raw: Option<String>) -> Option<bool> {
    let parsed = raw.as_deref().and_then(parse_bool);
    if parsed.is_some() {
        counters.booleans_parsed += 1;
    }
    parsed
}

fn mapped_rating(counters: &mut TransformationSummary, raw: Option<String>) -> Option<i64> {
    let inverted = raw.as_deref().and_then(invert_rating);
    if inverted.is_some() {
        counters.ratings_inverted += 1;
    }
    inverted
}

fn mapped_url(counters: &mut TransformationSummary, raw: Option<String>) -> Option<String> {
    raw.map(|url| {
        let cleaned = clean_url(&url);
        if cleaned != url {
            counters.urls_cleaned += 1;
        }
        cleaned.to_string()
    })
}

fn mapped_continent(
    counters: &mut TransformationSummary,
    country: Option<&str>,
    continent: Option<String>,
) -> Option<String> {
    let reclassified = reclassify_continent(country, continent.as_deref()).map(str::to_string);
    if reclassified != continent {
        counters.continents_reclassified += 1;
    }
    reclassified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_version::SchemaVersion;
    use rusqlite::Connection;

    fn legacy_fixture(include_internships: bool) -> LegacySource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE tblStudenten (
                Student_ID INTEGER PRIMARY KEY,
                Stud_Vorname TEXT, Stud_Name TEXT, email TEXT,
                Telefon TEXT, Jahrgang TEXT
            );
            CREATE TABLE "tblUniversität" (
                Uni_ID INTEGER PRIMARY KEY,
                Student_ID INTEGER,
                Uni_Name TEXT, Land TEXT, Ort TEXT, Kontinent TEXT,
                Postleitzahl TEXT, Homepage_Uni TEXT, Homepage_Abteilung TEXT,
                "Studiengebühren" TEXT, "Höhe pro Semester" TEXT,
                "Zeitraum Aufenthalt" TEXT
            );
            CREATE TABLE tblKurse (
                Kurs_ID INTEGER PRIMARY KEY,
                Uni_ID INTEGER,
                Kurs_Name TEXT, Kursverantwortlicher TEXT, "Prüfungsform" TEXT,
                Schwierigkeitsgrad TEXT, KursHinweise TEXT, Kursemail TEXT,
                Praktika TEXT
            );
            CREATE TABLE lstWohnungsart (
                Wohnart_ID INTEGER PRIMARY KEY, Wohnungsart TEXT
            );
            CREATE TABLE tblWohnung (
                Student_ID INTEGER, WohnungsArt INTEGER,
                WohnheimHomepage TEXT, "Wohnqualität" TEXT,
                WohnHinweise TEXT, WohnKosten TEXT
            );
            CREATE TABLE tblEinreise (
                Student_ID INTEGER, Visum TEXT, Kosten TEXT,
                Botschaft_Name TEXT, BotOrt TEXT, Beantragung_Zeit TEXT,
                Bemerkungen TEXT, Botschaft_Homepage TEXT, BotEmail TEXT,
                BotTelefon TEXT
            );
            CREATE TABLE tblImpfung (
                Student_ID INTEGER, Impfungsart TEXT, ImpfKosten TEXT,
                ImpfHinweise TEXT
            );
            CREATE TABLE tblFinanzierung (
                Student_ID INTEGER, Finanzierung_Institution TEXT, Betrag TEXT
            );

            INSERT INTO tblStudenten VALUES
                (1, 'Anna', 'Muster', 'anna@example.org', '123', '2008'),
                (2, 'Ben', 'Beispiel', NULL, NULL, '2009'),
                (3, 'Ohne', 'Uni', NULL, NULL, NULL);
            INSERT INTO "tblUniversität" VALUES
                (10, 1, 'Uni Talca', 'Chile', 'Talca', 'Amerika', '3460000',
                 'http://utalca.cl#http://mirror.utalca.cl', NULL,
                 'True', '350', '1 Semester'),
                (11, 2, 'Uni Talca', 'Argentinien', NULL, NULL, NULL,
                 NULL, NULL, NULL, NULL, NULL);
            INSERT INTO tblKurse VALUES
                (100, 10, 'Algebra', 'Prof. Soto', 'Klausur', '3',
                 NULL, NULL, NULL);
            INSERT INTO lstWohnungsart VALUES (1, 'Wohnheim');
            INSERT INTO tblWohnung VALUES
                (1, 1, 'http://dorm.example', '2', 'laut', '300');
            INSERT INTO tblEinreise VALUES
                (1, 'False', '50', 'Botschaft Santiago', 'Santiago',
                 '4 Wochen', NULL, 'foo#http://embassy.example', NULL, NULL);
            INSERT INTO tblImpfung VALUES
                (1, 'Tetanus', '20', NULL),
                (1, 'Hepatitis A', '45', NULL);
            INSERT INTO tblFinanzierung VALUES
                (1, 'DAAD', '500');
            "#,
        )
        .unwrap();
        if include_internships {
            conn.execute_batch(
                r#"
                CREATE TABLE internship_abroad (
                    id INTEGER PRIMARY KEY,
                    name TEXT, contact_email TEXT, country TEXT, city TEXT,
                    company_organization TEXT, duration TEXT,
                    stipend_amount TEXT, financing_methods TEXT,
                    work_description TEXT, skills_learned TEXT,
                    application_tips TEXT, general_comments TEXT,
                    overall_experience TEXT, submission_date TEXT
                );
                INSERT INTO internship_abroad VALUES
                    (1, 'Clara Schmidt', 'clara@example.org', 'Japan', 'Tokio',
                     'ACME Labs', '6 Monate', '1200', 'Stipendium',
                     'Robotik', 'ROS', NULL, NULL, '5', '2023-05-01');
                "#,
            )
            .unwrap();
        }
        LegacySource::from_connection(conn)
    }

    fn run_engine(version: SchemaVersion, include_internships: bool) -> (MigrationEngine, MigrationOutcome) {
        let source = legacy_fixture(include_internships);
        let dest = DestinationStore::open_in_memory(version).unwrap();
        let engine = MigrationEngine::new(source, dest);
        let outcome = engine.run().unwrap();
        (engine, outcome)
    }

    fn count(outcome: &MigrationOutcome, table: &str) -> i64 {
        outcome
            .row_counts
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| *rows)
            .unwrap()
    }

    #[test]
    fn test_full_run_row_counts() {
        let (_, outcome) = run_engine(SchemaVersion::V2, true);
        assert_eq!(count(&outcome, "users"), 3);
        assert_eq!(count(&outcome, "universities"), 1);
        assert_eq!(count(&outcome, "organisations"), 1);
        assert_eq!(count(&outcome, "study_experiences"), 2);
        assert_eq!(count(&outcome, "internship_experiences"), 1);
        assert_eq!(count(&outcome, "courses"), 1);
        assert_eq!(count(&outcome, "housing"), 1);
        assert_eq!(count(&outcome, "entry_regulations"), 1);
        assert_eq!(count(&outcome, "vaccinations"), 2);
        assert_eq!(count(&outcome, "finances"), 2);
    }

    #[test]
    fn test_students_without_university_are_skipped() {
        let (engine, _) = run_engine(SchemaVersion::V2, false);
        let orphans: i64 = engine
            .destination()
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM users WHERE last_name = 'Uni'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_field_transformations_are_applied() {
        let (engine, outcome) = run_engine(SchemaVersion::V2, true);
        let conn = engine.destination().connection();

        let quality: i64 = conn
            .query_row("SELECT quality FROM housing", [], |row| row.get(0))
            .unwrap();
        assert_eq!(quality, 4);

        let fees: bool = conn
            .query_row(
                "SELECT tuition_fees FROM study_experiences WHERE tuition_fees IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(fees);

        let visa: bool = conn
            .query_row("SELECT visa_required FROM entry_regulations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!visa);

        let (homepage, continent): (String, String) = conn
            .query_row(
                "SELECT homepage, continent FROM universities WHERE name = 'Uni Talca'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(homepage, "http://utalca.cl");
        assert_eq!(continent, "South America");

        let embassy: String = conn
            .query_row("SELECT embassy_homepage FROM entry_regulations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(embassy, "http://embassy.example");

        assert_eq!(outcome.transformations.ratings_inverted, 1);
        assert_eq!(outcome.transformations.booleans_parsed, 2);
        assert_eq!(outcome.transformations.urls_cleaned, 2);
        assert_eq!(outcome.transformations.continents_reclassified, 1);
    }

    #[test]
    fn test_university_dedup_warns_on_country_mismatch() {
        let (_, outcome) = run_engine(SchemaVersion::V2, false);
        assert!(outcome.validation.is_valid);
        assert!(outcome
            .validation
            .warnings
            .iter()
            .any(|w| w.warning_type == ValidationWarningType::DedupCountryMismatch));
    }

    #[test]
    fn test_internship_pass_links_finance_child() {
        let (engine, _) = run_engine(SchemaVersion::V2, true);
        let conn = engine.destination().connection();
        let (institution, amount): (String, String) = conn
            .query_row(
                "SELECT institution, amount FROM finances
                 WHERE internship_experience_id IS NOT NULL",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(institution, "Stipendium");
        assert_eq!(amount, "1200");

        let (first, last): (String, String) = conn
            .query_row(
                "SELECT first_name, last_name FROM users WHERE email = 'clara@example.org'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(first, "Clara");
        assert_eq!(last, "Schmidt");
    }

    #[test]
    fn test_source_without_internship_table_migrates_cleanly() {
        let (_, outcome) = run_engine(SchemaVersion::V2, false);
        assert!(outcome.validation.is_valid);
        assert_eq!(count(&outcome, "internship_experiences"), 0);
        assert_eq!(count(&outcome, "study_experiences"), 2);
    }

    #[test]
    fn test_v1_carries_legacy_university_key() {
        let (engine, _) = run_engine(SchemaVersion::V1, false);
        let id: i64 = engine
            .destination()
            .connection()
            .query_row(
                "SELECT id FROM universities WHERE name = 'Uni Talca'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(id, 10);
    }

    #[test]
    fn test_rerun_yields_identical_content() {
        let source = legacy_fixture(true);
        let dest = DestinationStore::open_in_memory(SchemaVersion::V2).unwrap();
        let engine = MigrationEngine::new(source, dest);

        let snapshot = |engine: &MigrationEngine| -> (Vec<(String, i64)>, Vec<String>) {
            let counts = engine.destination().row_counts().unwrap();
            let mut stmt = engine
                .destination()
                .connection()
                .prepare("SELECT name FROM universities ORDER BY name")
                .unwrap();
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            (counts, names)
        };

        engine.run().unwrap();
        let first = snapshot(&engine);
        engine.run().unwrap();
        let second = snapshot(&engine);
        assert_eq!(first, second);
    }

    #[test]
    fn test_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("legacy.db");
        let dest_path = dir.path().join("experiences.db");

        let conn = Connection::open(&source_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE tblStudenten (
                Student_ID INTEGER PRIMARY KEY,
                Stud_Vorname TEXT, Stud_Name TEXT, email TEXT,
                Telefon TEXT, Jahrgang TEXT
            );
            CREATE TABLE "tblUniversität" (
                Uni_ID INTEGER PRIMARY KEY,
                Student_ID INTEGER,
                Uni_Name TEXT, Land TEXT, Ort TEXT, Kontinent TEXT,
                Postleitzahl TEXT, Homepage_Uni TEXT, Homepage_Abteilung TEXT,
                "Studiengebühren" TEXT, "Höhe pro Semester" TEXT,
                "Zeitraum Aufenthalt" TEXT
            );
            INSERT INTO tblStudenten VALUES
                (1, 'Anna', 'Muster', NULL, NULL, NULL);
            INSERT INTO "tblUniversität" VALUES
                (10, 1, 'KTH', 'Schweden', 'Stockholm', 'Europa',
                 NULL, NULL, NULL, NULL, NULL, NULL);
            "#,
        )
        .unwrap();
        drop(conn);

        let source = LegacySource::open(&source_path).unwrap();
        let dest = DestinationStore::open(&dest_path, SchemaVersion::V2).unwrap();
        let outcome = MigrationEngine::new(source, dest).run().unwrap();
        assert!(outcome.validation.is_valid);

        let reopened = Connection::open(&dest_path).unwrap();
        let users: i64 = reopened
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
        let uni: String = reopened
            .query_row("SELECT name FROM universities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(uni, "KTH");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name(Some("Clara Schmidt")),
            (Some("Clara".to_string()), Some("Schmidt".to_string()))
        );
        assert_eq!(split_name(Some("Cher")), (None, Some("Cher".to_string())));
        assert_eq!(split_name(None), (None, None));
    }

    #[test]
    fn test_parse_submission_date() {
        let parsed = parse_submission_date("2023-05-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-05-01T00:00:00+00:00");
        assert!(parse_submission_date("not a date").is_none());
    }
}
