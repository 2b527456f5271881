use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::schema_version::SchemaVersion;

/// Every table of the normalized schema, in insert order.
pub const ALL_TABLES: [&str; 10] = [
    "users",
    "universities",
    "organisations",
    "study_experiences",
    "internship_experiences",
    "courses",
    "finances",
    "entry_regulations",
    "housing",
    "vaccinations",
];

/// The tables hanging off an experience row.
pub const CHILD_TABLES: [&str; 5] = [
    "courses",
    "finances",
    "entry_regulations",
    "housing",
    "vaccinations",
];

const SCHEMA_DDL: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    phone TEXT,
    class_year TEXT
);
CREATE TABLE universities (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE,
    country TEXT,
    city TEXT,
    continent TEXT,
    postcode TEXT,
    homepage TEXT,
    department_homepage TEXT
);
CREATE TABLE organisations (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE,
    country TEXT,
    city TEXT
);
CREATE TABLE study_experiences (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    university_id INTEGER NOT NULL REFERENCES universities(id),
    tuition_fees INTEGER,
    fees_per_semester TEXT,
    stay_period TEXT
);
CREATE TABLE internship_experiences (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    organisation_id INTEGER NOT NULL REFERENCES organisations(id),
    country TEXT,
    city TEXT,
    duration TEXT,
    work_description TEXT,
    skills_learned TEXT,
    application_tips TEXT,
    general_comments TEXT,
    overall_experience TEXT,
    submission_date TEXT
);
CREATE TABLE courses (
    id INTEGER PRIMARY KEY,
    study_experience_id INTEGER REFERENCES study_experiences(id),
    internship_experience_id INTEGER REFERENCES internship_experiences(id),
    name TEXT,
    coordinator TEXT,
    exam_type TEXT,
    difficulty TEXT,
    notes TEXT,
    email TEXT,
    internships TEXT,
    CHECK ((study_experience_id IS NULL) <> (internship_experience_id IS NULL))
);
CREATE TABLE finances (
    id INTEGER PRIMARY KEY,
    study_experience_id INTEGER REFERENCES study_experiences(id),
    internship_experience_id INTEGER REFERENCES internship_experiences(id),
    institution TEXT,
    amount TEXT,
    CHECK ((study_experience_id IS NULL) <> (internship_experience_id IS NULL))
);
CREATE TABLE entry_regulations (
    id INTEGER PRIMARY KEY,
    study_experience_id INTEGER REFERENCES study_experiences(id),
    internship_experience_id INTEGER REFERENCES internship_experiences(id),
    visa_required INTEGER,
    costs TEXT,
    embassy_name TEXT,
    embassy_city TEXT,
    processing_time TEXT,
    remarks TEXT,
    embassy_homepage TEXT,
    embassy_email TEXT,
    embassy_phone TEXT,
    CHECK ((study_experience_id IS NULL) <> (internship_experience_id IS NULL))
);
CREATE TABLE housing (
    id INTEGER PRIMARY KEY,
    study_experience_id INTEGER REFERENCES study_experiences(id),
    internship_experience_id INTEGER REFERENCES internship_experiences(id),
    housing_type TEXT,
    homepage TEXT,
    quality INTEGER,
    notes TEXT,
    costs TEXT,
    CHECK ((study_experience_id IS NULL) <> (internship_experience_id IS NULL))
);
CREATE TABLE vaccinations (
    id INTEGER PRIMARY KEY,
    study_experience_id INTEGER REFERENCES study_experiences(id),
    internship_experience_id INTEGER REFERENCES internship_experiences(id),
    kind TEXT,
    costs TEXT,
    notes TEXT,
    CHECK ((study_experience_id IS NULL) <> (internship_experience_id IS NULL))
);
"#;

/// Write access to the normalized destination database.
pub struct DestinationStore {
    conn: Connection,
    version: SchemaVersion,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Destination database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Reference to the one experience row a child row belongs to.
///
/// Holding exactly one parent key makes the mutually exclusive foreign-key
/// pair on the child tables unrepresentable to get wrong through this API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceRef {
    Study(i64),
    Internship(i64),
}

impl ExperienceRef {
    fn study_id(&self) -> Option<i64> {
        match self {
            ExperienceRef::Study(id) => Some(*id),
            ExperienceRef::Internship(_) => None,
        }
    }

    fn internship_id(&self) -> Option<i64> {
        match self {
            ExperienceRef::Study(_) => None,
            ExperienceRef::Internship(id) => Some(*id),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct NewUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_year: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewUniversity {
    pub legacy_id: Option<i64>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub postcode: Option<String>,
    pub homepage: Option<String>,
    pub department_homepage: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewOrganisation {
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewStudyExperience {
    pub user_id: i64,
    pub university_id: i64,
    pub tuition_fees: Option<bool>,
    pub fees_per_semester: Option<String>,
    pub stay_period: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInternshipExperience {
    pub user_id: i64,
    pub organisation_id: i64,
    pub country: Option<String>,
    pub city: Option<String>,
    pub duration: Option<String>,
    pub work_description: Option<String>,
    pub skills_learned: Option<String>,
    pub application_tips: Option<String>,
    pub general_comments: Option<String>,
    pub overall_experience: Option<String>,
    pub submission_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
pub struct NewCourse {
    pub name: Option<String>,
    pub coordinator: Option<String>,
    pub exam_type: Option<String>,
    pub difficulty: Option<String>,
    pub notes: Option<String>,
    pub email: Option<String>,
    pub internships: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewFinance {
    pub institution: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewEntryRegulation {
    pub visa_required: Option<bool>,
    pub costs: Option<String>,
    pub embassy_name: Option<String>,
    pub embassy_city: Option<String>,
    pub processing_time: Option<String>,
    pub remarks: Option<String>,
    pub embassy_homepage: Option<String>,
    pub embassy_email: Option<String>,
    pub embassy_phone: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewHousing {
    pub housing_type: Option<String>,
    pub homepage: Option<String>,
    pub quality: Option<i64>,
    pub notes: Option<String>,
    pub costs: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct NewVaccination {
    pub kind: Option<String>,
    pub costs: Option<String>,
    pub notes: Option<String>,
}

/// Outcome of a natural-key upsert into `universities`.
#[derive(Debug, Clone)]
pub struct UniversityUpsert {
    pub id: i64,
    pub deduplicated: bool,
    /// Country already stored for the deduplicated row, for mismatch
    /// detection by the caller.
    pub existing_country: Option<String>,
}

/// Foreign-key pair of one child row, as stored.
#[derive(Debug, Clone)]
pub struct ChildLink {
    pub table: &'static str,
    pub row_id: i64,
    pub study_experience_id: Option<i64>,
    pub internship_experience_id: Option<i64>,
}

impl DestinationStore {
    pub fn open<P: AsRef<Path>>(path: P, version: SchemaVersion) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        Ok(Self { conn, version })
    }

    pub fn open_in_memory(version: SchemaVersion) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        Ok(Self { conn, version })
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Drop whatever a previous run left behind and create the schema fresh.
    pub fn recreate(&self) -> Result<(), StoreError> {
        let mut batch = String::new();
        for table in ALL_TABLES.iter().rev() {
            batch.push_str(&format!("DROP TABLE IF EXISTS {};\n", table));
        }
        batch.push_str(SCHEMA_DDL);
        self.conn.execute_batch(&batch)?;
        Ok(())
    }

    pub fn insert_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO users (first_name, last_name, email, phone, class_year)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.first_name,
                user.last_name,
                user.email,
                user.phone,
                user.class_year
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a university or return the key of the row already stored under
    /// the same name. Rows without a name cannot be deduplicated and are
    /// always inserted.
    ///
    /// Under a schema version that carries legacy keys over, new rows keep
    /// their `Uni_ID`; otherwise SQLite assigns the next rowid.
    pub fn upsert_university(&self, uni: &NewUniversity) -> Result<UniversityUpsert, StoreError> {
        if let Some(name) = &uni.name {
            if let Some((id, existing_country)) = self.find_university_by_name(name)? {
                return Ok(UniversityUpsert {
                    id,
                    deduplicated: true,
                    existing_country,
                });
            }
        }
        let carried_id = if self.version.carries_over_university_ids() {
            uni.legacy_id
        } else {
            None
        };
        self.conn.execute(
            "INSERT INTO universities
                 (id, name, country, city, continent, postcode, homepage, department_homepage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                carried_id,
                uni.name,
                uni.country,
                uni.city,
                uni.continent,
                uni.postcode,
                uni.homepage,
                uni.department_homepage
            ],
        )?;
        Ok(UniversityUpsert {
            id: self.conn.last_insert_rowid(),
            deduplicated: false,
            existing_country: None,
        })
    }

    pub fn find_university_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(i64, Option<String>)>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, country FROM universities WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Insert an organisation or return the key of the row already stored
    /// under the same name. Organisations never carry legacy keys.
    pub fn upsert_organisation(&self, org: &NewOrganisation) -> Result<i64, StoreError> {
        if let Some(name) = &org.name {
            let existing: Option<i64> = self
                .conn
                .query_row(
                    "SELECT id FROM organisations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(id);
            }
        }
        self.conn.execute(
            "INSERT INTO organisations (name, country, city) VALUES (?1, ?2, ?3)",
            params![org.name, org.country, org.city],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_study_experience(
        &self,
        exp: &NewStudyExperience,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO study_experiences
                 (user_id, university_id, tuition_fees, fees_per_semester, stay_period)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                exp.user_id,
                exp.university_id,
                exp.tuition_fees,
                exp.fees_per_semester,
                exp.stay_period
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_internship_experience(
        &self,
        exp: &NewInternshipExperience,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO internship_experiences
                 (user_id, organisation_id, country, city, duration, work_description,
                  skills_learned, application_tips, general_comments, overall_experience,
                  submission_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                exp.user_id,
                exp.organisation_id,
                exp.country,
                exp.city,
                exp.duration,
                exp.work_description,
                exp.skills_learned,
                exp.application_tips,
                exp.general_comments,
                exp.overall_experience,
                exp.submission_date.map(|d| d.to_rfc3339()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_course(
        &self,
        parent: ExperienceRef,
        course: &NewCourse,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO courses
                 (study_experience_id, internship_experience_id, name, coordinator,
                  exam_type, difficulty, notes, email, internships)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                parent.study_id(),
                parent.internship_id(),
                course.name,
                course.coordinator,
                course.exam_type,
                course.difficulty,
                course.notes,
                course.email,
                course.internships
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_finance(
        &self,
        parent: ExperienceRef,
        finance: &NewFinance,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO finances
                 (study_experience_id, internship_experience_id, institution, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                parent.study_id(),
                parent.internship_id(),
                finance.institution,
                finance.amount
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_entry_regulation(
        &self,
        parent: ExperienceRef,
        entry: &NewEntryRegulation,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO entry_regulations
                 (study_experience_id, internship_experience_id, visa_required, costs,
                  embassy_name, embassy_city, processing_time, remarks, embassy_homepage,
                  embassy_email, embassy_phone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                parent.study_id(),
                parent.internship_id(),
                entry.visa_required,
                entry.costs,
                entry.embassy_name,
                entry.embassy_city,
                entry.processing_time,
                entry.remarks,
                entry.embassy_homepage,
                entry.embassy_email,
                entry.embassy_phone
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_housing(
        &self,
        parent: ExperienceRef,
        housing: &NewHousing,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO housing
                 (study_experience_id, internship_experience_id, housing_type, homepage,
                  quality, notes, costs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                parent.study_id(),
                parent.internship_id(),
                housing.housing_type,
                housing.homepage,
                housing.quality,
                housing.notes,
                housing.costs
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_vaccination(
        &self,
        parent: ExperienceRef,
        vaccination: &NewVaccination,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO vaccinations
                 (study_experience_id, internship_experience_id, kind, costs, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parent.study_id(),
                parent.internship_id(),
                vaccination.kind,
                vaccination.costs,
                vaccination.notes
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Row count per destination table, in schema order.
    pub fn row_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut counts = Vec::with_capacity(ALL_TABLES.len());
        for table in ALL_TABLES {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?;
            counts.push((table.to_string(), count));
        }
        Ok(counts)
    }

    /// The stored foreign-key pair of every child row.
    pub fn child_links(&self) -> Result<Vec<ChildLink>, StoreError> {
        let mut links = Vec::new();
        for table in CHILD_TABLES {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT id, study_experience_id, internship_experience_id FROM {}",
                table
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(ChildLink {
                    table,
                    row_id: row.get(0)?,
                    study_experience_id: row.get(1)?,
                    internship_experience_id: row.get(2)?,
                })
            })?;
            for link in rows {
                links.push(link?);
            }
        }
        Ok(links)
    }

    pub fn study_experience_ids(&self) -> Result<HashSet<i64>, StoreError> {
        self.ids("study_experiences")
    }

    pub fn internship_experience_ids(&self) -> Result<HashSet<i64>, StoreError> {
        self.ids("internship_experiences")
    }

    fn ids(&self, table: &str) -> Result<HashSet<i64>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("SELECT id FROM {}", table))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = HashSet::new();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }
}
