use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

/// Read access to the denormalized legacy database.
///
/// The legacy schema evolved over the years and not every dump carries every
/// table or column. Readers therefore degrade: a missing table yields no
/// rows, a missing or malformed column yields an absent value. Only row
/// identifiers are read strictly.
pub struct LegacySource {
    conn: Connection,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Row of `tblStudenten`
#[derive(Debug, Clone)]
pub struct LegacyStudent {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_year: Option<String>,
}

/// Row of `tblUniversität`
#[derive(Debug, Clone)]
pub struct LegacyUniversity {
    pub id: i64,
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub postcode: Option<String>,
    pub homepage: Option<String>,
    pub department_homepage: Option<String>,
    pub tuition_fees: Option<String>,
    pub fees_per_semester: Option<String>,
    pub stay_period: Option<String>,
}

/// Row of `tblKurse`
#[derive(Debug, Clone)]
pub struct LegacyCourse {
    pub name: Option<String>,
    pub coordinator: Option<String>,
    pub exam_type: Option<String>,
    pub difficulty: Option<String>,
    pub notes: Option<String>,
    pub email: Option<String>,
    pub internships: Option<String>,
}

/// Row of `tblWohnung`, with the housing-type label joined in from
/// `lstWohnungsart`
#[derive(Debug, Clone)]
pub struct LegacyHousing {
    pub housing_type: Option<String>,
    pub homepage: Option<String>,
    pub quality: Option<String>,
    pub notes: Option<String>,
    pub costs: Option<String>,
}

/// Row of `tblEinreise`
#[derive(Debug, Clone)]
pub struct LegacyEntryRegulation {
    pub visa_required: Option<String>,
    pub costs: Option<String>,
    pub embassy_name: Option<String>,
    pub embassy_city: Option<String>,
    pub processing_time: Option<String>,
    pub remarks: Option<String>,
    pub embassy_homepage: Option<String>,
    pub embassy_email: Option<String>,
    pub embassy_phone: Option<String>,
}

/// Row of `tblImpfung`
#[derive(Debug, Clone)]
pub struct LegacyVaccination {
    pub kind: Option<String>,
    pub costs: Option<String>,
    pub notes: Option<String>,
}

/// Row of `tblFinanzierung`
#[derive(Debug, Clone)]
pub struct LegacyFinancing {
    pub institution: Option<String>,
    pub amount: Option<String>,
}

/// Row of `internship_abroad`
#[derive(Debug, Clone)]
pub struct LegacyInternship {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub organisation: Option<String>,
    pub duration: Option<String>,
    pub stipend_amount: Option<String>,
    pub financing_methods: Option<String>,
    pub work_description: Option<String>,
    pub skills_learned: Option<String>,
    pub application_tips: Option<String>,
    pub general_comments: Option<String>,
    pub overall_experience: Option<String>,
    pub submission_date: Option<String>,
}

impl LegacySource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection, mainly for in-memory fixtures.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn students(&self) -> Result<Vec<LegacyStudent>, SourceError> {
        if !self.table_exists("tblStudenten")? {
            debug!("source has no tblStudenten table, nothing to migrate");
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare("SELECT * FROM tblStudenten")?;
        let rows = stmt.query_map([], |row| {
            Ok(LegacyStudent {
                id: row.get("Student_ID")?,
                first_name: text(row, "Stud_Vorname"),
                last_name: text(row, "Stud_Name"),
                email: text(row, "email"),
                phone: text(row, "Telefon"),
                class_year: text(row, "Jahrgang"),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The legacy app stored one university row per student. Students
    /// without one have no study experience to migrate.
    pub fn university_for_student(
        &self,
        student_id: i64,
    ) -> Result<Option<LegacyUniversity>, SourceError> {
        if !self.table_exists("tblUniversität")? {
            return Ok(None);
        }
        let row = self
            .conn
            .query_row(
                "SELECT * FROM tblUniversität WHERE Student_ID = ?1",
                params![student_id],
                |row| {
                    Ok(LegacyUniversity {
                        id: row.get("Uni_ID")?,
                        name: text(row, "Uni_Name"),
                        country: text(row, "Land"),
                        city: text(row, "Ort"),
                        continent: text(row, "Kontinent"),
                        postcode: text(row, "Postleitzahl"),
                        homepage: text(row, "Homepage_Uni"),
                        department_homepage: text(row, "Homepage_Abteilung"),
                        tuition_fees: text(row, "Studiengebühren"),
                        fees_per_semester: text(row, "Höhe pro Semester"),
                        stay_period: text(row, "Zeitraum Aufenthalt"),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn courses_for_university(
        &self,
        university_id: i64,
    ) -> Result<Vec<LegacyCourse>, SourceError> {
        if !self.table_exists("tblKurse")? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM tblKurse WHERE Uni_ID = ?1")?;
        let rows = stmt.query_map(params![university_id], |row| {
            Ok(LegacyCourse {
                name: text(row, "Kurs_Name"),
                coordinator: text(row, "Kursverantwortlicher"),
                exam_type: text(row, "Prüfungsform"),
                difficulty: text(row, "Schwierigkeitsgrad"),
                notes: text(row, "KursHinweise"),
                email: text(row, "Kursemail"),
                internships: text(row, "Praktika"),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn housing_for_student(
        &self,
        student_id: i64,
    ) -> Result<Option<LegacyHousing>, SourceError> {
        if !self.table_exists("tblWohnung")? {
            return Ok(None);
        }
        // The housing type is an ID into lstWohnungsart; older dumps ship
        // without the lookup table, in which case the label stays absent.
        let sql = if self.table_exists("lstWohnungsart")? {
            "SELECT tblWohnung.*, lstWohnungsart.Wohnungsart AS Wohnungsart_Name \
             FROM tblWohnung \
             LEFT JOIN lstWohnungsart ON tblWohnung.WohnungsArt = lstWohnungsart.Wohnart_ID \
             WHERE Student_ID = ?1"
        } else {
            "SELECT * FROM tblWohnung WHERE Student_ID = ?1"
        };
        let row = self
            .conn
            .query_row(sql, params![student_id], |row| {
                Ok(LegacyHousing {
                    housing_type: text(row, "Wohnungsart_Name"),
                    homepage: text(row, "WohnheimHomepage"),
                    quality: text(row, "Wohnqualität"),
                    notes: text(row, "WohnHinweise"),
                    costs: text(row, "WohnKosten"),
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn entry_regulation_for_student(
        &self,
        student_id: i64,
    ) -> Result<Option<LegacyEntryRegulation>, SourceError> {
        if !self.table_exists("tblEinreise")? {
            return Ok(None);
        }
        let row = self
            .conn
            .query_row(
                "SELECT * FROM tblEinreise WHERE Student_ID = ?1",
                params![student_id],
                |row| {
                    Ok(LegacyEntryRegulation {
                        visa_required: text(row, "Visum"),
                        costs: text(row, "Kosten"),
                        embassy_name: text(row, "Botschaft_Name"),
                        embassy_city: text(row, "BotOrt"),
                        processing_time: text(row, "Beantragung_Zeit"),
                        remarks: text(row, "Bemerkungen"),
                        embassy_homepage: text(row, "Botschaft_Homepage"),
                        embassy_email: text(row, "BotEmail"),
                        embassy_phone: text(row, "BotTelefon"),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn vaccinations_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<LegacyVaccination>, SourceError> {
        if !self.table_exists("tblImpfung")? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM tblImpfung WHERE Student_ID = ?1")?;
        let rows = stmt.query_map(params![student_id], |row| {
            Ok(LegacyVaccination {
                kind: text(row, "Impfungsart"),
                costs: text(row, "ImpfKosten"),
                notes: text(row, "ImpfHinweise"),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn financing_for_student(
        &self,
        student_id: i64,
    ) -> Result<Option<LegacyFinancing>, SourceError> {
        if !self.table_exists("tblFinanzierung")? {
            return Ok(None);
        }
        let row = self
            .conn
            .query_row(
                "SELECT * FROM tblFinanzierung WHERE Student_ID = ?1",
                params![student_id],
                |row| {
                    Ok(LegacyFinancing {
                        institution: text(row, "Finanzierung_Institution"),
                        amount: text(row, "Betrag"),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Internship reports live in their own table added late in the legacy
    /// app's life; many dumps predate it.
    pub fn internships(&self) -> Result<Vec<LegacyInternship>, SourceError> {
        if !self.table_exists("internship_abroad")? {
            debug!("source has no internship_abroad table, skipping internship pass");
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare("SELECT * FROM internship_abroad")?;
        let rows = stmt.query_map([], |row| {
            Ok(LegacyInternship {
                name: text(row, "name"),
                contact_email: text(row, "contact_email"),
                country: text(row, "country"),
                city: text(row, "city"),
                organisation: text(row, "company_organization"),
                duration: text(row, "duration"),
                stipend_amount: text(row, "stipend_amount"),
                financing_methods: text(row, "financing_methods"),
                work_description: text(row, "work_description"),
                skills_learned: text(row, "skills_learned"),
                application_tips: text(row, "application_tips"),
                general_comments: text(row, "general_comments"),
                overall_experience: text(row, "overall_experience"),
                submission_date: text(row, "submission_date"),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Read a column as trimmed text, tolerating missing columns and any
/// storage class. Absent, NULL, blob and empty-string values are all `None`.
fn text(row: &Row, column: &str) -> Option<String> {
    match row.get_ref(column) {
        Ok(ValueRef::Text(bytes)) => {
            let value = String::from_utf8_lossy(bytes);
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Ok(ValueRef::Integer(value)) => Some(value.to_string()),
        Ok(ValueRef::Real(value)) => Some(value.to_string()),
        _ => None,
    }
}
