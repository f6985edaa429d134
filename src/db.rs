use crate::audit::Event;
use crate::entities::{
    Citizen, CitizenInput, Complaint, ComplaintCategory, ComplaintPriority, ComplaintStatus,
    Family, Marriage, OfficialPosting, ServiceRecord, ServiceType, DATE_FORMAT,
};
use crate::error::{CivicError, CivicResult};
use crate::issuance::{decide, IssuanceDecision};
use crate::store::{
    empty_complaint_buckets, CitizenFilter, CivicStore, ComplaintFilter, FamilyFilter,
    RegistryStats, ServiceFilter,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            ration_card_number TEXT UNIQUE NOT NULL,
            address TEXT,
            head_id TEXT REFERENCES citizens(id),
            total_income REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // import_hash is only set for rows loaded from CSV (re-import skips them)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS citizens (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            dob TEXT NOT NULL,
            gender TEXT,
            phone TEXT,
            aadhar_number TEXT,
            address TEXT,
            income REAL,
            family_id TEXT REFERENCES families(id),
            created_at TEXT NOT NULL,
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS service_types (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            validity_days INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only
    conn.execute(
        "CREATE TABLE IF NOT EXISTS service_records (
            id TEXT PRIMARY KEY,
            citizen_id TEXT NOT NULL REFERENCES citizens(id),
            service_type_id TEXT NOT NULL REFERENCES service_types(id),
            issue_date TEXT NOT NULL,
            issued_by TEXT,
            status TEXT NOT NULL,
            comments TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marriages (
            id TEXT PRIMARY KEY,
            spouse1_id TEXT NOT NULL REFERENCES citizens(id),
            spouse2_id TEXT NOT NULL REFERENCES citizens(id),
            marriage_date TEXT NOT NULL,
            place TEXT,
            registration_number TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS official_postings (
            id TEXT PRIMARY KEY,
            official_name TEXT NOT NULL,
            designation TEXT NOT NULL,
            location TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS complaints (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            location TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            submitted_by TEXT,
            admin_remark TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            resolved_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_citizens_family ON citizens(family_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_service_records_pair
         ON service_records(citizen_id, service_type_id, issue_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN CODECS
// ============================================================================

/// Fixed-width UTC timestamps so text ordering matches time ordering
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn read_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {:?}: {}", raw, e)))
}

fn read_opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(_) => read_timestamp(row, idx).map(Some),
    }
}

fn read_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date {:?}: {}", raw, e)))
}

fn read_opt_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(_) => read_date(row, idx).map(Some),
    }
}

fn read_enum<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown value {:?}", raw)))
}

fn unique_violation(err: rusqlite::Error, message: &str) -> CivicError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            CivicError::validation(message)
        }
        _ => err.into(),
    }
}

const CITIZEN_COLUMNS: &str =
    "id, full_name, dob, gender, phone, aadhar_number, address, income, family_id, created_at";

fn citizen_from_row(row: &Row) -> rusqlite::Result<Citizen> {
    Ok(Citizen {
        id: row.get(0)?,
        full_name: row.get(1)?,
        dob: read_date(row, 2)?,
        gender: row.get(3)?,
        phone: row.get(4)?,
        aadhar_number: row.get(5)?,
        address: row.get(6)?,
        income: row.get(7)?,
        family_id: row.get(8)?,
        created_at: read_timestamp(row, 9)?,
    })
}

const FAMILY_COLUMNS: &str = "id, ration_card_number, address, head_id, total_income, created_at";

fn family_from_row(row: &Row) -> rusqlite::Result<Family> {
    Ok(Family {
        id: row.get(0)?,
        ration_card_number: row.get(1)?,
        address: row.get(2)?,
        head_id: row.get(3)?,
        total_income: row.get(4)?,
        created_at: read_timestamp(row, 5)?,
    })
}

const SERVICE_TYPE_COLUMNS: &str = "id, name, validity_days, created_at";

fn service_type_from_row(row: &Row) -> rusqlite::Result<ServiceType> {
    Ok(ServiceType {
        id: row.get(0)?,
        name: row.get(1)?,
        validity_days: row.get(2)?,
        created_at: read_timestamp(row, 3)?,
    })
}

const SERVICE_RECORD_COLUMNS: &str =
    "id, citizen_id, service_type_id, issue_date, issued_by, status, comments";

fn service_record_from_row(row: &Row) -> rusqlite::Result<ServiceRecord> {
    Ok(ServiceRecord {
        id: row.get(0)?,
        citizen_id: row.get(1)?,
        service_type_id: row.get(2)?,
        issue_date: read_timestamp(row, 3)?,
        issued_by: row.get(4)?,
        status: row.get(5)?,
        comments: row.get(6)?,
    })
}

const COMPLAINT_COLUMNS: &str = "id, title, category, description, location, priority, status,
     submitted_by, admin_remark, created_at, updated_at, resolved_at";

fn complaint_from_row(row: &Row) -> rusqlite::Result<Complaint> {
    Ok(Complaint {
        id: row.get(0)?,
        title: row.get(1)?,
        category: read_enum(row, 2, ComplaintCategory::parse)?,
        description: row.get(3)?,
        location: row.get(4)?,
        priority: read_enum(row, 5, ComplaintPriority::parse)?,
        status: read_enum(row, 6, ComplaintStatus::parse)?,
        submitted_by: row.get(7)?,
        admin_remark: row.get(8)?,
        created_at: read_timestamp(row, 9)?,
        updated_at: read_timestamp(row, 10)?,
        resolved_at: read_opt_timestamp(row, 11)?,
    })
}

fn query_citizen(conn: &Connection, id: &str) -> CivicResult<Option<Citizen>> {
    let citizen = conn
        .query_row(
            &format!("SELECT {} FROM citizens WHERE id = ?1", CITIZEN_COLUMNS),
            [id],
            citizen_from_row,
        )
        .optional()?;
    Ok(citizen)
}

fn query_service_type(conn: &Connection, id: &str) -> CivicResult<Option<ServiceType>> {
    let service_type = conn
        .query_row(
            &format!("SELECT {} FROM service_types WHERE id = ?1", SERVICE_TYPE_COLUMNS),
            [id],
            service_type_from_row,
        )
        .optional()?;
    Ok(service_type)
}

fn query_latest_record(
    conn: &Connection,
    citizen_id: &str,
    service_type_id: &str,
) -> CivicResult<Option<ServiceRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {} FROM service_records
                 WHERE citizen_id = ?1 AND service_type_id = ?2
                 ORDER BY issue_date DESC
                 LIMIT 1",
                SERVICE_RECORD_COLUMNS
            ),
            params![citizen_id, service_type_id],
            service_record_from_row,
        )
        .optional()?;
    Ok(record)
}

fn insert_service_record(conn: &Connection, record: &ServiceRecord) -> CivicResult<()> {
    conn.execute(
        "INSERT INTO service_records (
            id, citizen_id, service_type_id, issue_date, issued_by, status, comments
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.citizen_id,
            record.service_type_id,
            timestamp(&record.issue_date),
            record.issued_by,
            record.status,
            record.comments,
        ],
    )?;
    Ok(())
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> CivicResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> CivicResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: read_timestamp(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| conversion_error(5, e.to_string()))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// `CivicStore` backed by a single SQLite connection.
///
/// Access is serialised through a mutex; every statement runs under it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an existing connection, creating the schema if needed
    pub fn new(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        info!(path = %path.display(), "database opened");
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bulk-load citizens. Rows already imported (same name, dob and
    /// national id) are skipped; invalid rows are reported and skipped.
    /// Families touched by the import get their income recomputed.
    pub fn import_citizens(&self, rows: Vec<CitizenInput>, actor: &str) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut touched: HashSet<String> = HashSet::new();

        for (line, row) in rows.into_iter().enumerate() {
            let citizen = match Citizen::from_input(row) {
                Ok(c) => c,
                Err(e) => {
                    warn!(row = line + 1, error = %e, "skipping invalid citizen row");
                    summary.rejected += 1;
                    continue;
                }
            };

            if let Some(family_id) = &citizen.family_id {
                if self.get_family(family_id)?.is_none() {
                    warn!(row = line + 1, family_id = %family_id, "skipping row with unknown family");
                    summary.rejected += 1;
                    continue;
                }
            }

            let hash = citizen_import_hash(&citizen);
            let result = {
                let conn = self.conn();
                conn.execute(
                    "INSERT INTO citizens (
                        id, full_name, dob, gender, phone, aadhar_number, address,
                        income, family_id, created_at, import_hash
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        citizen.id,
                        citizen.full_name,
                        citizen.dob_string(),
                        citizen.gender,
                        citizen.phone,
                        citizen.aadhar_number,
                        citizen.address,
                        citizen.income,
                        citizen.family_id,
                        timestamp(&citizen.created_at),
                        hash,
                    ],
                )
            };

            match result {
                Ok(_) => {
                    summary.inserted += 1;
                    if let Some(family_id) = &citizen.family_id {
                        touched.insert(family_id.clone());
                    }
                    let event = Event::new(
                        "citizen_imported",
                        "citizen",
                        &citizen.id,
                        serde_json::json!({ "full_name": citizen.full_name }),
                        actor,
                    );
                    self.record_event(&event)?;
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    summary.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for family_id in &touched {
            self.recompute_family_income(family_id)?;
        }

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "citizen import finished"
        );
        Ok(summary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Deduplication key for imported citizens. This is not the identity (that
/// is the UUID); it only detects a row that was loaded before.
pub fn citizen_import_hash(citizen: &Citizen) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}",
        citizen.full_name.to_lowercase(),
        citizen.dob_string(),
        citizen.aadhar_number.as_deref().unwrap_or_default()
    ));
    format!("{:x}", hasher.finalize())
}

pub fn load_citizens_csv(csv_path: &Path) -> Result<Vec<CitizenInput>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: CitizenInput = result.context("Failed to deserialize citizen row")?;
        rows.push(row);
    }

    Ok(rows)
}

impl CivicStore for SqliteStore {
    // ------------------------------------------------------------------------
    // citizens
    // ------------------------------------------------------------------------

    fn insert_citizen(&self, citizen: &Citizen) -> CivicResult<()> {
        self.conn().execute(
            "INSERT INTO citizens (
                id, full_name, dob, gender, phone, aadhar_number, address,
                income, family_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                citizen.id,
                citizen.full_name,
                citizen.dob_string(),
                citizen.gender,
                citizen.phone,
                citizen.aadhar_number,
                citizen.address,
                citizen.income,
                citizen.family_id,
                timestamp(&citizen.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_citizen(&self, id: &str) -> CivicResult<Option<Citizen>> {
        query_citizen(&self.conn(), id)
    }

    fn modify_citizen(
        &self,
        id: &str,
        edit: &mut dyn FnMut(&mut Citizen) -> CivicResult<()>,
    ) -> CivicResult<(Citizen, Citizen)> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let before = query_citizen(&tx, id)?.ok_or_else(|| CivicError::not_found("Citizen", id))?;
        let mut after = before.clone();
        edit(&mut after)?;

        tx.execute(
            "UPDATE citizens
             SET full_name = ?2, dob = ?3, gender = ?4, phone = ?5, aadhar_number = ?6,
                 address = ?7, income = ?8, family_id = ?9
             WHERE id = ?1",
            params![
                after.id,
                after.full_name,
                after.dob_string(),
                after.gender,
                after.phone,
                after.aadhar_number,
                after.address,
                after.income,
                after.family_id,
            ],
        )?;
        tx.commit()?;
        Ok((before, after))
    }

    fn list_citizens(&self, filter: &CitizenFilter) -> CivicResult<Vec<Citizen>> {
        let mut sql = format!("SELECT {} FROM citizens WHERE 1 = 1", CITIZEN_COLUMNS);
        let mut args: Vec<String> = Vec::new();

        match &filter.family {
            FamilyFilter::Any => {}
            FamilyFilter::Unassigned => sql.push_str(" AND family_id IS NULL"),
            FamilyFilter::Family(id) => {
                args.push(id.clone());
                sql.push_str(&format!(" AND family_id = ?{}", args.len()));
            }
        }

        if let Some(term) = &filter.search {
            args.push(format!("%{}%", term.to_lowercase()));
            let n = args.len();
            sql.push_str(&format!(
                " AND (LOWER(full_name) LIKE ?{n}
                   OR LOWER(COALESCE(aadhar_number, '')) LIKE ?{n}
                   OR LOWER(COALESCE(phone, '')) LIKE ?{n})"
            ));
        }
        sql.push_str(" ORDER BY full_name, id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let citizens = stmt
            .query_map(params_from_iter(args.iter()), citizen_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(citizens)
    }

    fn set_citizen_family(
        &self,
        citizen_id: &str,
        family_id: Option<&str>,
        only_from: Option<&str>,
    ) -> CivicResult<Option<Citizen>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let Some(before) = query_citizen(&tx, citizen_id)? else {
            return Ok(None);
        };
        if only_from.is_some() && before.family_id.as_deref() != only_from {
            return Ok(None);
        }

        tx.execute(
            "UPDATE citizens SET family_id = ?2 WHERE id = ?1",
            params![citizen_id, family_id],
        )?;
        tx.commit()?;
        Ok(Some(before))
    }

    // ------------------------------------------------------------------------
    // families
    // ------------------------------------------------------------------------

    fn insert_family(&self, family: &Family) -> CivicResult<()> {
        self.conn()
            .execute(
                "INSERT INTO families (id, ration_card_number, address, head_id, total_income, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    family.id,
                    family.ration_card_number,
                    family.address,
                    family.head_id,
                    family.total_income,
                    timestamp(&family.created_at),
                ],
            )
            .map_err(|e| unique_violation(e, "Ration card number is already registered."))?;
        Ok(())
    }

    fn get_family(&self, id: &str) -> CivicResult<Option<Family>> {
        let conn = self.conn();
        let family = conn
            .query_row(
                &format!("SELECT {} FROM families WHERE id = ?1", FAMILY_COLUMNS),
                [id],
                family_from_row,
            )
            .optional()?;
        Ok(family)
    }

    fn list_families(&self) -> CivicResult<Vec<Family>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM families ORDER BY ration_card_number",
            FAMILY_COLUMNS
        ))?;
        let families = stmt
            .query_map([], family_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(families)
    }

    fn family_members(&self, family_id: &str) -> CivicResult<Vec<Citizen>> {
        self.list_citizens(&CitizenFilter {
            search: None,
            family: FamilyFilter::Family(family_id.to_string()),
        })
    }

    fn recompute_family_income(&self, family_id: &str) -> CivicResult<f64> {
        // Sum and write in one statement: no window for a concurrent
        // membership change between the read and the write.
        let conn = self.conn();
        let total: Option<f64> = conn
            .query_row(
                "UPDATE families
                 SET total_income = (
                     SELECT COALESCE(SUM(income), 0.0) FROM citizens WHERE family_id = ?1
                 )
                 WHERE id = ?1
                 RETURNING total_income",
                [family_id],
                |row| row.get(0),
            )
            .optional()?;

        match total {
            Some(total) => Ok(total),
            None => {
                debug!(family_id, "recompute on unknown family");
                Ok(0.0)
            }
        }
    }

    // ------------------------------------------------------------------------
    // services
    // ------------------------------------------------------------------------

    fn insert_service_type(&self, service_type: &ServiceType) -> CivicResult<()> {
        self.conn()
            .execute(
                "INSERT INTO service_types (id, name, validity_days, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    service_type.id,
                    service_type.name,
                    service_type.validity_days,
                    timestamp(&service_type.created_at),
                ],
            )
            .map_err(|e| unique_violation(e, "A service type with this name already exists."))?;
        Ok(())
    }

    fn get_service_type(&self, id: &str) -> CivicResult<Option<ServiceType>> {
        query_service_type(&self.conn(), id)
    }

    fn list_service_types(&self) -> CivicResult<Vec<ServiceType>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM service_types ORDER BY name",
            SERVICE_TYPE_COLUMNS
        ))?;
        let types = stmt
            .query_map([], service_type_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(types)
    }

    fn latest_service_record(
        &self,
        citizen_id: &str,
        service_type_id: &str,
    ) -> CivicResult<Option<ServiceRecord>> {
        query_latest_record(&self.conn(), citizen_id, service_type_id)
    }

    fn issue_if_allowed(&self, record: &ServiceRecord) -> CivicResult<IssuanceDecision> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let service_type = query_service_type(&tx, &record.service_type_id)?
            .ok_or_else(|| CivicError::InvalidServiceType(record.service_type_id.clone()))?;
        let latest = query_latest_record(&tx, &record.citizen_id, &record.service_type_id)?;

        let decision = decide(&service_type, latest.as_ref(), record.issue_date);
        if decision.allowed {
            insert_service_record(&tx, record)?;
            tx.commit()?;
        }
        Ok(decision)
    }

    fn list_service_records(&self, filter: &ServiceFilter) -> CivicResult<Vec<ServiceRecord>> {
        let mut sql = format!("SELECT {} FROM service_records WHERE 1 = 1", SERVICE_RECORD_COLUMNS);
        let mut args: Vec<String> = Vec::new();

        if let Some(id) = &filter.service_type_id {
            args.push(id.clone());
            sql.push_str(&format!(" AND service_type_id = ?{}", args.len()));
        }
        if let Some(id) = &filter.citizen_id {
            args.push(id.clone());
            sql.push_str(&format!(" AND citizen_id = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY issue_date DESC");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(args.iter()), service_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // marriages
    // ------------------------------------------------------------------------

    fn insert_marriage(&self, marriage: &Marriage) -> CivicResult<()> {
        self.conn().execute(
            "INSERT INTO marriages (
                id, spouse1_id, spouse2_id, marriage_date, place, registration_number, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                marriage.id,
                marriage.spouse1_id,
                marriage.spouse2_id,
                marriage.marriage_date_string(),
                marriage.place,
                marriage.registration_number,
                timestamp(&marriage.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_marriages(&self) -> CivicResult<Vec<Marriage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, spouse1_id, spouse2_id, marriage_date, place, registration_number, created_at
             FROM marriages
             ORDER BY marriage_date DESC, id",
        )?;
        let marriages = stmt
            .query_map([], |row| {
                Ok(Marriage {
                    id: row.get(0)?,
                    spouse1_id: row.get(1)?,
                    spouse2_id: row.get(2)?,
                    marriage_date: read_date(row, 3)?,
                    place: row.get(4)?,
                    registration_number: row.get(5)?,
                    created_at: read_timestamp(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(marriages)
    }

    // ------------------------------------------------------------------------
    // official postings
    // ------------------------------------------------------------------------

    fn insert_posting(&self, posting: &OfficialPosting) -> CivicResult<()> {
        self.conn().execute(
            "INSERT INTO official_postings (
                id, official_name, designation, location, start_date, end_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                posting.id,
                posting.official_name,
                posting.designation,
                posting.location,
                posting.start_date_string(),
                posting.end_date_string(),
                timestamp(&posting.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_postings(&self) -> CivicResult<Vec<OfficialPosting>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, official_name, designation, location, start_date, end_date, created_at
             FROM official_postings
             ORDER BY official_name, id",
        )?;
        let postings = stmt
            .query_map([], |row| {
                Ok(OfficialPosting {
                    id: row.get(0)?,
                    official_name: row.get(1)?,
                    designation: row.get(2)?,
                    location: row.get(3)?,
                    start_date: read_opt_date(row, 4)?,
                    end_date: read_opt_date(row, 5)?,
                    created_at: read_timestamp(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    // ------------------------------------------------------------------------
    // complaints
    // ------------------------------------------------------------------------

    fn insert_complaint(&self, complaint: &Complaint) -> CivicResult<()> {
        self.conn().execute(
            "INSERT INTO complaints (
                id, title, category, description, location, priority, status,
                submitted_by, admin_remark, created_at, updated_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                complaint.id,
                complaint.title,
                complaint.category.as_str(),
                complaint.description,
                complaint.location,
                complaint.priority.as_str(),
                complaint.status.as_str(),
                complaint.submitted_by,
                complaint.admin_remark,
                timestamp(&complaint.created_at),
                timestamp(&complaint.updated_at),
                complaint.resolved_at.as_ref().map(timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_complaint(&self, id: &str) -> CivicResult<Option<Complaint>> {
        let conn = self.conn();
        let complaint = conn
            .query_row(
                &format!("SELECT {} FROM complaints WHERE id = ?1", COMPLAINT_COLUMNS),
                [id],
                complaint_from_row,
            )
            .optional()?;
        Ok(complaint)
    }

    fn update_complaint(&self, complaint: &Complaint) -> CivicResult<()> {
        let changed = self.conn().execute(
            "UPDATE complaints
             SET status = ?2, admin_remark = ?3, updated_at = ?4, resolved_at = ?5
             WHERE id = ?1",
            params![
                complaint.id,
                complaint.status.as_str(),
                complaint.admin_remark,
                timestamp(&complaint.updated_at),
                complaint.resolved_at.as_ref().map(timestamp),
            ],
        )?;
        if changed == 0 {
            return Err(CivicError::not_found("Complaint", complaint.id.clone()));
        }
        Ok(())
    }

    fn list_complaints(&self, filter: &ComplaintFilter) -> CivicResult<Vec<Complaint>> {
        let mut sql = format!("SELECT {} FROM complaints WHERE 1 = 1", COMPLAINT_COLUMNS);
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(who) = &filter.submitted_by {
            args.push(who.clone());
            sql.push_str(&format!(" AND submitted_by = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let complaints = stmt
            .query_map(params_from_iter(args.iter()), complaint_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(complaints)
    }

    // ------------------------------------------------------------------------
    // audit & stats
    // ------------------------------------------------------------------------

    fn record_event(&self, event: &Event) -> CivicResult<()> {
        insert_event(&self.conn(), event)
    }

    fn events_for(&self, entity_type: &str, entity_id: &str) -> CivicResult<Vec<Event>> {
        get_events_for_entity(&self.conn(), entity_type, entity_id)
    }

    fn stats(&self, issued_since: DateTime<Utc>) -> CivicResult<RegistryStats> {
        let conn = self.conn();

        let citizens: i64 = conn.query_row("SELECT COUNT(*) FROM citizens", [], |row| row.get(0))?;
        let families: i64 = conn.query_row("SELECT COUNT(*) FROM families", [], |row| row.get(0))?;
        let services_issued_since: i64 = conn.query_row(
            "SELECT COUNT(*) FROM service_records WHERE issue_date >= ?1",
            [timestamp(&issued_since)],
            |row| row.get(0),
        )?;
        let total_family_income: f64 = conn.query_row(
            "SELECT COALESCE(SUM(total_income), 0.0) FROM families",
            [],
            |row| row.get(0),
        )?;

        let (mut complaints_by_status, mut complaints_by_category) = empty_complaint_buckets();
        for (column, buckets) in [
            ("status", &mut complaints_by_status),
            ("category", &mut complaints_by_category),
        ] {
            let mut stmt = conn.prepare(&format!(
                "SELECT {column}, COUNT(*) FROM complaints GROUP BY {column}"
            ))?;
            let rows =
                stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (key, count) = row?;
                buckets.insert(key, count);
            }
        }

        Ok(RegistryStats {
            citizens,
            families,
            services_issued_since,
            total_family_income,
            complaints_by_status,
            complaints_by_category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ComplaintInput, FamilyInput, ServiceTypeInput};
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn citizen(name: &str, income: Option<f64>) -> Citizen {
        Citizen::from_input(CitizenInput {
            full_name: Some(name.to_string()),
            dob: Some("1980-06-15".to_string()),
            income,
            ..Default::default()
        })
        .unwrap()
    }

    fn family(card: &str) -> Family {
        Family::from_input(FamilyInput {
            ration_card_number: Some(card.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_citizen_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut c = citizen("Asha Rao", Some(50000.0));
        c.aadhar_number = Some("1234 5678 9012".to_string());
        store.insert_citizen(&c).unwrap();

        let loaded = store.get_citizen(&c.id).unwrap().unwrap();
        assert_eq!(loaded.full_name, "Asha Rao");
        assert_eq!(loaded.dob, c.dob);
        assert_eq!(loaded.income, Some(50000.0));
        assert_eq!(loaded.aadhar_number, c.aadhar_number);

        assert!(store.get_citizen("missing").unwrap().is_none());
    }

    #[test]
    fn test_recompute_uses_single_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let f = family("RC-1");
        store.insert_family(&f).unwrap();

        for (name, income) in [("A", Some(50000.0)), ("B", None), ("C", Some(75000.0))] {
            let mut c = citizen(name, income);
            c.family_id = Some(f.id.clone());
            store.insert_citizen(&c).unwrap();
        }

        assert_eq!(store.recompute_family_income(&f.id).unwrap(), 125000.0);
        assert_eq!(store.get_family(&f.id).unwrap().unwrap().total_income, 125000.0);
    }

    #[test]
    fn test_recompute_unknown_family_is_zero() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.recompute_family_income("nope").unwrap(), 0.0);
    }

    #[test]
    fn test_duplicate_ration_card_is_validation_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_family(&family("RC-1")).unwrap();

        let err = store.insert_family(&family("RC-1")).unwrap_err();
        assert!(matches!(err, CivicError::Validation(_)));
    }

    #[test]
    fn test_unlink_only_from_expected_family() {
        let store = SqliteStore::open_in_memory().unwrap();
        let f1 = family("RC-1");
        let f2 = family("RC-2");
        store.insert_family(&f1).unwrap();
        store.insert_family(&f2).unwrap();

        let mut c = citizen("A", Some(10.0));
        c.family_id = Some(f1.id.clone());
        store.insert_citizen(&c).unwrap();

        assert!(store.set_citizen_family(&c.id, None, Some(&f2.id)).unwrap().is_none());
        let before = store.set_citizen_family(&c.id, None, Some(&f1.id)).unwrap().unwrap();
        assert_eq!(before.family_id.as_deref(), Some(f1.id.as_str()));
        assert!(store.get_citizen(&c.id).unwrap().unwrap().family_id.is_none());
        assert!(store.set_citizen_family("missing", None, None).unwrap().is_none());
    }

    #[test]
    fn test_modify_citizen_is_all_or_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = citizen("A", Some(10.0));
        store.insert_citizen(&c).unwrap();

        let (before, after) = store
            .modify_citizen(&c.id, &mut |row: &mut Citizen| {
                row.income = Some(20.0);
                Ok(())
            })
            .unwrap();
        assert_eq!(before.income, Some(10.0));
        assert_eq!(after.income, Some(20.0));

        let err = store
            .modify_citizen(&c.id, &mut |row: &mut Citizen| {
                row.income = Some(99.0);
                Err(CivicError::validation("rejected"))
            })
            .unwrap_err();
        assert!(matches!(err, CivicError::Validation(_)));
        assert_eq!(store.get_citizen(&c.id).unwrap().unwrap().income, Some(20.0));

        let missing = store.modify_citizen("missing", &mut |_: &mut Citizen| Ok(())).unwrap_err();
        assert!(matches!(missing, CivicError::NotFound { .. }));
    }

    #[test]
    fn test_latest_service_record_orders_by_issue_date() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = citizen("A", None);
        store.insert_citizen(&c).unwrap();
        let st = ServiceType::from_input(ServiceTypeInput {
            name: Some("Income Certificate".to_string()),
            validity_days: Some(30),
        })
        .unwrap();
        store.insert_service_type(&st).unwrap();

        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = older + Duration::days(45);
        // Insert newest first so insertion order cannot explain the result
        for when in [newer, older] {
            let record = ServiceRecord::issue(c.id.clone(), st.id.clone(), None, None, when);
            insert_service_record(&store.conn(), &record).unwrap();
        }

        let latest = store.latest_service_record(&c.id, &st.id).unwrap().unwrap();
        assert_eq!(latest.issue_date, newer);
        assert!(store.latest_service_record(&c.id, "other").unwrap().is_none());
    }

    #[test]
    fn test_issue_if_allowed_checks_inside_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = citizen("A", None);
        store.insert_citizen(&c).unwrap();
        let st = ServiceType::from_input(ServiceTypeInput {
            name: Some("Caste Certificate".to_string()),
            validity_days: Some(30),
        })
        .unwrap();
        store.insert_service_type(&st).unwrap();

        let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = ServiceRecord::issue(c.id.clone(), st.id.clone(), None, None, jan);
        assert!(store.issue_if_allowed(&first).unwrap().allowed);

        let again = ServiceRecord::issue(c.id.clone(), st.id.clone(), None, None, jan + Duration::days(10));
        let denied = store.issue_if_allowed(&again).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.expires_at, Some(jan + Duration::days(30)));

        let after_expiry =
            ServiceRecord::issue(c.id.clone(), st.id.clone(), None, None, jan + Duration::days(30));
        assert!(store.issue_if_allowed(&after_expiry).unwrap().allowed);
        assert_eq!(store.list_service_records(&ServiceFilter::default()).unwrap().len(), 2);

        let unknown = ServiceRecord::issue(c.id.clone(), "nope".to_string(), None, None, jan);
        assert!(matches!(
            store.issue_if_allowed(&unknown),
            Err(CivicError::InvalidServiceType(_))
        ));
    }

    #[test]
    fn test_complaints_filtered_by_submitter() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (who, category) in [("ravi", "Water"), ("ravi", "Roads"), ("meena", "Water")] {
            let complaint = Complaint::from_input(ComplaintInput {
                title: Some("Broken".to_string()),
                category: Some(category.to_string()),
                description: Some("Needs repair".to_string()),
                location: Some("Ward 1".to_string()),
                submitted_by: Some(who.to_string()),
                ..Default::default()
            })
            .unwrap();
            store.insert_complaint(&complaint).unwrap();
        }

        let ravi = ComplaintFilter {
            submitted_by: Some("ravi".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list_complaints(&ravi).unwrap().len(), 2);
        assert_eq!(store.list_complaints(&ComplaintFilter::default()).unwrap().len(), 3);

        let stats = store.stats(Utc::now()).unwrap();
        assert_eq!(stats.complaints_by_category.get("Water"), Some(&2));
        assert_eq!(stats.complaints_by_category.get("Roads"), Some(&1));
        assert_eq!(stats.complaints_by_status.get("submitted"), Some(&3));
    }

    #[test]
    fn test_event_log() {
        let store = SqliteStore::open_in_memory().unwrap();

        let event = Event::new(
            "test_event",
            "citizen",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );
        store.record_event(&event).unwrap();

        let events = store.events_for("citizen", "test_id_123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data, serde_json::json!({"test": "data"}));
    }

    #[test]
    fn test_import_twice_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citizens.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "full_name,dob,gender,phone,aadhar_number,address,income,family_id").unwrap();
        writeln!(file, "Asha Rao,1990-04-12,F,,1111,,50000,").unwrap();
        writeln!(file, "Ravi Kumar,1985-01-30,M,,2222,,,").unwrap();
        writeln!(file, "No Dob,,M,,3333,,,").unwrap();
        drop(file);

        let store = SqliteStore::open_in_memory().unwrap();

        let first = store
            .import_citizens(load_citizens_csv(&path).unwrap(), "importer")
            .unwrap();
        assert_eq!(
            first,
            ImportSummary {
                inserted: 2,
                duplicates: 0,
                rejected: 1
            }
        );

        let second = store
            .import_citizens(load_citizens_csv(&path).unwrap(), "importer")
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);

        assert_eq!(store.list_citizens(&CitizenFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_import_hash_is_stable() {
        let c = citizen("Asha Rao", None);
        let hash1 = citizen_import_hash(&c);
        let hash2 = citizen_import_hash(&c);

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_stats_counts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let f = family("RC-1");
        store.insert_family(&f).unwrap();
        let mut c = citizen("A", Some(1000.0));
        c.family_id = Some(f.id.clone());
        store.insert_citizen(&c).unwrap();
        store.recompute_family_income(&f.id).unwrap();

        let stats = store.stats(Utc::now() - Duration::days(1)).unwrap();
        assert_eq!(stats.citizens, 1);
        assert_eq!(stats.families, 1);
        assert_eq!(stats.services_issued_since, 0);
        assert_eq!(stats.total_family_income, 1000.0);
        assert_eq!(stats.complaints_by_status.get("submitted"), Some(&0));
        assert!(stats.complaints_by_category.values().all(|count| *count == 0));
    }
}
