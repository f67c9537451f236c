use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::ports::{Store, UnitOfWork};
use crate::domain::{touch_all, AuditFields, Auditable, BookingDetail, BookingSummary, EntityKind, Vehicle};
use crate::error::{IngestError, Result};

const BOOTSTRAP_SQL: &str = include_str!("../../migrations/001_create_tables.sql");

/// Stay well under SQLite's bound parameter limit for `IN (...)` lists.
const MAX_IN_PARAMS: usize = 500;

const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const VEHICLE_COLUMNS: &str = "id, car_make, car_model, car_type, car_category, car_year, host_id, \
     location_city, location_state, location_country, location_coords_lat, location_coords_lon, \
     listing_created_on, is_active, last_detail_scrape_at, record_create, record_update";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store. Every unit of work opens its own connection and runs
/// one `BEGIN IMMEDIATE` transaction on it.
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { path, busy_timeout };
        let conn = store.connect()?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch(BOOTSTRAP_SQL)?;
        info!(
            "SQLite store ready at {} (journal_mode={})",
            store.path.display(),
            journal_mode
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

impl Store for SqliteStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(Box::new(SqliteUnitOfWork { conn, open: true }))
    }

    fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>> {
        let conn = self.connect()?;
        load_vehicle(&conn, id)
    }

    fn count_summaries(&self, vehicle_id: i64) -> Result<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM booking_summaries WHERE vehicle_id = ?1",
            params![vehicle_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_details(&self, vehicle_id: i64) -> Result<Vec<BookingDetail>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, vehicle_id, date, price, currency, record_create, record_update
             FROM booking_details WHERE vehicle_id = ?1 ORDER BY date",
        )?;
        let rows = stmt.query_map(params![vehicle_id], detail_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

struct SqliteUnitOfWork {
    conn: Connection,
    open: bool,
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!("Rolled back uncommitted unit of work"),
            Err(e) => warn!("Rollback failed: {}", e),
        }
    }
}

impl UnitOfWork for SqliteUnitOfWork {
    fn existing_vehicle_ids(&mut self, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>> {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut found = BTreeSet::new();
        for chunk in ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT id FROM vehicles WHERE id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?;
            for id in rows {
                found.insert(id?);
            }
        }
        Ok(found)
    }

    fn existing_detail_dates(
        &mut self,
        vehicle_id: i64,
        dates: &BTreeSet<NaiveDate>,
    ) -> Result<BTreeSet<NaiveDate>> {
        let dates: Vec<NaiveDate> = dates.iter().copied().collect();
        let mut found = BTreeSet::new();
        for chunk in dates.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT date FROM booking_details WHERE vehicle_id = ?1 AND date IN ({})",
                placeholders(2, chunk.len())
            );
            let mut values = Vec::with_capacity(chunk.len() + 1);
            values.push(Value::Integer(vehicle_id));
            values.extend(chunk.iter().map(|d| Value::Text(d.format(DATE_FORMAT).to_string())));

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                parse_date(0, row.get::<_, String>(0)?)
            })?;
            for date in rows {
                found.insert(date?);
            }
        }
        Ok(found)
    }

    fn insert_vehicles(&mut self, rows: &mut [Vehicle]) -> Result<usize> {
        touch_all(rows, Utc::now());
        let sql = format!(
            "INSERT INTO vehicles ({VEHICLE_COLUMNS}) VALUES ({})",
            placeholders(1, 17)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        for v in rows.iter() {
            stmt.execute(params![
                v.id,
                v.make,
                v.model,
                v.vehicle_type,
                v.category,
                v.year,
                v.host_id,
                v.location_city,
                v.location_state,
                v.location_country,
                v.latitude,
                v.longitude,
                v.listing_created_on.map(|d| d.format(DATE_FORMAT).to_string()),
                v.is_active,
                v.last_detail_scrape_at.map(|t| t.to_rfc3339()),
                format_ts(v.audit.created_at),
                format_ts(v.audit.updated_at),
            ])
            .map_err(|e| classify(EntityKind::Vehicle, e))?;
        }
        debug!("Inserted {} vehicles", rows.len());
        Ok(rows.len())
    }

    fn insert_summaries(&mut self, rows: &mut [BookingSummary]) -> Result<usize> {
        touch_all(rows, Utc::now());
        let mut stmt = self.conn.prepare(
            "INSERT INTO booking_summaries
                (vehicle_id, average_daily_price, currency, completed_trips, captured_at, record_create, record_update)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for s in rows.iter_mut() {
            let id = stmt
                .insert(params![
                    s.vehicle_id,
                    s.average_daily_price,
                    s.currency,
                    s.completed_trips,
                    s.captured_at.to_rfc3339(),
                    format_ts(s.audit.created_at),
                    format_ts(s.audit.updated_at),
                ])
                .map_err(|e| classify(EntityKind::BookingSummary, e))?;
            s.id = Some(id);
        }
        debug!("Inserted {} booking summaries", rows.len());
        Ok(rows.len())
    }

    fn insert_details(&mut self, rows: &mut [BookingDetail]) -> Result<usize> {
        touch_all(rows, Utc::now());
        let mut stmt = self.conn.prepare(
            "INSERT INTO booking_details
                (vehicle_id, date, price, currency, record_create, record_update)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for d in rows.iter_mut() {
            let id = stmt
                .insert(params![
                    d.vehicle_id,
                    d.date.format(DATE_FORMAT).to_string(),
                    d.price,
                    d.currency,
                    format_ts(d.audit.created_at),
                    format_ts(d.audit.updated_at),
                ])
                .map_err(|e| classify(EntityKind::BookingDetail, e))?;
            d.id = Some(id);
        }
        debug!("Inserted {} booking details", rows.len());
        Ok(rows.len())
    }

    fn mark_detail_scraped(&mut self, vehicle_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut vehicle = load_vehicle(&self.conn, vehicle_id)?.ok_or(IngestError::NotFound {
            entity: EntityKind::Vehicle,
            id: vehicle_id,
        })?;
        vehicle.last_detail_scrape_at = Some(at);
        vehicle.touch(Utc::now());

        self.conn.execute(
            "UPDATE vehicles SET last_detail_scrape_at = ?1, record_update = ?2 WHERE id = ?3",
            params![
                at.to_rfc3339(),
                format_ts(vehicle.audit().updated_at),
                vehicle_id
            ],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.open = false;
        Ok(())
    }
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Uniqueness violations become `Conflict`; everything else stays a storage error.
fn classify(entity: EntityKind, err: rusqlite::Error) -> IngestError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.extended_code == SQLITE_CONSTRAINT_PRIMARYKEY
            || failure.extended_code == SQLITE_CONSTRAINT_UNIQUE
        {
            return IngestError::Conflict {
                entity,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            };
        }
    }
    IngestError::Sqlite(err)
}

fn format_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn load_vehicle(conn: &Connection, id: i64) -> Result<Option<Vehicle>> {
    let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1");
    let vehicle = conn.query_row(&sql, params![id], vehicle_from_row).optional()?;
    Ok(vehicle)
}

fn vehicle_from_row(row: &Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        make: row.get(1)?,
        model: row.get(2)?,
        vehicle_type: row.get(3)?,
        category: row.get(4)?,
        year: row.get(5)?,
        host_id: row.get(6)?,
        location_city: row.get(7)?,
        location_state: row.get(8)?,
        location_country: row.get(9)?,
        latitude: row.get(10)?,
        longitude: row.get(11)?,
        listing_created_on: row
            .get::<_, Option<String>>(12)?
            .map(|raw| parse_date(12, raw))
            .transpose()?,
        is_active: row.get(13)?,
        last_detail_scrape_at: parse_ts(14, row.get(14)?)?,
        audit: AuditFields {
            created_at: parse_ts(15, row.get(15)?)?,
            updated_at: parse_ts(16, row.get(16)?)?,
        },
    })
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<BookingDetail> {
    Ok(BookingDetail {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        date: parse_date(2, row.get(2)?)?,
        price: row.get(3)?,
        currency: row.get(4)?,
        audit: AuditFields {
            created_at: parse_ts(5, row.get(5)?)?,
            updated_at: parse_ts(6, row.get(6)?)?,
        },
    })
}
