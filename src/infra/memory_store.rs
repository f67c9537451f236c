use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::app::ports::{Store, UnitOfWork};
use crate::domain::{touch_all, Auditable, BookingDetail, BookingSummary, EntityKind, Vehicle};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Default)]
struct Tables {
    vehicles: BTreeMap<i64, Vehicle>,
    summaries: Vec<BookingSummary>,
    details: BTreeMap<(i64, NaiveDate), BookingDetail>,
    next_summary_id: i64,
    next_detail_id: i64,
}

/// In-memory store for development and tests.
///
/// A unit of work holds the lock for its whole lifetime and records only the
/// rows it adds or changes; they are applied to the live tables on commit, so
/// opening one costs nothing proportional to the data already stored.
/// Same constraints as the SQLite schema: vehicle primary key, detail
/// `(vehicle_id, date)` uniqueness and vehicle foreign keys.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| IngestError::storage("in-memory store lock poisoned"))
    }
}

impl Store for InMemoryStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let live = self.lock()?;
        let staged = Staged {
            next_summary_id: live.next_summary_id,
            next_detail_id: live.next_detail_id,
            ..Staged::default()
        };
        Ok(Box::new(InMemoryUnitOfWork { live, staged }))
    }

    fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>> {
        Ok(self.lock()?.vehicles.get(&id).cloned())
    }

    fn count_summaries(&self, vehicle_id: i64) -> Result<usize> {
        Ok(self
            .lock()?
            .summaries
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id)
            .count())
    }

    fn list_details(&self, vehicle_id: i64) -> Result<Vec<BookingDetail>> {
        Ok(self
            .lock()?
            .details
            .range((vehicle_id, NaiveDate::MIN)..=(vehicle_id, NaiveDate::MAX))
            .map(|(_, d)| d.clone())
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Rows written by one unit of work, not yet visible to readers.
#[derive(Default)]
struct Staged {
    vehicles: BTreeMap<i64, Vehicle>,
    summaries: Vec<BookingSummary>,
    details: BTreeMap<(i64, NaiveDate), BookingDetail>,
    next_summary_id: i64,
    next_detail_id: i64,
}

struct InMemoryUnitOfWork<'a> {
    live: MutexGuard<'a, Tables>,
    staged: Staged,
}

impl InMemoryUnitOfWork<'_> {
    fn has_vehicle(&self, id: i64) -> bool {
        self.staged.vehicles.contains_key(&id) || self.live.vehicles.contains_key(&id)
    }

    fn has_detail(&self, key: &(i64, NaiveDate)) -> bool {
        self.staged.details.contains_key(key) || self.live.details.contains_key(key)
    }

    fn require_vehicle(&self, entity: EntityKind, vehicle_id: i64) -> Result<()> {
        if self.has_vehicle(vehicle_id) {
            Ok(())
        } else {
            Err(IngestError::storage(format!(
                "foreign key violation: {entity} references missing vehicle {vehicle_id}"
            )))
        }
    }
}

impl UnitOfWork for InMemoryUnitOfWork<'_> {
    fn existing_vehicle_ids(&mut self, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>> {
        Ok(ids.iter().copied().filter(|id| self.has_vehicle(*id)).collect())
    }

    fn existing_detail_dates(
        &mut self,
        vehicle_id: i64,
        dates: &BTreeSet<NaiveDate>,
    ) -> Result<BTreeSet<NaiveDate>> {
        Ok(dates
            .iter()
            .copied()
            .filter(|date| self.has_detail(&(vehicle_id, *date)))
            .collect())
    }

    fn insert_vehicles(&mut self, rows: &mut [Vehicle]) -> Result<usize> {
        touch_all(rows, Utc::now());
        for row in rows.iter() {
            if self.has_vehicle(row.id) {
                return Err(IngestError::Conflict {
                    entity: EntityKind::Vehicle,
                    message: format!("vehicle {} already exists", row.id),
                });
            }
            self.staged.vehicles.insert(row.id, row.clone());
        }
        debug!("Staged {} vehicles", rows.len());
        Ok(rows.len())
    }

    fn insert_summaries(&mut self, rows: &mut [BookingSummary]) -> Result<usize> {
        touch_all(rows, Utc::now());
        for row in rows.iter_mut() {
            self.require_vehicle(EntityKind::BookingSummary, row.vehicle_id)?;
            self.staged.next_summary_id += 1;
            row.id = Some(self.staged.next_summary_id);
            self.staged.summaries.push(row.clone());
        }
        Ok(rows.len())
    }

    fn insert_details(&mut self, rows: &mut [BookingDetail]) -> Result<usize> {
        touch_all(rows, Utc::now());
        for row in rows.iter_mut() {
            self.require_vehicle(EntityKind::BookingDetail, row.vehicle_id)?;
            if self.has_detail(&row.key()) {
                return Err(IngestError::Conflict {
                    entity: EntityKind::BookingDetail,
                    message: format!(
                        "booking detail for vehicle {} on {} already exists",
                        row.vehicle_id, row.date
                    ),
                });
            }
            self.staged.next_detail_id += 1;
            row.id = Some(self.staged.next_detail_id);
            self.staged.details.insert(row.key(), row.clone());
        }
        Ok(rows.len())
    }

    fn mark_detail_scraped(&mut self, vehicle_id: i64, at: DateTime<Utc>) -> Result<()> {
        if !self.staged.vehicles.contains_key(&vehicle_id) {
            let stored = self
                .live
                .vehicles
                .get(&vehicle_id)
                .cloned()
                .ok_or(IngestError::NotFound {
                    entity: EntityKind::Vehicle,
                    id: vehicle_id,
                })?;
            self.staged.vehicles.insert(vehicle_id, stored);
        }
        if let Some(vehicle) = self.staged.vehicles.get_mut(&vehicle_id) {
            vehicle.last_detail_scrape_at = Some(at);
            vehicle.touch(Utc::now());
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let live = &mut *self.live;
        live.vehicles.extend(staged.vehicles);
        live.summaries.extend(staged.summaries);
        live.details.extend(staged.details);
        live.next_summary_id = staged.next_summary_id;
        live.next_detail_id = staged.next_detail_id;
        Ok(())
    }
}
