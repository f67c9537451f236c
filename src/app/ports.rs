use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

use crate::domain::{BookingDetail, BookingSummary, Vehicle};
use crate::error::Result;

/// Persistent store for vehicles, booking summaries and booking details.
///
/// Writes only happen through a [`UnitOfWork`] obtained from [`Store::begin`].
pub trait Store: Send + Sync {
    /// Open a unit of work owned by a single ingestion call.
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;

    fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>>;

    fn count_summaries(&self, vehicle_id: i64) -> Result<usize>;

    fn list_details(&self, vehicle_id: i64) -> Result<Vec<BookingDetail>>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// One transaction. Committed only by [`UnitOfWork::commit`]; dropping it
/// without committing rolls everything back.
///
/// Every insert and update calls `touch` on the rows before writing them, so
/// the audit fields handed back reflect what was persisted.
pub trait UnitOfWork {
    /// Which of `ids` already have a vehicle row.
    fn existing_vehicle_ids(&mut self, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>>;

    /// Which of `dates` already have a booking detail for `vehicle_id`.
    fn existing_detail_dates(
        &mut self,
        vehicle_id: i64,
        dates: &BTreeSet<NaiveDate>,
    ) -> Result<BTreeSet<NaiveDate>>;

    fn insert_vehicles(&mut self, rows: &mut [Vehicle]) -> Result<usize>;

    /// Assigns `id` on every row.
    fn insert_summaries(&mut self, rows: &mut [BookingSummary]) -> Result<usize>;

    /// Assigns `id` on every row. A duplicate `(vehicle_id, date)` fails
    /// with `IngestError::Conflict`.
    fn insert_details(&mut self, rows: &mut [BookingDetail]) -> Result<usize>;

    /// Update the listing lifecycle field `last_detail_scrape_at` and touch
    /// the vehicle. Fails with `IngestError::NotFound` for an unknown id.
    fn mark_detail_scraped(&mut self, vehicle_id: i64, at: DateTime<Utc>) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
}
