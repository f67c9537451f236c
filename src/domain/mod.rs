pub mod audit;

pub use audit::{touch_all, AuditFields, Auditable};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marketplace listing. `id` is issued by the marketplace and is the primary key.
///
/// Descriptive attributes are first-write-wins; only the listing lifecycle
/// fields and the audit timestamps change after the first insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub vehicle_type: Option<String>,
    pub category: Option<String>,
    pub year: i32,
    pub host_id: i64,
    pub location_city: String,
    pub location_state: String,
    pub location_country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub listing_created_on: Option<NaiveDate>,
    pub is_active: Option<bool>,
    pub last_detail_scrape_at: Option<DateTime<Utc>>,
    pub audit: AuditFields,
}

/// Aggregate pricing/performance snapshot for one vehicle at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub id: Option<i64>,
    pub vehicle_id: i64,
    pub average_daily_price: f64,
    pub currency: String,
    pub completed_trips: i64,
    pub captured_at: DateTime<Utc>,
    pub audit: AuditFields,
}

/// One booked calendar day. Unique per `(vehicle_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetail {
    pub id: Option<i64>,
    pub vehicle_id: i64,
    pub date: NaiveDate,
    pub price: f64,
    pub currency: String,
    pub audit: AuditFields,
}

impl BookingDetail {
    pub fn key(&self) -> (i64, NaiveDate) {
        (self.vehicle_id, self.date)
    }
}

macro_rules! impl_auditable {
    ($($ty:ty),*) => {
        $(
            impl Auditable for $ty {
                fn audit(&self) -> &AuditFields {
                    &self.audit
                }

                fn audit_mut(&mut self) -> &mut AuditFields {
                    &mut self.audit
                }
            }
        )*
    };
}

impl_auditable!(Vehicle, BookingSummary, BookingDetail);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vehicle,
    BookingSummary,
    BookingDetail,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::BookingSummary => "booking_summary",
            EntityKind::BookingDetail => "booking_detail",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
