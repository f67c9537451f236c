//! Pure payload → candidate record transformation. No I/O, no dedup decisions.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{AuditFields, BookingDetail, BookingSummary, Vehicle};
use crate::payload::{DailyPricingBatch, DailyPricingEntry, SearchBatch, VehicleListing};

/// Candidates derived from one search-results batch.
///
/// `vehicles` and `summaries` are index-aligned: one of each per listing,
/// duplicates included.
#[derive(Debug, Clone, Default)]
pub struct SearchCandidates {
    pub vehicles: Vec<Vehicle>,
    pub summaries: Vec<BookingSummary>,
}

/// Candidates derived from one daily-pricing batch.
#[derive(Debug, Clone)]
pub struct DetailCandidates {
    pub vehicle_id: i64,
    pub captured_at: Option<DateTime<Utc>>,
    pub days_seen: usize,
    pub details: Vec<BookingDetail>,
}

pub fn normalize_search_batch(batch: &SearchBatch) -> SearchCandidates {
    let mut out = SearchCandidates::default();
    for listing in batch.listings() {
        out.vehicles.push(vehicle_from_listing(listing));
        out.summaries.push(summary_from_listing(listing, batch.timestamp));
    }
    out
}

pub fn normalize_daily_pricing_batch(batch: &DailyPricingBatch) -> DetailCandidates {
    let details = batch
        .daily_pricing_responses
        .iter()
        .filter(|day| day.whole_day_unavailable)
        .map(|day| detail_from_day(batch.vehicle_id, day))
        .collect();

    DetailCandidates {
        vehicle_id: batch.vehicle_id,
        captured_at: batch.timestamp,
        days_seen: batch.daily_pricing_responses.len(),
        details,
    }
}

fn vehicle_from_listing(listing: &VehicleListing) -> Vehicle {
    Vehicle {
        id: listing.id,
        make: listing.make.clone(),
        model: listing.model.clone(),
        vehicle_type: listing.vehicle_type.clone(),
        category: listing.seo_category.clone(),
        year: listing.year,
        host_id: listing.host_id,
        location_city: listing.location.city.clone(),
        location_state: listing.location.state.clone(),
        location_country: listing.location.country.clone(),
        latitude: listing.location.home_location.lat,
        longitude: listing.location.home_location.lng,
        listing_created_on: listing
            .listing_created_time
            .as_deref()
            .and_then(parse_leading_date),
        is_active: listing.is_active,
        last_detail_scrape_at: None,
        audit: AuditFields::default(),
    }
}

fn summary_from_listing(listing: &VehicleListing, captured_at: DateTime<Utc>) -> BookingSummary {
    BookingSummary {
        id: None,
        vehicle_id: listing.id,
        average_daily_price: listing.avg_daily_price.amount,
        currency: listing.avg_daily_price.currency.clone(),
        completed_trips: listing.completed_trips,
        captured_at,
        audit: AuditFields::default(),
    }
}

fn detail_from_day(vehicle_id: i64, day: &DailyPricingEntry) -> BookingDetail {
    BookingDetail {
        id: None,
        vehicle_id,
        date: day.date,
        price: day.price_with_currency.amount,
        currency: day.price_with_currency.currency_code.clone(),
        audit: AuditFields::default(),
    }
}

/// Listing creation arrives either as a bare date or a full timestamp.
fn parse_leading_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
