//! Search-results capture batch.
//!
//! Only the fields the normalizer consumes are modelled. Banners, filters,
//! images, tags and anything the marketplace adds later are dropped by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBatch {
    #[serde(default)]
    pub data_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<SearchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub request_method: Option<String>,
    #[serde(default)]
    pub request_url: Option<String>,
    #[serde(default)]
    pub response_status: Option<i64>,
    #[serde(default)]
    pub response_status_text: Option<String>,
    pub response_content: SearchResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub search_id: Option<String>,
    #[serde(default)]
    pub total_hits: Option<i64>,
    pub vehicles: Vec<VehicleListing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleListing {
    pub id: i64,
    pub host_id: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type", default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub seo_category: Option<String>,
    #[serde(default)]
    pub listing_created_time: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    pub avg_daily_price: AvgDailyPrice,
    pub completed_trips: i64,
    pub location: ListingLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvgDailyPrice {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingLocation {
    pub city: String,
    pub state: String,
    pub country: String,
    pub home_location: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl SearchBatch {
    /// All vehicle listings across every entry, in payload order.
    pub fn listings(&self) -> impl Iterator<Item = &VehicleListing> {
        self.entries
            .iter()
            .flat_map(|entry| entry.response_content.vehicles.iter())
    }
}
