use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-day pricing calendar captured for a single vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPricingBatch {
    #[serde(rename = "vehicle_id")]
    pub vehicle_id: i64,
    /// Capture time. Older captures omit it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calendar_currency_header: Option<String>,
    pub daily_pricing_responses: Vec<DailyPricingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPricingEntry {
    pub date: NaiveDate,
    pub price: f64,
    pub price_with_currency: PriceWithCurrency,
    /// `true` means the day cannot be rented, which we read as booked.
    pub whole_day_unavailable: bool,
    #[serde(default)]
    pub custom: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceWithCurrency {
    pub amount: f64,
    pub currency_code: String,
}
