//! Capture payload schemas.
//!
//! Each payload is checked against an embedded JSON Schema that lists only the
//! required subset of fields, then deserialized into the typed models below.
//! Unknown fields pass both steps untouched.

pub mod daily_pricing;
pub mod search;

pub use daily_pricing::{DailyPricingBatch, DailyPricingEntry, PriceWithCurrency};
pub use search::{SearchBatch, SearchEntry, SearchResponse, VehicleListing};

use crate::error::{IngestError, Result};
use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;
use serde_json::Value;

static SEARCH_BATCH_SCHEMA: Lazy<std::result::Result<JSONSchema, String>> =
    Lazy::new(|| compile_schema(include_str!("../../schemas/search_batch.v1.json")));

static DAILY_PRICING_SCHEMA: Lazy<std::result::Result<JSONSchema, String>> =
    Lazy::new(|| compile_schema(include_str!("../../schemas/daily_pricing.v1.json")));

fn compile_schema(raw: &str) -> std::result::Result<JSONSchema, String> {
    let schema: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    JSONSchema::options()
        .compile(&schema)
        .map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    SearchBatch,
    DailyPricing,
}

impl PayloadKind {
    fn schema(&self) -> Result<&'static JSONSchema> {
        let compiled = match self {
            PayloadKind::SearchBatch => &*SEARCH_BATCH_SCHEMA,
            PayloadKind::DailyPricing => &*DAILY_PRICING_SCHEMA,
        };
        compiled
            .as_ref()
            .map_err(|e| IngestError::Config(format!("embedded {:?} schema is invalid: {e}", self)))
    }
}

/// Validate a JSON document against the schema for `kind`.
///
/// Reports the first violation only, with the JSON pointer of the offending
/// field. A missing required property points at the property itself rather
/// than its parent object.
pub fn validate(kind: PayloadKind, document: &Value) -> Result<()> {
    let schema = kind.schema()?;
    if let Err(mut errors) = schema.validate(document) {
        if let Some(error) = errors.next() {
            let mut path = error.instance_path.to_string();
            if let ValidationErrorKind::Required { property } = &error.kind {
                path.push('/');
                match property.as_str() {
                    Some(name) => path.push_str(name),
                    None => path.push_str(&property.to_string()),
                }
            }
            return Err(IngestError::schema(path, error.to_string()));
        }
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(kind: PayloadKind, raw: &[u8]) -> Result<T> {
    let document: Value = serde_json::from_slice(raw)
        .map_err(|e| IngestError::schema("", format!("payload is not valid JSON: {e}")))?;
    validate(kind, &document)?;
    serde_path_to_error::deserialize(document).map_err(|e| {
        let path = json_pointer(e.path());
        IngestError::schema(path, e.into_inner().to_string())
    })
}

/// Render a serde path (`entries[0].response_content`) as a JSON pointer
/// (`/entries/0/response_content`), matching what schema errors report.
fn json_pointer(path: &serde_path_to_error::Path) -> String {
    let mut pointer = String::new();
    for segment in path.iter() {
        match segment {
            Segment::Seq { index } => {
                pointer.push('/');
                pointer.push_str(&index.to_string());
            }
            Segment::Map { key } | Segment::Enum { variant: key } => {
                pointer.push('/');
                pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
            }
            _ => {}
        }
    }
    pointer
}

pub fn parse_search_batch(raw: &[u8]) -> Result<SearchBatch> {
    parse(PayloadKind::SearchBatch, raw)
}

pub fn parse_daily_pricing_batch(raw: &[u8]) -> Result<DailyPricingBatch> {
    parse(PayloadKind::DailyPricing, raw)
}
