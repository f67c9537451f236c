use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

use turo_ingest::app::ports::Store;
use turo_ingest::app::IngestService;
use turo_ingest::error::IngestError;
use turo_ingest::infra::SqliteStore;
use turo_ingest::pipeline::DetailConflictPolicy;

const SEARCH_FIXTURE: &str = include_str!("resources/search_batch.json");
const PRICING_FIXTURE: &str = include_str!("resources/daily_pricing.json");

struct Harness {
    _dir: TempDir,
    db_path: PathBuf,
    service: IngestService,
}

fn harness(policy: DetailConflictPolicy) -> Result<Harness> {
    let dir = tempdir()?;
    let db_path = dir.path().join("ingest.db");
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path, Duration::from_millis(10_000))?);
    Ok(Harness {
        _dir: dir,
        db_path,
        service: IngestService::new(store, policy),
    })
}

fn listing(id: i64) -> Value {
    json!({
        "id": id,
        "hostId": 500 + id,
        "make": "Honda",
        "model": "Civic",
        "type": "CAR",
        "year": 2019,
        "avgDailyPrice": { "amount": 40.0 + id as f64, "currency": "USD" },
        "completedTrips": id,
        "location": {
            "city": "Austin", "state": "TX", "country": "US",
            "homeLocation": { "lat": 30.26, "lng": -97.74 }
        }
    })
}

fn search_batch(ids: &[i64]) -> Vec<u8> {
    let vehicles: Vec<Value> = ids.iter().map(|id| listing(*id)).collect();
    serde_json::to_vec(&json!({
        "data_type": "search",
        "timestamp": "2024-02-01T00:00:00Z",
        "entries": [{
            "request_method": "POST",
            "request_url": "https://turo.com/api/v2/search",
            "response_status": 200,
            "response_status_text": "OK",
            "response_content": { "vehicles": vehicles }
        }]
    }))
    .unwrap()
}

fn pricing_batch(vehicle_id: i64, days: &[(&str, f64, bool)]) -> Vec<u8> {
    let responses: Vec<Value> = days
        .iter()
        .map(|(date, price, unavailable)| {
            json!({
                "date": date,
                "price": price,
                "priceWithCurrency": { "amount": price, "currencyCode": "USD" },
                "wholeDayUnavailable": unavailable
            })
        })
        .collect();
    serde_json::to_vec(&json!({
        "vehicle_id": vehicle_id,
        "dailyPricingResponses": responses
    }))
    .unwrap()
}

fn count(db_path: &Path, table: &str) -> Result<i64> {
    let conn = Connection::open(db_path)?;
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn test_fixture_search_batch_creates_vehicles() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;

    let report = h.service.ingest_search_batch(SEARCH_FIXTURE.as_bytes())?;
    assert_eq!(report.vehicles_added, 2);
    assert_eq!(report.vehicles_skipped, 0);

    let tesla = h.service.read_vehicle(102)?;
    assert_eq!(tesla.make, "Tesla");
    assert_eq!(tesla.model, "Model 3");
    assert_eq!(tesla.vehicle_type.as_deref(), Some("CAR"));
    assert_eq!(tesla.category.as_deref(), Some("electric"));
    assert_eq!(tesla.host_id, 9002);
    assert_eq!(tesla.location_city, "Bellevue");
    assert_eq!(tesla.latitude, 47.6101);
    assert_eq!(tesla.longitude, -122.2015);
    assert_eq!(tesla.listing_created_on, Some(date("2023-06-01")));
    assert_eq!(tesla.is_active, Some(true));
    assert!(tesla.audit.created_at.is_some());
    assert!(tesla.audit.updated_at.is_some());
    Ok(())
}

#[test]
fn test_vehicle_ingest_is_idempotent() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let payload = search_batch(&[1, 2, 3]);

    let first = h.service.ingest_search_batch(&payload)?;
    let before = h.service.read_vehicle(2)?;
    let second = h.service.ingest_search_batch(&payload)?;
    let after = h.service.read_vehicle(2)?;

    assert_eq!(first.vehicles_added, 3);
    assert_eq!(second.vehicles_added, 0);
    assert_eq!(second.vehicles_skipped, 3);
    assert_eq!(count(&h.db_path, "vehicles")?, 3);
    // First write wins: a re-ingest never rewrites the stored row.
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn test_repeated_id_within_batch_counts_once() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let report = h.service.ingest_search_batch(&search_batch(&[7, 7, 8]))?;
    assert_eq!(report.vehicles_added, 2);
    assert_eq!(report.vehicles_skipped, 1);
    assert_eq!(count(&h.db_path, "vehicles")?, 2);
    Ok(())
}

#[test]
fn test_summaries_are_append_only() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let payload = search_batch(&[11, 12]);

    for _ in 0..3 {
        let report = h.service.ingest_booking_summaries(&payload)?;
        assert_eq!(report.summaries_added, 2);
    }

    assert_eq!(h.service.store().count_summaries(11)?, 3);
    assert_eq!(h.service.store().count_summaries(12)?, 3);
    assert_eq!(count(&h.db_path, "booking_summaries")?, 6);
    assert_eq!(count(&h.db_path, "vehicles")?, 2);
    Ok(())
}

#[test]
fn test_summaries_create_only_missing_vehicles() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    h.service.ingest_search_batch(&search_batch(&[102]))?;

    let report = h.service.ingest_booking_summaries(&search_batch(&[101, 102]))?;
    assert_eq!(report.vehicles_added, 1);
    assert_eq!(report.summaries_added, 2);
    assert_eq!(count(&h.db_path, "vehicles")?, 2);
    assert_eq!(count(&h.db_path, "booking_summaries")?, 2);

    let conn = Connection::open(&h.db_path)?;
    let (price, currency, trips): (f64, String, i64) = conn.query_row(
        "SELECT average_daily_price, currency, completed_trips FROM booking_summaries WHERE vehicle_id = 101",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    assert_eq!(price, 141.0);
    assert_eq!(currency, "USD");
    assert_eq!(trips, 101);
    Ok(())
}

#[test]
fn test_only_unavailable_days_become_details() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    h.service.ingest_search_batch(SEARCH_FIXTURE.as_bytes())?;

    let report = h.service.ingest_daily_pricing(PRICING_FIXTURE.as_bytes())?;
    assert_eq!(report.days_seen, 7);
    assert_eq!(report.details_added, 3);
    assert_eq!(report.details_skipped, 0);

    let details = h.service.store().list_details(101)?;
    let dates: Vec<NaiveDate> = details.iter().map(|d| d.date).collect();
    assert_eq!(
        dates,
        vec![date("2024-01-01"), date("2024-01-03"), date("2024-01-05")]
    );

    let first = &details[0];
    assert_eq!(first.vehicle_id, 101);
    assert_eq!(first.price, 50.0);
    assert_eq!(first.currency, "USD");

    let vehicle = h.service.read_vehicle(101)?;
    assert_eq!(
        vehicle.last_detail_scrape_at.map(|t| t.to_rfc3339()),
        Some("2024-01-15T10:00:00+00:00".to_string())
    );
    Ok(())
}

#[test]
fn test_duplicate_detail_rejected_by_default() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    h.service.ingest_search_batch(&search_batch(&[101]))?;
    h.service
        .ingest_daily_pricing(&pricing_batch(101, &[("2024-01-01", 50.0, true)]))?;

    let err = h
        .service
        .ingest_daily_pricing(&pricing_batch(
            101,
            &[("2024-01-02", 51.0, true), ("2024-01-01", 50.0, true)],
        ))
        .unwrap_err();
    assert!(matches!(err, IngestError::Conflict { .. }), "got {err:?}");

    // The whole batch rolled back, including the new date.
    let details = h.service.store().list_details(101)?;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].date, date("2024-01-01"));
    Ok(())
}

#[test]
fn test_repeated_date_in_one_batch_rejected_by_default() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    h.service.ingest_search_batch(&search_batch(&[101]))?;

    let err = h
        .service
        .ingest_daily_pricing(&pricing_batch(
            101,
            &[
                ("2024-03-01", 70.0, true),
                ("2024-03-02", 70.0, true),
                ("2024-03-01", 75.0, true),
            ],
        ))
        .unwrap_err();
    assert!(matches!(err, IngestError::Conflict { .. }), "got {err:?}");

    assert_eq!(count(&h.db_path, "booking_details")?, 0);
    assert!(h.service.read_vehicle(101)?.last_detail_scrape_at.is_none());
    Ok(())
}

#[test]
fn test_duplicate_detail_skipped_with_skip_existing() -> Result<()> {
    let h = harness(DetailConflictPolicy::SkipExisting)?;
    h.service.ingest_search_batch(&search_batch(&[101]))?;
    h.service
        .ingest_daily_pricing(&pricing_batch(101, &[("2024-01-01", 50.0, true)]))?;

    let report = h.service.ingest_daily_pricing(&pricing_batch(
        101,
        &[
            ("2024-01-01", 99.0, true),
            ("2024-01-02", 51.0, true),
            ("2024-01-02", 51.0, true),
        ],
    ))?;
    assert_eq!(report.details_added, 1);
    assert_eq!(report.details_skipped, 2);

    let details = h.service.store().list_details(101)?;
    assert_eq!(details.len(), 2);
    // The stored price for the first day is untouched.
    assert_eq!(details[0].price, 50.0);
    Ok(())
}

#[test]
fn test_pricing_for_unknown_vehicle_writes_nothing() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let err = h
        .service
        .ingest_daily_pricing(&pricing_batch(999, &[("2024-01-01", 50.0, true)]))
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound { id: 999, .. }));
    assert_eq!(count(&h.db_path, "booking_details")?, 0);
    Ok(())
}

#[test]
fn test_failure_mid_batch_rolls_back_everything() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    {
        let conn = Connection::open(&h.db_path)?;
        conn.execute_batch(
            "CREATE TRIGGER fail_on_104 BEFORE INSERT ON vehicles
             WHEN NEW.id = 104
             BEGIN SELECT RAISE(ABORT, 'simulated storage failure'); END;",
        )?;
    }

    let err = h
        .service
        .ingest_booking_summaries(&search_batch(&[101, 102, 103, 104, 105]))
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert_eq!(count(&h.db_path, "vehicles")?, 0);
    assert_eq!(count(&h.db_path, "booking_summaries")?, 0);

    let err = h
        .service
        .ingest_search_batch(&search_batch(&[101, 102, 103, 104, 105]))
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert_eq!(count(&h.db_path, "vehicles")?, 0);
    Ok(())
}

#[test]
fn test_schema_failure_writes_nothing() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let mut payload: Value = serde_json::from_str(SEARCH_FIXTURE)?;
    payload["entries"][0]["response_content"]["vehicles"][1]
        .as_object_mut()
        .unwrap()
        .remove("make");

    let err = h
        .service
        .ingest_search_batch(&serde_json::to_vec(&payload)?)
        .unwrap_err();
    match err {
        IngestError::SchemaValidation { path, .. } => {
            assert_eq!(path, "/entries/0/response_content/vehicles/1/make")
        }
        other => panic!("expected schema validation error, got {other:?}"),
    }
    assert_eq!(count(&h.db_path, "vehicles")?, 0);
    Ok(())
}

#[test]
fn test_concurrent_overlapping_batches_store_each_vehicle_once() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    let service = Arc::new(h.service);
    let batches = [
        search_batch(&(1..=20).collect::<Vec<_>>()),
        search_batch(&(10..=30).collect::<Vec<_>>()),
    ];
    let barrier = Arc::new(Barrier::new(batches.len()));

    let handles: Vec<_> = batches
        .into_iter()
        .map(|payload| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.ingest_search_batch(&payload)
            })
        })
        .collect();

    let mut added = 0;
    for handle in handles {
        let report = handle.join().expect("ingest thread panicked")?;
        added += report.vehicles_added;
    }

    assert_eq!(added, 30);
    let conn = Connection::open(&h.db_path)?;
    let (rows, distinct): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT id) FROM vehicles",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    assert_eq!(rows, 30);
    assert_eq!(distinct, 30);
    Ok(())
}

#[test]
fn test_store_survives_reopen() -> Result<()> {
    let h = harness(DetailConflictPolicy::Reject)?;
    h.service.ingest_search_batch(SEARCH_FIXTURE.as_bytes())?;

    let reopened = SqliteStore::open(&h.db_path, Duration::from_millis(2_000))?;
    let vehicle = reopened.get_vehicle(101)?.expect("vehicle persisted");
    assert_eq!(vehicle.make, "Toyota");
    assert_eq!(vehicle.year, 2021);
    Ok(())
}
