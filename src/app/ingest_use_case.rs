use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::app::ports::Store;
use crate::constants::*;
use crate::domain::{EntityKind, Vehicle};
use crate::error::{IngestError, Result};
use crate::observability::metrics;
use crate::payload::{self, DailyPricingBatch, SearchBatch};
use crate::pipeline::dedup::{self, DetailConflictPolicy};
use crate::pipeline::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBatchReport {
    pub vehicles_added: usize,
    pub vehicles_skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Always the number of listings in the payload.
    pub summaries_added: usize,
    /// Vehicles that had to be created so the summaries have a parent row.
    pub vehicles_added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPricingReport {
    pub details_added: usize,
    pub details_skipped: usize,
    pub days_seen: usize,
}

/// The ingestion boundary operations.
///
/// Each call validates, normalizes and persists inside one unit of work:
/// committed when every step succeeds, rolled back otherwise. Nothing is
/// cached between calls.
pub struct IngestService {
    store: Arc<dyn Store>,
    detail_policy: DetailConflictPolicy,
}

impl IngestService {
    pub fn new(store: Arc<dyn Store>, detail_policy: DetailConflictPolicy) -> Self {
        Self {
            store,
            detail_policy,
        }
    }

    pub fn detail_policy(&self) -> DetailConflictPolicy {
        self.detail_policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Persist vehicles not yet stored. Returns how many were new.
    pub fn ingest_search_batch(&self, raw: &[u8]) -> Result<SearchBatchReport> {
        observe(OP_INGEST_SEARCH_BATCH, || {
            let batch = payload::parse_search_batch(raw)?;
            self.ingest_search(&batch)
        })
    }

    pub fn ingest_search(&self, batch: &SearchBatch) -> Result<SearchBatchReport> {
        let candidates = normalize::normalize_search_batch(batch);
        debug!("Normalized {} vehicle candidates", candidates.vehicles.len());

        let mut uow = self.store.begin()?;
        let outcome = dedup::upsert_vehicles(uow.as_mut(), candidates.vehicles)?;
        uow.commit()?;

        metrics::entities::vehicles(outcome.added, outcome.skipped);
        info!(
            added = outcome.added,
            skipped = outcome.skipped,
            "{} vehicle(s) added",
            outcome.added
        );
        Ok(SearchBatchReport {
            vehicles_added: outcome.added,
            vehicles_skipped: outcome.skipped,
        })
    }

    /// Append one summary per listing. Vehicles missing from the store are
    /// created in the same unit of work, first write wins.
    pub fn ingest_booking_summaries(&self, raw: &[u8]) -> Result<SummaryReport> {
        observe(OP_INGEST_BOOKING_SUMMARIES, || {
            let batch = payload::parse_search_batch(raw)?;
            self.ingest_summaries(&batch)
        })
    }

    pub fn ingest_summaries(&self, batch: &SearchBatch) -> Result<SummaryReport> {
        let candidates = normalize::normalize_search_batch(batch);

        let mut uow = self.store.begin()?;
        let vehicles = dedup::upsert_vehicles(uow.as_mut(), candidates.vehicles)?;
        let summaries_added = dedup::append_summaries(uow.as_mut(), candidates.summaries)?;
        uow.commit()?;

        metrics::entities::vehicles(vehicles.added, vehicles.skipped);
        metrics::entities::summaries(summaries_added);
        info!(
            summaries_added,
            vehicles_added = vehicles.added,
            "{} booking summaries added",
            summaries_added
        );
        Ok(SummaryReport {
            summaries_added,
            vehicles_added: vehicles.added,
        })
    }

    /// Persist booked days for one vehicle and record the scrape time on it.
    pub fn ingest_daily_pricing(&self, raw: &[u8]) -> Result<DailyPricingReport> {
        observe(OP_INGEST_DAILY_PRICING, || {
            let batch = payload::parse_daily_pricing_batch(raw)?;
            self.ingest_pricing(&batch)
        })
    }

    pub fn ingest_pricing(&self, batch: &DailyPricingBatch) -> Result<DailyPricingReport> {
        let candidates = normalize::normalize_daily_pricing_batch(batch);
        let vehicle_id = candidates.vehicle_id;

        let mut uow = self.store.begin()?;
        let known = uow.existing_vehicle_ids(&BTreeSet::from([vehicle_id]))?;
        if !known.contains(&vehicle_id) {
            return Err(IngestError::NotFound {
                entity: EntityKind::Vehicle,
                id: vehicle_id,
            });
        }

        let outcome = dedup::persist_details(
            uow.as_mut(),
            vehicle_id,
            candidates.details,
            self.detail_policy,
        )?;
        uow.mark_detail_scraped(vehicle_id, candidates.captured_at.unwrap_or_else(Utc::now))?;
        uow.commit()?;

        metrics::entities::details(outcome.added, outcome.skipped, candidates.days_seen);
        info!(
            vehicle_id,
            days_seen = candidates.days_seen,
            added = outcome.added,
            skipped = outcome.skipped,
            policy = self.detail_policy.as_str(),
            "{} booking detail(s) added",
            outcome.added
        );
        Ok(DailyPricingReport {
            details_added: outcome.added,
            details_skipped: outcome.skipped,
            days_seen: candidates.days_seen,
        })
    }

    pub fn read_vehicle(&self, id: i64) -> Result<Vehicle> {
        let span = info_span!("read", operation = OP_READ_VEHICLE, vehicle_id = id);
        let _enter = span.enter();
        self.store.get_vehicle(id)?.ok_or(IngestError::NotFound {
            entity: EntityKind::Vehicle,
            id,
        })
    }
}

/// Run one ingestion call inside a span with a fresh run id, recording
/// duration and outcome.
fn observe<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("ingest", operation, %run_id);
    let _enter = span.enter();

    let started = Instant::now();
    let result = call();
    let secs = started.elapsed().as_secs_f64();

    match &result {
        Ok(_) => metrics::calls::success(operation, secs),
        Err(e) => {
            warn!(kind = e.kind(), "{} failed: {}", operation, e);
            metrics::calls::error(operation, e.kind(), secs);
        }
    }
    result
}
