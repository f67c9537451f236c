//! Dedup/upsert decisions for one ingestion batch.
//!
//! Vehicles: at most one row per id, first write wins, existing ids are
//! skipped silently. Summaries: append-only. Details: at most one row per
//! `(vehicle_id, date)`, with the conflict behaviour picked by
//! [`DetailConflictPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;
use std::str::FromStr;
use tracing::debug;

use crate::app::ports::UnitOfWork;
use crate::domain::{BookingDetail, BookingSummary, Vehicle};
use crate::error::{IngestError, Result};

/// How a daily-pricing batch treats `(vehicle_id, date)` pairs that are
/// already stored or repeated within the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailConflictPolicy {
    /// Insert everything and let the uniqueness constraint reject the whole
    /// batch on the first duplicate.
    #[default]
    Reject,
    /// Drop pairs that already exist (and repeats within the batch, keeping
    /// the first) before inserting, mirroring the vehicle path.
    SkipExisting,
}

impl DetailConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailConflictPolicy::Reject => "reject",
            DetailConflictPolicy::SkipExisting => "skip_existing",
        }
    }
}

impl FromStr for DetailConflictPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reject" => Ok(DetailConflictPolicy::Reject),
            "skip_existing" | "skip" => Ok(DetailConflictPolicy::SkipExisting),
            other => Err(IngestError::Config(format!(
                "unknown detail conflict policy '{other}' (expected 'reject' or 'skip_existing')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Keep the first item for each key, preserving order. Returns the kept
/// items and how many were dropped.
pub fn dedupe_keep_first<T, K, F>(items: Vec<T>, key: F) -> (Vec<T>, usize)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let total = items.len();
    let mut seen = HashSet::with_capacity(total);
    let kept: Vec<T> = items.into_iter().filter(|item| seen.insert(key(item))).collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Insert vehicles whose id is not yet stored.
///
/// One existence check for the whole (deduplicated) id set, then one bulk
/// insert of the new rows.
pub fn upsert_vehicles(uow: &mut dyn UnitOfWork, candidates: Vec<Vehicle>) -> Result<UpsertOutcome> {
    let (unique, repeated) = dedupe_keep_first(candidates, |v| v.id);
    if unique.is_empty() {
        return Ok(UpsertOutcome {
            added: 0,
            skipped: repeated,
        });
    }

    let ids: BTreeSet<i64> = unique.iter().map(|v| v.id).collect();
    let existing = uow.existing_vehicle_ids(&ids)?;

    let (mut fresh, known): (Vec<Vehicle>, Vec<Vehicle>) =
        unique.into_iter().partition(|v| !existing.contains(&v.id));

    debug!(
        new = fresh.len(),
        existing = known.len(),
        repeated,
        "partitioned vehicle candidates"
    );

    let added = if fresh.is_empty() {
        0
    } else {
        uow.insert_vehicles(&mut fresh)?
    };

    Ok(UpsertOutcome {
        added,
        skipped: known.len() + repeated,
    })
}

/// Summaries form a time series; every candidate is inserted.
pub fn append_summaries(uow: &mut dyn UnitOfWork, mut candidates: Vec<BookingSummary>) -> Result<usize> {
    if candidates.is_empty() {
        return Ok(0);
    }
    uow.insert_summaries(&mut candidates)
}

/// Persist booking details for one vehicle under `policy`.
pub fn persist_details(
    uow: &mut dyn UnitOfWork,
    vehicle_id: i64,
    candidates: Vec<BookingDetail>,
    policy: DetailConflictPolicy,
) -> Result<UpsertOutcome> {
    if candidates.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    match policy {
        DetailConflictPolicy::Reject => {
            let mut rows = candidates;
            let added = uow.insert_details(&mut rows)?;
            Ok(UpsertOutcome { added, skipped: 0 })
        }
        DetailConflictPolicy::SkipExisting => {
            let (unique, repeated) = dedupe_keep_first(candidates, BookingDetail::key);
            let dates: BTreeSet<_> = unique.iter().map(|d| d.date).collect();
            let existing = uow.existing_detail_dates(vehicle_id, &dates)?;

            let (mut fresh, known): (Vec<BookingDetail>, Vec<BookingDetail>) =
                unique.into_iter().partition(|d| !existing.contains(&d.date));

            let added = if fresh.is_empty() {
                0
            } else {
                uow.insert_details(&mut fresh)?
            };
            Ok(UpsertOutcome {
                added,
                skipped: known.len() + repeated,
            })
        }
    }
}
