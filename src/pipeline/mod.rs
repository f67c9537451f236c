// Ingestion pipeline: normalization and dedup/upsert decisions

pub mod dedup;
pub mod normalize;

pub use dedup::{DetailConflictPolicy, UpsertOutcome};
pub use normalize::{normalize_daily_pricing_batch, normalize_search_batch, DetailCandidates, SearchCandidates};
