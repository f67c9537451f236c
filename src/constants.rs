/// Configuration defaults and environment variable names

// Defaults used when neither config.toml nor the environment sets a value
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_DATABASE_PATH: &str = "data/turo.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LISTEN_PORT: u16 = 8000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// Environment overrides (also read from .env)
pub const ENV_CONFIG_PATH: &str = "TURO_INGEST_CONFIG";
pub const ENV_DATABASE_PATH: &str = "TURO_INGEST_DATABASE_PATH";
pub const ENV_LISTEN_PORT: &str = "TURO_INGEST_LISTEN_PORT";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TURO_INGEST_BUSY_TIMEOUT_MS";
pub const ENV_DETAIL_CONFLICT_POLICY: &str = "TURO_INGEST_DETAIL_CONFLICT_POLICY";
pub const ENV_LOG_DIR: &str = "TURO_INGEST_LOG_DIR";
pub const ENV_METRICS_PORT: &str = "TURO_INGEST_METRICS_PORT";
pub const ENV_STORE: &str = "TURO_INGEST_STORE";

// Operation names, used as span names and metric labels
pub const OP_INGEST_SEARCH_BATCH: &str = "ingest_search_batch";
pub const OP_INGEST_BOOKING_SUMMARIES: &str = "ingest_booking_summaries";
pub const OP_INGEST_DAILY_PRICING: &str = "ingest_daily_pricing";
pub const OP_READ_VEHICLE: &str = "read_vehicle";
