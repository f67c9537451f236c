use crate::domain::EntityKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A required payload field is missing or has the wrong type.
    /// `path` is a JSON pointer into the submitted document.
    #[error("Schema validation failed at '{path}': {message}")]
    SchemaValidation { path: String, message: String },

    /// A uniqueness constraint rejected the batch.
    #[error("Conflict persisting {entity}: {message}")]
    Conflict { entity: EntityKind, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::SchemaValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        IngestError::Storage {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used for HTTP bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SchemaValidation { .. } => "schema_validation",
            IngestError::Conflict { .. } => "conflict",
            IngestError::NotFound { .. } => "not_found",
            IngestError::Storage { .. } | IngestError::Sqlite(_) => "storage",
            IngestError::Json(_) => "json",
            IngestError::Toml(_) | IngestError::Config(_) => "config",
            IngestError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
