//! Error types for schema_diff

use thiserror::Error;

/// Result type for schema_diff operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema_diff
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A named schema could not be introspected. Aborts the whole run.
    #[error("Metadata unavailable for schema '{schema}': {reason}")]
    MetadataUnavailable { schema: String, reason: String },

    /// Two entities of one table share an identity key.
    #[error("Ambiguous identity in table '{table}': duplicate {kind} '{name}'")]
    AmbiguousIdentity {
        table: String,
        kind: &'static str,
        name: String,
    },

    /// The table uses a feature outside the modelled subset; only that table is skipped.
    #[error("Unsupported construct in table '{table}': {construct}")]
    UnsupportedConstruct { table: String, construct: String },

    #[error("DDL statement failed: {statement}: {source}")]
    ExecutionFailure {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// Applying the generated DDL did not converge on the target schema.
    #[error("Checksum mismatch after migration: {from} ({from_checksum}) != {to} ({to_checksum})")]
    ChecksumMismatch {
        from: String,
        to: String,
        from_checksum: String,
        to_checksum: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Diff worker failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether the error only concerns a single table and the run may continue
    pub fn is_table_local(&self) -> bool {
        matches!(self, Error::UnsupportedConstruct { .. })
    }
}

/// Convert Serde JSON errors to schema_diff errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to schema_diff errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
