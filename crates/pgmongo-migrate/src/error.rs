//! Error types for pgmongo-migrate.
//!
//! A single error enum covers the whole run. Discovery failures end the run,
//! while query, scan and write failures only end the table they happened in.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating tables.
///
/// Every variant carries a stable `MIG-XXX` code, see [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration (MIG-001).
    #[error("[MIG-001] Configuration error: {0}")]
    Config(String),

    /// The PostgreSQL handle could not be established or was lost (MIG-002).
    #[error("[MIG-002] Source connection error: {0}")]
    SourceConnection(String),

    /// The MongoDB handle could not be established or was lost (MIG-003).
    #[error("[MIG-003] Destination connection error: {0}")]
    DestinationConnection(String),

    /// Listing base tables from the catalog failed (MIG-004).
    #[error("[MIG-004] Table discovery failed: {0}")]
    Discovery(String),

    /// Opening the row stream of a table failed (MIG-005).
    #[error("[MIG-005] Failed to query table '{table}': {reason}")]
    Query {
        /// Source table.
        table: String,
        /// Driver message.
        reason: String,
    },

    /// Reading a row failed mid-stream (MIG-006).
    #[error("[MIG-006] Failed to read row {row} of table '{table}': {reason}")]
    Scan {
        /// Source table.
        table: String,
        /// 1-based position of the row that could not be read.
        row: u64,
        /// Driver or decode message.
        reason: String,
    },

    /// The destination rejected an insert (MIG-007).
    #[error("[MIG-007] Failed to insert document into collection '{collection}': {reason}")]
    Write {
        /// Destination collection.
        collection: String,
        /// Driver or serialization message.
        reason: String,
    },

    /// The run was cancelled before the table finished (MIG-008).
    #[error("[MIG-008] Transfer cancelled")]
    Cancelled,

    /// IO error (MIG-009).
    #[error("[MIG-009] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error (MIG-010).
    #[error("[MIG-010] Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns the error code (e.g., "MIG-004").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "MIG-001",
            Self::SourceConnection(_) => "MIG-002",
            Self::DestinationConnection(_) => "MIG-003",
            Self::Discovery(_) => "MIG-004",
            Self::Query { .. } => "MIG-005",
            Self::Scan { .. } => "MIG-006",
            Self::Write { .. } => "MIG-007",
            Self::Cancelled => "MIG-008",
            Self::Io(_) => "MIG-009",
            Self::Yaml(_) => "MIG-010",
        }
    }

    /// Returns true if this error only ends the current table.
    ///
    /// The orchestrator records these in the table's result and moves on.
    #[must_use]
    pub const fn is_table_fatal(&self) -> bool {
        matches!(
            self,
            Self::Query { .. } | Self::Scan { .. } | Self::Write { .. } | Self::Cancelled
        )
    }

    /// Builds a [`Error::Query`].
    pub fn query(table: impl Into<String>, reason: impl ToString) -> Self {
        Self::Query {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`Error::Scan`].
    pub fn scan(table: impl Into<String>, row: u64, reason: impl ToString) -> Self {
        Self::Scan {
            table: table.into(),
            row,
            reason: reason.to_string(),
        }
    }

    /// Builds a [`Error::Write`].
    pub fn write(collection: impl Into<String>, reason: impl ToString) -> Self {
        Self::Write {
            collection: collection.into(),
            reason: reason.to_string(),
        }
    }
}
