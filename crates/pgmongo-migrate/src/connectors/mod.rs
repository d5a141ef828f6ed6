//! Connectors for the relational source and the document destination.

pub mod dry_run;
pub mod mongodb;
pub mod pg_binary;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;

use crate::document::Document;
use crate::error::Result;
use crate::value::{ColumnDescriptor, RawValue};

pub use self::dry_run::DryRunSink;
pub use self::mongodb::MongoSink;
pub use self::postgres::PostgresSource;

/// One row read from a [`RowStream`].
#[derive(Debug, Clone)]
pub struct SourceRow {
    /// Result set columns, shared by every row of the stream.
    pub columns: Arc<[ColumnDescriptor]>,
    /// Owned values, one per column, in column order.
    pub values: Vec<RawValue>,
}

/// Lazy sequence of rows from a full-table scan.
#[async_trait]
pub trait RowStream: Send {
    /// Returns the next row, or `None` once the table is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Scan`] if a row cannot be read. The stream
    /// must not be polled again after an error.
    async fn next_row(&mut self) -> Result<Option<SourceRow>>;
}

/// Trait for relational sources.
///
/// Implementations must tolerate concurrent calls: with several workers,
/// each table opens its own cursor on the same source.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Lists every base table of the configured schema (views and system
    /// tables excluded).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Discovery`] if the catalog cannot be read.
    async fn list_base_tables(&self) -> Result<Vec<String>>;

    /// Starts an unfiltered, unordered scan of all columns of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] if the scan cannot be started.
    async fn open_cursor(&self, table: &str) -> Result<Box<dyn RowStream>>;

    /// Releases the source's connections. Does nothing by default.
    async fn close(&self) {}
}

/// Trait for document destinations.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Get the destination type name.
    fn sink_type(&self) -> &'static str;

    /// Inserts `document` as a new entry of `collection`.
    ///
    /// Every call creates a new entry; nothing is merged or overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Write`] if the destination rejects it.
    async fn insert(&self, collection: &str, document: Document) -> Result<()>;

    /// Flushes and releases the destination's connections. Does nothing by
    /// default.
    async fn close(&self) {}
}
