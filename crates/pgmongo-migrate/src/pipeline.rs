//! Migration pipeline orchestration.
//!
//! Tables are resolved once, then each table goes through
//! `Pending -> Streaming -> Completed | Failed`. A failing table is recorded
//! and the run moves on; only a failed table discovery aborts the run.

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MigrationConfig, PostgresConfig};
use crate::connectors::{DocumentSink, DryRunSink, MongoSink, PostgresSource, RowSource};
use crate::discovery::{resolve_tables, TableSelection};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Lifecycle of one table transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Resolved, cursor not opened yet.
    Pending,
    /// Cursor open, rows being copied.
    Streaming,
    /// Cursor exhausted, every row written.
    Completed,
    /// Stopped by an error or by cancellation.
    Failed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a table transfer ended.
#[derive(Debug)]
pub enum TransferOutcome {
    /// All rows were written.
    Completed,
    /// The transfer stopped early.
    Failed(Error),
}

/// Per-table result.
#[derive(Debug)]
pub struct TransferResult {
    /// Source table, also the destination collection.
    pub table: String,
    /// Documents written before the transfer ended.
    pub rows: u64,
    /// Final outcome.
    pub outcome: TransferOutcome,
    /// Wall time spent on the table.
    pub duration: Duration,
}

impl TransferResult {
    /// Returns true if every row of the table was written.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Completed)
    }

    /// The error that stopped the table, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            TransferOutcome::Completed => None,
            TransferOutcome::Failed(e) => Some(e),
        }
    }

    /// Terminal state of the table.
    #[must_use]
    pub fn state(&self) -> TableState {
        if self.is_completed() {
            TableState::Completed
        } else {
            TableState::Failed
        }
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn status_line(&self) -> String {
        match &self.outcome {
            TransferOutcome::Completed => format!(
                "Data transfer from table {} completed: {} row(s) in {:.2}s",
                self.table,
                self.rows,
                self.duration.as_secs_f64()
            ),
            TransferOutcome::Failed(e) => format!(
                "Data transfer from table {} FAILED after {} row(s): {}",
                self.table, self.rows, e
            ),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// One entry per resolved table, in resolution order.
    pub results: Vec<TransferResult>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationReport {
    /// Returns true only if every table completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(TransferResult::is_completed)
    }

    /// Tables that did not complete.
    pub fn failed(&self) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(|r| !r.is_completed())
    }

    /// Documents written across all tables.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.results.iter().map(|r| r.rows).sum()
    }

    /// Calculate throughput (documents per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_rows() as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Looks up the result of a table.
    #[must_use]
    pub fn result(&self, table: &str) -> Option<&TransferResult> {
        self.results.iter().find(|r| r.table == table)
    }
}

/// Book-keeping for one table while it is transferred.
struct TableTransfer {
    table: String,
    state: TableState,
    rows: u64,
    started: Instant,
}

impl TableTransfer {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            state: TableState::Pending,
            rows: 0,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: TableState) {
        debug!("{}: {} -> {}", self.table, self.state, next);
        self.state = next;
    }

    fn finish(mut self, result: Result<()>) -> TransferResult {
        let outcome = match result {
            Ok(()) => {
                self.transition(TableState::Completed);
                TransferOutcome::Completed
            }
            Err(e) => {
                self.transition(TableState::Failed);
                TransferOutcome::Failed(e)
            }
        };

        TransferResult {
            table: self.table,
            rows: self.rows,
            outcome,
            duration: self.started.elapsed(),
        }
    }
}

/// Migration pipeline.
pub struct Pipeline {
    source: Arc<dyn RowSource>,
    sink: Arc<dyn DocumentSink>,
    selection: TableSelection,
    workers: usize,
}

impl Pipeline {
    /// Create a new pipeline over already connected stores.
    pub fn new(
        source: Arc<dyn RowSource>,
        sink: Arc<dyn DocumentSink>,
        selection: TableSelection,
    ) -> Self {
        Self {
            source,
            sink,
            selection,
            workers: 1,
        }
    }

    /// Sets how many tables are transferred concurrently.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Connects both stores described by `config` and builds the pipeline.
    ///
    /// In dry-run mode no destination connection is made.
    ///
    /// # Errors
    ///
    /// Returns a connection error once retries are exhausted.
    pub async fn from_config(config: &MigrationConfig) -> Result<Self> {
        let retry = RetryConfig::for_connections(config.options.connect_retries);
        let source = connect_source(&config.postgres, &retry).await?;

        let sink: Arc<dyn DocumentSink> = if config.options.dry_run {
            info!("Dry run mode - not writing to destination");
            Arc::new(DryRunSink::new())
        } else {
            let sink = with_retry(&retry, "connect to MongoDB", || {
                MongoSink::connect(&config.mongodb)
            })
            .await;
            match sink {
                Ok(sink) => Arc::new(sink),
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            }
        };

        Ok(Self::new(
            Arc::new(source),
            sink,
            TableSelection::from(&config.postgres),
        )
        .with_workers(config.options.workers))
    }

    /// Closes the source and then the destination.
    ///
    /// Call once the last run has finished; the pipeline is unusable after.
    pub async fn close(&self) {
        self.source.close().await;
        self.sink.close().await;
    }

    /// Resolves the tables this pipeline would process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the catalog query fails.
    pub async fn tables(&self) -> Result<Vec<String>> {
        resolve_tables(&self.selection, self.source.as_ref()).await
    }

    /// Run the migration pipeline.
    ///
    /// Every resolved table gets a [`TransferResult`], including tables that
    /// never started because `cancel` fired first.
    ///
    /// # Errors
    ///
    /// Returns an error only if table discovery fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationReport> {
        let start = Instant::now();

        info!(
            "Starting migration pipeline ({} -> {}, {} worker(s))",
            self.source.source_type(),
            self.sink.sink_type(),
            self.workers
        );

        let tables = self.tables().await?;
        let progress = create_progress_bar(tables.len() as u64);

        let cancel = &cancel;
        let progress_ref = &progress;
        let results: Vec<TransferResult> = stream::iter(tables)
            .map(|table| async move {
                let result = self.transfer_table(&table, cancel).await;
                match result.error() {
                    None => info!("{}", result.status_line()),
                    Some(_) => warn!("{}", result.status_line()),
                }
                progress_ref.inc(1);
                result
            })
            .buffered(self.workers)
            .collect()
            .await;

        progress.finish_and_clear();

        let report = MigrationReport {
            results,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            "Migration complete: {} table(s), {} failed, {} document(s) in {:.2}s ({:.0} docs/sec)",
            report.results.len(),
            report.failed().count(),
            report.total_rows(),
            report.duration_secs,
            report.throughput()
        );

        Ok(report)
    }

    /// Copies every row of `table` into the collection of the same name.
    ///
    /// Never fails: errors end up in the returned result.
    pub async fn transfer_table(&self, table: &str, cancel: &CancellationToken) -> TransferResult {
        let mut transfer = TableTransfer::new(table);
        let result = self.stream_table(&mut transfer, cancel).await;
        transfer.finish(result)
    }

    async fn stream_table(
        &self,
        transfer: &mut TableTransfer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut cursor = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            cursor = self.source.open_cursor(&transfer.table) => cursor?,
        };
        transfer.transition(TableState::Streaming);

        loop {
            let row = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                row = cursor.next_row() => row?,
            };
            let Some(row) = row else {
                return Ok(());
            };

            let document = Document::build(&row.columns, row.values);
            self.sink.insert(&transfer.table, document).await?;
            transfer.rows += 1;
        }
    }
}

/// Connects the PostgreSQL source, retrying transient failures.
///
/// # Errors
///
/// Returns [`Error::SourceConnection`] once retries are exhausted.
pub async fn connect_source(config: &PostgresConfig, retry: &RetryConfig) -> Result<PostgresSource> {
    with_retry(retry, "connect to PostgreSQL", || PostgresSource::connect(config)).await
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);

    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tables")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(table: &str, rows: u64, error: Option<Error>) -> TransferResult {
        TransferResult {
            table: table.to_string(),
            rows,
            outcome: error.map_or(TransferOutcome::Completed, TransferOutcome::Failed),
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_report_throughput() {
        let report = MigrationReport {
            results: vec![result("a", 600, None), result("b", 400, None)],
            duration_secs: 2.0,
        };

        assert_eq!(report.total_rows(), 1000);
        assert!((report.throughput() - 500.0).abs() < 0.001);
    }

    #[test]
    fn test_report_zero_duration() {
        let report = MigrationReport::default();
        assert_eq!(report.throughput(), 0.0);
        assert!(report.is_success());
    }

    #[test]
    fn test_report_any_failure_is_not_success() {
        let report = MigrationReport {
            results: vec![
                result("a", 2, None),
                result("b", 1, Some(Error::write("b", "duplicate key"))),
            ],
            duration_secs: 1.0,
        };

        assert!(!report.is_success());
        let failed: Vec<_> = report.failed().map(|r| r.table.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
        assert_eq!(report.result("a").map(TransferResult::state), Some(TableState::Completed));
        assert_eq!(report.result("b").map(TransferResult::state), Some(TableState::Failed));
    }

    #[test]
    fn test_status_lines() {
        let ok = result("users", 2, None);
        assert!(ok.status_line().contains("users completed: 2 row(s)"));

        let failed = result("orders", 3, Some(Error::Cancelled));
        let line = failed.status_line();
        assert!(line.contains("orders FAILED after 3 row(s)"));
        assert!(line.contains("MIG-008"));
    }

    #[test]
    fn test_table_transfer_finish() {
        let mut transfer = TableTransfer::new("users");
        assert_eq!(transfer.state, TableState::Pending);
        transfer.transition(TableState::Streaming);
        transfer.rows = 5;

        let done = transfer.finish(Err(Error::scan("users", 6, "bad utf-8")));
        assert_eq!(done.state(), TableState::Failed);
        assert_eq!(done.rows, 5);
        assert!(matches!(done.error(), Some(Error::Scan { row: 6, .. })));
    }
}
