//! Destination that discards documents, used by `--dry-run`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::connectors::DocumentSink;
use crate::document::Document;
use crate::error::Result;

/// Counts documents without writing them anywhere.
#[derive(Debug, Default)]
pub struct DryRunSink {
    discarded: AtomicU64,
}

impl DryRunSink {
    /// Creates a new dry-run sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents received so far.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentSink for DryRunSink {
    fn sink_type(&self) -> &'static str {
        "dry-run"
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        trace!("dry run: skipping {}-field document for {}", document.len(), collection);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
