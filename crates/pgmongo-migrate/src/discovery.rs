//! Resolution of the set of tables to migrate.

use tracing::{info, warn};

use crate::connectors::RowSource;
use crate::error::Result;

/// Which tables a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSelection {
    /// Explicit table names, in the order they should be processed.
    pub tables: Vec<String>,
    /// Ask the source catalog instead of using `tables`.
    pub auto_discover: bool,
}

impl TableSelection {
    /// An explicit, ordered list of tables.
    pub fn explicit<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            auto_discover: false,
        }
    }

    /// Every base table the source reports.
    #[must_use]
    pub fn all() -> Self {
        Self {
            tables: Vec::new(),
            auto_discover: true,
        }
    }
}

impl From<&crate::config::PostgresConfig> for TableSelection {
    fn from(config: &crate::config::PostgresConfig) -> Self {
        Self {
            tables: config.tables.clone(),
            auto_discover: config.all_tables,
        }
    }
}

/// Resolves the tables to migrate.
///
/// Without auto-discovery the explicit list is returned verbatim: order is
/// kept and table existence is only checked when each table is opened. With
/// auto-discovery the catalog's base tables replace the explicit list.
///
/// # Errors
///
/// Returns [`crate::Error::Discovery`] if the catalog query fails.
pub async fn resolve_tables(selection: &TableSelection, source: &dyn RowSource) -> Result<Vec<String>> {
    if !selection.auto_discover {
        return Ok(selection.tables.clone());
    }

    if !selection.tables.is_empty() {
        warn!(
            "all_tables is set; ignoring {} explicitly listed table(s)",
            selection.tables.len()
        );
    }

    let tables = source.list_base_tables().await?;
    info!(
        "Discovered {} base table(s) from {}",
        tables.len(),
        source.source_type()
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::RowStream;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Catalog {
        tables: Option<Vec<&'static str>>,
        calls: AtomicU32,
    }

    impl Catalog {
        fn new(tables: Option<Vec<&'static str>>) -> Self {
            Self {
                tables,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RowSource for Catalog {
        fn source_type(&self) -> &'static str {
            "catalog"
        }

        async fn list_base_tables(&self) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.tables {
                Some(tables) => Ok(tables.iter().map(|t| (*t).to_string()).collect()),
                None => Err(Error::Discovery("permission denied for schema public".into())),
            }
        }

        async fn open_cursor(&self, table: &str) -> Result<Box<dyn RowStream>> {
            Err(Error::query(table, "not a table source"))
        }
    }

    #[tokio::test]
    async fn test_explicit_list_returned_verbatim() {
        let catalog = Catalog::new(Some(vec!["users"]));
        let selection = TableSelection::explicit(["zeta", "alpha", "does_not_exist"]);

        let tables = resolve_tables(&selection, &catalog).await.unwrap();

        assert_eq!(tables, vec!["zeta", "alpha", "does_not_exist"]);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_discovery_replaces_explicit_list() {
        let catalog = Catalog::new(Some(vec!["users", "orders"]));
        let selection = TableSelection {
            tables: vec!["ignored_table".to_string()],
            auto_discover: true,
        };

        let tables = resolve_tables(&selection, &catalog).await.unwrap();

        assert_eq!(tables, vec!["users", "orders"]);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_discovery_empty_schema() {
        let catalog = Catalog::new(Some(vec![]));
        let tables = resolve_tables(&TableSelection::all(), &catalog).await.unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_discovery_error() {
        let catalog = Catalog::new(None);
        let err = resolve_tables(&TableSelection::all(), &catalog)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[test]
    fn test_selection_from_config() {
        let config: crate::config::PostgresConfig = serde_yaml::from_str(
            "host: h\ndatabase: d\nuser: u\ntables: [a, b]\nall_tables: true\n",
        )
        .unwrap();

        let selection = TableSelection::from(&config);
        assert!(selection.auto_discover);
        assert_eq!(selection.tables, vec!["a", "b"]);
    }
}
