//! PostgreSQL row source.
//!
//! Tables are read with an unfiltered `SELECT *`. A producer task drives the
//! sqlx row stream and hands decoded rows to the consumer through a channel
//! of capacity one, so a table is never materialized in memory and reading
//! waits for the previous row's write.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::PostgresConfig;
use crate::connectors::pg_binary::{self, Temporal};
use crate::connectors::{RowSource, RowStream, SourceRow};
use crate::error::{Error, Result};
use crate::value::{ColumnDescriptor, RawValue};

/// PostgreSQL limit on identifier length, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Rows buffered between the reader task and the consumer.
const ROW_CHANNEL_CAPACITY: usize = 1;

const BASE_TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

/// Validates and double-quotes an identifier.
///
/// Embedded double quotes are doubled. Empty names, NUL bytes and names
/// longer than [`MAX_IDENTIFIER_LENGTH`] are rejected.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Config("identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(Error::Config(format!(
            "identifier contains a NUL byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(Error::Config(format!(
            "identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Builds the full-table scan for `schema.table`.
pub fn full_scan_sql(schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "SELECT * FROM {}.{}",
        quote_identifier(schema)?,
        quote_identifier(table)?
    ))
}

/// How a column is decoded into a [`RawValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// `BOOL`
    Bool,
    /// `INT2`
    Int16,
    /// `INT4`
    Int32,
    /// `INT8`
    Int64,
    /// `OID`, widened to a 64-bit integer.
    Oid,
    /// `FLOAT4`
    Float32,
    /// `FLOAT8`
    Float64,
    /// `NUMERIC`, read from its wire form at full precision.
    Numeric,
    /// Built-in character types.
    Text,
    /// The single-byte `"char"` type.
    Char,
    /// Types whose binary form is their text: enums, `citext`.
    TextLike,
    /// `BYTEA`
    Bytes,
    /// `UUID`
    Uuid,
    /// `TIMESTAMP`
    Timestamp,
    /// `TIMESTAMPTZ`
    TimestampTz,
    /// `DATE`
    Date,
    /// `TIME`
    Time,
    /// `JSON` / `JSONB`
    Json,
    /// `BOOL[]`
    BoolArray,
    /// `INT2[]`
    Int16Array,
    /// `INT4[]`
    Int32Array,
    /// `INT8[]`
    Int64Array,
    /// `FLOAT4[]`
    Float32Array,
    /// `FLOAT8[]`
    Float64Array,
    /// `TEXT[]`, `VARCHAR[]`
    TextArray,
    /// `UUID[]`
    UuidArray,
    /// Anything else, kept as [`RawValue::Other`] wire bytes.
    Raw,
}

impl ColumnKind {
    /// Maps a PostgreSQL type name, as reported by sqlx, to a decoder.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int16,
            "INT4" => Self::Int32,
            "INT8" => Self::Int64,
            "OID" => Self::Oid,
            "FLOAT4" => Self::Float32,
            "FLOAT8" => Self::Float64,
            "NUMERIC" => Self::Numeric,
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => Self::Text,
            "\"CHAR\"" => Self::Char,
            "citext" | "CITEXT" => Self::TextLike,
            "BYTEA" => Self::Bytes,
            "UUID" => Self::Uuid,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "JSON" | "JSONB" => Self::Json,
            "BOOL[]" => Self::BoolArray,
            "INT2[]" => Self::Int16Array,
            "INT4[]" => Self::Int32Array,
            "INT8[]" => Self::Int64Array,
            "FLOAT4[]" => Self::Float32Array,
            "FLOAT8[]" => Self::Float64Array,
            "TEXT[]" | "VARCHAR[]" => Self::TextArray,
            "UUID[]" => Self::UuidArray,
            _ => Self::Raw,
        }
    }

    fn for_type(type_info: &PgTypeInfo) -> Self {
        match Self::from_type_name(type_info.name()) {
            Self::Raw if matches!(type_info.kind(), PgTypeKind::Enum(_)) => Self::TextLike,
            kind => kind,
        }
    }
}

/// PostgreSQL source backed by a sqlx connection pool.
pub struct PostgresSource {
    pool: PgPool,
    schema: String,
}

impl PostgresSource {
    /// Connects a pool using the source configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceConnection`] if no connection can be made.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::SourceConnection(format!(
                    "PostgreSQL {}:{}/{}: {}",
                    config.host, config.port, config.database, e
                ))
            })?;

        debug!(
            "Connected to PostgreSQL {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self::from_pool(pool, config.schema.clone()))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// The schema tables are resolved in.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

#[async_trait]
impl RowSource for PostgresSource {
    fn source_type(&self) -> &'static str {
        "postgres"
    }

    async fn list_base_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(BASE_TABLES_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Discovery(format!("schema '{}': {}", self.schema, e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| Error::Discovery(format!("reading table name: {}", e)))
            })
            .collect()
    }

    async fn open_cursor(&self, table: &str) -> Result<Box<dyn RowStream>> {
        let sql = full_scan_sql(&self.schema, table).map_err(|e| Error::query(table, e))?;
        debug!("Opening cursor: {}", sql);

        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let producer = tokio::spawn(read_rows(self.pool.clone(), sql, table.to_string(), tx));
        let mut stream = PgRowStream::new(table, rx, producer);

        // The first message tells a failed query apart from an empty table.
        let first = stream.rx.recv().await;
        match first {
            Some(Err(e @ Error::Query { .. })) => return Err(e),
            Some(first) => stream.first = Some(first),
            None => stream.finish().await?,
        }

        Ok(Box::new(stream))
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed PostgreSQL pool");
    }
}

/// Consumer half of a table scan.
struct PgRowStream {
    table: String,
    rx: mpsc::Receiver<Result<SourceRow>>,
    producer: Option<JoinHandle<()>>,
    first: Option<Result<SourceRow>>,
    exhausted: bool,
    rows_read: u64,
}

impl PgRowStream {
    fn new(
        table: &str,
        rx: mpsc::Receiver<Result<SourceRow>>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            table: table.to_string(),
            rx,
            producer: Some(producer),
            first: None,
            exhausted: false,
            rows_read: 0,
        }
    }

    /// Marks the stream exhausted, surfacing a crashed reader task as a
    /// scan error on the row after the last one delivered.
    async fn finish(&mut self) -> Result<()> {
        self.exhausted = true;
        match self.producer.take() {
            Some(handle) => handle.await.map_err(|e| {
                Error::scan(
                    &self.table,
                    self.rows_read + 1,
                    format!("row reader task failed: {}", e),
                )
            }),
            None => Ok(()),
        }
    }

    fn delivered(&mut self, row: SourceRow) -> Option<SourceRow> {
        self.rows_read += 1;
        Some(row)
    }
}

#[async_trait]
impl RowStream for PgRowStream {
    async fn next_row(&mut self) -> Result<Option<SourceRow>> {
        if let Some(first) = self.first.take() {
            if first.is_err() {
                self.exhausted = true;
            }
            return first.map(|row| self.delivered(row));
        }
        if self.exhausted {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(Ok(row)) => Ok(self.delivered(row)),
            Some(Err(e)) => {
                self.exhausted = true;
                Err(e)
            }
            None => self.finish().await.map(|()| None),
        }
    }
}

impl Drop for PgRowStream {
    fn drop(&mut self) {
        if let Some(handle) = &self.producer {
            handle.abort();
        }
    }
}

/// Drives the scan and sends each decoded row, stopping at the first error
/// or when the consumer goes away.
async fn read_rows(
    pool: PgPool,
    sql: String,
    table: String,
    tx: mpsc::Sender<Result<SourceRow>>,
) {
    let mut rows = sqlx::query(&sql).fetch(&pool);
    let mut shape: Option<(Arc<[ColumnDescriptor]>, Vec<ColumnKind>)> = None;
    let mut row_number: u64 = 0;

    loop {
        let item = match rows.try_next().await {
            Ok(Some(row)) => {
                row_number += 1;
                let (columns, kinds) = &*shape.get_or_insert_with(|| describe(&row));
                decode_row(&row, columns, kinds)
                    .map(|values| SourceRow {
                        columns: Arc::clone(columns),
                        values,
                    })
                    .map_err(|reason| Error::scan(&table, row_number, reason))
            }
            Ok(None) => break,
            Err(e) if row_number == 0 => Err(Error::query(&table, e)),
            Err(e) => Err(Error::scan(&table, row_number + 1, e)),
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

fn describe(row: &PgRow) -> (Arc<[ColumnDescriptor]>, Vec<ColumnKind>) {
    let columns: Vec<ColumnDescriptor> = row
        .columns()
        .iter()
        .map(|c| ColumnDescriptor::new(c.name(), c.ordinal(), c.type_info().name()))
        .collect();
    let kinds = row
        .columns()
        .iter()
        .map(|c| ColumnKind::for_type(c.type_info()))
        .collect();
    (columns.into(), kinds)
}

fn decode_row(
    row: &PgRow,
    columns: &[ColumnDescriptor],
    kinds: &[ColumnKind],
) -> std::result::Result<Vec<RawValue>, String> {
    columns
        .iter()
        .zip(kinds)
        .map(|(column, kind)| {
            decode_value(row, column, *kind).map_err(|e| match e {
                DecodeError::Malformed(reason) => format!(
                    "column '{}' ({}): {}",
                    column.name, column.type_name, reason
                ),
                DecodeError::Driver(e) => format!("column '{}': {}", column.name, e),
            })
        })
        .collect()
}

enum DecodeError {
    Malformed(String),
    Driver(sqlx::Error),
}

impl From<sqlx::Error> for DecodeError {
    fn from(e: sqlx::Error) -> Self {
        Self::Driver(e)
    }
}

impl From<String> for DecodeError {
    fn from(reason: String) -> Self {
        Self::Malformed(reason)
    }
}

fn array<T: Into<RawValue>>(items: Option<Vec<Option<T>>>) -> RawValue {
    items.map_or(RawValue::Null, |items| {
        RawValue::Array(items.into_iter().map(RawValue::from).collect())
    })
}

/// Infinite timestamps and dates are kept as PostgreSQL spells them.
fn temporal<T>(value: Temporal<T>, finite: impl FnOnce(T) -> RawValue) -> RawValue {
    match value {
        Temporal::Finite(v) => finite(v),
        Temporal::Infinity => RawValue::Text("infinity".to_string()),
        Temporal::NegativeInfinity => RawValue::Text("-infinity".to_string()),
    }
}

/// Borrows a column's wire bytes, or `None` for SQL NULL.
fn raw_bytes(row: &PgRow, index: usize) -> std::result::Result<Option<&[u8]>, DecodeError> {
    let value = row.try_get_raw(index)?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_bytes()
        .map(Some)
        .map_err(|e| DecodeError::Malformed(e.to_string()))
}

fn raw(row: &PgRow, column: &ColumnDescriptor) -> std::result::Result<RawValue, DecodeError> {
    Ok(
        raw_bytes(row, column.ordinal)?.map_or(RawValue::Null, |bytes| RawValue::Other {
            type_name: column.type_name.clone(),
            bytes: bytes.to_vec(),
        }),
    )
}

/// Decodes a one-dimensional array. Multi-dimensional values, which share
/// the array's type name, fall back to wire bytes.
fn array_or_raw<T>(
    row: &PgRow,
    column: &ColumnDescriptor,
) -> std::result::Result<RawValue, DecodeError>
where
    T: Into<RawValue>,
    Vec<Option<T>>: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    match row.try_get::<Option<Vec<Option<T>>>, _>(column.ordinal) {
        Ok(items) => Ok(array(items)),
        Err(sqlx::Error::ColumnDecode { .. }) => raw(row, column),
        Err(e) => Err(e.into()),
    }
}

fn decode_value(
    row: &PgRow,
    column: &ColumnDescriptor,
    kind: ColumnKind,
) -> std::result::Result<RawValue, DecodeError> {
    use chrono::NaiveTime;
    use sqlx::postgres::types::Oid;

    let index = column.ordinal;
    let value = match kind {
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(index)?.into(),
        ColumnKind::Int16 => row.try_get::<Option<i16>, _>(index)?.into(),
        ColumnKind::Int32 => row.try_get::<Option<i32>, _>(index)?.into(),
        ColumnKind::Int64 => row.try_get::<Option<i64>, _>(index)?.into(),
        ColumnKind::Oid => row
            .try_get::<Option<Oid>, _>(index)?
            .map(|oid| i64::from(oid.0))
            .into(),
        ColumnKind::Float32 => row.try_get::<Option<f32>, _>(index)?.into(),
        ColumnKind::Float64 => row.try_get::<Option<f64>, _>(index)?.into(),
        ColumnKind::Numeric => match raw_bytes(row, index)? {
            Some(bytes) => RawValue::Numeric(pg_binary::decode_numeric(bytes)?),
            None => RawValue::Null,
        },
        ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.into(),
        ColumnKind::Char => row
            .try_get::<Option<i8>, _>(index)?
            .map(|c| char::from(c as u8).to_string())
            .into(),
        ColumnKind::TextLike => row.try_get_unchecked::<Option<String>, _>(index)?.into(),
        ColumnKind::Bytes => row.try_get::<Option<Vec<u8>>, _>(index)?.into(),
        ColumnKind::Uuid => row.try_get::<Option<uuid::Uuid>, _>(index)?.into(),
        ColumnKind::Timestamp => match raw_bytes(row, index)? {
            Some(bytes) => temporal(pg_binary::decode_timestamp(bytes)?, |at| {
                RawValue::Timestamp(at.naive_utc())
            }),
            None => RawValue::Null,
        },
        ColumnKind::TimestampTz => match raw_bytes(row, index)? {
            Some(bytes) => temporal(pg_binary::decode_timestamp(bytes)?, RawValue::TimestampTz),
            None => RawValue::Null,
        },
        ColumnKind::Date => match raw_bytes(row, index)? {
            Some(bytes) => temporal(pg_binary::decode_date(bytes)?, RawValue::Date),
            None => RawValue::Null,
        },
        ColumnKind::Time => row.try_get::<Option<NaiveTime>, _>(index)?.into(),
        ColumnKind::Json => row.try_get::<Option<serde_json::Value>, _>(index)?.into(),
        ColumnKind::BoolArray => array_or_raw::<bool>(row, column)?,
        ColumnKind::Int16Array => array_or_raw::<i16>(row, column)?,
        ColumnKind::Int32Array => array_or_raw::<i32>(row, column)?,
        ColumnKind::Int64Array => array_or_raw::<i64>(row, column)?,
        ColumnKind::Float32Array => array_or_raw::<f32>(row, column)?,
        ColumnKind::Float64Array => array_or_raw::<f64>(row, column)?,
        ColumnKind::TextArray => array_or_raw::<String>(row, column)?,
        ColumnKind::UuidArray => array_or_raw::<uuid::Uuid>(row, column)?,
        ColumnKind::Raw => raw(row, column)?,
    };
    Ok(value)
}

#[cfg(test)]
#[path = "postgres_tests.rs"]
mod tests;
