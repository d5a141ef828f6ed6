//! # pgmongo-migrate
//!
//! `pgmongo-migrate` is a CLI tool and library that copies PostgreSQL tables
//! into MongoDB collections. Every row becomes one schema-less document whose
//! keys are the column names; each table lands in the collection of the same
//! name.
//!
//! ## Value mapping
//!
//! | PostgreSQL | BSON |
//! |------------|------|
//! | `bool` | Boolean |
//! | `int2`, `int4` | Int32 |
//! | `int8` | Int64 |
//! | `float4`, `float8` | Double |
//! | `numeric` | String (exact digits, `NaN`, `Infinity`) |
//! | `text`, `varchar`, `"char"`, enums | String |
//! | `bytea` | Binary |
//! | `uuid` | Binary (UUID subtype) |
//! | `timestamp`, `timestamptz`, `date` | Date (`infinity` as String) |
//! | `time` | String (`HH:MM:SS[.ffffff]`) |
//! | `json`, `jsonb` | Embedded document / value |
//! | one-dimensional arrays | Array |
//! | anything else | `{ type, bytes }` with the binary wire value |
//! | `NULL` | Null (the key is kept) |
//!
//! ## Quick Start
//!
//! ```bash
//! pgmongo-migrate init --output config.yml
//! pgmongo-migrate --config config.yml
//!
//! # Dry run (read everything, write nothing)
//! pgmongo-migrate --config config.yml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! postgres:
//!   host: localhost
//!   database: app
//!   user: app
//!   tables: [users, orders]
//!
//! mongodb:
//!   uri: mongodb://localhost:27017
//!   database: app_export
//!
//! options:
//!   workers: 2
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod discovery;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod value;

pub use config::{MigrationConfig, MigrationOptions};
pub use connectors::{DocumentSink, RowSource, RowStream, SourceRow};
pub use discovery::{resolve_tables, TableSelection};
pub use document::Document;
pub use error::{Error, Result};
pub use pipeline::{MigrationReport, Pipeline, TableState, TransferOutcome, TransferResult};
pub use value::{ColumnDescriptor, RawValue};
