//! MongoDB document sink.
//!
//! Each source table maps to the collection of the same name. Documents are
//! inserted one at a time with `insert_one`: re-running a migration adds a
//! second copy of every row rather than replacing the first.

use async_trait::async_trait;
use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson};
use chrono::Timelike;
use tracing::debug;

use crate::config::{validate_mongo_uri, MongoConfig};
use crate::connectors::DocumentSink;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::RawValue;

/// MongoDB destination bound to one database.
pub struct MongoSink {
    client: ::mongodb::Client,
    database: ::mongodb::Database,
}

impl MongoSink {
    /// Connects and pings the deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationConnection`] if the URI is rejected or
    /// the server does not answer the ping.
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        validate_mongo_uri(&config.uri)?;

        let client = ::mongodb::Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| Error::DestinationConnection(format!("MongoDB client: {}", e)))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::DestinationConnection(format!("MongoDB ping failed: {}", e)))?;

        debug!("Connected to MongoDB, target database {}", config.database);
        Ok(Self {
            database: client.database(&config.database),
            client,
        })
    }

    /// Name of the target database.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Counts the documents of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationConnection`] if the count fails.
    pub async fn count(&self, collection: &str) -> Result<u64> {
        self.database
            .collection::<bson::Document>(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| Error::DestinationConnection(format!("counting {}: {}", collection, e)))
    }
}

/// Binary subtype tagging the wire bytes of a PostgreSQL type without a
/// native mapping.
pub const PG_WIRE_SUBTYPE: u8 = 0x80;

#[async_trait]
impl DocumentSink for MongoSink {
    fn sink_type(&self) -> &'static str {
        "mongodb"
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let document = to_bson_document(document).map_err(|e| Error::write(collection, e))?;

        self.database
            .collection::<bson::Document>(collection)
            .insert_one(document)
            .await
            .map_err(|e| Error::write(collection, e))?;
        Ok(())
    }

    /// Waits for in-flight operations, then closes the client.
    async fn close(&self) {
        self.client.clone().shutdown().await;
        debug!("Closed MongoDB client");
    }
}

/// Converts a row document to BSON, keeping key order.
///
/// # Errors
///
/// Returns a message naming the field whose value BSON cannot represent.
pub fn to_bson_document(document: Document) -> std::result::Result<bson::Document, String> {
    let mut out = bson::Document::new();
    for (key, value) in document {
        let value = raw_value_to_bson(value).map_err(|e| format!("field '{}': {}", key, e))?;
        out.insert(key, value);
    }
    Ok(out)
}

/// Converts one value to its closest native BSON type.
///
/// Timestamps lose sub-millisecond precision, the resolution of BSON dates.
/// Decimals and times of day have no exact BSON counterpart and are stored
/// as their canonical text. Types without a mapping become
/// `{ type, bytes }` with the wire bytes under subtype [`PG_WIRE_SUBTYPE`].
pub fn raw_value_to_bson(value: RawValue) -> std::result::Result<Bson, String> {
    let bson = match value {
        RawValue::Null => Bson::Null,
        RawValue::Bool(v) => Bson::Boolean(v),
        RawValue::Int16(v) => Bson::Int32(i32::from(v)),
        RawValue::Int32(v) => Bson::Int32(v),
        RawValue::Int64(v) => Bson::Int64(v),
        RawValue::Float32(v) => Bson::Double(f64::from(v)),
        RawValue::Float64(v) => Bson::Double(v),
        RawValue::Numeric(v) => Bson::String(v),
        RawValue::Text(v) => Bson::String(v),
        RawValue::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes,
        }),
        RawValue::Uuid(v) => Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: v.as_bytes().to_vec(),
        }),
        RawValue::Timestamp(v) => {
            Bson::DateTime(bson::DateTime::from_millis(v.and_utc().timestamp_millis()))
        }
        RawValue::TimestampTz(v) => Bson::DateTime(bson::DateTime::from_millis(v.timestamp_millis())),
        RawValue::Date(v) => {
            let midnight = v
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| format!("date {} has no midnight", v))?;
            Bson::DateTime(bson::DateTime::from_millis(midnight.and_utc().timestamp_millis()))
        }
        RawValue::Time(v) if v.nanosecond() == 0 => Bson::String(v.format("%H:%M:%S").to_string()),
        RawValue::Time(v) => Bson::String(v.format("%H:%M:%S%.6f").to_string()),
        RawValue::Json(v) => bson::to_bson(&v).map_err(|e| e.to_string())?,
        RawValue::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(raw_value_to_bson)
                .collect::<std::result::Result<Vec<_>, _>>()?,
        ),
        RawValue::Other { type_name, bytes } => Bson::Document(doc! {
            "type": type_name,
            "bytes": Binary {
                subtype: BinarySubtype::UserDefined(PG_WIRE_SUBTYPE),
                bytes,
            },
        }),
    };
    Ok(bson)
}

#[cfg(test)]
#[path = "mongodb_tests.rs"]
mod tests;
