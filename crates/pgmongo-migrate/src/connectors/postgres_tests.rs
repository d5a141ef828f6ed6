//! Tests for the PostgreSQL row source.

use super::*;

#[test]
fn test_quote_identifier_plain() {
    assert_eq!(quote_identifier("users").unwrap(), "\"users\"");
}

#[test]
fn test_quote_identifier_keeps_case_and_spaces() {
    assert_eq!(quote_identifier("Order Items").unwrap(), "\"Order Items\"");
}

#[test]
fn test_quote_identifier_escapes_quotes() {
    assert_eq!(
        quote_identifier("evil\"; DROP TABLE x; --").unwrap(),
        "\"evil\"\"; DROP TABLE x; --\""
    );
}

#[test]
fn test_quote_identifier_rejects_invalid() {
    assert!(quote_identifier("").is_err());
    assert!(quote_identifier("bad\0name").is_err());
    assert!(quote_identifier(&"x".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
    assert!(quote_identifier(&"x".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
}

#[test]
fn test_full_scan_sql() {
    assert_eq!(
        full_scan_sql("public", "users").unwrap(),
        "SELECT * FROM \"public\".\"users\""
    );
}

#[test]
fn test_full_scan_sql_quotes_names_exactly() {
    // No case folding and no schema splitting: both stay one identifier.
    assert_eq!(
        full_scan_sql("public", "Users").unwrap(),
        "SELECT * FROM \"public\".\"Users\""
    );
    assert_eq!(
        full_scan_sql("public", "sales.orders").unwrap(),
        "SELECT * FROM \"public\".\"sales.orders\""
    );
}

#[test]
fn test_full_scan_sql_rejects_bad_table() {
    assert!(full_scan_sql("public", "").is_err());
}

#[test]
fn test_column_kind_scalars() {
    assert_eq!(ColumnKind::from_type_name("BOOL"), ColumnKind::Bool);
    assert_eq!(ColumnKind::from_type_name("INT2"), ColumnKind::Int16);
    assert_eq!(ColumnKind::from_type_name("INT4"), ColumnKind::Int32);
    assert_eq!(ColumnKind::from_type_name("INT8"), ColumnKind::Int64);
    assert_eq!(ColumnKind::from_type_name("FLOAT8"), ColumnKind::Float64);
    assert_eq!(ColumnKind::from_type_name("NUMERIC"), ColumnKind::Numeric);
    assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), ColumnKind::TimestampTz);
    assert_eq!(ColumnKind::from_type_name("JSONB"), ColumnKind::Json);
    assert_eq!(ColumnKind::from_type_name("BYTEA"), ColumnKind::Bytes);
}

#[test]
fn test_column_kind_character_types() {
    for name in ["TEXT", "VARCHAR", "CHAR", "BPCHAR", "NAME"] {
        assert_eq!(ColumnKind::from_type_name(name), ColumnKind::Text, "{name}");
    }
    assert_eq!(ColumnKind::from_type_name("citext"), ColumnKind::TextLike);
    assert_eq!(ColumnKind::from_type_name("\"CHAR\""), ColumnKind::Char);
}

#[test]
fn test_column_kind_arrays() {
    assert_eq!(ColumnKind::from_type_name("INT4[]"), ColumnKind::Int32Array);
    assert_eq!(ColumnKind::from_type_name("VARCHAR[]"), ColumnKind::TextArray);
    assert_eq!(ColumnKind::from_type_name("UUID[]"), ColumnKind::UuidArray);
}

#[test]
fn test_column_kind_unknown_is_raw() {
    for name in [
        "INTERVAL", "INET", "MONEY", "TIMETZ", "BIT", "XML", "POINT", "TSVECTOR", "JSONB[]",
    ] {
        assert_eq!(ColumnKind::from_type_name(name), ColumnKind::Raw, "{name}");
    }
}

#[test]
fn test_array_helper_keeps_null_elements() {
    let value = array(Some(vec![Some(1_i32), None, Some(3)]));
    assert_eq!(
        value,
        RawValue::Array(vec![RawValue::Int32(1), RawValue::Null, RawValue::Int32(3)])
    );
}

#[test]
fn test_array_helper_null_column() {
    assert_eq!(array::<i64>(None), RawValue::Null);
}

#[test]
fn test_array_helper_empty_array_is_not_null() {
    assert_eq!(array::<String>(Some(vec![])), RawValue::Array(vec![]));
}

fn one_row(id: i32) -> Result<SourceRow> {
    Ok(SourceRow {
        columns: Arc::from(vec![ColumnDescriptor::new("id", 0, "INT4")]),
        values: vec![RawValue::Int32(id)],
    })
}

#[tokio::test]
async fn test_row_stream_delivers_then_ends() {
    // Arrange
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
    let producer = tokio::spawn(async move {
        for id in 1..=2 {
            if tx.send(one_row(id)).await.is_err() {
                return;
            }
        }
    });
    let mut stream = PgRowStream::new("users", rx, producer);

    // Act
    let first = stream.next_row().await.unwrap();
    let second = stream.next_row().await.unwrap();
    let end = stream.next_row().await.unwrap();

    // Assert
    assert_eq!(first.unwrap().values, vec![RawValue::Int32(1)]);
    assert_eq!(second.unwrap().values, vec![RawValue::Int32(2)]);
    assert!(end.is_none());
    assert!(stream.next_row().await.unwrap().is_none());
}

#[tokio::test]
async fn test_crashed_reader_reports_row_after_last_delivered() {
    // Arrange
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
    let producer = tokio::spawn(async move {
        for id in 1..=2 {
            if tx.send(one_row(id)).await.is_err() {
                return;
            }
        }
        panic!("timestamp out of range");
    });
    let mut stream = PgRowStream::new("events", rx, producer);

    // Act
    assert!(stream.next_row().await.unwrap().is_some());
    assert!(stream.next_row().await.unwrap().is_some());
    let err = stream.next_row().await.unwrap_err();

    // Assert
    match err {
        Error::Scan { table, row, reason } => {
            assert_eq!(table, "events");
            assert_eq!(row, 3);
            assert!(reason.contains("row reader task failed"), "{reason}");
        }
        other => panic!("expected scan error, got {other:?}"),
    }
}
