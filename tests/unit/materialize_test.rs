use std::time::Duration;

use chrono::{TimeZone, Utc};
use hanaframe::backend::{ColumnMeta, RawValue};
use hanaframe::convert::{ConverterRegistry, OutputType, Value};
use hanaframe::error::HanaframeError;
use hanaframe::materialize::{ColumnData, Interrupt, RowLimit, materialize};
use num_bigint::BigInt;
use num_rational::BigRational;
use tokio_util::sync::CancellationToken;

use crate::support::{FakeCursor, numbered_cursor};

fn limit(n: usize) -> RowLimit {
    RowLimit::new(n).unwrap()
}

// --- Row limit ---

#[test]
fn stops_at_limit_without_error() {
    let mut cursor = numbered_cursor(150);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(100),
        &Interrupt::none(),
    )
    .unwrap();

    assert_eq!(table.row_count(), 100);
    for column in table.columns() {
        assert_eq!(column.data.len(), 100, "column {}", column.name);
    }
    assert_eq!(cursor.position(), 100, "must not read past the limit");
}

#[test]
fn short_cursor_gives_short_table() {
    let mut cursor = numbered_cursor(7);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(100),
        &Interrupt::none(),
    )
    .unwrap();
    assert_eq!(table.row_count(), 7);
}

#[test]
fn empty_cursor_keeps_columns() {
    let mut cursor = numbered_cursor(0);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::none(),
    )
    .unwrap();
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.columns().len(), 3);
    assert!(table.columns().iter().all(|c| c.data.is_empty()));
}

#[test]
fn row_limit_resolution() {
    let default = limit(500);
    assert_eq!(RowLimit::resolve(None, default), default);
    assert_eq!(RowLimit::resolve(Some(0), default), default);
    assert_eq!(RowLimit::resolve(Some(20), default).get(), 20);
    assert!(RowLimit::new(0).is_none());
}

// --- Typing ---

#[test]
fn columns_take_converter_output_types() {
    let mut cursor = numbered_cursor(3);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::none(),
    )
    .unwrap();

    let id = table.column("id").unwrap();
    assert_eq!(id.data.output_type(), OutputType::Int64);
    assert_eq!(id.data, ColumnData::Int64(vec![Some(0), Some(1), Some(2)]));

    let ts = table.column("ts").unwrap();
    assert_eq!(ts.type_name, "TIMESTAMP");
    assert_eq!(
        ts.data.get(2),
        Some(Value::Timestamp(
            Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 2).unwrap()
        ))
    );

    let label = table.column("label").unwrap();
    assert_eq!(label.data.output_type(), OutputType::String);
    assert_eq!(label.data.get(1), Some(Value::String("row-1".to_string())));
}

#[test]
fn nulls_stay_absent_in_every_column_kind() {
    let columns = vec![
        ColumnMeta::new("f", "DOUBLE"),
        ColumnMeta::new("i", "BIGINT"),
        ColumnMeta::new("t", "DATE"),
        ColumnMeta::new("d", "FIXED16"),
        ColumnMeta::new("s", "NVARCHAR"),
    ];
    let rows = vec![
        vec![RawValue::Null; 5],
        vec![
            RawValue::text("0"),
            RawValue::text("0"),
            RawValue::text("1970-01-01"),
            RawValue::decimal(BigRational::from_integer(BigInt::from(0))),
            RawValue::text(""),
        ],
    ];
    let mut cursor = FakeCursor::new(columns, rows);
    let table = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::none(),
    )
    .unwrap();

    assert_eq!(table.row_count(), 2);
    for column in table.columns() {
        assert_eq!(column.data.get(0), None, "{} row 0 must be absent", column.name);
        assert!(column.data.get(1).is_some(), "{} row 1 must be present", column.name);
    }
    assert_eq!(
        table.column("f").unwrap().data,
        ColumnData::Float64(vec![None, Some(0.0)])
    );
    assert_eq!(
        table.column("s").unwrap().data,
        ColumnData::String(vec![None, Some(String::new())])
    );
}

// --- Failure ---

#[test]
fn scan_error_discards_everything() {
    let mut cursor = numbered_cursor(100).failing_at(50);
    let result = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(1000),
        &Interrupt::none(),
    );
    assert!(result.is_err(), "no partial table may be returned");
    assert!(matches!(result, Err(HanaframeError::Query { .. })));
}

#[test]
fn conversion_error_names_column_and_row() {
    let columns = vec![ColumnMeta::new("v", "DOUBLE")];
    let rows = vec![
        vec![RawValue::text("1.5")],
        vec![RawValue::text("abc")],
        vec![RawValue::text("2.5")],
    ];
    let mut cursor = FakeCursor::new(columns, rows);
    let err = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::none(),
    )
    .unwrap_err();

    match err {
        HanaframeError::Conversion {
            column,
            type_name,
            row,
            message,
        } => {
            assert_eq!(column, "v");
            assert_eq!(type_name, "DOUBLE");
            assert_eq!(row, 1);
            assert!(message.contains("abc"), "Got: {}", message);
        }
        other => panic!("expected a conversion error, got {other:?}"),
    }
}

#[test]
fn ragged_row_is_rejected() {
    let columns = vec![ColumnMeta::new("a", "INT"), ColumnMeta::new("b", "INT")];
    let rows = vec![vec![RawValue::text("1")]];
    let mut cursor = FakeCursor::new(columns, rows);
    let err = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::none(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("expected 2"), "Got: {}", err);
}

// --- Interrupts ---

#[test]
fn cancelled_token_stops_before_first_row() {
    let token = CancellationToken::new();
    token.cancel();
    let mut cursor = numbered_cursor(10);
    let result = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &Interrupt::new(Some(token), None),
    );
    assert!(matches!(result, Err(HanaframeError::Cancelled)));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn cancellation_mid_stream_aborts() {
    let token = CancellationToken::new();
    let mut cursor = numbered_cursor(100).cancelling_at(40, token.clone());
    let result = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(1000),
        &Interrupt::new(Some(token), None),
    );
    assert!(matches!(result, Err(HanaframeError::Cancelled)));
    assert_eq!(cursor.position(), 41);
}

#[test]
fn expired_deadline_is_a_timeout() {
    let interrupt = Interrupt::new(None, Some(Duration::ZERO));
    let mut cursor = numbered_cursor(10);
    let result = materialize(
        &mut cursor,
        &ConverterRegistry::hana(),
        limit(10),
        &interrupt,
    );
    assert!(matches!(result, Err(HanaframeError::Timeout { seconds: 0 })));
}

#[test]
fn remaining_seconds_is_never_zero() {
    assert_eq!(Interrupt::none().remaining_secs(), None);
    let interrupt = Interrupt::new(None, Some(Duration::from_secs(30)));
    let left = interrupt.remaining_secs().unwrap();
    assert!((1..=30).contains(&left), "Got: {}", left);
}
