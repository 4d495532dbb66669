/// Conversion from Arrow record batches to GraphQL values

use super::ResultRow;
use crate::error::{RelqlError, Result};

use async_graphql::Value;
use chrono::{DateTime, NaiveDate, Utc};
use datafusion::arrow::array::*;
use datafusion::arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;

/// Convert every row of a batch, keyed by column name
pub fn batch_rows(batch: &RecordBatch) -> Result<Vec<ResultRow>> {
    let schema = batch.schema();
    let mut rows = Vec::with_capacity(batch.num_rows());

    for row_idx in 0..batch.num_rows() {
        let mut row = ResultRow::with_capacity(schema.fields().len());
        for (col_idx, field) in schema.fields().iter().enumerate() {
            let value = cell_value(batch.column(col_idx), row_idx, field.name())?;
            row.insert(field.name().to_string(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

fn downcast<'a, T: 'static>(column: &'a ArrayRef, name: &str) -> Result<&'a T> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        RelqlError::Serialization(format!(
            "Column '{}' does not hold {:?} values",
            name,
            column.data_type()
        ))
    })
}

fn float(value: f64) -> Result<Value> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| RelqlError::Serialization(format!("Invalid float value {}", value)))
}

/// Convert one cell to a GraphQL value
pub fn cell_value(column: &ArrayRef, row_idx: usize, name: &str) -> Result<Value> {
    if column.is_null(row_idx) {
        return Ok(Value::Null);
    }

    let value = match column.data_type() {
        ArrowDataType::Int8 => Value::from(downcast::<Int8Array>(column, name)?.value(row_idx)),
        ArrowDataType::Int16 => Value::from(downcast::<Int16Array>(column, name)?.value(row_idx)),
        ArrowDataType::Int32 => Value::from(downcast::<Int32Array>(column, name)?.value(row_idx)),
        ArrowDataType::Int64 => Value::from(downcast::<Int64Array>(column, name)?.value(row_idx)),
        ArrowDataType::UInt8 => Value::from(downcast::<UInt8Array>(column, name)?.value(row_idx)),
        ArrowDataType::UInt16 => Value::from(downcast::<UInt16Array>(column, name)?.value(row_idx)),
        ArrowDataType::UInt32 => Value::from(downcast::<UInt32Array>(column, name)?.value(row_idx)),
        ArrowDataType::UInt64 => {
            let value = downcast::<UInt64Array>(column, name)?.value(row_idx);
            // JSON numbers past i64 lose precision in most clients
            if value <= i64::MAX as u64 {
                Value::from(value)
            } else {
                Value::String(value.to_string())
            }
        }
        ArrowDataType::Float32 => float(downcast::<Float32Array>(column, name)?.value(row_idx) as f64)?,
        ArrowDataType::Float64 => float(downcast::<Float64Array>(column, name)?.value(row_idx))?,
        ArrowDataType::Decimal128(_, _) => {
            Value::String(downcast::<Decimal128Array>(column, name)?.value_as_string(row_idx))
        }
        ArrowDataType::Utf8 => {
            Value::String(downcast::<StringArray>(column, name)?.value(row_idx).to_string())
        }
        ArrowDataType::LargeUtf8 => {
            Value::String(downcast::<LargeStringArray>(column, name)?.value(row_idx).to_string())
        }
        ArrowDataType::Boolean => Value::Boolean(downcast::<BooleanArray>(column, name)?.value(row_idx)),
        ArrowDataType::Timestamp(unit, _tz) => {
            let timestamp_ns = match unit {
                TimeUnit::Nanosecond => downcast::<TimestampNanosecondArray>(column, name)?.value(row_idx),
                TimeUnit::Microsecond => {
                    downcast::<TimestampMicrosecondArray>(column, name)?.value(row_idx) * 1_000
                }
                TimeUnit::Millisecond => {
                    downcast::<TimestampMillisecondArray>(column, name)?.value(row_idx) * 1_000_000
                }
                TimeUnit::Second => {
                    downcast::<TimestampSecondArray>(column, name)?.value(row_idx) * 1_000_000_000
                }
            };

            let secs = timestamp_ns.div_euclid(1_000_000_000);
            let nsecs = timestamp_ns.rem_euclid(1_000_000_000) as u32;
            let datetime = DateTime::<Utc>::from_timestamp(secs, nsecs).ok_or_else(|| {
                RelqlError::Serialization(format!("Invalid timestamp: {}", timestamp_ns))
            })?;
            Value::String(datetime.to_rfc3339())
        }
        ArrowDataType::Date32 => {
            let days = downcast::<Date32Array>(column, name)?.value(row_idx);
            Value::String(format_date(chrono::Duration::days(days as i64))?)
        }
        ArrowDataType::Date64 => {
            let millis = downcast::<Date64Array>(column, name)?.value(row_idx);
            Value::String(format_date(chrono::Duration::milliseconds(millis))?)
        }
        _ => {
            tracing::warn!(
                "Unsupported type {:?} for column '{}', returning null",
                column.data_type(),
                name
            );
            Value::Null
        }
    };

    Ok(value)
}

fn format_date(since_epoch: chrono::Duration) -> Result<String> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(since_epoch))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| RelqlError::Serialization(format!("Invalid date offset {}", since_epoch)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
    use std::sync::Arc;

    #[test]
    fn test_batch_rows_basic_types() {
        let schema = Arc::new(ArrowSchema::new(vec![
            ArrowField::new("t0__id", DataType::Int64, false),
            ArrowField::new("t0__name", DataType::Utf8, false),
            ArrowField::new("t0__pages", DataType::Int32, true),
            ArrowField::new("t0__in_print", DataType::Boolean, false),
        ]));

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["Dune", "Emma"])),
                Arc::new(Int32Array::from(vec![Some(412), None])),
                Arc::new(BooleanArray::from(vec![true, false])),
            ],
        )
        .unwrap();

        let rows = batch_rows(&batch).unwrap();
        assert_eq!(rows.len(), 2);
        // Keys stay numeric, unlike string-typed IDs
        assert_eq!(rows[0]["t0__id"], Value::from(1));
        assert_eq!(rows[0]["t0__name"], Value::from("Dune"));
        assert_eq!(rows[0]["t0__pages"], Value::from(412));
        assert_eq!(rows[1]["t0__pages"], Value::Null);
        assert_eq!(rows[1]["t0__in_print"], Value::Boolean(false));
    }

    #[test]
    fn test_batch_rows_numeric_types() {
        let schema = Arc::new(ArrowSchema::new(vec![
            ArrowField::new("int8", DataType::Int8, false),
            ArrowField::new("uint8", DataType::UInt8, false),
            ArrowField::new("float32", DataType::Float32, false),
            ArrowField::new("float64", DataType::Float64, false),
        ]));

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int8Array::from(vec![10i8])),
                Arc::new(UInt8Array::from(vec![255u8])),
                Arc::new(Float32Array::from(vec![3.14f32])),
                Arc::new(Float64Array::from(vec![2.718f64])),
            ],
        )
        .unwrap();

        let row = &batch_rows(&batch).unwrap()[0];
        assert_eq!(row["int8"], Value::from(10));
        assert_eq!(row["uint8"], Value::from(255));
        match &row["float32"] {
            Value::Number(n) => assert!((n.as_f64().unwrap() - 3.14).abs() < 0.01),
            other => panic!("Expected number, got {:?}", other),
        }
        match &row["float64"] {
            Value::Number(n) => assert!((n.as_f64().unwrap() - 2.718).abs() < 0.001),
            other => panic!("Expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_dates_and_decimals() {
        let schema = Arc::new(ArrowSchema::new(vec![
            ArrowField::new("published", DataType::Date32, false),
            ArrowField::new("price", DataType::Decimal128(10, 2), false),
        ]));

        let prices = Decimal128Array::from(vec![1999i128])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Date32Array::from(vec![19_000])), Arc::new(prices)],
        )
        .unwrap();

        let row = &batch_rows(&batch).unwrap()[0];
        assert_eq!(row["published"], Value::from("2022-01-08"));
        assert_eq!(row["price"], Value::from("19.99"));
    }
}
