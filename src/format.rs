use chrono::SecondsFormat;
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::HanaframeError;
use crate::health::HealthStatus;
use crate::materialize::{Column, ColumnData, ResultTable};

/// Columnar JSON view of a result: `{"row_count": n, "columns": [{name, type, values}]}`.
///
/// Absent cells render as `null`. Non-finite floats also render as `null`
/// since JSON has no spelling for them.
pub fn table_to_json(table: &ResultTable) -> JsonValue {
    let columns = table.columns().iter().map(column_to_json).collect();

    let mut map = Map::new();
    map.insert("row_count".to_string(), JsonValue::from(table.row_count()));
    map.insert("columns".to_string(), JsonValue::Array(columns));
    JsonValue::Object(map)
}

fn column_to_json(column: &Column) -> JsonValue {
    let values: Vec<JsonValue> = match &column.data {
        ColumnData::Float64(v) => v
            .iter()
            .map(|x| {
                x.and_then(Number::from_f64)
                    .map_or(JsonValue::Null, JsonValue::Number)
            })
            .collect(),
        ColumnData::Int64(v) => v
            .iter()
            .map(|x| x.map_or(JsonValue::Null, JsonValue::from))
            .collect(),
        ColumnData::Timestamp(v) => v
            .iter()
            .map(|x| {
                x.map_or(JsonValue::Null, |ts| {
                    JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                })
            })
            .collect(),
        ColumnData::String(v) => v
            .iter()
            .map(|x| x.clone().map_or(JsonValue::Null, JsonValue::String))
            .collect(),
    };

    let mut map = Map::new();
    map.insert("name".to_string(), JsonValue::String(column.name.clone()));
    map.insert("source_type".to_string(), JsonValue::String(column.type_name.clone()));
    map.insert(
        "type".to_string(),
        JsonValue::String(column.data.output_type().as_str().to_string()),
    );
    map.insert("values".to_string(), JsonValue::Array(values));
    JsonValue::Object(map)
}

/// Pretty-printed JSON for a result table.
pub fn to_json(table: &ResultTable) -> Result<String, HanaframeError> {
    serde_json::to_string_pretty(&table_to_json(table)).map_err(|e| HanaframeError::Format {
        message: e.to_string(),
    })
}

/// Pretty-printed JSON for a health status.
pub fn health_to_json(status: &HealthStatus) -> Result<String, HanaframeError> {
    serde_json::to_string_pretty(status).map_err(|e| HanaframeError::Format {
        message: e.to_string(),
    })
}
