use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::backend::{ColumnMeta, Cursor};
use crate::convert::{ConvertError, Converter, ConverterRegistry, OutputType, Value};
use crate::error::HanaframeError;

/// Initial column capacity; the real row count is unknown until the cursor ends.
const MAX_PREALLOCATED_ROWS: usize = 4096;

/// Hard cap on materialized rows. Always a concrete positive number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimit(NonZeroUsize);

impl RowLimit {
    /// `None` for zero.
    pub fn new(limit: usize) -> Option<Self> {
        NonZeroUsize::new(limit).map(Self)
    }

    /// A per-request override wins unless it is missing or zero.
    pub fn resolve(requested: Option<usize>, default: RowLimit) -> RowLimit {
        requested.and_then(RowLimit::new).unwrap_or(default)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl From<NonZeroUsize> for RowLimit {
    fn from(limit: NonZeroUsize) -> Self {
        Self(limit)
    }
}

/// Caller-supplied reasons to stop early: a cancellation token and/or a deadline.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl Interrupt {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    pub fn check(&self) -> Result<(), HanaframeError> {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(HanaframeError::Cancelled);
        }
        if let Some((deadline, timeout)) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(HanaframeError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        Ok(())
    }

    /// Whole seconds left before the deadline, for drivers that take a statement timeout.
    pub fn remaining_secs(&self) -> Option<u64> {
        self.deadline.map(|(deadline, _)| {
            deadline
                .saturating_duration_since(Instant::now())
                .as_secs()
                .max(1)
        })
    }
}

/// Values of one column, stored by output type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float64(Vec<Option<f64>>),
    Int64(Vec<Option<i64>>),
    Timestamp(Vec<Option<DateTime<Utc>>>),
    String(Vec<Option<String>>),
}

impl ColumnData {
    pub fn with_capacity(output_type: OutputType, capacity: usize) -> Self {
        match output_type {
            OutputType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            OutputType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            OutputType::Timestamp => ColumnData::Timestamp(Vec::with_capacity(capacity)),
            OutputType::String => ColumnData::String(Vec::with_capacity(capacity)),
        }
    }

    pub fn output_type(&self) -> OutputType {
        match self {
            ColumnData::Float64(_) => OutputType::Float64,
            ColumnData::Int64(_) => OutputType::Int64,
            ColumnData::Timestamp(_) => OutputType::Timestamp,
            ColumnData::String(_) => OutputType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float64(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`. `None` for both an absent value and an out-of-range row.
    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Float64(v) => v.get(row).copied().flatten().map(Value::Float64),
            ColumnData::Int64(v) => v.get(row).copied().flatten().map(Value::Int64),
            ColumnData::Timestamp(v) => v.get(row).copied().flatten().map(Value::Timestamp),
            ColumnData::String(v) => v.get(row).cloned().flatten().map(Value::String),
        }
    }

    fn push(&mut self, value: Option<Value>) -> Result<(), ConvertError> {
        match (self, value) {
            (ColumnData::Float64(v), None) => v.push(None),
            (ColumnData::Int64(v), None) => v.push(None),
            (ColumnData::Timestamp(v), None) => v.push(None),
            (ColumnData::String(v), None) => v.push(None),
            (ColumnData::Float64(v), Some(Value::Float64(x))) => v.push(Some(x)),
            (ColumnData::Int64(v), Some(Value::Int64(x))) => v.push(Some(x)),
            (ColumnData::Timestamp(v), Some(Value::Timestamp(x))) => v.push(Some(x)),
            (ColumnData::String(v), Some(Value::String(x))) => v.push(Some(x)),
            (data, Some(other)) => {
                return Err(ConvertError(format!(
                    "converter produced {:?} for a {:?} column",
                    other.output_type(),
                    data.output_type()
                )));
            }
        }
        Ok(())
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub data: ColumnData,
}

/// Column-oriented query result. All columns have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl ResultTable {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Drain `cursor` into a typed table of at most `limit` rows.
///
/// Reaching the limit is not an error. Any scan or conversion failure, and any
/// interrupt, drops everything collected so far.
pub fn materialize(
    cursor: &mut dyn Cursor,
    registry: &ConverterRegistry,
    limit: RowLimit,
    interrupt: &Interrupt,
) -> Result<ResultTable, HanaframeError> {
    let metas: Vec<ColumnMeta> = cursor.columns().to_vec();
    let converters: Vec<&Converter> = metas
        .iter()
        .map(|m| registry.resolve(&m.type_name))
        .collect();

    let capacity = limit.get().min(MAX_PREALLOCATED_ROWS);
    let mut data: Vec<ColumnData> = converters
        .iter()
        .map(|c| ColumnData::with_capacity(c.output_type, capacity))
        .collect();

    let mut row_count = 0;
    while row_count < limit.get() {
        interrupt.check()?;
        let Some(row) = cursor.next_row()? else {
            break;
        };
        if row.len() != metas.len() {
            return Err(HanaframeError::Query {
                message: format!(
                    "row {row_count} has {} values, expected {}",
                    row.len(),
                    metas.len()
                ),
            });
        }

        for (idx, raw) in row.iter().enumerate() {
            let meta = &metas[idx];
            converters[idx]
                .convert(raw)
                .and_then(|value| data[idx].push(value))
                .map_err(|e| HanaframeError::Conversion {
                    column: meta.name.clone(),
                    type_name: meta.type_name.clone(),
                    row: row_count,
                    message: e.0,
                })?;
        }
        row_count += 1;
    }

    tracing::debug!(
        rows = row_count,
        columns = metas.len(),
        limit = limit.get(),
        "materialized result"
    );

    let columns = metas
        .into_iter()
        .zip(data)
        .map(|(meta, data)| Column {
            name: meta.name,
            type_name: meta.type_name,
            data,
        })
        .collect();

    Ok(ResultTable { columns, row_count })
}
