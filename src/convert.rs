use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_traits::ToPrimitive;
use regex::Regex;
use thiserror::Error;

use crate::backend::RawValue;

/// `YYYY-MM-DD`
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// `YYYY-MM-DD hh:mm:ss`, optional fractional seconds.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// `YYYY-MM-DDThh:mm:ssZ`, optional fractional seconds.
pub const DATE_TIME_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// HANA reports fixed-point columns as `FIXED8`, `FIXED12` or `FIXED16`.
pub const FIXED_POINT_PATTERN: &str = r"^FIXED\d{1,2}$";

/// The closed set of column types a converter can produce. Every column is nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Float64,
    Int64,
    Timestamp,
    String,
}

impl OutputType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputType::Float64 => "float64",
            OutputType::Int64 => "int64",
            OutputType::Timestamp => "timestamp",
            OutputType::String => "string",
        }
    }
}

/// A present, typed cell. Absence is `None` at the `Option<Value>` level.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float64(f64),
    Int64(i64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl Value {
    pub fn output_type(&self) -> OutputType {
        match self {
            Value::Float64(_) => OutputType::Float64,
            Value::Int64(_) => OutputType::Int64,
            Value::Timestamp(_) => OutputType::Timestamp,
            Value::String(_) => OutputType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConvertError(pub String);

pub type ConvertFn = fn(&RawValue) -> Result<Option<Value>, ConvertError>;

/// A pure conversion function together with the output type it guarantees.
#[derive(Debug, Clone, Copy)]
pub struct Converter {
    pub name: &'static str,
    pub output_type: OutputType,
    pub func: ConvertFn,
}

impl Converter {
    pub const fn new(name: &'static str, output_type: OutputType, func: ConvertFn) -> Self {
        Self {
            name,
            output_type,
            func,
        }
    }

    pub fn convert(&self, raw: &RawValue) -> Result<Option<Value>, ConvertError> {
        (self.func)(raw)
    }

    pub fn is_passthrough(&self) -> bool {
        self.name == PASSTHROUGH.name
    }
}

/// Used for every column type nothing else claims.
pub const PASSTHROUGH: Converter =
    Converter::new("passthrough string", OutputType::String, passthrough_string);

/// How a registered converter is selected for a column type name.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    pub fn exact(type_name: impl Into<String>) -> Self {
        Matcher::Exact(type_name.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            Matcher::Exact(name) => name == type_name,
            Matcher::Pattern(re) => re.is_match(type_name),
        }
    }

    fn is_exact(&self) -> bool {
        matches!(self, Matcher::Exact(_))
    }
}

/// Ordered (matcher, converter) registrations.
///
/// Built once at startup and read-only afterwards, so a shared reference can be
/// used from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    entries: Vec<(Matcher, Converter)>,
}

impl ConverterRegistry {
    /// An empty registry. Every column passes through as a string.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Converters for the types SAP HANA reports.
    pub fn hana() -> Self {
        let mut registry = Self::empty();
        for name in ["DOUBLE", "FLOAT", "REAL"] {
            registry.register(
                Matcher::exact(name),
                Converter::new("handle float", OutputType::Float64, parse_float),
            );
        }
        for name in ["BIGINT", "TINYINT", "SMALLINT", "INT", "YEAR"] {
            registry.register(
                Matcher::exact(name),
                Converter::new("handle integer", OutputType::Int64, parse_integer),
            );
        }
        for name in ["DATETIME", "TIMESTAMP", "SECONDDATE"] {
            registry.register(
                Matcher::exact(name),
                Converter::new("handle datetime", OutputType::Timestamp, parse_datetime),
            );
        }
        registry.register(
            Matcher::exact("DATE"),
            Converter::new("handle date", OutputType::Timestamp, parse_date),
        );
        registry.register(
            Matcher::Pattern(fixed_point_regex()),
            Converter::new("handle decimal", OutputType::Float64, rational_to_float),
        );
        registry
    }

    pub fn register(&mut self, matcher: Matcher, converter: Converter) {
        self.entries.push((matcher, converter));
    }

    /// Exact names first, then patterns in registration order, then passthrough.
    pub fn resolve(&self, type_name: &str) -> &Converter {
        self.entries
            .iter()
            .find(|(m, _)| m.is_exact() && m.matches(type_name))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(m, _)| !m.is_exact() && m.matches(type_name))
            })
            .map(|(_, c)| c)
            .unwrap_or(&PASSTHROUGH)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static FIXED_POINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FIXED_POINT_PATTERN).expect("FIXED pattern compiles"));

fn fixed_point_regex() -> Regex {
    FIXED_POINT.clone()
}

fn expect_text<'a>(raw: &'a RawValue, wanted: &str) -> Result<Option<&'a str>, ConvertError> {
    match raw {
        RawValue::Null => Ok(None),
        RawValue::Text(s) => Ok(Some(s.as_str())),
        RawValue::Decimal { .. } => Err(ConvertError(format!(
            "expected {wanted} text, got a decimal value"
        ))),
    }
}

pub fn passthrough_string(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    Ok(match raw {
        RawValue::Null => None,
        RawValue::Text(s) => Some(Value::String(s.clone())),
        RawValue::Decimal { text, .. } => Some(Value::String(text.clone())),
    })
}

pub fn parse_float(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    if let RawValue::Decimal { .. } = raw {
        return rational_to_float(raw);
    }
    let Some(s) = expect_text(raw, "float")? else {
        return Ok(None);
    };
    s.parse::<f64>()
        .map(|v| Some(Value::Float64(v)))
        .map_err(|e| ConvertError(format!("cannot parse {s:?} as float: {e}")))
}

pub fn parse_integer(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    if let RawValue::Decimal { value: r, .. } = raw {
        return match r.is_integer().then(|| r.to_integer().to_i64()).flatten() {
            Some(v) => Ok(Some(Value::Int64(v))),
            None => Err(ConvertError(format!("decimal {r} is not a 64-bit integer"))),
        };
    }
    let Some(s) = expect_text(raw, "integer")? else {
        return Ok(None);
    };
    s.parse::<i64>()
        .map(|v| Some(Value::Int64(v)))
        .map_err(|e| ConvertError(format!("cannot parse {s:?} as integer: {e}")))
}

fn parse_timestamp_text(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT_ISO))
        .ok()
        .map(|dt| dt.and_utc())
}

pub fn parse_datetime(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    let Some(s) = expect_text(raw, "timestamp")? else {
        return Ok(None);
    };
    parse_timestamp_text(s)
        .map(|ts| Some(Value::Timestamp(ts)))
        .ok_or_else(|| ConvertError(format!("cannot parse {s:?} as timestamp")))
}

pub fn parse_date(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    let Some(s) = expect_text(raw, "date")? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .or_else(|| parse_timestamp_text(s))
        .map(|ts| Some(Value::Timestamp(ts)))
        .ok_or_else(|| ConvertError(format!("cannot parse {s:?} as date")))
}

/// Float conversion goes through the rational itself, never through a decimal string.
pub fn rational_to_float(raw: &RawValue) -> Result<Option<Value>, ConvertError> {
    match raw {
        RawValue::Null => Ok(None),
        RawValue::Decimal { value: r, .. } => r
            .to_f64()
            .map(|v| Some(Value::Float64(v)))
            .ok_or_else(|| ConvertError(format!("decimal {r} is out of float range"))),
        RawValue::Text(_) => Err(ConvertError(
            "value is not a decimal: the connection supplier must deliver a rational".to_string(),
        )),
    }
}
