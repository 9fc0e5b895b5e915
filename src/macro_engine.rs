//! Textual expansion of time-range macros (`$__timeFilter(col)` and friends).
//!
//! Expansion is lexical: the surrounding SQL is never parsed or validated.
//! `$__` names outside the vocabulary are copied through untouched. Expanding an
//! already expanded statement is not guaranteed to be a no-op, so callers expand
//! exactly once per request.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::HanaframeError;

const MACRO_PREFIX: &str = "$__";
const EPOCH: &str = "TO_TIMESTAMP('1970-01-01 00:00:00')";
const TIMESTAMP_LITERAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static INTERVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(ms|s|m|h|d|w)$").expect("interval pattern compiles"));

/// Inclusive query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

/// The recognized macro vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroToken {
    Time,
    TimeEpoch,
    TimeFilter,
    TimeFrom,
    TimeTo,
    TimeGroup,
    TimeGroupAlias,
    UnixEpochFilter,
    UnixEpochFrom,
    UnixEpochTo,
    UnixEpochGroup,
    UnixEpochGroupAlias,
    Interval,
    IntervalMs,
}

impl MacroToken {
    pub const ALL: [MacroToken; 14] = [
        MacroToken::Time,
        MacroToken::TimeEpoch,
        MacroToken::TimeFilter,
        MacroToken::TimeFrom,
        MacroToken::TimeTo,
        MacroToken::TimeGroup,
        MacroToken::TimeGroupAlias,
        MacroToken::UnixEpochFilter,
        MacroToken::UnixEpochFrom,
        MacroToken::UnixEpochTo,
        MacroToken::UnixEpochGroup,
        MacroToken::UnixEpochGroupAlias,
        MacroToken::Interval,
        MacroToken::IntervalMs,
    ];

    /// Name without the `$__` prefix.
    pub fn name(self) -> &'static str {
        match self {
            MacroToken::Time => "time",
            MacroToken::TimeEpoch => "timeEpoch",
            MacroToken::TimeFilter => "timeFilter",
            MacroToken::TimeFrom => "timeFrom",
            MacroToken::TimeTo => "timeTo",
            MacroToken::TimeGroup => "timeGroup",
            MacroToken::TimeGroupAlias => "timeGroupAlias",
            MacroToken::UnixEpochFilter => "unixEpochFilter",
            MacroToken::UnixEpochFrom => "unixEpochFrom",
            MacroToken::UnixEpochTo => "unixEpochTo",
            MacroToken::UnixEpochGroup => "unixEpochGroup",
            MacroToken::UnixEpochGroupAlias => "unixEpochGroupAlias",
            MacroToken::Interval => "interval",
            MacroToken::IntervalMs => "interval_ms",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Number of arguments the macro takes.
    pub fn arity(self) -> usize {
        match self {
            MacroToken::TimeFrom
            | MacroToken::TimeTo
            | MacroToken::UnixEpochFrom
            | MacroToken::UnixEpochTo
            | MacroToken::Interval
            | MacroToken::IntervalMs => 0,
            MacroToken::Time
            | MacroToken::TimeEpoch
            | MacroToken::TimeFilter
            | MacroToken::UnixEpochFilter => 1,
            MacroToken::TimeGroup
            | MacroToken::TimeGroupAlias
            | MacroToken::UnixEpochGroup
            | MacroToken::UnixEpochGroupAlias => 2,
        }
    }
}

/// Backend-specific SQL for each macro.
///
/// The unix-epoch macros operate on integer second columns and have portable
/// defaults; the rest depend on the backend's date functions.
pub trait MacroDialect {
    fn time_column(&self, column: &str) -> String;

    fn time_epoch(&self, column: &str) -> String;

    fn time_filter(&self, column: &str, range: &TimeRange) -> String;

    fn time_from(&self, range: &TimeRange) -> String;

    fn time_to(&self, range: &TimeRange) -> String;

    fn time_group(&self, column: &str, interval: Duration) -> String;

    fn unix_epoch_filter(&self, column: &str, range: &TimeRange) -> String {
        format!(
            "{column} >= {} AND {column} <= {}",
            range.from.timestamp(),
            range.to.timestamp()
        )
    }

    fn unix_epoch_from(&self, range: &TimeRange) -> String {
        range.from.timestamp().to_string()
    }

    fn unix_epoch_to(&self, range: &TimeRange) -> String {
        range.to.timestamp().to_string()
    }

    fn unix_epoch_group(&self, column: &str, interval: Duration) -> String {
        let secs = whole_seconds(interval);
        format!("FLOOR({column} / {secs}) * {secs}")
    }
}

/// SAP HANA SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct HanaDialect;

impl HanaDialect {
    fn timestamp_literal(ts: &DateTime<Utc>) -> String {
        format!("TO_TIMESTAMP('{}')", ts.format(TIMESTAMP_LITERAL_FORMAT))
    }
}

impl MacroDialect for HanaDialect {
    fn time_column(&self, column: &str) -> String {
        format!("{column} AS \"time\"")
    }

    fn time_epoch(&self, column: &str) -> String {
        format!("SECONDS_BETWEEN({EPOCH}, {column}) AS \"time\"")
    }

    fn time_filter(&self, column: &str, range: &TimeRange) -> String {
        format!(
            "{column} BETWEEN {} AND {}",
            Self::timestamp_literal(&range.from),
            Self::timestamp_literal(&range.to)
        )
    }

    fn time_from(&self, range: &TimeRange) -> String {
        Self::timestamp_literal(&range.from)
    }

    fn time_to(&self, range: &TimeRange) -> String {
        Self::timestamp_literal(&range.to)
    }

    fn time_group(&self, column: &str, interval: Duration) -> String {
        let secs = whole_seconds(interval);
        format!(
            "ADD_SECONDS({EPOCH}, FLOOR(SECONDS_BETWEEN({EPOCH}, {column}) / {secs}) * {secs})"
        )
    }
}

fn whole_seconds(interval: Duration) -> u64 {
    interval.as_secs().max(1)
}

/// Rewrite every recognized macro in `sql`.
pub fn expand(
    sql: &str,
    range: &TimeRange,
    interval: Duration,
    dialect: &dyn MacroDialect,
) -> Result<String, HanaframeError> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while let Some(pos) = rest.find(MACRO_PREFIX) {
        out.push_str(&rest[..pos]);
        let after_prefix = &rest[pos + MACRO_PREFIX.len()..];
        let name_len = after_prefix
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after_prefix.len());
        let name = &after_prefix[..name_len];
        let after_name = &after_prefix[name_len..];

        let Some(token) = MacroToken::from_name(name) else {
            out.push_str(MACRO_PREFIX);
            out.push_str(name);
            rest = after_name;
            continue;
        };

        let (args, remaining) = if after_name.starts_with('(') {
            split_arguments(token, after_name)?
        } else {
            (Vec::new(), after_name)
        };

        out.push_str(&render(token, &args, range, interval, dialect)?);
        rest = remaining;
    }
    out.push_str(rest);

    Ok(out)
}

/// Split `(a, b)` at top-level commas. Returns the trimmed arguments and the text
/// after the closing parenthesis. Commas and parentheses inside `'literals'` and
/// `"identifiers"` are ordinary characters.
fn split_arguments(token: MacroToken, input: &str) -> Result<(Vec<String>, &str), HanaframeError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut args = Vec::new();
    let mut current = String::new();

    for (idx, c) in input.char_indices() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                if depth > 1 {
                    current.push(c);
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let last = current.trim();
                    if !last.is_empty() || !args.is_empty() {
                        args.push(last.to_string());
                    }
                    return Ok((args, &input[idx + 1..]));
                }
                current.push(c);
            }
            ',' if depth == 1 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    Err(HanaframeError::Macro {
        message: format!("unterminated argument list for $__{}", token.name()),
    })
}

fn render(
    token: MacroToken,
    args: &[String],
    range: &TimeRange,
    interval: Duration,
    dialect: &dyn MacroDialect,
) -> Result<String, HanaframeError> {
    if args.len() != token.arity() {
        return Err(HanaframeError::Macro {
            message: format!(
                "$__{} expects {} argument(s), got {}",
                token.name(),
                token.arity(),
                args.len()
            ),
        });
    }

    let sql = match token {
        MacroToken::Time => dialect.time_column(&args[0]),
        MacroToken::TimeEpoch => dialect.time_epoch(&args[0]),
        MacroToken::TimeFilter => dialect.time_filter(&args[0], range),
        MacroToken::TimeFrom => dialect.time_from(range),
        MacroToken::TimeTo => dialect.time_to(range),
        MacroToken::TimeGroup => dialect.time_group(&args[0], parse_interval(&args[1], interval)?),
        MacroToken::TimeGroupAlias => format!(
            "{} AS \"time\"",
            dialect.time_group(&args[0], parse_interval(&args[1], interval)?)
        ),
        MacroToken::UnixEpochFilter => dialect.unix_epoch_filter(&args[0], range),
        MacroToken::UnixEpochFrom => dialect.unix_epoch_from(range),
        MacroToken::UnixEpochTo => dialect.unix_epoch_to(range),
        MacroToken::UnixEpochGroup => {
            dialect.unix_epoch_group(&args[0], parse_interval(&args[1], interval)?)
        }
        MacroToken::UnixEpochGroupAlias => format!(
            "{} AS \"time\"",
            dialect.unix_epoch_group(&args[0], parse_interval(&args[1], interval)?)
        ),
        MacroToken::Interval => format_interval(interval),
        MacroToken::IntervalMs => interval.as_millis().to_string(),
    };

    Ok(sql)
}

/// Parse `500ms`, `30s`, `5m`, `1h`, `1d`, `1w`. Surrounding quotes are ignored;
/// `$__interval` and `auto` resolve to `request_interval`.
pub fn parse_interval(input: &str, request_interval: Duration) -> Result<Duration, HanaframeError> {
    let trimmed = input.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if trimmed == "$__interval" || trimmed.eq_ignore_ascii_case("auto") {
        return Ok(request_interval);
    }

    let invalid = || HanaframeError::Macro {
        message: format!("invalid interval {input:?}"),
    };
    let caps = INTERVAL_RE.captures(trimmed).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let unit_millis: u64 = match &caps[2] {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(invalid()),
    };
    let millis = amount.checked_mul(unit_millis).ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}

/// Render a duration in the largest unit that divides it exactly.
pub fn format_interval(interval: Duration) -> String {
    let ms = interval.as_millis();
    let units: [(&str, u128); 5] = [
        ("w", 604_800_000),
        ("d", 86_400_000),
        ("h", 3_600_000),
        ("m", 60_000),
        ("s", 1_000),
    ];
    for (unit, size) in units {
        if ms >= size && ms % size == 0 {
            return format!("{}{unit}", ms / size);
        }
    }
    format!("{ms}ms")
}
