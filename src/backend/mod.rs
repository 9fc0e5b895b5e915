#[cfg(feature = "odbc")]
pub mod hana;
pub mod pool;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::error::HanaframeError;

/// Metadata for a single result column, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single scanned cell, normalized by the connection supplier.
///
/// Fixed-point values arrive as an exact rational next to the text the backend
/// rendered them as; everything else arrives as text. Driver-specific wrapper
/// types never cross this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Decimal { value: BigRational, text: String },
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }

    /// Decimal built from an exact value, with plain base-10 text.
    ///
    /// A value with no finite decimal expansion keeps `num/den` as its text.
    pub fn decimal(value: BigRational) -> Self {
        let text = decimal_text(&value).unwrap_or_else(|| value.to_string());
        RawValue::Decimal { value, text }
    }

    /// Decimal parsed from backend text. The text is kept as delivered.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        parse_decimal(text).map(|value| RawValue::Decimal {
            value,
            text: text.to_string(),
        })
    }
}

/// Forward-only, row-at-a-time view over a result set.
pub trait Cursor {
    /// Column metadata. Stable for the lifetime of the cursor.
    fn columns(&self) -> &[ColumnMeta];

    /// Next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>, HanaframeError>;
}

/// Pooled connection handle supplied by the host.
///
/// Pool sizing and connection lifetime are fixed when the pool is built. Every
/// borrow is scoped to a single call: the connection goes back to the pool when
/// `ping` or `with_cursor` returns, whatever the outcome.
pub trait ConnectionPool: Send + Sync {
    /// Cheap connectivity check. Must not run a statement.
    fn ping(&self) -> Result<(), HanaframeError>;

    /// Execute `sql` and hand the open cursor to `consume`.
    ///
    /// The cursor is released before this returns, on success and on error.
    fn with_cursor<R>(
        &self,
        sql: &str,
        timeout_secs: Option<u64>,
        consume: impl FnOnce(&mut dyn Cursor) -> Result<R, HanaframeError>,
    ) -> Result<R, HanaframeError>;
}

/// Largest power of ten a decimal literal may scale by.
const MAX_DECIMAL_SHIFT: u32 = 1024;

/// HANA name of the fixed-point type backing a `DECIMAL(precision, _)` column.
pub fn fixed_point_type_name(precision: usize) -> &'static str {
    match precision {
        0..=18 => "FIXED8",
        19..=28 => "FIXED12",
        _ => "FIXED16",
    }
}

/// Parse a decimal literal (`-12.3400`, `1E-3`) into an exact rational.
///
/// `None` for anything that is not a plain base-10 number.
pub fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };

    let (negative, digits) = match mantissa.as_bytes().first()? {
        b'-' => (true, &mantissa[1..]),
        b'+' => (false, &mantissa[1..]),
        _ => (false, mantissa),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut numerator: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
    if negative {
        numerator = -numerator;
    }

    let scale = i64::from(exponent) - frac_part.len() as i64;
    let shift = u32::try_from(scale.unsigned_abs())
        .ok()
        .filter(|s| *s <= MAX_DECIMAL_SHIFT)?;
    let power = BigInt::from(10u8).pow(shift);
    Some(if scale >= 0 {
        BigRational::from_integer(numerator * power)
    } else {
        BigRational::new(numerator, power)
    })
}

/// Plain base-10 rendering (`12.34`, `-0.5`, `250`) of a rational whose reduced
/// denominator has no prime factors other than 2 and 5.
pub fn decimal_text(value: &BigRational) -> Option<String> {
    let mut denom = value.denom().clone();
    let mut twos = 0u32;
    while (&denom % 2u32).is_zero() {
        denom /= 2u32;
        twos += 1;
    }
    let mut fives = 0u32;
    while (&denom % 5u32).is_zero() {
        denom /= 5u32;
        fives += 1;
    }
    if !denom.is_one() {
        return None;
    }

    let places = twos.max(fives);
    let scaled = value.numer().abs() * BigInt::from(10u8).pow(places) / value.denom();
    let mut digits = scaled.to_string();
    let places = places as usize;
    if places > 0 {
        if digits.len() <= places {
            digits = format!("{}{digits}", "0".repeat(places + 1 - digits.len()));
        }
        digits.insert(digits.len() - places, '.');
    }
    if value.is_negative() {
        digits.insert(0, '-');
    }
    Some(digits)
}
