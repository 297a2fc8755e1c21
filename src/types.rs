//! SQLite's dynamic type system: storage classes, column affinities and the
//! conversions between them.
//!
//! Every cell is a [`Value`], one variant per storage class. A column's
//! [`ColumnAffinity`] decides which storage class a value is converted to when
//! it is written or compared against that column. Everything in this module is
//! pure and stateless.

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static NUMERIC_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:(?:0|[1-9][0-9]*)(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
        .expect("numeric literal pattern")
});

static INTEGER_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("integer literal pattern"));

const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// A single cell value. The variant is the value's storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// SQLite storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageClass {
    /// Lowercase name as reported by `typeof()`.
    pub fn name(self) -> &'static str {
        match self {
            StorageClass::Null => "null",
            StorageClass::Integer => "integer",
            StorageClass::Real => "real",
            StorageClass::Text => "text",
            StorageClass::Blob => "blob",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column affinities. `Blob` doubles as SQLite's "no affinity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnAffinity {
    Text,
    Numeric,
    Integer,
    Real,
    Blob,
}

impl ColumnAffinity {
    /// Affinity of a declared column type, using SQLite's substring rules.
    pub fn from_type_name(type_name: Option<&str>) -> Self {
        let Some(name) = type_name else {
            return ColumnAffinity::Blob;
        };
        let upper = name.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnAffinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnAffinity::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            ColumnAffinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnAffinity::Real
        } else {
            ColumnAffinity::Numeric
        }
    }

    /// Uppercase display name used by schema introspection.
    pub fn type_name(self) -> &'static str {
        match self {
            ColumnAffinity::Text => "TEXT",
            ColumnAffinity::Numeric => "NUMERIC",
            ColumnAffinity::Integer => "INTEGER",
            ColumnAffinity::Real => "REAL",
            ColumnAffinity::Blob => "BLOB",
        }
    }

    /// Value written to a column that an INSERT leaves out.
    pub fn zero_value(self) -> Value {
        match self {
            ColumnAffinity::Integer | ColumnAffinity::Numeric => Value::Integer(0),
            ColumnAffinity::Real => Value::Real(0.0),
            ColumnAffinity::Text => Value::Text(String::new()),
            ColumnAffinity::Blob => Value::Blob(Vec::new()),
        }
    }

    /// Affinity naturally carried by a value of the given storage class.
    pub fn of_storage_class(class: StorageClass) -> Option<Self> {
        match class {
            StorageClass::Null => None,
            StorageClass::Integer => Some(ColumnAffinity::Integer),
            StorageClass::Real => Some(ColumnAffinity::Real),
            StorageClass::Text => Some(ColumnAffinity::Text),
            StorageClass::Blob => Some(ColumnAffinity::Blob),
        }
    }
}

impl fmt::Display for ColumnAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Numeric view of a value used by arithmetic and aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Real(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(v) => v as f64,
            Numeric::Real(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Numeric::Integer(v) => Value::Integer(v),
            Numeric::Real(v) => Value::Real(v),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage class of the representation itself, with no shape inspection.
    pub fn natural_class(&self) -> StorageClass {
        match self {
            Value::Null => StorageClass::Null,
            Value::Integer(_) => StorageClass::Integer,
            Value::Real(_) => StorageClass::Real,
            Value::Text(_) => StorageClass::Text,
            Value::Blob(_) => StorageClass::Blob,
        }
    }

    /// Text rendering used by `||`, text coercion and result output.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format_real(*v),
            Value::Text(text) => text.clone(),
            Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Truth value: `None` for NULL, otherwise whether the numeric value is non-zero.
    pub fn truth(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Integer(v) => Some(*v != 0),
            Value::Real(v) => Some(*v != 0.0),
            Value::Text(text) => Some(numeric_prefix(text).as_f64() != 0.0),
            Value::Blob(bytes) => Some(numeric_prefix(&String::from_utf8_lossy(bytes)).as_f64() != 0.0),
        }
    }

    /// Numeric interpretation for arithmetic. Text contributes its longest
    /// numeric prefix (zero when there is none); blobs have no numeric value.
    pub fn to_numeric(&self) -> Result<Option<Numeric>> {
        match self {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(Numeric::Integer(*v))),
            Value::Real(v) => Ok(Some(Numeric::Real(*v))),
            Value::Text(text) => Ok(Some(numeric_prefix(text))),
            Value::Blob(_) => Err(Error::type_mismatch("blob used as a number")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Blob(bytes) => {
                f.write_str("x'")?;
                for byte in bytes {
                    write!(f, "{:02X}", byte)?;
                }
                f.write_str("'")
            }
            other => f.write_str(&other.render()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

/// NaN has no SQL representation and binds as NULL.
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Value::Null
        } else {
            Value::Real(value)
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Whether `text` matches the SQL numeric literal grammar: optional sign,
/// digits with at most one decimal point, no redundant leading zero, and an
/// optional exponent.
pub fn is_numeric(text: &str) -> bool {
    NUMERIC_TEXT.is_match(text)
}

/// Exact integer test for text: an optional sign followed by digits, of any length.
pub fn is_integer_text(text: &str) -> bool {
    INTEGER_TEXT.is_match(text)
}

/// Approximate integer test for doubles.
///
/// Compares the value against its truncation with a tolerance of the smallest
/// subnormal. Magnitudes outside the i64 range never pass, and subnormals
/// closest to zero do.
pub fn is_integer_f64(value: f64) -> bool {
    ((value as i64) as f64 - value).abs() <= f64::from_bits(1)
}

/// Single-precision counterpart of [`is_integer_f64`].
pub fn is_integer_f32(value: f32) -> bool {
    ((value as i64) as f32 - value).abs() <= f32::from_bits(1)
}

/// Integer value of a double when it passes [`is_integer_f64`] and fits an i64.
pub fn real_as_integer(value: f64) -> Option<i64> {
    if is_integer_f64(value) && (I64_LOWER..I64_UPPER).contains(&value) {
        Some(value as i64)
    } else {
        None
    }
}

/// Storage class implied by a value's shape, ignoring column context.
///
/// Numeric-looking text and integral doubles classify as numbers.
pub fn storage_class(value: &Value) -> StorageClass {
    match value {
        Value::Null => StorageClass::Null,
        Value::Integer(_) => StorageClass::Integer,
        Value::Real(v) => {
            if real_as_integer(*v).is_some() {
                StorageClass::Integer
            } else {
                StorageClass::Real
            }
        }
        Value::Text(text) => numeric_text_class(text).unwrap_or(StorageClass::Text),
        Value::Blob(_) => StorageClass::Blob,
    }
}

/// Storage class a value takes once stored in, or compared against, a column
/// with the given affinity.
pub fn storage_class_with_affinity(value: &Value, affinity: ColumnAffinity) -> StorageClass {
    match affinity {
        ColumnAffinity::Text => match value {
            Value::Null => StorageClass::Null,
            Value::Blob(_) => StorageClass::Blob,
            _ => StorageClass::Text,
        },
        ColumnAffinity::Numeric | ColumnAffinity::Integer => storage_class(value),
        ColumnAffinity::Real => match storage_class(value) {
            StorageClass::Integer => StorageClass::Real,
            other => other,
        },
        ColumnAffinity::Blob => value.natural_class(),
    }
}

/// Convert a value into the representation its affinity implies.
pub fn coerce(value: Value, affinity: ColumnAffinity) -> Value {
    let target = storage_class_with_affinity(&value, affinity);
    match (target, value) {
        (_, Value::Null) => Value::Null,
        (StorageClass::Integer, Value::Real(v)) => match real_as_integer(v) {
            Some(int) => Value::Integer(int),
            None => Value::Real(v),
        },
        (StorageClass::Integer, Value::Text(text)) => match text.parse::<i64>() {
            Ok(int) => Value::Integer(int),
            Err(_) => match text.parse::<f64>().ok().and_then(real_as_integer) {
                Some(int) => Value::Integer(int),
                None => Value::Text(text),
            },
        },
        (StorageClass::Real, Value::Integer(v)) => Value::Real(v as f64),
        (StorageClass::Real, Value::Text(text)) => match text.parse::<f64>() {
            Ok(real) => Value::Real(real),
            Err(_) => Value::Text(text),
        },
        (StorageClass::Text, Value::Integer(v)) => Value::Text(v.to_string()),
        (StorageClass::Text, Value::Real(v)) => Value::Text(format_real(v)),
        (_, value) => value,
    }
}

/// SQLite's sort order: NULL, then numbers compared numerically across
/// integer and real, then text by bytes, then blobs by bytes. A NaN real
/// sorts below every other number.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
        (Value::Integer(l), Value::Real(r)) => int_real_cmp(*l, *r),
        (Value::Real(l), Value::Integer(r)) => int_real_cmp(*r, *l).reverse(),
        (Value::Real(l), Value::Real(r)) => real_cmp(*l, *r),
        (Value::Integer(_) | Value::Real(_), _) => Ordering::Less,
        (_, Value::Integer(_) | Value::Real(_)) => Ordering::Greater,
        (Value::Text(l), Value::Text(r)) => l.as_bytes().cmp(r.as_bytes()),
        (Value::Text(_), Value::Blob(_)) => Ordering::Less,
        (Value::Blob(_), Value::Text(_)) => Ordering::Greater,
        (Value::Blob(l), Value::Blob(r)) => l.cmp(r),
    }
}

/// Equality under [`compare_values`]; NULL equals NULL here.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Ordering::Equal
}

/// Affinity a literal token carries by its lexical form.
pub fn lexical_affinity(literal: &str) -> ColumnAffinity {
    if literal.eq_ignore_ascii_case("NULL") || is_blob_literal(literal) {
        ColumnAffinity::Blob
    } else if literal.eq_ignore_ascii_case("TRUE") || literal.eq_ignore_ascii_case("FALSE") {
        ColumnAffinity::Integer
    } else if is_quoted(literal) {
        ColumnAffinity::Text
    } else if is_numeric(literal) {
        if is_integer_text(literal) && literal.parse::<i64>().is_ok() {
            ColumnAffinity::Integer
        } else {
            ColumnAffinity::Real
        }
    } else {
        ColumnAffinity::Text
    }
}

/// Typed value of a literal token, following [`lexical_affinity`].
pub fn coerce_to_lexical_affinity(literal: &str) -> Result<Value> {
    if literal.eq_ignore_ascii_case("NULL") {
        return Ok(Value::Null);
    }
    if literal.eq_ignore_ascii_case("TRUE") {
        return Ok(Value::Integer(1));
    }
    if literal.eq_ignore_ascii_case("FALSE") {
        return Ok(Value::Integer(0));
    }
    if is_blob_literal(literal) {
        return decode_hex(&literal[2..literal.len() - 1]).map(Value::Blob);
    }
    if is_quoted(literal) {
        let inner = &literal[1..literal.len() - 1];
        return Ok(Value::Text(inner.replace("''", "'")));
    }
    match lexical_affinity(literal) {
        ColumnAffinity::Integer => literal
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| Error::type_mismatch(format!("malformed integer literal {}", literal))),
        ColumnAffinity::Real => literal
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| Error::type_mismatch(format!("malformed real literal {}", literal))),
        _ => Ok(Value::Text(literal.to_string())),
    }
}

/// SQL literal spelling of a value; the inverse of [`coerce_to_lexical_affinity`].
pub fn literal_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
        other => other.to_string(),
    }
}

/// Render a double the way SQLite's `%!.15g` does: fifteen significant
/// digits and always a decimal point.
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return "0.0".to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    if (-4..15).contains(&exponent) {
        let places = (14 - exponent).max(0) as usize;
        keep_point(format!("{value:.places$}"))
    } else {
        let formatted = format!("{value:.14e}");
        let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", keep_point(mantissa.to_string()), sign, exp.abs())
    }
}

fn keep_point(mut text: String) -> String {
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').len();
        text.truncate(trimmed);
        if text.ends_with('.') {
            text.push('0');
        }
    } else {
        text.push_str(".0");
    }
    text
}

fn numeric_text_class(text: &str) -> Option<StorageClass> {
    if !is_numeric(text) {
        return None;
    }
    if is_integer_text(text) && text.parse::<i64>().is_ok() {
        return Some(StorageClass::Integer);
    }
    let real = text.parse::<f64>().ok()?;
    if real_as_integer(real).is_some() {
        Some(StorageClass::Integer)
    } else {
        Some(StorageClass::Real)
    }
}

/// Longest leading numeric prefix of `text`, or integer zero.
fn numeric_prefix(text: &str) -> Numeric {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    let mut is_real = false;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut cursor = end + 1;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor > end + 1 || has_digits {
            has_digits = true;
            is_real = true;
            end = cursor;
        }
    }
    if !has_digits {
        return Numeric::Integer(0);
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut cursor = end + 1;
        if cursor < bytes.len() && (bytes[cursor] == b'+' || bytes[cursor] == b'-') {
            cursor += 1;
        }
        if cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
                cursor += 1;
            }
            is_real = true;
            end = cursor;
        }
    }
    let prefix = &text[..end];
    if !is_real {
        if let Ok(int) = prefix.parse::<i64>() {
            return Numeric::Integer(int);
        }
    }
    Numeric::Real(prefix.parse::<f64>().unwrap_or(0.0))
}

fn real_cmp(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

fn int_real_cmp(int: i64, real: f64) -> Ordering {
    if real.is_nan() {
        return Ordering::Greater;
    }
    if real < I64_LOWER {
        return Ordering::Greater;
    }
    if real >= I64_UPPER {
        return Ordering::Less;
    }
    match int.cmp(&(real as i64)) {
        Ordering::Equal => (int as f64).partial_cmp(&real).unwrap_or(Ordering::Equal),
        other => other,
    }
}

fn is_quoted(literal: &str) -> bool {
    literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'')
}

fn is_blob_literal(literal: &str) -> bool {
    literal.len() >= 3
        && (literal.starts_with("x'") || literal.starts_with("X'"))
        && literal.ends_with('\'')
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let malformed = || Error::Syntax {
        near: format!("x'{}'", hex),
        detail: "malformed blob literal".to_string(),
    };
    if hex.len() % 2 != 0 {
        return Err(malformed());
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair).map_err(|_| malformed())?;
            u8::from_str_radix(digits, 16).map_err(|_| malformed())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    #[test]
    fn numeric_grammar() {
        for ok in ["0", "-0", "+12", "3.14", "0.5", ".5", "5.", "1e10", "2.5E-3", "10"] {
            assert!(is_numeric(ok), "{} should be numeric", ok);
        }
        for bad in ["", ".", "-", "007", "00.5", "1.2.3", "e5", "12a", " 12", "0x10"] {
            assert!(!is_numeric(bad), "{} should not be numeric", bad);
        }
    }

    #[test]
    fn integer_text_is_exact_and_unbounded() {
        assert!(is_integer_text("123"));
        assert!(is_integer_text("-99999999999999999999999"));
        assert!(!is_integer_text("500.0"));
        assert!(!is_integer_text("1e3"));
    }

    #[test]
    fn double_integer_test_matches_known_boundaries() {
        assert!(is_integer_f64(0.0));
        assert!(is_integer_f64(3.0));
        assert!(is_integer_f64(-42.0));
        assert!(!is_integer_f64(3.5));
        assert!(!is_integer_f64(1e300));
        assert!(!is_integer_f64(-1e300));
        assert!(!is_integer_f64(f64::MIN_POSITIVE));
        assert!(!is_integer_f64(f64::NAN));
        assert!(!is_integer_f64(f64::INFINITY));
        // The smallest subnormal sits within tolerance of zero.
        assert!(is_integer_f64(5e-324));
    }

    #[test]
    fn float_integer_test() {
        assert!(is_integer_f32(7.0));
        assert!(!is_integer_f32(7.25));
        assert!(!is_integer_f32(1e30));
    }

    #[test]
    fn shape_classification() {
        assert_eq!(storage_class(&Value::Null), StorageClass::Null);
        assert_eq!(storage_class(&text("12")), StorageClass::Integer);
        assert_eq!(storage_class(&text("500.0")), StorageClass::Integer);
        assert_eq!(storage_class(&text("1.5")), StorageClass::Real);
        assert_eq!(storage_class(&text("abc")), StorageClass::Text);
        assert_eq!(storage_class(&Value::Real(2.0)), StorageClass::Integer);
        assert_eq!(storage_class(&Value::Real(2.5)), StorageClass::Real);
        assert_eq!(storage_class(&Value::Blob(vec![1])), StorageClass::Blob);
    }

    #[test]
    fn affinity_conversion_table() {
        let value = text("500.0");
        assert_eq!(
            storage_class_with_affinity(&value, ColumnAffinity::Text),
            StorageClass::Text
        );
        assert_eq!(
            storage_class_with_affinity(&value, ColumnAffinity::Numeric),
            StorageClass::Integer
        );
        assert_eq!(
            storage_class_with_affinity(&value, ColumnAffinity::Integer),
            StorageClass::Integer
        );
        assert_eq!(
            storage_class_with_affinity(&value, ColumnAffinity::Real),
            StorageClass::Real
        );
        assert_eq!(
            storage_class_with_affinity(&value, ColumnAffinity::Blob),
            StorageClass::Text
        );
    }

    #[test]
    fn text_affinity_leaves_blobs_alone() {
        let blob = Value::Blob(vec![0xde, 0xad]);
        assert_eq!(
            storage_class_with_affinity(&blob, ColumnAffinity::Text),
            StorageClass::Blob
        );
        assert_eq!(coerce(blob.clone(), ColumnAffinity::Text), blob);
    }

    #[test]
    fn coerce_follows_affinity() {
        assert_eq!(coerce(text("500.0"), ColumnAffinity::Integer), Value::Integer(500));
        assert_eq!(coerce(text("500.0"), ColumnAffinity::Numeric), Value::Integer(500));
        assert_eq!(coerce(text("500.0"), ColumnAffinity::Real), Value::Real(500.0));
        assert_eq!(coerce(text("500.0"), ColumnAffinity::Text), text("500.0"));
        assert_eq!(coerce(text("500.0"), ColumnAffinity::Blob), text("500.0"));
        assert_eq!(coerce(Value::Integer(7), ColumnAffinity::Text), text("7"));
        assert_eq!(coerce(Value::Real(2.5), ColumnAffinity::Text), text("2.5"));
        assert_eq!(coerce(Value::Integer(3), ColumnAffinity::Real), Value::Real(3.0));
        assert_eq!(coerce(text("abc"), ColumnAffinity::Integer), text("abc"));
        assert_eq!(coerce(Value::Null, ColumnAffinity::Text), Value::Null);
    }

    #[test]
    fn compare_orders_across_classes() {
        let ordered = [
            Value::Null,
            Value::Integer(-5),
            Value::Real(1.5),
            Value::Integer(2),
            text("A"),
            text("a"),
            Value::Blob(vec![0]),
            Value::Blob(vec![0, 1]),
        ];
        for window in ordered.windows(2) {
            assert_eq!(
                compare_values(&window[0], &window[1]),
                Ordering::Less,
                "{:?} < {:?}",
                window[0],
                window[1]
            );
        }
        assert_eq!(
            compare_values(&Value::Integer(1), &Value::Real(1.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn nan_sorts_below_every_number() {
        let nan = Value::Real(f64::NAN);
        assert_eq!(compare_values(&nan, &nan), Ordering::Equal);
        for number in [Value::Integer(i64::MIN), Value::Real(f64::NEG_INFINITY), Value::Real(0.0)] {
            assert_eq!(compare_values(&nan, &number), Ordering::Less);
            assert_eq!(compare_values(&number, &nan), Ordering::Greater);
        }
        assert_eq!(compare_values(&Value::Null, &nan), Ordering::Less);
        assert_eq!(Value::from(f64::NAN), Value::Null);
    }

    #[test]
    fn int_real_compare_keeps_precision() {
        let big = i64::MAX - 1;
        assert_eq!(
            compare_values(&Value::Integer(big), &Value::Real(9.3e18)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Real(-9.3e18), &Value::Integer(i64::MIN)),
            Ordering::Less
        );
    }

    #[test]
    fn lexical_classification() {
        assert_eq!(lexical_affinity("NULL"), ColumnAffinity::Blob);
        assert_eq!(lexical_affinity("x'0A'"), ColumnAffinity::Blob);
        assert_eq!(lexical_affinity("42"), ColumnAffinity::Integer);
        assert_eq!(lexical_affinity("4.2"), ColumnAffinity::Real);
        assert_eq!(lexical_affinity("'hi'"), ColumnAffinity::Text);
        assert_eq!(lexical_affinity("9223372036854775808"), ColumnAffinity::Real);

        assert_eq!(coerce_to_lexical_affinity("null").unwrap(), Value::Null);
        assert_eq!(coerce_to_lexical_affinity("X'0aFF'").unwrap(), Value::Blob(vec![0x0a, 0xff]));
        assert_eq!(coerce_to_lexical_affinity("'it''s'").unwrap(), text("it's"));
        assert_eq!(coerce_to_lexical_affinity("500.0").unwrap(), Value::Real(500.0));
        assert_eq!(coerce_to_lexical_affinity("FALSE").unwrap(), Value::Integer(0));
        assert!(coerce_to_lexical_affinity("x'abc'").is_err());
    }

    #[test]
    fn literal_text_round_trips() {
        for value in [Value::Null, Value::Integer(-3), Value::Real(0.25), text("o'k"), Value::Blob(vec![1, 2])] {
            assert_eq!(coerce_to_lexical_affinity(&literal_text(&value)).unwrap(), value);
        }
    }

    #[test]
    fn real_formatting() {
        assert_eq!(format_real(500.0), "500.0");
        assert_eq!(format_real(0.1), "0.1");
        assert_eq!(format_real(-2.5), "-2.5");
        assert_eq!(format_real(1e300), "1.0e+300");
        assert_eq!(format_real(1.5e-7), "1.5e-07");
    }

    #[test]
    fn numeric_prefix_of_text() {
        assert_eq!(text("12abc").to_numeric().unwrap(), Some(Numeric::Integer(12)));
        assert_eq!(text(" 2.5x").to_numeric().unwrap(), Some(Numeric::Real(2.5)));
        assert_eq!(text("abc").to_numeric().unwrap(), Some(Numeric::Integer(0)));
        assert_eq!(text("1e3").to_numeric().unwrap(), Some(Numeric::Real(1000.0)));
        assert_eq!(Value::Null.to_numeric().unwrap(), None);
        assert!(Value::Blob(vec![1]).to_numeric().is_err());
    }

    #[test]
    fn truthiness() {
        assert_eq!(Value::Null.truth(), None);
        assert_eq!(Value::Integer(0).truth(), Some(false));
        assert_eq!(Value::Real(0.5).truth(), Some(true));
        assert_eq!(text("abc").truth(), Some(false));
        assert_eq!(text("1abc").truth(), Some(true));
    }

    #[test]
    fn type_names_map_to_affinity() {
        assert_eq!(ColumnAffinity::from_type_name(Some("INTEGER")), ColumnAffinity::Integer);
        assert_eq!(ColumnAffinity::from_type_name(Some("VARCHAR(20)")), ColumnAffinity::Text);
        assert_eq!(ColumnAffinity::from_type_name(Some("DOUBLE")), ColumnAffinity::Real);
        assert_eq!(ColumnAffinity::from_type_name(Some("DECIMAL(10,2)")), ColumnAffinity::Numeric);
        assert_eq!(ColumnAffinity::from_type_name(Some("BLOB")), ColumnAffinity::Blob);
        assert_eq!(ColumnAffinity::from_type_name(None), ColumnAffinity::Blob);
    }
}
