use std::cmp::Ordering;
use std::fmt;

use vtbridge_error::{BridgeError, Result};

/// Native type tag of an engine value.
///
/// The discriminants match `SQLITE_INTEGER` .. `SQLITE_NULL` from
/// `sqlite3.h`, so a raw `sqlite3_value_type()` result converts directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(i32)]
pub enum ValueType {
    Integer = 1,
    Float = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
}

impl ValueType {
    /// Decode a raw engine type code. Unknown codes are treated as NULL,
    /// which is what the engine itself does for corrupt values.
    #[must_use]
    pub const fn from_raw(code: i32) -> Self {
        match code {
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Text,
            4 => Self::Blob,
            _ => Self::Null,
        }
    }

    /// Lower-case name, as returned by SQL `typeof()`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "real",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Null => "null",
        }
    }
}

/// A dynamically-typed engine value.
///
/// Filter arguments, mutation column values and overloaded-function
/// arguments all arrive as `SqliteValue`. SQLite has five fundamental
/// storage classes: NULL, INTEGER, REAL, TEXT, and BLOB.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum SqliteValue {
    /// SQL NULL.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Float(f64),
    /// A UTF-8 text string.
    Text(String),
    /// A binary large object.
    Blob(Vec<u8>),
}

impl SqliteValue {
    /// The native type tag of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Blob(_) => ValueType::Blob,
        }
    }

    /// Length in bytes, with `sqlite3_value_bytes()` semantics: numeric
    /// values report the length of their text rendering, NULL reports 0.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Text(s) => s.len(),
            Self::Blob(b) => b.len(),
            Self::Integer(_) | Self::Float(_) => self.to_text().len(),
        }
    }

    /// Returns true if this is a NULL value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to extract an integer value.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to extract a float value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract a text reference.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract a blob reference.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to an integer following SQLite's type coercion rules.
    ///
    /// - NULL -> 0
    /// - Integer -> itself
    /// - Float -> truncated to i64
    /// - Text -> attempt to parse, 0 on failure
    /// - Blob -> 0
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_integer(&self) -> i64 {
        match self {
            Self::Null | Self::Blob(_) => 0,
            Self::Integer(i) => *i,
            Self::Float(f) => *f as i64,
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .unwrap_or_else(|_| s.trim().parse::<f64>().map_or(0, |f| f as i64)),
        }
    }

    /// Convert to a float following SQLite's type coercion rules.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float(&self) -> f64 {
        match self {
            Self::Null | Self::Blob(_) => 0.0,
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }

    /// Convert to text following SQLite's `CAST(x AS TEXT)` rules.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format_sqlite_float(*f),
            Self::Text(s) => s.clone(),
            Self::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Boolean view: any non-zero numeric value is true.
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Float(f) => *f != 0.0,
            _ => self.to_integer() != 0,
        }
    }

    /// Strict 32-bit integer accessor.
    ///
    /// Unlike [`to_integer`](Self::to_integer) this refuses to coerce
    /// non-integer storage classes and reports values that do not fit.
    pub fn try_i32(&self) -> Result<i32> {
        let Self::Integer(i) = self else {
            return Err(self.mismatch("integer"));
        };
        i32::try_from(*i).map_err(|_| BridgeError::OutOfRange {
            what: "32-bit integer".to_owned(),
            value: i.to_string(),
        })
    }

    /// Strict 64-bit integer accessor.
    pub fn try_i64(&self) -> Result<i64> {
        self.as_integer().ok_or_else(|| self.mismatch("integer"))
    }

    /// Strict text accessor.
    pub fn try_text(&self) -> Result<&str> {
        self.as_text().ok_or_else(|| self.mismatch("text"))
    }

    /// Strict blob accessor.
    pub fn try_blob(&self) -> Result<&[u8]> {
        self.as_blob().ok_or_else(|| self.mismatch("blob"))
    }

    fn mismatch(&self, expected: &str) -> BridgeError {
        BridgeError::TypeMismatch {
            expected: expected.to_owned(),
            actual: self.typeof_str().to_owned(),
        }
    }

    /// Returns the SQLite `typeof()` string for this value.
    pub const fn typeof_str(&self) -> &'static str {
        self.value_type().name()
    }

    /// The sort order key for NULL values (SQLite sorts NULLs first).
    const fn sort_class(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Float(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }
}

impl fmt::Display for SqliteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&format_sqlite_float(*v)),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Blob(b) => {
                f.write_str("X'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl PartialEq for SqliteValue {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for SqliteValue {
    #[allow(clippy::cast_precision_loss)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // SQLite sort order: NULL < numeric < text < blob
        let class_a = self.sort_class();
        let class_b = other.sort_class();
        if class_a != class_b {
            return Some(class_a.cmp(&class_b));
        }

        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<i64> for SqliteValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for SqliteValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<bool> for SqliteValue {
    fn from(b: bool) -> Self {
        Self::Integer(i64::from(b))
    }
}

impl From<f64> for SqliteValue {
    fn from(f: f64) -> Self {
        if f.is_nan() { Self::Null } else { Self::Float(f) }
    }
}

impl From<String> for SqliteValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for SqliteValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for SqliteValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

impl From<&[u8]> for SqliteValue {
    fn from(b: &[u8]) -> Self {
        Self::Blob(b.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for SqliteValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Format a floating-point value as text the way SQLite renders REAL.
///
/// Integral values keep a trailing `.0` so REAL stays distinguishable from
/// INTEGER in text output (e.g., `120.0` not `120`).
#[must_use]
pub fn format_sqlite_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() { "Inf" } else { "-Inf" }.to_owned();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_properties() {
        let v = SqliteValue::Null;
        assert!(v.is_null());
        assert_eq!(v.value_type(), ValueType::Null);
        assert_eq!(v.byte_len(), 0);
        assert_eq!(v.to_integer(), 0);
        assert_eq!(v.to_text(), "");
        assert_eq!(v.to_string(), "NULL");
    }

    #[test]
    fn integer_properties() {
        let v = SqliteValue::Integer(42);
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.value_type(), ValueType::Integer);
        assert_eq!(v.byte_len(), 2);
        assert_eq!(v.to_text(), "42");
        assert!(v.to_bool());
    }

    #[test]
    fn float_text_rendering() {
        assert_eq!(SqliteValue::Float(120.0).to_text(), "120.0");
        assert_eq!(SqliteValue::Float(3.25).to_text(), "3.25");
        assert_eq!(SqliteValue::Float(3.25).to_integer(), 3);
    }

    #[test]
    fn text_and_blob_lengths_are_bytes() {
        assert_eq!(SqliteValue::from("héllo").byte_len(), 6);
        assert_eq!(SqliteValue::from(vec![1_u8, 2, 3]).byte_len(), 3);
    }

    #[test]
    fn type_tag_round_trips_engine_codes() {
        for tag in [
            ValueType::Integer,
            ValueType::Float,
            ValueType::Text,
            ValueType::Blob,
            ValueType::Null,
        ] {
            assert_eq!(ValueType::from_raw(tag as i32), tag);
        }
        assert_eq!(ValueType::from_raw(99), ValueType::Null);
    }

    #[test]
    fn strict_accessors() {
        assert_eq!(SqliteValue::Integer(7).try_i32().unwrap(), 7);
        assert!(matches!(
            SqliteValue::Integer(i64::MAX).try_i32(),
            Err(BridgeError::OutOfRange { .. })
        ));
        let err = SqliteValue::from("x").try_i64().unwrap_err();
        assert_eq!(err.to_string(), "type mismatch: expected integer, got text");
        assert_eq!(SqliteValue::from("abc").try_text().unwrap(), "abc");
        assert!(SqliteValue::Null.try_blob().is_err());
    }

    #[test]
    fn comparison_follows_storage_class_order() {
        assert!(SqliteValue::Null < SqliteValue::Integer(0));
        assert!(SqliteValue::Integer(5) < SqliteValue::from("a"));
        assert!(SqliteValue::from("z") < SqliteValue::from(vec![0_u8]));
        assert_eq!(SqliteValue::Integer(2), SqliteValue::Float(2.0));
    }

    #[test]
    fn conversions() {
        assert_eq!(SqliteValue::from(true), SqliteValue::Integer(1));
        assert!(SqliteValue::from(f64::NAN).is_null());
        assert!(SqliteValue::from(None::<i64>).is_null());
        assert_eq!(SqliteValue::from(vec![0xAB_u8]).to_string(), "X'AB'");
    }
}
