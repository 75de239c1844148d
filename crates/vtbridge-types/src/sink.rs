//! Result sinks: where column values and overload results are written.
//!
//! A cursor's `column` call and an overloaded scalar function both produce
//! exactly one value. The bridge hands them a [`ResultSink`]; the native
//! layer implements it over the engine's result context, tests use
//! [`ColumnContext`].

use crate::value::SqliteValue;

/// Typed setters for a single result value.
///
/// Only the last setter called before the callback returns is observed.
pub trait ResultSink {
    fn set_null(&mut self);

    fn set_i64(&mut self, value: i64);

    fn set_f64(&mut self, value: f64);

    /// Text result. The sink copies the bytes.
    fn set_text(&mut self, value: &str);

    /// Blob result. The sink copies the bytes.
    fn set_blob(&mut self, value: &[u8]);

    /// Blob result that transfers ownership of the buffer.
    ///
    /// Native sinks hand the buffer to the engine without copying and keep
    /// it pinned until the engine releases it. The default falls back to a
    /// copy.
    fn set_blob_owned(&mut self, value: Vec<u8>) {
        self.set_blob(&value);
    }

    /// Report an error instead of a value.
    fn set_error(&mut self, message: &str);

    fn set_i32(&mut self, value: i32) {
        self.set_i64(i64::from(value));
    }

    /// Booleans are stored as integer 1 or 0.
    fn set_bool(&mut self, value: bool) {
        self.set_i64(i64::from(value));
    }

    /// Dispatch on the storage class of `value`.
    fn set_value(&mut self, value: SqliteValue) {
        match value {
            SqliteValue::Null => self.set_null(),
            SqliteValue::Integer(i) => self.set_i64(i),
            SqliteValue::Float(f) => self.set_f64(f),
            SqliteValue::Text(s) => self.set_text(&s),
            SqliteValue::Blob(b) => self.set_blob_owned(b),
        }
    }
}

/// In-memory result sink.
///
/// Holds the last value written, or the error message if one was reported.
#[derive(Debug, Default)]
pub struct ColumnContext {
    value: Option<SqliteValue>,
    error: Option<String>,
}

impl ColumnContext {
    /// Create an empty context with no value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value written, if any.
    pub fn value(&self) -> Option<&SqliteValue> {
        self.value.as_ref()
    }

    /// Take the written value, leaving `None`.
    pub fn take_value(&mut self) -> Option<SqliteValue> {
        self.value.take()
    }

    /// The error reported, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn store(&mut self, value: SqliteValue) {
        self.error = None;
        self.value = Some(value);
    }
}

impl ResultSink for ColumnContext {
    fn set_null(&mut self) {
        self.store(SqliteValue::Null);
    }

    fn set_i64(&mut self, value: i64) {
        self.store(SqliteValue::Integer(value));
    }

    fn set_f64(&mut self, value: f64) {
        self.store(SqliteValue::Float(value));
    }

    fn set_text(&mut self, value: &str) {
        self.store(SqliteValue::Text(value.to_owned()));
    }

    fn set_blob(&mut self, value: &[u8]) {
        self.store(SqliteValue::Blob(value.to_vec()));
    }

    fn set_blob_owned(&mut self, value: Vec<u8>) {
        self.store(SqliteValue::Blob(value));
    }

    fn set_error(&mut self, message: &str) {
        self.value = None;
        self.error = Some(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_setter_wins() {
        let mut ctx = ColumnContext::new();
        assert!(ctx.value().is_none());
        ctx.set_i32(5);
        ctx.set_text("five");
        assert_eq!(ctx.value(), Some(&SqliteValue::from("five")));
    }

    #[test]
    fn bool_is_integer() {
        let mut ctx = ColumnContext::new();
        ctx.set_bool(true);
        assert_eq!(ctx.take_value(), Some(SqliteValue::Integer(1)));
        ctx.set_bool(false);
        assert_eq!(ctx.take_value(), Some(SqliteValue::Integer(0)));
    }

    #[test]
    fn set_value_dispatches_by_class() {
        let mut ctx = ColumnContext::new();
        for v in [
            SqliteValue::Null,
            SqliteValue::Integer(-3),
            SqliteValue::Float(0.5),
            SqliteValue::from("x"),
            SqliteValue::from(vec![1_u8, 2]),
        ] {
            ctx.set_value(v.clone());
            assert_eq!(ctx.value(), Some(&v));
            assert_eq!(ctx.value().map(SqliteValue::value_type), Some(v.value_type()));
        }
    }

    #[test]
    fn error_replaces_value() {
        let mut ctx = ColumnContext::new();
        ctx.set_f64(1.5);
        ctx.set_error("boom");
        assert!(ctx.value().is_none());
        assert_eq!(ctx.error(), Some("boom"));
        ctx.set_null();
        assert!(ctx.error().is_none());
    }
}
