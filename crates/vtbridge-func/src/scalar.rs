//! Scalar (row-level) function trait.
//!
//! Tables use scalar functions to overload engine functions for calls whose
//! first argument is one of their columns. Each invocation is independent.
//!
//! # Send + Sync
//!
//! An overload is shared between the table's registry and any statement
//! the engine has planned against it, so implementations must be
//! thread-safe.

use vtbridge_error::Result;
use vtbridge_types::SqliteValue;

/// A scalar SQL function.
///
/// Return [`BridgeError::Implementation`](vtbridge_error::BridgeError::Implementation)
/// for domain errors; the message is reported to the engine as the
/// function's error.
pub trait ScalarFunction: Send + Sync {
    /// Execute this function on the given arguments.
    fn invoke(&self, args: &[SqliteValue]) -> Result<SqliteValue>;
}

impl<F> ScalarFunction for F
where
    F: Fn(&[SqliteValue]) -> Result<SqliteValue> + Send + Sync,
{
    fn invoke(&self, args: &[SqliteValue]) -> Result<SqliteValue> {
        self(args)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vtbridge_error::BridgeError;

    use super::*;

    // -- Mock: add_one(x) -> x + 1 --

    struct AddOne;

    impl ScalarFunction for AddOne {
        fn invoke(&self, args: &[SqliteValue]) -> Result<SqliteValue> {
            match &args[0] {
                SqliteValue::Integer(i) => Ok(SqliteValue::Integer(i + 1)),
                SqliteValue::Float(f) => Ok(SqliteValue::Float(f + 1.0)),
                SqliteValue::Null => Ok(SqliteValue::Null),
                other => Err(BridgeError::implementation(format!(
                    "add_one: cannot add to {}",
                    other.typeof_str()
                ))),
            }
        }
    }

    #[test]
    fn struct_function() {
        let f: Arc<dyn ScalarFunction> = Arc::new(AddOne);
        assert_eq!(f.invoke(&[SqliteValue::Integer(41)]).unwrap(), SqliteValue::Integer(42));
        let err = f.invoke(&[SqliteValue::from("x")]).unwrap_err();
        assert_eq!(err.to_string(), "add_one: cannot add to text");
    }

    #[test]
    fn closure_function() {
        let concat: Arc<dyn ScalarFunction> = Arc::new(|args: &[SqliteValue]| -> Result<SqliteValue> {
            Ok(SqliteValue::Text(args.iter().map(SqliteValue::to_text).collect()))
        });
        let out = concat
            .invoke(&[SqliteValue::from("a"), SqliteValue::Integer(1)])
            .unwrap();
        assert_eq!(out, SqliteValue::from("a1"));
    }
}
