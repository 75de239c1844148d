//! Engine value marshalling.

use std::os::raw::c_int;
use std::slice;

use rusqlite::ffi;
use vtbridge_error::Result;
use vtbridge_types::{SqliteValue, ValueType};

/// Copy one engine value.
///
/// # Safety
/// `value` must be a live `sqlite3_value` for the duration of the call.
pub(crate) unsafe fn read_value(value: *mut ffi::sqlite3_value) -> Result<SqliteValue> {
    Ok(match ValueType::from_raw(ffi::sqlite3_value_type(value)) {
        ValueType::Integer => SqliteValue::Integer(ffi::sqlite3_value_int64(value)),
        ValueType::Float => SqliteValue::Float(ffi::sqlite3_value_double(value)),
        ValueType::Text => {
            // text before bytes: the length must describe the converted form
            let text = ffi::sqlite3_value_text(value);
            let len = usize::try_from(ffi::sqlite3_value_bytes(value)).unwrap_or(0);
            if text.is_null() || len == 0 {
                SqliteValue::Text(String::new())
            } else {
                let bytes = slice::from_raw_parts(text, len);
                SqliteValue::Text(std::str::from_utf8(bytes)?.to_owned())
            }
        }
        ValueType::Blob => {
            let blob = ffi::sqlite3_value_blob(value);
            let len = usize::try_from(ffi::sqlite3_value_bytes(value)).unwrap_or(0);
            if blob.is_null() || len == 0 {
                SqliteValue::Blob(Vec::new())
            } else {
                SqliteValue::Blob(slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
            }
        }
        ValueType::Null => SqliteValue::Null,
    })
}

/// Copy an engine value array.
///
/// # Safety
/// `argv` must point to `argc` live values, or be null when `argc` is 0.
pub(crate) unsafe fn read_values(
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> Result<Vec<SqliteValue>> {
    let count = usize::try_from(argc).unwrap_or(0);
    if count == 0 || argv.is_null() {
        return Ok(Vec::new());
    }
    slice::from_raw_parts(argv, count)
        .iter()
        .map(|&value| read_value(value))
        .collect()
}
