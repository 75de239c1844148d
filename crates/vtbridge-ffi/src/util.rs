//! Engine-allocated strings and error plumbing.

use std::any::Any;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use rusqlite::ffi;
use vtbridge_error::{BridgeError, Result};

/// Copy `text` into a NUL-terminated buffer from the engine's allocator.
///
/// Interior NUL bytes end the string early. Returns null when allocation
/// fails.
pub(crate) unsafe fn sqlite_strdup(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    let bytes = bytes
        .iter()
        .position(|&b| b == 0)
        .map_or(bytes, |nul| &bytes[..nul]);
    let len = bytes.len();
    let Ok(size) = ffi::sqlite3_uint64::try_from(len + 1) else {
        return ptr::null_mut();
    };
    let out = ffi::sqlite3_malloc64(size).cast::<c_char>();
    if out.is_null() {
        return out;
    }
    ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), out, len);
    *out.add(len) = 0;
    out
}

/// Cut `message` to at most `max_len` bytes on a character boundary.
pub(crate) fn truncate_message(message: &str, max_len: usize) -> &str {
    if message.len() <= max_len {
        return message;
    }
    let mut end = max_len;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

/// Replace the message in an engine-owned error slot.
pub(crate) unsafe fn set_error_slot(slot: *mut *mut c_char, message: &str, max_len: usize) {
    if slot.is_null() {
        return;
    }
    if !(*slot).is_null() {
        ffi::sqlite3_free((*slot).cast::<c_void>());
    }
    *slot = sqlite_strdup(truncate_message(message, max_len));
}

/// The engine's last error on `db`, as a [`BridgeError::Engine`].
pub(crate) unsafe fn engine_error(db: *mut ffi::sqlite3, code: c_int) -> BridgeError {
    let message = if db.is_null() {
        None
    } else {
        let msg = ffi::sqlite3_errmsg(db);
        (!msg.is_null()).then(|| CStr::from_ptr(msg).to_string_lossy().into_owned())
    };
    BridgeError::Engine {
        code,
        message: message.unwrap_or_else(|| format!("engine error code {code}")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Run implementation code, turning a panic into an error.
///
/// Handle-table lookups stay outside this guard so that lifetime bugs keep
/// unwinding to the `extern "C"` boundary.
pub(crate) fn guard<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(BridgeError::ImplementationPanic(panic_message(&*payload))))
}

/// Drop a released target, containing any panic raised by its destructor.
pub(crate) fn dispose<T>(target: T) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(target))) {
        tracing::warn!(
            target: "vtbridge.vtab",
            panic = %panic_message(&*payload),
            "destructor panicked during teardown"
        );
    }
}
