//! Result sink over an engine function/column context.
//!
//! Owned blobs are handed to the engine without copying. The buffer is
//! parked in a process-wide pin map keyed by its address until the engine
//! calls [`release_pinned_blob`], which unpins it exactly once.

use std::collections::BTreeMap;
use std::os::raw::{c_int, c_uchar, c_void};

use parking_lot::{Mutex, const_mutex};
use rusqlite::ffi;
use tracing::warn;
use vtbridge_types::ResultSink;

use crate::metrics;

static PINNED: Mutex<BTreeMap<usize, Box<[u8]>>> = const_mutex(BTreeMap::new());

/// Number of blobs currently owned by the engine.
pub fn pinned_blob_count() -> usize {
    PINNED.lock().len()
}

fn pin_blob(data: Vec<u8>) -> (*const c_void, usize) {
    let data = data.into_boxed_slice();
    let len = data.len();
    let ptr = data.as_ptr();
    PINNED.lock().insert(ptr.addr(), data);
    metrics::record_pin();
    (ptr.cast(), len)
}

/// Destructor passed to the engine for pinned blobs.
///
/// # Safety
/// Called by the engine with the pointer it was handed.
pub(crate) unsafe extern "C" fn release_pinned_blob(ptr: *mut c_void) {
    let released = PINNED.lock().remove(&ptr.addr());
    if released.is_some() {
        metrics::record_unpin();
    } else {
        warn!(target: "vtbridge.vtab", addr = ptr.addr(), "release of a blob that is not pinned");
    }
}

/// Writes results into a `sqlite3_context`.
pub(crate) struct ContextSink {
    ctx: *mut ffi::sqlite3_context,
}

impl ContextSink {
    /// # Safety
    /// `ctx` must stay valid for the lifetime of the sink.
    pub(crate) unsafe fn new(ctx: *mut ffi::sqlite3_context) -> Self {
        Self { ctx }
    }
}

fn len64(len: usize) -> ffi::sqlite3_uint64 {
    ffi::sqlite3_uint64::try_from(len).unwrap_or(ffi::sqlite3_uint64::MAX)
}

impl ResultSink for ContextSink {
    fn set_null(&mut self) {
        unsafe { ffi::sqlite3_result_null(self.ctx) }
    }

    fn set_i32(&mut self, value: i32) {
        unsafe { ffi::sqlite3_result_int(self.ctx, value) }
    }

    fn set_i64(&mut self, value: i64) {
        unsafe { ffi::sqlite3_result_int64(self.ctx, value) }
    }

    fn set_f64(&mut self, value: f64) {
        unsafe { ffi::sqlite3_result_double(self.ctx, value) }
    }

    fn set_text(&mut self, value: &str) {
        unsafe {
            ffi::sqlite3_result_text64(
                self.ctx,
                value.as_ptr().cast(),
                len64(value.len()),
                ffi::SQLITE_TRANSIENT(),
                ffi::SQLITE_UTF8 as c_uchar,
            );
        }
    }

    fn set_blob(&mut self, value: &[u8]) {
        unsafe {
            ffi::sqlite3_result_blob64(
                self.ctx,
                value.as_ptr().cast(),
                len64(value.len()),
                ffi::SQLITE_TRANSIENT(),
            );
        }
    }

    fn set_blob_owned(&mut self, value: Vec<u8>) {
        if value.is_empty() {
            unsafe { ffi::sqlite3_result_zeroblob(self.ctx, 0) };
            return;
        }
        let (ptr, len) = pin_blob(value);
        unsafe {
            ffi::sqlite3_result_blob64(self.ctx, ptr, len64(len), Some(release_pinned_blob));
        }
    }

    fn set_error(&mut self, message: &str) {
        let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
        unsafe { ffi::sqlite3_result_error(self.ctx, message.as_ptr().cast(), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_and_release_exactly_once() {
        let before = pinned_blob_count();
        let (ptr, len) = pin_blob(vec![1, 2, 3]);
        assert_eq!(len, 3);
        assert!(pinned_blob_count() > before);
        unsafe { release_pinned_blob(ptr.cast_mut()) };
        assert!(!PINNED.lock().contains_key(&ptr.addr()));
        // a second release is ignored
        unsafe { release_pinned_blob(ptr.cast_mut()) };
    }
}
