//! `sqlite3_index_info` marshalling.

use std::os::raw::c_int;
use std::slice;

use rusqlite::ffi;
use vtbridge_error::{BridgeError, Result};
use vtbridge_func::{ConstraintOp, IndexConstraint, IndexSelection, IndexSortColumn};

use crate::util::sqlite_strdup;

/// Snapshot the engine's request.
///
/// # Safety
/// `info` must be the live structure passed to `xBestIndex`.
pub(crate) unsafe fn read_selection(info: *const ffi::sqlite3_index_info) -> IndexSelection {
    let info = &*info;
    let constraints = raw_slice(info.aConstraint, info.nConstraint)
        .iter()
        .map(|c| IndexConstraint::new(c.iColumn, ConstraintOp::from_raw(c.op), c.usable != 0))
        .collect();
    let sort_columns = raw_slice(info.aOrderBy, info.nOrderBy)
        .iter()
        .map(|o| IndexSortColumn {
            column: o.iColumn,
            descending: o.desc != 0,
        })
        .collect();
    let mut selection = IndexSelection::new(constraints, sort_columns);
    selection.estimated_cost = info.estimatedCost;
    selection
}

/// Write the table's answer back, one usage record per constraint.
///
/// Nothing is written unless the selection validates.
///
/// # Safety
/// `info` must be the live structure passed to `xBestIndex`.
pub(crate) unsafe fn write_selection(
    info: *mut ffi::sqlite3_index_info,
    selection: &IndexSelection,
) -> Result<()> {
    let info = &mut *info;
    let usage = selection.constraint_usage()?;
    if usage.len() != usize::try_from(info.nConstraint).unwrap_or(0) {
        return Err(BridgeError::internal("constraint count changed during selection"));
    }
    let idx_str = match &selection.identifier.description {
        Some(description) => {
            if description.contains('\0') {
                return Err(BridgeError::InteriorNul {
                    what: "index description".to_owned(),
                });
            }
            let ptr = sqlite_strdup(description);
            if ptr.is_null() {
                return Err(BridgeError::Engine {
                    code: ffi::SQLITE_NOMEM,
                    message: "out of memory".to_owned(),
                });
            }
            ptr
        }
        None => std::ptr::null_mut(),
    };

    if !usage.is_empty() {
        let out = slice::from_raw_parts_mut(info.aConstraintUsage, usage.len());
        for (slot, record) in out.iter_mut().zip(&usage) {
            slot.argvIndex = record.argv_index;
            slot.omit = u8::from(record.omit);
        }
    }
    info.idxNum = selection.identifier.code;
    info.idxStr = idx_str;
    info.needToFreeIdxStr = c_int::from(!idx_str.is_null());
    info.orderByConsumed = c_int::from(!selection.sort_required);
    info.estimatedCost = selection.estimated_cost;
    if let Some(rows) = selection.estimated_rows {
        info.estimatedRows = rows;
    }
    Ok(())
}

unsafe fn raw_slice<'a, T>(ptr: *const T, len: c_int) -> &'a [T] {
    let len = usize::try_from(len).unwrap_or(0);
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}
