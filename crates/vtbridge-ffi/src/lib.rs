//! SQLite binding for the virtual table bridge.
//!
//! [`register_module`] installs a [`TableFactory`] under a module name on a
//! live connection. From then on `CREATE VIRTUAL TABLE t USING name(...)`
//! builds tables through the factory and every engine callback is routed
//! to the matching [`TableInstance`](vtbridge_func::TableInstance) or
//! [`CursorDriver`](vtbridge_func::CursorDriver).
//!
//! Tracing: span `vtab_callback` with field `callback` when
//! [`ModuleConfig::trace_callbacks`] is set.
//! Log targets: `vtbridge.vtab` (lifecycle, failures), `vtbridge.cursor`,
//! `vtbridge.overload`, `vtbridge.handle`.

#![allow(
    unsafe_code,
    unsafe_op_in_unsafe_fn,
    clippy::borrow_as_ptr,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::missing_safety_doc
)]

mod config;
pub mod handle;
mod index_info;
mod metrics;
mod module;
mod result;
mod util;
mod value;

use std::ffi::CString;

use rusqlite::{Connection, ffi};
use tracing::info;
use vtbridge_error::{BridgeError, Result};
use vtbridge_func::TableFactory;

pub use config::{Capability, ModuleConfig};
pub use handle::{HANDLES, Handle, HandleTable, WeakHandle};
pub use metrics::{BridgeMetricsSnapshot, bridge_metrics_snapshot, reset_bridge_metrics};
pub use result::pinned_blob_count;

/// Register `factory` as virtual table module `name` on `conn`.
///
/// The engine owns the registration from here on and releases the factory
/// when the module is replaced or the connection closes.
pub fn register_module<F>(
    conn: &Connection,
    name: &str,
    factory: F,
    config: ModuleConfig,
) -> Result<()>
where
    F: TableFactory + 'static,
{
    let c_name = CString::new(name).map_err(|_| BridgeError::InteriorNul {
        what: "module name".to_owned(),
    })?;
    let state = Box::new(module::ModuleState {
        name: name.to_owned(),
        factory: Box::new(factory),
        config,
    });
    let callbacks = module::module_for(config.capability);
    // On failure the engine runs the destructor on the payload itself.
    let rc = unsafe {
        ffi::sqlite3_create_module_v2(
            conn.handle(),
            c_name.as_ptr(),
            callbacks,
            Box::into_raw(state).cast(),
            Some(module::drop_module_state),
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(unsafe { util::engine_error(conn.handle(), rc) });
    }
    info!(
        target: "vtbridge.vtab",
        module = name,
        capability = ?config.capability,
        "module registered"
    );
    Ok(())
}
