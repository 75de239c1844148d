//! Native `sqlite3_module` callbacks.
//!
//! Every native table and cursor descriptor embeds the engine's base struct
//! first and carries a [`Handle`] to the managed object behind it. Managed
//! objects are reached only through [`HANDLES`]; the engine never sees a
//! Rust pointer.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::ffi;
use tracing::{debug, info, span::EnteredSpan, warn};
use vtbridge_error::{BridgeError, Result};
use vtbridge_func::{
    ConstructMode, CursorDriver, EngineHost, IndexIdentifier, OverloadEntry, TableArgs,
    TableFactory, TableInstance,
};
use vtbridge_types::ResultSink;

use crate::config::{Capability, ModuleConfig};
use crate::handle::{HANDLES, Handle, WeakHandle};
use crate::index_info::{read_selection, write_selection};
use crate::metrics::{self, Callback};
use crate::result::ContextSink;
use crate::util::{dispose, engine_error, guard, set_error_slot};
use crate::value::read_values;

/// Registration payload handed to the engine as the module's client data.
pub(crate) struct ModuleState {
    pub(crate) name: String,
    pub(crate) factory: Box<dyn TableFactory>,
    pub(crate) config: ModuleConfig,
}

/// Engine destructor for [`ModuleState`].
///
/// # Safety
/// `state` must come from `Box::into_raw` of a `ModuleState`.
pub(crate) unsafe extern "C" fn drop_module_state(state: *mut c_void) {
    if state.is_null() {
        return;
    }
    let state = Box::from_raw(state.cast::<ModuleState>());
    info!(target: "vtbridge.vtab", module = %state.name, "module released");
    dispose(state);
}

#[repr(C)]
struct NativeTable {
    base: ffi::sqlite3_vtab,
    handle: Handle,
    /// Owning connection; outlives the descriptor.
    db: *mut ffi::sqlite3,
    /// Weak tokens handed out as overload user data, by entry id.
    overload_tokens: HashMap<u64, WeakHandle>,
    config: ModuleConfig,
}

#[repr(C)]
struct NativeCursor {
    base: ffi::sqlite3_vtab_cursor,
    handle: Handle,
    table: WeakHandle,
    config: ModuleConfig,
}

type SharedTable = Mutex<TableInstance>;
type SharedCursor = Mutex<CursorDriver>;

fn locked<T>(target: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    target
        .try_lock()
        .ok_or_else(|| BridgeError::misuse("re-entrant call into virtual table"))
}

fn enter(config: &ModuleConfig, callback: Callback) -> Option<EnteredSpan> {
    metrics::record_call(callback);
    config
        .trace_callbacks
        .then(|| tracing::debug_span!("vtab_callback", callback = callback.name()).entered())
}

/// Status handed back for any failure. The specific code is only logged;
/// the message slot carries the detail.
const FAILURE: c_int = ffi::SQLITE_ERROR;

fn code_of(err: &BridgeError) -> c_int {
    match err {
        BridgeError::Engine { code, .. } => *code,
        other => other.error_code().as_raw(),
    }
}

unsafe fn table_parts(vtab: *mut ffi::sqlite3_vtab) -> (Handle, ModuleConfig) {
    let native = &*vtab.cast::<NativeTable>();
    (native.handle, native.config)
}

unsafe fn cursor_parts(
    cursor: *mut ffi::sqlite3_vtab_cursor,
) -> (Handle, ModuleConfig, *mut ffi::sqlite3_vtab) {
    let native = &*cursor.cast::<NativeCursor>();
    (native.handle, native.config, native.base.pVtab)
}

/// Log `err`, store its message on the table and return its status code.
unsafe fn report(
    vtab: *mut ffi::sqlite3_vtab,
    config: &ModuleConfig,
    callback: Callback,
    err: &BridgeError,
) -> c_int {
    metrics::record_failure();
    warn!(
        target: "vtbridge.vtab",
        callback = callback.name(),
        code = code_of(err),
        error = %err,
        "virtual table callback failed"
    );
    if !vtab.is_null() {
        set_error_slot(&raw mut (*vtab).zErrMsg, &err.to_string(), config.max_error_len);
    }
    FAILURE
}

unsafe fn finish(
    vtab: *mut ffi::sqlite3_vtab,
    config: &ModuleConfig,
    callback: Callback,
    outcome: Result<()>,
) -> c_int {
    match outcome {
        Ok(()) => ffi::SQLITE_OK,
        Err(err) => report(vtab, config, callback, &err),
    }
}

// ---------------------------------------------------------------------------
// Engine host
// ---------------------------------------------------------------------------

struct DbHost {
    db: *mut ffi::sqlite3,
}

impl EngineHost for DbHost {
    fn declare_schema(&self, ddl: &str) -> Result<()> {
        let c_ddl = CString::new(ddl).map_err(|_| BridgeError::InteriorNul {
            what: "schema".to_owned(),
        })?;
        let rc = unsafe { ffi::sqlite3_declare_vtab(self.db, c_ddl.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            let engine = unsafe { engine_error(self.db, rc) };
            Err(BridgeError::invalid_schema(format!("{engine}: {ddl}")))
        }
    }

    fn declare_overload(&self, name: &str, n_args: i32) -> Result<()> {
        let c_name = CString::new(name).map_err(|_| BridgeError::InteriorNul {
            what: "function name".to_owned(),
        })?;
        let rc = unsafe { ffi::sqlite3_overload_function(self.db, c_name.as_ptr(), n_args) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(unsafe { engine_error(self.db, rc) })
        }
    }
}

// ---------------------------------------------------------------------------
// Table callbacks
// ---------------------------------------------------------------------------

unsafe fn read_args(argc: c_int, argv: *const *const c_char) -> Result<Vec<String>> {
    let count = usize::try_from(argc).unwrap_or(0);
    if count == 0 || argv.is_null() {
        return Ok(Vec::new());
    }
    std::slice::from_raw_parts(argv, count)
        .iter()
        .map(|&arg| {
            if arg.is_null() {
                Ok(String::new())
            } else {
                Ok(CStr::from_ptr(arg).to_str()?.to_owned())
            }
        })
        .collect()
}

unsafe fn build_table(
    mode: ConstructMode,
    db: *mut ffi::sqlite3,
    state: &ModuleState,
    argc: c_int,
    argv: *const *const c_char,
) -> Result<Box<NativeTable>> {
    let args = TableArgs::from_argv(&read_args(argc, argv)?)?;
    let instance = guard(|| TableInstance::new(state.factory.as_ref(), args))?;
    let instance: Arc<SharedTable> = Arc::new(Mutex::new(instance));
    let handle = HANDLES.wrap(Arc::clone(&instance));
    let host = DbHost { db };
    if let Err(err) = guard(|| instance.lock().connect(mode, &host)) {
        drop(HANDLES.release(handle));
        dispose(instance);
        return Err(err);
    }
    Ok(Box::new(NativeTable {
        base: mem::zeroed(),
        handle,
        db,
        overload_tokens: HashMap::new(),
        config: state.config,
    }))
}

unsafe fn construct(
    mode: ConstructMode,
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    let state = &*aux.cast::<ModuleState>();
    let callback = match mode {
        ConstructMode::Create => Callback::Create,
        ConstructMode::Connect => Callback::Connect,
    };
    let _span = enter(&state.config, callback);
    match build_table(mode, db, state, argc, argv) {
        Ok(native) => {
            *pp_vtab = Box::into_raw(native).cast::<ffi::sqlite3_vtab>();
            ffi::SQLITE_OK
        }
        Err(err) => {
            metrics::record_failure();
            warn!(
                target: "vtbridge.vtab",
                module = %state.name,
                mode = mode.as_str(),
                code = code_of(&err),
                error = %err,
                "virtual table construction failed"
            );
            set_error_slot(pz_err, &err.to_string(), state.config.max_error_len);
            FAILURE
        }
    }
}

unsafe extern "C" fn x_create(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    construct(ConstructMode::Create, db, aux, argc, argv, pp_vtab, pz_err)
}

unsafe extern "C" fn x_connect(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    construct(ConstructMode::Connect, db, aux, argc, argv, pp_vtab, pz_err)
}

unsafe extern "C" fn x_best_index(
    vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int {
    let (handle, config) = table_parts(vtab);
    let _span = enter(&config, Callback::BestIndex);
    let table = HANDLES.resolve::<SharedTable>(handle);
    let mut selection = read_selection(info);
    let outcome = guard(|| locked(&table)?.select_best_index(&mut selection))
        .and_then(|()| write_selection(info, &selection));
    finish(vtab, &config, Callback::BestIndex, outcome)
}

unsafe fn release_table(vtab: *mut ffi::sqlite3_vtab, callback: Callback) -> c_int {
    let native = Box::from_raw(vtab.cast::<NativeTable>());
    let _span = enter(&native.config, callback);
    let table = HANDLES.resolve::<SharedTable>(native.handle);
    let outcome = guard(|| {
        let mut instance = locked(&table)?;
        if callback == Callback::Destroy {
            instance.destroy();
        } else {
            instance.disconnect();
        }
        Ok(())
    });
    if let Err(err) = outcome {
        metrics::record_failure();
        warn!(target: "vtbridge.vtab", callback = callback.name(), error = %err, "teardown failed");
    }
    drop(table);
    for token in native.overload_tokens.values() {
        HANDLES.release_weak(*token);
    }
    dispose(HANDLES.release(native.handle));
    if !native.base.zErrMsg.is_null() {
        ffi::sqlite3_free(native.base.zErrMsg.cast::<c_void>());
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_disconnect(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    release_table(vtab, Callback::Disconnect)
}

unsafe extern "C" fn x_destroy(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    release_table(vtab, Callback::Destroy)
}

unsafe extern "C" fn x_open(
    vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
    let (handle, config) = table_parts(vtab);
    let _span = enter(&config, Callback::Open);
    let table = HANDLES.resolve::<SharedTable>(handle);
    match guard(|| locked(&table)?.open_cursor()) {
        Ok(driver) => {
            let driver: Arc<SharedCursor> = Arc::new(Mutex::new(driver));
            let cursor = Box::new(NativeCursor {
                base: mem::zeroed(),
                handle: HANDLES.wrap(driver),
                table: HANDLES.wrap_weak(&table),
                config,
            });
            *pp_cursor = Box::into_raw(cursor).cast::<ffi::sqlite3_vtab_cursor>();
            ffi::SQLITE_OK
        }
        Err(err) => report(vtab, &config, Callback::Open, &err),
    }
}

unsafe fn transaction(
    vtab: *mut ffi::sqlite3_vtab,
    callback: Callback,
    hook: fn(&mut TableInstance) -> Result<()>,
) -> c_int {
    let (handle, config) = table_parts(vtab);
    let _span = enter(&config, callback);
    let table = HANDLES.resolve::<SharedTable>(handle);
    let outcome = guard(|| hook(&mut *locked(&table)?));
    finish(vtab, &config, callback, outcome)
}

unsafe extern "C" fn x_begin(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    let (handle, config) = table_parts(vtab);
    let _span = enter(&config, Callback::Begin);
    let host = DbHost {
        db: (*vtab.cast::<NativeTable>()).db,
    };
    let table = HANDLES.resolve::<SharedTable>(handle);
    let outcome = guard(|| locked(&table)?.begin(&host));
    finish(vtab, &config, Callback::Begin, outcome)
}

unsafe extern "C" fn x_sync(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction(vtab, Callback::Sync, TableInstance::sync)
}

unsafe extern "C" fn x_commit(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction(vtab, Callback::Commit, TableInstance::commit)
}

unsafe extern "C" fn x_rollback(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction(vtab, Callback::Rollback, TableInstance::rollback)
}

unsafe extern "C" fn x_update(
    vtab: *mut ffi::sqlite3_vtab,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let (handle, config) = table_parts(vtab);
    let _span = enter(&config, Callback::Update);
    let table = HANDLES.resolve::<SharedTable>(handle);
    let outcome =
        read_values(argc, argv).and_then(|args| guard(|| locked(&table)?.update(&args)));
    match outcome {
        Ok(rowid) => {
            if !p_rowid.is_null() {
                *p_rowid = rowid;
            }
            ffi::SQLITE_OK
        }
        Err(err) => report(vtab, &config, Callback::Update, &err),
    }
}

type ScalarCallback =
    unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value);

unsafe extern "C" fn x_find_function(
    vtab: *mut ffi::sqlite3_vtab,
    n_arg: c_int,
    z_name: *const c_char,
    px_func: *mut Option<ScalarCallback>,
    pp_arg: *mut *mut c_void,
) -> c_int {
    let native = &mut *vtab.cast::<NativeTable>();
    let _span = enter(&native.config, Callback::FindFunction);
    if z_name.is_null() {
        return 0;
    }
    let name = CStr::from_ptr(z_name).to_string_lossy();
    let table = HANDLES.resolve::<SharedTable>(native.handle);
    let entry = table
        .try_lock()
        .and_then(|instance| instance.find_function(&name, n_arg));
    let Some(entry) = entry else {
        return 0;
    };
    let token = *native
        .overload_tokens
        .entry(entry.id())
        .or_insert_with(|| HANDLES.wrap_weak(&entry));
    debug!(target: "vtbridge.overload", function = %name, n_arg, id = entry.id(), "overload bound");
    *px_func = Some(overload_trampoline);
    *pp_arg = token.into_ptr();
    1
}

/// Scalar entry point for every overload. The user data is a weak token
/// for the [`OverloadEntry`].
unsafe extern "C" fn overload_trampoline(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    metrics::record_call(Callback::Overload);
    let mut sink = ContextSink::new(ctx);
    let entry = WeakHandle::from_ptr(ffi::sqlite3_user_data(ctx))
        .and_then(|token| HANDLES.resolve_weak::<OverloadEntry>(token));
    let Some(entry) = entry else {
        metrics::record_failure();
        sink.set_error("function overload is no longer available");
        return;
    };
    match read_values(argc, argv).and_then(|args| guard(|| entry.invoke(&args))) {
        Ok(value) => sink.set_value(value),
        Err(err) => {
            metrics::record_failure();
            debug!(target: "vtbridge.overload", function = %entry.key().name, error = %err, "overload failed");
            sink.set_error(&err.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Cursor callbacks
// ---------------------------------------------------------------------------

unsafe extern "C" fn x_close(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let native = Box::from_raw(cursor.cast::<NativeCursor>());
    let _span = enter(&native.config, Callback::Close);
    let driver = HANDLES.resolve::<SharedCursor>(native.handle);
    if let Err(err) = guard(|| {
        locked(&driver)?.close();
        Ok(())
    }) {
        metrics::record_failure();
        warn!(target: "vtbridge.cursor", error = %err, "cursor close failed");
    }
    drop(driver);
    let table = HANDLES
        .resolve_weak::<SharedTable>(native.table)
        .and_then(|table| table.try_lock().map(|t| t.args().table_name.clone()));
    HANDLES.release_weak(native.table);
    dispose(HANDLES.release(native.handle));
    debug!(target: "vtbridge.cursor", table = table.as_deref().unwrap_or("<released>"), "cursor closed");
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_filter(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let (handle, config, vtab) = cursor_parts(cursor);
    let _span = enter(&config, Callback::Filter);
    let description =
        (!idx_str.is_null()).then(|| CStr::from_ptr(idx_str).to_string_lossy().into_owned());
    let identifier = IndexIdentifier::new(idx_num, description);
    let driver = HANDLES.resolve::<SharedCursor>(handle);
    let outcome = read_values(argc, argv)
        .and_then(|args| guard(|| locked(&driver)?.filter(&identifier, &args).map(drop)));
    finish(vtab, &config, Callback::Filter, outcome)
}

unsafe extern "C" fn x_next(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let (handle, config, vtab) = cursor_parts(cursor);
    let _span = enter(&config, Callback::Next);
    let driver = HANDLES.resolve::<SharedCursor>(handle);
    let outcome = guard(|| locked(&driver)?.next().map(drop));
    finish(vtab, &config, Callback::Next, outcome)
}

unsafe extern "C" fn x_eof(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let (handle, config, _) = cursor_parts(cursor);
    let _span = enter(&config, Callback::Eof);
    let driver = HANDLES.resolve::<SharedCursor>(handle);
    // a cursor we cannot inspect reports end of data
    let eof = driver.try_lock().is_none_or(|d| d.eof());
    c_int::from(eof)
}

unsafe extern "C" fn x_column(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    column: c_int,
) -> c_int {
    let (handle, config, vtab) = cursor_parts(cursor);
    let _span = enter(&config, Callback::Column);
    let driver = HANDLES.resolve::<SharedCursor>(handle);
    let mut sink = ContextSink::new(ctx);
    let outcome = usize::try_from(column)
        .map_err(|_| BridgeError::OutOfRange {
            what: "column ordinal".to_owned(),
            value: column.to_string(),
        })
        .and_then(|ordinal| guard(|| locked(&driver)?.column(ordinal, &mut sink)));
    match outcome {
        Ok(()) => ffi::SQLITE_OK,
        Err(err) => {
            sink.set_error(&err.to_string());
            report(vtab, &config, Callback::Column, &err)
        }
    }
}

unsafe extern "C" fn x_rowid(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let (handle, config, vtab) = cursor_parts(cursor);
    let _span = enter(&config, Callback::Rowid);
    let driver = HANDLES.resolve::<SharedCursor>(handle);
    match guard(|| locked(&driver)?.rowid()) {
        Ok(rowid) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        Err(err) => report(vtab, &config, Callback::Rowid, &err),
    }
}

// ---------------------------------------------------------------------------
// Callback tables
// ---------------------------------------------------------------------------

union ModuleZeroHack {
    bytes: [u8; mem::size_of::<ffi::sqlite3_module>()],
    module: ffi::sqlite3_module,
}

// Fields added by newer engine versions stay null.
const ZERO_MODULE: ffi::sqlite3_module = unsafe {
    ModuleZeroHack {
        bytes: [0_u8; mem::size_of::<ffi::sqlite3_module>()],
    }
    .module
};

const READ_WRITE_CALLBACKS: ffi::sqlite3_module = ffi::sqlite3_module {
    iVersion: 1,
    xCreate: Some(x_create),
    xConnect: Some(x_connect),
    xBestIndex: Some(x_best_index),
    xDisconnect: Some(x_disconnect),
    xDestroy: Some(x_destroy),
    xOpen: Some(x_open),
    xClose: Some(x_close),
    xFilter: Some(x_filter),
    xNext: Some(x_next),
    xEof: Some(x_eof),
    xColumn: Some(x_column),
    xRowid: Some(x_rowid),
    xUpdate: Some(x_update),
    xBegin: Some(x_begin),
    xSync: Some(x_sync),
    xCommit: Some(x_commit),
    xRollback: Some(x_rollback),
    xFindFunction: Some(x_find_function),
    ..ZERO_MODULE
};

static READ_WRITE: ffi::sqlite3_module = READ_WRITE_CALLBACKS;

static NON_TRANSACTIONAL: ffi::sqlite3_module = ffi::sqlite3_module {
    xBegin: None,
    xCommit: None,
    xRollback: None,
    ..READ_WRITE_CALLBACKS
};

static READ_ONLY: ffi::sqlite3_module = ffi::sqlite3_module {
    xUpdate: None,
    xBegin: None,
    xSync: None,
    xCommit: None,
    xRollback: None,
    ..READ_WRITE_CALLBACKS
};

/// The callback table for `capability`.
pub(crate) fn module_for(capability: Capability) -> &'static ffi::sqlite3_module {
    match capability {
        Capability::ReadWrite => &READ_WRITE,
        Capability::NonTransactional => &NON_TRANSACTIONAL,
        Capability::ReadOnly => &READ_ONLY,
    }
}
