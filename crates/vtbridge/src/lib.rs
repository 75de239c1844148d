//! Public API facade for the virtual table bridge.
//!
//! Implement [`VirtualTable`] and [`VirtualTableCursor`], wrap construction
//! in a [`TableFactory`], and register it on a `rusqlite::Connection` with
//! [`ConnectionExt`]. The lower crates are re-exported for code that needs
//! the state machines or the handle table directly.

mod connection;

pub use connection::ConnectionExt;

pub use vtbridge_error::{BridgeError, ErrorCode, Result};
pub use vtbridge_ffi::{
    BridgeMetricsSnapshot, Capability, HANDLES, Handle, HandleTable, ModuleConfig, WeakHandle,
    bridge_metrics_snapshot, pinned_blob_count, register_module, reset_bridge_metrics,
};
pub use vtbridge_func::{
    ColumnDef, ConstraintOp, ConstraintUsage, ConstructMode, CursorDriver, CursorState,
    DEFAULT_ESTIMATED_COST, EngineHost, FunctionKey, IndexConstraint, IndexIdentifier,
    IndexSelection, IndexSortColumn, Mutation, OverloadEntry, OverloadRegistry, ScalarFunction,
    TableArgs, TableContext, TableFactory, TableInstance, TableState, VirtualTable,
    VirtualTableCursor, create_table_statement, dequote,
};
pub use vtbridge_types::{ColumnContext, ResultSink, SqliteValue, ValueType};

pub use rusqlite;
