//! Virtual table and cursor traits.
//!
//! Virtual tables expose external data sources as SQL tables. The engine
//! drives them through the create/connect, best-index, filter/next and
//! update protocol; the bridge turns those callbacks into calls on these
//! traits.
//!
//! These traits are **open** (user-implementable). A module author provides
//! a [`TableFactory`] that builds one [`VirtualTable`] per table instance;
//! the table hands out boxed [`VirtualTableCursor`]s, so no compile-time
//! pairing between table and cursor types is needed.

use std::sync::Arc;

use vtbridge_error::{BridgeError, Result};
use vtbridge_types::{ResultSink, SqliteValue};

use crate::host::EngineHost;
use crate::index::{IndexIdentifier, IndexSelection};
use crate::overload::{OverloadRegistry, ScalarFunction};
use crate::schema::TableArgs;

/// Builds table instances for one registered module.
pub trait TableFactory: Send + Sync {
    /// Allocate a table instance. No engine state exists yet.
    fn construct(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>>;
}

impl<F> TableFactory for F
where
    F: Fn(&TableArgs) -> Result<Box<dyn VirtualTable>> + Send + Sync,
{
    fn construct(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        self(args)
    }
}

/// What a table may do while it is being opened or a write transaction
/// begins.
pub struct TableContext<'a> {
    args: &'a TableArgs,
    host: &'a dyn EngineHost,
    overloads: &'a mut OverloadRegistry,
}

impl<'a> TableContext<'a> {
    pub(crate) fn new(
        args: &'a TableArgs,
        host: &'a dyn EngineHost,
        overloads: &'a mut OverloadRegistry,
    ) -> Self {
        Self {
            args,
            host,
            overloads,
        }
    }

    pub fn args(&self) -> &TableArgs {
        self.args
    }

    /// Supply this table's own implementation of a scalar function.
    ///
    /// `n_args` of `-1` matches any arity. An overload cannot be removed
    /// again while the table is connected; a second call for the same key
    /// replaces the first, and statements already bound to the old entry
    /// fail when they call it.
    pub fn override_function(
        &mut self,
        name: &str,
        n_args: i32,
        function: Arc<dyn ScalarFunction>,
    ) -> Result<()> {
        self.overloads.override_function(self.host, name, n_args, function)
    }
}

/// A virtual table instance.
///
/// Lifecycle hooks run in this order: [`create`](Self::create) (only for
/// `CREATE VIRTUAL TABLE`), [`schema`](Self::schema), [`open`](Self::open),
/// then any number of planning, scanning and mutation calls, then
/// [`close`](Self::close) and, when the table is dropped,
/// [`drop_storage`](Self::drop_storage).
///
/// # Default Implementations
///
/// Only `schema`, `select_best_index` and `open_cursor` are required. The
/// mutation methods default to [`BridgeError::ReadOnly`]; the transaction
/// hooks default to success.
pub trait VirtualTable: Send {
    /// One-time allocation of backing storage.
    fn create(&mut self, _args: &TableArgs) -> Result<()> {
        Ok(())
    }

    /// The `CREATE TABLE` statement describing this table's columns.
    ///
    /// See [`create_table_statement`](crate::schema::create_table_statement).
    fn schema(&self, args: &TableArgs) -> Result<String>;

    /// Called once the schema has been accepted by the engine.
    fn open(&mut self, _ctx: &mut TableContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Release resources held for this connection.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Irreversibly remove backing storage (`DROP TABLE`).
    fn drop_storage(&mut self) -> Result<()> {
        Ok(())
    }

    /// Choose how to satisfy a query.
    fn select_best_index(&self, selection: &mut IndexSelection) -> Result<()>;

    /// Open a new scan cursor. No row is positioned yet.
    fn open_cursor(&self) -> Result<Box<dyn VirtualTableCursor>>;

    /// Mint a rowid for an insert that did not supply one.
    fn new_rowid(&mut self) -> Result<i64> {
        Err(BridgeError::ReadOnly)
    }

    fn insert_row(&mut self, _rowid: i64, _values: &[SqliteValue]) -> Result<()> {
        Err(BridgeError::ReadOnly)
    }

    /// Replace the column values of the row at `rowid`.
    fn update_row(&mut self, _rowid: i64, _values: &[SqliteValue]) -> Result<()> {
        Err(BridgeError::ReadOnly)
    }

    /// Move the row at `old` to identity `new`, keeping its values.
    fn update_rowid(&mut self, _old: i64, _new: i64) -> Result<()> {
        Err(BridgeError::ReadOnly)
    }

    fn delete_row(&mut self, _rowid: i64) -> Result<()> {
        Err(BridgeError::ReadOnly)
    }

    /// A write transaction starts. Overloads installed through `ctx`
    /// apply to statements prepared from here on.
    fn begin(&mut self, _ctx: &mut TableContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Phase one of commit.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A cursor for scanning a virtual table.
///
/// Cursors are `Send` but not `Sync`: they are single-threaded scan objects
/// bound to one filter invocation at a time.
pub trait VirtualTableCursor: Send {
    /// Begin a scan with the plan chosen during index selection.
    ///
    /// `args` holds the consumed constraint values, in slot order. Returns
    /// whether a row is present.
    fn filter(&mut self, index: &IndexIdentifier, args: &[SqliteValue]) -> Result<bool>;

    /// Advance one row. Returns whether a row is present.
    fn next(&mut self) -> Result<bool>;

    /// Write column `ordinal` of the current row into `sink`.
    fn column(&self, ordinal: usize, sink: &mut dyn ResultSink) -> Result<()>;

    fn rowid(&self) -> Result<i64>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
