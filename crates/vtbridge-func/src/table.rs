//! Table lifecycle state machine.
//!
//! A [`TableInstance`] wraps one [`VirtualTable`] for the span of one
//! create/connect ... disconnect/destroy cycle, together with the arguments
//! it was built from and the overloads it installed.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vtbridge_error::{BridgeError, Result};
use vtbridge_types::SqliteValue;

use crate::cursor::CursorDriver;
use crate::host::EngineHost;
use crate::index::IndexSelection;
use crate::mutation::Mutation;
use crate::overload::{OverloadEntry, OverloadRegistry};
use crate::schema::TableArgs;
use crate::vtab::{TableContext, TableFactory, VirtualTable};

/// How a table instance is being attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructMode {
    /// `CREATE VIRTUAL TABLE`: runs the one-time `create` hook.
    Create,
    /// Reattach to existing storage.
    Connect,
}

impl ConstructMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Connect => "connect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Connecting,
    Connected,
    Disconnecting,
    Destroyed,
}

/// One live table instance.
pub struct TableInstance {
    table: Box<dyn VirtualTable>,
    args: TableArgs,
    overloads: OverloadRegistry,
    state: TableState,
}

impl TableInstance {
    /// Allocate a table through `factory`. The instance starts out
    /// `Connecting`; [`connect`](Self::connect) finishes the attach.
    pub fn new(factory: &dyn TableFactory, args: TableArgs) -> Result<Self> {
        let table = factory.construct(&args)?;
        Ok(Self {
            table,
            args,
            overloads: OverloadRegistry::new(),
            state: TableState::Connecting,
        })
    }

    pub const fn state(&self) -> TableState {
        self.state
    }

    pub fn args(&self) -> &TableArgs {
        &self.args
    }

    /// Run the attach sequence: `create` (in [`ConstructMode::Create`]),
    /// `schema`, schema declaration with the engine, then `open`.
    ///
    /// On failure the instance stays `Connecting` and must be discarded
    /// without teardown hooks.
    pub fn connect(&mut self, mode: ConstructMode, host: &dyn EngineHost) -> Result<()> {
        if self.state != TableState::Connecting {
            return Err(BridgeError::misuse(format!(
                "connect called on a table in state {:?}",
                self.state
            )));
        }
        if mode == ConstructMode::Create {
            self.table.create(&self.args)?;
        }
        let ddl = self.table.schema(&self.args)?;
        host.declare_schema(&ddl)?;
        {
            let mut ctx = TableContext::new(&self.args, host, &mut self.overloads);
            self.table.open(&mut ctx)?;
        }
        self.state = TableState::Connected;
        info!(
            target: "vtbridge.vtab",
            module = %self.args.module_name,
            table = %self.args.table_name,
            mode = mode.as_str(),
            "virtual table connected"
        );
        Ok(())
    }

    /// Detach from the connection: `close`, then release overloads.
    ///
    /// Errors from the table are logged and dropped.
    pub fn disconnect(&mut self) {
        self.teardown("disconnect", false);
    }

    /// Remove the table: `close`, then `drop_storage`, then release
    /// overloads. Errors from the table are logged and dropped.
    pub fn destroy(&mut self) {
        self.teardown("destroy", true);
    }

    fn teardown(&mut self, phase: &'static str, drop_storage: bool) {
        if self.state != TableState::Connected {
            warn!(target: "vtbridge.vtab", phase, state = ?self.state, "teardown of a table that is not connected");
            self.overloads.clear();
            self.state = TableState::Destroyed;
            return;
        }
        self.state = TableState::Disconnecting;
        if let Err(err) = self.table.close() {
            warn!(target: "vtbridge.vtab", phase, table = %self.args.table_name, error = %err, "table close failed");
        }
        if drop_storage {
            if let Err(err) = self.table.drop_storage() {
                warn!(target: "vtbridge.vtab", phase, table = %self.args.table_name, error = %err, "table drop failed");
            }
        }
        self.overloads.clear();
        self.state = TableState::Destroyed;
        info!(target: "vtbridge.vtab", phase, table = %self.args.table_name, "virtual table released");
    }

    fn connected(&self, call: &str) -> Result<()> {
        if self.state == TableState::Connected {
            Ok(())
        } else {
            Err(BridgeError::misuse(format!(
                "{call} called on a table in state {:?}",
                self.state
            )))
        }
    }

    /// Let the table choose a plan, then check it is executable.
    pub fn select_best_index(&self, selection: &mut IndexSelection) -> Result<()> {
        self.connected("best_index")?;
        self.table.select_best_index(selection)?;
        selection.validate()
    }

    pub fn open_cursor(&self) -> Result<CursorDriver> {
        self.connected("open")?;
        let cursor = self.table.open_cursor()?;
        debug!(target: "vtbridge.cursor", table = %self.args.table_name, "cursor opened");
        Ok(CursorDriver::new(cursor))
    }

    /// Decode and apply one update call. Returns the effective rowid.
    pub fn update(&mut self, argv: &[SqliteValue]) -> Result<i64> {
        self.connected("update")?;
        Mutation::decode(argv)?.apply(self.table.as_mut())
    }

    /// Start a write transaction. The table may install or replace
    /// overloads through the context it is handed.
    pub fn begin(&mut self, host: &dyn EngineHost) -> Result<()> {
        self.connected("begin")?;
        let mut ctx = TableContext::new(&self.args, host, &mut self.overloads);
        self.table.begin(&mut ctx)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.connected("sync")?;
        self.table.sync()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.connected("commit")?;
        self.table.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.connected("rollback")?;
        self.table.rollback()
    }

    /// Look up an overload for a call with `n_args` arguments.
    pub fn find_function(&self, name: &str, n_args: i32) -> Option<Arc<OverloadEntry>> {
        if self.state != TableState::Connected {
            return None;
        }
        self.overloads.find(name, n_args)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use vtbridge_types::{ColumnContext, ResultSink};

    use super::*;
    use crate::index::IndexIdentifier;
    use crate::overload::tests::RecordingHost;
    use crate::schema::{ColumnDef, create_table_statement};
    use crate::vtab::VirtualTableCursor;

    type Rows = Arc<Mutex<Vec<(i64, Vec<SqliteValue>)>>>;

    /// `(id INTEGER, name TEXT)` table over a shared vector.
    struct People {
        rows: Rows,
        hooks: Arc<Mutex<Vec<&'static str>>>,
        fail_open: bool,
        fail_close: bool,
    }

    struct PeopleCursor {
        rows: Rows,
        pos: usize,
        seen: Arc<Mutex<Option<IndexIdentifier>>>,
    }

    impl VirtualTable for People {
        fn create(&mut self, _args: &TableArgs) -> Result<()> {
            self.hooks.lock().push("create");
            Ok(())
        }

        fn schema(&self, args: &TableArgs) -> Result<String> {
            self.hooks.lock().push("schema");
            create_table_statement(
                &args.table_name,
                &[ColumnDef::new("id", "INTEGER"), ColumnDef::new("name", "TEXT")],
            )
        }

        fn open(&mut self, ctx: &mut TableContext<'_>) -> Result<()> {
            self.hooks.lock().push("open");
            if self.fail_open {
                return Err(BridgeError::implementation("cannot open people"));
            }
            ctx.override_function(
                "upper",
                1,
                Arc::new(|_: &[SqliteValue]| -> Result<SqliteValue> { Ok("PEOPLE".into()) }),
            )
        }

        fn close(&mut self) -> Result<()> {
            self.hooks.lock().push("close");
            if self.fail_close {
                Err(BridgeError::implementation("close failed"))
            } else {
                Ok(())
            }
        }

        fn drop_storage(&mut self) -> Result<()> {
            self.hooks.lock().push("drop");
            self.rows.lock().clear();
            Ok(())
        }

        fn select_best_index(&self, selection: &mut IndexSelection) -> Result<()> {
            selection.identifier = IndexIdentifier::new(7, Some("full-scan".to_owned()));
            selection.estimated_cost = 10.0;
            Ok(())
        }

        fn open_cursor(&self) -> Result<Box<dyn VirtualTableCursor>> {
            Ok(Box::new(PeopleCursor {
                rows: Arc::clone(&self.rows),
                pos: 0,
                seen: Arc::new(Mutex::new(None)),
            }))
        }

        fn insert_row(&mut self, rowid: i64, values: &[SqliteValue]) -> Result<()> {
            self.rows.lock().push((rowid, values.to_vec()));
            Ok(())
        }

        fn begin(&mut self, ctx: &mut TableContext<'_>) -> Result<()> {
            self.hooks.lock().push("begin");
            ctx.override_function(
                "upper",
                1,
                Arc::new(|_: &[SqliteValue]| -> Result<SqliteValue> { Ok("BEGUN".into()) }),
            )
        }
    }

    impl VirtualTableCursor for PeopleCursor {
        fn filter(&mut self, index: &IndexIdentifier, _args: &[SqliteValue]) -> Result<bool> {
            *self.seen.lock() = Some(index.clone());
            self.pos = 0;
            Ok(!self.rows.lock().is_empty())
        }

        fn next(&mut self) -> Result<bool> {
            self.pos += 1;
            Ok(self.pos < self.rows.lock().len())
        }

        fn column(&self, ordinal: usize, sink: &mut dyn ResultSink) -> Result<()> {
            let rows = self.rows.lock();
            let value = rows[self.pos]
                .1
                .get(ordinal)
                .cloned()
                .ok_or_else(|| BridgeError::implementation(format!("no column {ordinal}")))?;
            sink.set_value(value);
            Ok(())
        }

        fn rowid(&self) -> Result<i64> {
            Ok(self.rows.lock()[self.pos].0)
        }
    }

    fn people() -> (People, Rows, Arc<Mutex<Vec<&'static str>>>) {
        let rows: Rows = Arc::new(Mutex::new(Vec::new()));
        let hooks = Arc::new(Mutex::new(Vec::new()));
        let table = People {
            rows: Arc::clone(&rows),
            hooks: Arc::clone(&hooks),
            fail_open: false,
            fail_close: false,
        };
        (table, rows, hooks)
    }

    fn args() -> TableArgs {
        TableArgs::from_argv(&["people", "main", "t"]).unwrap()
    }

    fn instance(table: People) -> TableInstance {
        let cell = Mutex::new(Some(table));
        let factory = move |_: &TableArgs| -> Result<Box<dyn VirtualTable>> {
            let table = cell
                .lock()
                .take()
                .ok_or_else(|| BridgeError::internal("factory already used"))?;
            Ok(Box::new(table))
        };
        TableInstance::new(&factory, args()).unwrap()
    }

    #[test]
    fn create_runs_hooks_in_order() {
        let (table, _, hooks) = people();
        let host = RecordingHost::default();
        let mut inst = instance(table);
        assert_eq!(inst.state(), TableState::Connecting);
        inst.connect(ConstructMode::Create, &host).unwrap();
        assert_eq!(inst.state(), TableState::Connected);
        assert_eq!(hooks.lock().as_slice(), &["create", "schema", "open"]);
        assert_eq!(
            host.schemas.borrow().as_slice(),
            &["CREATE TABLE [t]([id] INTEGER, [name] TEXT)".to_owned()]
        );
        assert_eq!(host.overloads.borrow().as_slice(), &[("upper".to_owned(), 1)]);
    }

    #[test]
    fn connect_skips_create_hook() {
        let (table, _, hooks) = people();
        let mut inst = instance(table);
        inst.connect(ConstructMode::Connect, &RecordingHost::default()).unwrap();
        assert_eq!(hooks.lock().as_slice(), &["schema", "open"]);
    }

    #[test]
    fn failed_open_leaves_instance_connecting() {
        let (mut table, _, _) = people();
        table.fail_open = true;
        let mut inst = instance(table);
        let err = inst
            .connect(ConstructMode::Create, &RecordingHost::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot open people");
        assert_eq!(inst.state(), TableState::Connecting);
        assert!(inst.begin(&RecordingHost::default()).is_err());
    }

    #[test]
    fn engine_schema_rejection_propagates() {
        let (table, _, hooks) = people();
        let host = RecordingHost {
            refuse: true,
            ..RecordingHost::default()
        };
        let mut inst = instance(table);
        let err = inst.connect(ConstructMode::Create, &host).unwrap_err();
        assert!(matches!(err, BridgeError::Engine { .. }));
        assert_eq!(hooks.lock().as_slice(), &["create", "schema"]);
    }

    #[test]
    fn insert_then_scan_one_row() {
        let (table, _, _) = people();
        let mut inst = instance(table);
        inst.connect(ConstructMode::Create, &RecordingHost::default()).unwrap();

        let rowid = inst
            .update(&[SqliteValue::Null, SqliteValue::Integer(5), SqliteValue::Integer(5), "a".into()])
            .unwrap();
        assert_eq!(rowid, 5);

        let mut sel = IndexSelection::new(Vec::new(), Vec::new());
        inst.select_best_index(&mut sel).unwrap();
        let mut cursor = inst.open_cursor().unwrap();
        assert!(cursor.filter(&sel.identifier, &[]).unwrap());
        assert_eq!(cursor.rowid().unwrap(), 5);
        let mut ctx = ColumnContext::new();
        cursor.column(0, &mut ctx).unwrap();
        assert_eq!(ctx.take_value(), Some(SqliteValue::Integer(5)));
        cursor.column(1, &mut ctx).unwrap();
        assert_eq!(ctx.take_value(), Some(SqliteValue::from("a")));
        assert!(!cursor.next().unwrap());
        assert!(cursor.eof());
    }

    #[test]
    fn overloads_resolve_until_teardown() {
        let (table, _, _) = people();
        let mut inst = instance(table);
        inst.connect(ConstructMode::Connect, &RecordingHost::default()).unwrap();
        let entry = inst.find_function("UPPER", 1).unwrap();
        assert_eq!(entry.invoke(&[]).unwrap(), SqliteValue::from("PEOPLE"));
        assert!(inst.find_function("upper", 2).is_none());
        let weak = Arc::downgrade(&entry);
        drop(entry);

        inst.disconnect();
        assert!(weak.upgrade().is_none());
        assert!(inst.find_function("upper", 1).is_none());
    }

    #[test]
    fn begin_replaces_an_overload() {
        let (table, _, hooks) = people();
        let host = RecordingHost::default();
        let mut inst = instance(table);
        inst.connect(ConstructMode::Connect, &host).unwrap();
        let stale = Arc::downgrade(&inst.find_function("upper", 1).unwrap());

        inst.begin(&host).unwrap();
        assert!(stale.upgrade().is_none());
        let entry = inst.find_function("upper", 1).unwrap();
        assert_eq!(entry.invoke(&[]).unwrap(), SqliteValue::from("BEGUN"));
        assert_eq!(hooks.lock().last(), Some(&"begin"));
        assert_eq!(host.overloads.borrow().len(), 2);
    }

    #[test]
    fn destroy_closes_then_drops_and_swallows_errors() {
        let (mut table, rows, hooks) = people();
        table.fail_close = true;
        rows.lock().push((1, vec![]));
        let mut inst = instance(table);
        inst.connect(ConstructMode::Connect, &RecordingHost::default()).unwrap();
        inst.destroy();
        assert_eq!(inst.state(), TableState::Destroyed);
        assert_eq!(hooks.lock().as_slice(), &["schema", "open", "close", "drop"]);
        assert!(rows.lock().is_empty());
        assert!(inst.open_cursor().is_err());
    }

    #[test]
    fn disconnect_keeps_storage() {
        let (table, rows, hooks) = people();
        rows.lock().push((1, vec![]));
        let mut inst = instance(table);
        inst.connect(ConstructMode::Connect, &RecordingHost::default()).unwrap();
        inst.disconnect();
        assert_eq!(hooks.lock().last(), Some(&"close"));
        assert_eq!(rows.lock().len(), 1);
    }
}
