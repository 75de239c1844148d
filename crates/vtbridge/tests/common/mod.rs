//! In-memory virtual table shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use vtbridge::{
    BridgeError, ColumnDef, ConstraintOp, IndexIdentifier, IndexSelection, Result, ResultSink,
    SqliteValue, TableArgs, TableContext, TableFactory, VirtualTable, VirtualTableCursor,
    create_table_statement,
};

pub type Rows = Arc<Mutex<BTreeMap<i64, Vec<SqliteValue>>>>;

/// Knobs for misbehaving tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    pub fail_schema: bool,
    pub gap_plan: bool,
    pub panic_on_next: bool,
    /// Replace the `upper` overload with a bracketing one on every begin.
    pub rebind_on_begin: bool,
}

/// Storage and hook journal, shared between the test and every table
/// instance the factory builds.
#[derive(Clone, Default)]
pub struct Shared {
    pub rows: Rows,
    journal: Arc<Mutex<Vec<String>>>,
    pub behavior: Behavior,
}

impl Shared {
    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn record(&self, event: impl Into<String>) {
        self.journal.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn clear_events(&self) {
        self.journal.lock().clear();
    }

    pub fn factory(&self) -> impl TableFactory + 'static {
        let shared = self.clone();
        move |_args: &TableArgs| -> Result<Box<dyn VirtualTable>> {
            Ok(Box::new(MemoryTable {
                shared: shared.clone(),
            }))
        }
    }
}

/// Columns: `id INTEGER, name TEXT, payload BLOB`.
pub struct MemoryTable {
    shared: Shared,
}

impl VirtualTable for MemoryTable {
    fn create(&mut self, args: &TableArgs) -> Result<()> {
        self.shared.record("create");
        if let Some(label) = args.parameter("label") {
            self.shared.record(format!("label={label}"));
        }
        Ok(())
    }

    fn schema(&self, args: &TableArgs) -> Result<String> {
        self.shared.record("schema");
        if self.shared.behavior.fail_schema {
            return Err(BridgeError::implementation("no schema today"));
        }
        create_table_statement(
            &args.table_name,
            &[
                ColumnDef::new("id", "INTEGER"),
                ColumnDef::new("name", "TEXT"),
                ColumnDef::new("payload", "BLOB"),
            ],
        )
    }

    fn open(&mut self, ctx: &mut TableContext<'_>) -> Result<()> {
        self.shared.record("open");
        ctx.override_function(
            "upper",
            1,
            Arc::new(|args: &[SqliteValue]| -> Result<SqliteValue> {
                Ok(SqliteValue::from(format!("<{}>", args[0].to_text())))
            }),
        )?;
        ctx.override_function(
            "substr",
            2,
            Arc::new(|args: &[SqliteValue]| -> Result<SqliteValue> {
                Ok(SqliteValue::from(format!("substr:{}", args[1].to_integer())))
            }),
        )
    }

    fn close(&mut self) -> Result<()> {
        self.shared.record("close");
        Ok(())
    }

    fn drop_storage(&mut self) -> Result<()> {
        self.shared.record("drop_storage");
        self.shared.rows.lock().clear();
        Ok(())
    }

    fn select_best_index(&self, selection: &mut IndexSelection) -> Result<()> {
        let candidate = selection
            .usable_constraints()
            .find(|(_, c)| c.op() == ConstraintOp::Eq && (c.column() == 0 || c.column() == -1))
            .map(|(index, c)| (index, c.column()));
        let Some((index, column)) = candidate else {
            return Ok(());
        };
        if self.shared.behavior.gap_plan {
            return selection.assign(index, 1, true);
        }
        selection.consume(index, false)?;
        selection.identifier = if column == 0 {
            IndexIdentifier::new(1, Some("id-eq".to_owned()))
        } else {
            IndexIdentifier::new(2, Some("rowid-eq".to_owned()))
        };
        selection.estimated_cost = 1.0;
        selection.estimated_rows = Some(1);
        Ok(())
    }

    fn open_cursor(&self) -> Result<Box<dyn VirtualTableCursor>> {
        Ok(Box::new(MemoryCursor::new(self.shared.clone())))
    }

    fn new_rowid(&mut self) -> Result<i64> {
        Ok(self
            .shared
            .rows
            .lock()
            .keys()
            .next_back()
            .map_or(1, |last| last + 1))
    }

    fn insert_row(&mut self, rowid: i64, values: &[SqliteValue]) -> Result<()> {
        self.shared.record(format!("insert {rowid}"));
        let mut rows = self.shared.rows.lock();
        if rows.contains_key(&rowid) {
            return Err(BridgeError::implementation(format!(
                "rowid {rowid} already exists"
            )));
        }
        rows.insert(rowid, values.to_vec());
        Ok(())
    }

    fn update_row(&mut self, rowid: i64, values: &[SqliteValue]) -> Result<()> {
        self.shared.record(format!("update {rowid}"));
        match self.shared.rows.lock().get_mut(&rowid) {
            Some(row) => {
                *row = values.to_vec();
                Ok(())
            }
            None => Err(BridgeError::implementation(format!("no row {rowid}"))),
        }
    }

    fn update_rowid(&mut self, old: i64, new: i64) -> Result<()> {
        self.shared.record(format!("move {old}->{new}"));
        let mut rows = self.shared.rows.lock();
        let row = rows
            .remove(&old)
            .ok_or_else(|| BridgeError::implementation(format!("no row {old}")))?;
        rows.insert(new, row);
        Ok(())
    }

    fn delete_row(&mut self, rowid: i64) -> Result<()> {
        self.shared.record(format!("delete {rowid}"));
        self.shared.rows.lock().remove(&rowid);
        Ok(())
    }

    fn begin(&mut self, ctx: &mut TableContext<'_>) -> Result<()> {
        self.shared.record("begin");
        if !self.shared.behavior.rebind_on_begin {
            return Ok(());
        }
        ctx.override_function(
            "upper",
            1,
            Arc::new(|args: &[SqliteValue]| -> Result<SqliteValue> {
                Ok(SqliteValue::from(format!("[{}]", args[0].to_text())))
            }),
        )
    }

    fn sync(&mut self) -> Result<()> {
        self.shared.record("sync");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.shared.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.shared.record("rollback");
        Ok(())
    }
}

/// Scans a snapshot taken at filter time.
pub struct MemoryCursor {
    shared: Shared,
    matched: Vec<(i64, Vec<SqliteValue>)>,
    position: usize,
}

impl MemoryCursor {
    pub fn new(shared: Shared) -> Self {
        Self {
            shared,
            matched: Vec::new(),
            position: 0,
        }
    }
}

impl VirtualTableCursor for MemoryCursor {
    fn filter(&mut self, index: &IndexIdentifier, args: &[SqliteValue]) -> Result<bool> {
        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.shared
            .record(format!("filter {index} {}", rendered.join(",")));
        let key = args.first();
        self.matched = self
            .shared
            .rows
            .lock()
            .iter()
            .filter(|&(&rowid, values)| match index.code {
                1 => values.first() == key,
                2 => key == Some(&SqliteValue::Integer(rowid)),
                _ => true,
            })
            .map(|(&rowid, values)| (rowid, values.clone()))
            .collect();
        self.position = 0;
        Ok(!self.matched.is_empty())
    }

    fn next(&mut self) -> Result<bool> {
        assert!(
            !self.shared.behavior.panic_on_next,
            "cursor stepped on a rake"
        );
        self.position += 1;
        Ok(self.position < self.matched.len())
    }

    fn column(&self, ordinal: usize, sink: &mut dyn ResultSink) -> Result<()> {
        let (_, values) = &self.matched[self.position];
        sink.set_value(values.get(ordinal).cloned().unwrap_or(SqliteValue::Null));
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.matched[self.position].0)
    }
}
