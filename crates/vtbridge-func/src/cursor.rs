//! Cursor state machine.
//!
//! The engine never asks a cursor whether it is at the end. It asks the
//! bridge, and the bridge answers from the flag recorded by the last
//! successful `filter` or `next`. [`CursorDriver`] owns that flag and
//! rejects calls the lifecycle does not allow.

use tracing::{debug, warn};
use vtbridge_error::{BridgeError, Result};
use vtbridge_types::{ResultSink, SqliteValue};

use crate::index::IndexIdentifier;
use crate::vtab::VirtualTableCursor;

/// Where a cursor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created; no filter applied yet.
    Opened,
    /// Positioned on a row.
    Iterating,
    /// Filter or next reported no row.
    Exhausted,
    /// Closed; every further call is misuse.
    Closed,
}

/// Drives one [`VirtualTableCursor`] and tracks its row-present flag.
pub struct CursorDriver {
    cursor: Box<dyn VirtualTableCursor>,
    state: CursorState,
    row_present: bool,
}

impl CursorDriver {
    #[must_use]
    pub fn new(cursor: Box<dyn VirtualTableCursor>) -> Self {
        Self {
            cursor,
            state: CursorState::Opened,
            row_present: false,
        }
    }

    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Apply a plan. May be called again to restart the scan.
    ///
    /// On failure the row-present flag keeps its previous value.
    pub fn filter(&mut self, index: &IndexIdentifier, args: &[SqliteValue]) -> Result<bool> {
        self.ensure_open("filter")?;
        let present = self.cursor.filter(index, args)?;
        debug!(
            target: "vtbridge.cursor",
            index = %index,
            args = args.len(),
            row_present = present,
            "cursor filtered"
        );
        Ok(self.record(present))
    }

    /// Advance one row. Only valid while positioned on a row.
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_open("next")?;
        match self.state {
            CursorState::Opened => return Err(BridgeError::misuse("next called before filter")),
            CursorState::Exhausted => {
                return Err(BridgeError::misuse("next called on an exhausted cursor"));
            }
            CursorState::Iterating | CursorState::Closed => {}
        }
        let present = self.cursor.next()?;
        Ok(self.record(present))
    }

    /// Whether the scan is past its last row.
    ///
    /// A pure read of the tracked flag; the cursor is not consulted.
    pub const fn eof(&self) -> bool {
        !self.row_present
    }

    /// Write column `ordinal` of the current row into `sink`.
    pub fn column(&self, ordinal: usize, sink: &mut dyn ResultSink) -> Result<()> {
        self.ensure_row("column")?;
        self.cursor.column(ordinal, sink)
    }

    pub fn rowid(&self) -> Result<i64> {
        self.ensure_row("rowid")?;
        self.cursor.rowid()
    }

    /// Close the cursor. Failures are logged, never returned.
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        if let Err(err) = self.cursor.close() {
            warn!(target: "vtbridge.cursor", phase = "close", error = %err, "cursor close failed");
        }
        self.state = CursorState::Closed;
        self.row_present = false;
    }

    fn record(&mut self, present: bool) -> bool {
        self.row_present = present;
        self.state = if present {
            CursorState::Iterating
        } else {
            CursorState::Exhausted
        };
        present
    }

    fn ensure_open(&self, call: &str) -> Result<()> {
        if self.state == CursorState::Closed {
            return Err(BridgeError::misuse(format!("{call} called on a closed cursor")));
        }
        Ok(())
    }

    fn ensure_row(&self, call: &str) -> Result<()> {
        self.ensure_open(call)?;
        if !self.row_present {
            return Err(BridgeError::misuse(format!("{call} called with no current row")));
        }
        Ok(())
    }
}

impl Drop for CursorDriver {
    fn drop(&mut self) {
        self.close();
    }
}
