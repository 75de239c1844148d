//! Decoding of the engine's single update entry point.
//!
//! The engine reports every INSERT, UPDATE and DELETE through one call
//! carrying `argv`:
//!
//! | shape                                   | meaning                      |
//! |-----------------------------------------|------------------------------|
//! | `[rowid]`                               | delete `rowid`               |
//! | `[NULL, new_or_NULL, c0, c1, ...]`      | insert                       |
//! | `[old, new_or_NULL, c0, c1, ...]`       | update, moving `old` to `new`|

use tracing::debug;
use vtbridge_error::{BridgeError, Result};
use vtbridge_types::SqliteValue;

use crate::vtab::VirtualTable;

/// One decoded mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Delete {
        rowid: i64,
    },
    Insert {
        /// `None` when the statement did not supply a rowid.
        rowid: Option<i64>,
        values: Vec<SqliteValue>,
    },
    Update {
        old_rowid: i64,
        /// `None` when the engine passed NULL for the new rowid.
        new_rowid: Option<i64>,
        values: Vec<SqliteValue>,
    },
}

fn rowid_arg(value: &SqliteValue, which: &str) -> Result<i64> {
    value.as_integer().ok_or_else(|| {
        BridgeError::protocol(format!(
            "{which} rowid must be an integer, got {}",
            value.typeof_str()
        ))
    })
}

fn optional_rowid_arg(value: &SqliteValue, which: &str) -> Result<Option<i64>> {
    if value.is_null() {
        Ok(None)
    } else {
        rowid_arg(value, which).map(Some)
    }
}

impl Mutation {
    /// Decode the engine's argument vector.
    ///
    /// Any shape outside the table above is a protocol violation.
    pub fn decode(argv: &[SqliteValue]) -> Result<Self> {
        match argv {
            [] => Err(BridgeError::protocol("update called with no arguments")),
            [rowid] => {
                if rowid.is_null() {
                    return Err(BridgeError::protocol("delete called with a NULL rowid"));
                }
                Ok(Self::Delete {
                    rowid: rowid_arg(rowid, "delete")?,
                })
            }
            [old, new, values @ ..] => {
                let new_rowid = optional_rowid_arg(new, "new")?;
                if old.is_null() {
                    Ok(Self::Insert {
                        rowid: new_rowid,
                        values: values.to_vec(),
                    })
                } else {
                    Ok(Self::Update {
                        old_rowid: rowid_arg(old, "old")?,
                        new_rowid,
                        values: values.to_vec(),
                    })
                }
            }
        }
    }

    /// Short name for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Delete { .. } => "delete",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
        }
    }

    /// Run this mutation against `table`.
    ///
    /// Returns the effective rowid: the minted or supplied rowid for an
    /// insert, the new identity for an update, the removed rowid for a
    /// delete.
    pub fn apply(self, table: &mut dyn VirtualTable) -> Result<i64> {
        let kind = self.kind();
        let rowid = match self {
            Self::Delete { rowid } => {
                table.delete_row(rowid)?;
                rowid
            }
            Self::Insert { rowid, values } => {
                let rowid = match rowid {
                    Some(rowid) => rowid,
                    None => table.new_rowid()?,
                };
                table.insert_row(rowid, &values)?;
                rowid
            }
            Self::Update {
                old_rowid,
                new_rowid,
                values,
            } => {
                let new_rowid = match new_rowid {
                    Some(rowid) => rowid,
                    None => table.new_rowid()?,
                };
                if new_rowid != old_rowid {
                    table.update_rowid(old_rowid, new_rowid)?;
                }
                table.update_row(new_rowid, &values)?;
                new_rowid
            }
        };
        debug!(target: "vtbridge.update", kind, rowid, "mutation applied");
        Ok(rowid)
    }
}
