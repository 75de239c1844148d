//! Value model shared by the virtual-table bridge.
//!
//! [`SqliteValue`] is the owned form of an engine value as seen by table and
//! cursor implementations. [`ResultSink`] is the write side: cursors and
//! overloaded functions report their output through it without knowing
//! whether the destination is a native result context or an in-memory
//! [`ColumnContext`].

pub mod sink;
pub mod value;

pub use sink::{ColumnContext, ResultSink};
pub use value::{SqliteValue, ValueType, format_sqlite_float};
