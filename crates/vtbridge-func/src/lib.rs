//! Virtual table protocol, independent of any engine binding.
//!
//! This crate defines the open, user-implementable traits a virtual table
//! module is written against ([`VirtualTable`], [`VirtualTableCursor`],
//! [`TableFactory`], [`ScalarFunction`]) and the state machines the native
//! layer drives on the engine's behalf:
//! - [`TableInstance`]: create/connect, schema declaration, teardown
//! - [`CursorDriver`]: filter/next/eof tracking
//! - [`IndexSelection`]: best-index negotiation and validation
//! - [`Mutation`]: decoding of the polymorphic update call
//! - [`OverloadRegistry`]: per-table function overloads
//!
//! Everything the core needs from the engine goes through [`EngineHost`].

pub mod cursor;
pub mod host;
pub mod index;
pub mod mutation;
pub mod overload;
pub mod scalar;
pub mod schema;
pub mod table;
pub mod vtab;

pub use cursor::{CursorDriver, CursorState};
pub use host::EngineHost;
pub use index::{
    ConstraintOp, ConstraintUsage, DEFAULT_ESTIMATED_COST, IndexConstraint, IndexIdentifier,
    IndexSelection, IndexSortColumn,
};
pub use mutation::Mutation;
pub use overload::{FunctionKey, OverloadEntry, OverloadRegistry};
pub use scalar::ScalarFunction;
pub use schema::{ColumnDef, TableArgs, create_table_statement, dequote};
pub use table::{ConstructMode, TableInstance, TableState};
pub use vtab::{TableContext, TableFactory, VirtualTable, VirtualTableCursor};
