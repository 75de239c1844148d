use vtbridge_error::Result;

/// Calls the bridge makes back into the engine while constructing a table.
///
/// The native layer implements this over a live database handle; tests use
/// a recording mock.
pub trait EngineHost {
    /// Register the table's `CREATE TABLE` statement.
    fn declare_schema(&self, ddl: &str) -> Result<()>;

    /// Opt this connection into letting virtual tables overload `name` with
    /// `n_args` arguments.
    fn declare_overload(&self, name: &str, n_args: i32) -> Result<()>;
}
