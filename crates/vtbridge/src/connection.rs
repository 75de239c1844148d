//! Connection extension trait for registering virtual table modules.

use rusqlite::Connection;
use vtbridge_error::Result;
use vtbridge_ffi::{ModuleConfig, register_module};
use vtbridge_func::TableFactory;

/// Adds module registration to `rusqlite::Connection`.
///
/// # Examples
///
/// ```ignore
/// use vtbridge::ConnectionExt;
///
/// conn.register_virtual_table_module("memory", |args: &TableArgs| {
///     Ok(Box::new(MemoryTable::new(args)) as Box<dyn VirtualTable>)
/// })?;
/// conn.execute_batch("CREATE VIRTUAL TABLE t USING memory()")?;
/// ```
pub trait ConnectionExt {
    /// Register `factory` under `name` with [`ModuleConfig::default`].
    fn register_virtual_table_module<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: TableFactory + 'static;

    /// Register `factory` under `name` with explicit settings.
    fn register_virtual_table_module_with<F>(
        &self,
        name: &str,
        factory: F,
        config: ModuleConfig,
    ) -> Result<()>
    where
        F: TableFactory + 'static;
}

impl ConnectionExt for Connection {
    fn register_virtual_table_module<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: TableFactory + 'static,
    {
        register_module(self, name, factory, ModuleConfig::default())
    }

    fn register_virtual_table_module_with<F>(
        &self,
        name: &str,
        factory: F,
        config: ModuleConfig,
    ) -> Result<()>
    where
        F: TableFactory + 'static,
    {
        register_module(self, name, factory, config)
    }
}
