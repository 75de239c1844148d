//! Per-table function overloads.
//!
//! A table may supply its own version of a scalar function for calls whose
//! first argument is one of its columns. Entries are keyed by
//! `(name, num_args)`; `-1` matches any arity.
//!
//! Installing an overload is one-way: the engine offers no call to
//! withdraw the opt-in, so an entry lives until it is replaced by a newer
//! one for the same key or the table goes away.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use vtbridge_error::{BridgeError, Result};
use vtbridge_types::SqliteValue;

use crate::host::EngineHost;
pub use crate::scalar::ScalarFunction;

/// Composite lookup key: `(UPPERCASE name, num_args)`.
///
/// Names are stored as uppercase ASCII for case-insensitive matching.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct FunctionKey {
    pub name: String,
    /// Expected argument count, or `-1` for any.
    pub num_args: i32,
}

impl FunctionKey {
    #[must_use]
    pub fn new(name: &str, num_args: i32) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            num_args,
        }
    }
}

/// One installed overload.
pub struct OverloadEntry {
    id: u64,
    key: FunctionKey,
    function: Arc<dyn ScalarFunction>,
}

impl OverloadEntry {
    /// Identifier unique within the owning registry. A replacement entry
    /// for the same key gets a new id.
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &FunctionKey {
        &self.key
    }

    pub fn invoke(&self, args: &[SqliteValue]) -> Result<SqliteValue> {
        self.function.invoke(args)
    }
}

impl std::fmt::Debug for OverloadEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverloadEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Overloads installed by one table instance.
#[derive(Debug, Default)]
pub struct OverloadRegistry {
    entries: HashMap<FunctionKey, Arc<OverloadEntry>>,
    next_id: u64,
}

impl OverloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opt in with the engine, then install `function` under
    /// `(name, n_args)`, replacing any earlier entry for that key.
    ///
    /// Nothing is installed if the engine refuses the opt-in.
    pub fn override_function(
        &mut self,
        host: &dyn EngineHost,
        name: &str,
        n_args: i32,
        function: Arc<dyn ScalarFunction>,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(BridgeError::implementation("overload function name is empty"));
        }
        if n_args < -1 {
            return Err(BridgeError::OutOfRange {
                what: "overload argument count".to_owned(),
                value: n_args.to_string(),
            });
        }
        host.declare_overload(name, n_args)?;

        let key = FunctionKey::new(name, n_args);
        self.next_id += 1;
        let entry = Arc::new(OverloadEntry {
            id: self.next_id,
            key: key.clone(),
            function,
        });
        let replaced = self.entries.insert(key, entry).is_some();
        info!(
            target: "vtbridge.overload",
            name = %name,
            arity = n_args,
            id = self.next_id,
            replaced,
            "function overload installed"
        );
        Ok(())
    }

    /// Resolve an overload for a call with `n_args` arguments.
    ///
    /// Tries the exact arity first, then the any-arity entry.
    pub fn find(&self, name: &str, n_args: i32) -> Option<Arc<OverloadEntry>> {
        let canon = name.to_ascii_uppercase();
        let exact = FunctionKey {
            name: canon.clone(),
            num_args: n_args,
        };
        if let Some(entry) = self.entries.get(&exact) {
            debug!(target: "vtbridge.overload", name = %canon, arity = n_args, hit = "exact", "overload lookup");
            return Some(Arc::clone(entry));
        }
        let any = FunctionKey {
            name: canon.clone(),
            num_args: -1,
        };
        let result = self.entries.get(&any).map(Arc::clone);
        debug!(
            target: "vtbridge.overload",
            name = %canon,
            arity = n_args,
            hit = if result.is_some() { "any-arity" } else { "miss" },
            "overload lookup"
        );
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Outstanding weak references observe the drop.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(target: "vtbridge.overload", count = self.entries.len(), "overloads released");
        }
        self.entries.clear();
    }
}
