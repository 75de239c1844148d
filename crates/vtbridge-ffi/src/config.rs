use serde::{Deserialize, Serialize};

/// What a module's tables support. Selects the native callback table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Reads, writes and transaction hooks.
    #[default]
    ReadWrite,
    /// Reads and writes; begin/commit/rollback are not wired.
    NonTransactional,
    /// Reads only; the engine rejects writes itself.
    ReadOnly,
}

/// Per-module settings, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub capability: Capability,
    /// Open a `vtab_callback` debug span around every callback.
    pub trace_callbacks: bool,
    /// Longest error message, in bytes, placed in the engine's error slot.
    pub max_error_len: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            capability: Capability::ReadWrite,
            trace_callbacks: false,
            max_error_len: 4096,
        }
    }
}

impl ModuleConfig {
    #[must_use]
    pub fn read_only() -> Self {
        Self::default().with_capability(Capability::ReadOnly)
    }

    #[must_use]
    pub const fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    #[must_use]
    pub const fn with_trace_callbacks(mut self, enabled: bool) -> Self {
        self.trace_callbacks = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_error_len(mut self, max_error_len: usize) -> Self {
        self.max_error_len = max_error_len;
        self
    }
}
