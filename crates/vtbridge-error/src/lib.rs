use thiserror::Error;

/// Primary error type for the virtual-table bridge.
///
/// Every failure that can cross the native boundary is one of these
/// variants. The bridge converts them to a status code plus message text
/// before returning to the engine; they never unwind into native code.
#[derive(Error, Debug)]
pub enum BridgeError {
    // === Implementation Errors ===
    /// Failure raised by table, cursor or index-selection code. The message
    /// is surfaced to the engine verbatim.
    #[error("{0}")]
    Implementation(String),

    /// A panic was caught while running implementation code.
    #[error("virtual table implementation panicked: {0}")]
    ImplementationPanic(String),

    /// The table does not support the requested mutation.
    #[error("attempt to write a read-only virtual table")]
    ReadOnly,

    /// The table rejected an index plan it produced itself.
    #[error("invalid index plan: {detail}")]
    InvalidIndexPlan { detail: String },

    /// The schema declared by the table is unusable.
    #[error("invalid virtual table schema: {detail}")]
    InvalidSchema { detail: String },

    // === Protocol Errors ===
    /// Malformed argument shape received from the engine.
    #[error("virtual table protocol violation: {detail}")]
    Protocol { detail: String },

    /// A bridge object was used outside its lifecycle.
    #[error("virtual table misuse: {0}")]
    Misuse(String),

    /// The engine rejected a call made by the bridge.
    #[error("{message}")]
    Engine { code: i32, message: String },

    // === Value Errors ===
    /// Value accessor called on the wrong storage class.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Numeric value does not fit the requested representation.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: String, value: String },

    /// Text destined for the engine contains a NUL byte.
    #[error("{what} contains an interior NUL byte")]
    InteriorNul { what: String },

    /// Text received from the engine is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    // === Internal Errors ===
    /// Operation is not supported by this table.
    #[error("unsupported operation")]
    Unsupported,

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// SQLite result codes the bridge reports or maps to.
///
/// These match the numeric values from C SQLite's `sqlite3.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Attempt to write a read-only database.
    ReadOnly = 8,
    /// Data type mismatch.
    Mismatch = 20,
    /// Library used incorrectly.
    Misuse = 21,
    /// Value out of range.
    Range = 25,
}

impl ErrorCode {
    /// The raw integer value handed to the engine.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl BridgeError {
    /// Map this error to the SQLite code it most closely corresponds to.
    ///
    /// Callbacks always report the generic failure code upward; this value
    /// is recorded alongside the message for diagnostics.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Implementation(_)
            | Self::ImplementationPanic(_)
            | Self::InvalidIndexPlan { .. }
            | Self::InvalidSchema { .. }
            | Self::Engine { .. }
            | Self::InteriorNul { .. }
            | Self::Utf8(_)
            | Self::Unsupported => ErrorCode::Error,
            Self::ReadOnly => ErrorCode::ReadOnly,
            Self::Protocol { .. } | Self::Misuse(_) => ErrorCode::Misuse,
            Self::TypeMismatch { .. } => ErrorCode::Mismatch,
            Self::OutOfRange { .. } => ErrorCode::Range,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error was caused by the engine handing the bridge an
    /// argument shape it never should have produced.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Misuse(_))
    }

    /// Whether this error originated in user table/cursor code.
    pub const fn is_implementation_error(&self) -> bool {
        matches!(
            self,
            Self::Implementation(_)
                | Self::ImplementationPanic(_)
                | Self::ReadOnly
                | Self::InvalidIndexPlan { .. }
                | Self::InvalidSchema { .. }
                | Self::Unsupported
        )
    }

    /// Create an implementation error.
    pub fn implementation(msg: impl Into<String>) -> Self {
        Self::Implementation(msg.into())
    }

    /// Create a protocol violation.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Create a misuse error.
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    /// Create an invalid index plan error.
    pub fn invalid_index_plan(detail: impl Into<String>) -> Self {
        Self::InvalidIndexPlan {
            detail: detail.into(),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(detail: impl Into<String>) -> Self {
        Self::InvalidSchema {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `BridgeError`.
pub type Result<T> = std::result::Result<T, BridgeError>;
