//! Best-index negotiation types.
//!
//! The engine offers a snapshot of candidate WHERE constraints and ORDER BY
//! terms. The table marks the constraints it consumes (assigning each a
//! filter-argument slot), picks an [`IndexIdentifier`] and a cost, and the
//! bridge serializes the result back in the engine's layout.

use std::fmt;

use tracing::debug;
use vtbridge_error::{BridgeError, Result};

/// Planner cost used when neither the engine nor the table supplies one.
pub const DEFAULT_ESTIMATED_COST: f64 = 1_000_000.0;

/// Comparison operator for an index constraint.
///
/// Decoded from the engine's `SQLITE_INDEX_CONSTRAINT_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Match,
    Like,
    Glob,
    Regexp,
    Ne,
    IsNot,
    IsNotNull,
    IsNull,
    Is,
    Limit,
    Offset,
    /// Operator defined by a function overload (codes 150 and above).
    Function(u8),
    /// A code this bridge does not recognize.
    Unknown(u8),
}

impl ConstraintOp {
    /// Decode a raw engine operator code.
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            2 => Self::Eq,
            4 => Self::Gt,
            8 => Self::Le,
            16 => Self::Lt,
            32 => Self::Ge,
            64 => Self::Match,
            65 => Self::Like,
            66 => Self::Glob,
            67 => Self::Regexp,
            68 => Self::Ne,
            69 => Self::IsNot,
            70 => Self::IsNotNull,
            71 => Self::IsNull,
            72 => Self::Is,
            73 => Self::Limit,
            74 => Self::Offset,
            150..=u8::MAX => Self::Function(code),
            _ => Self::Unknown(code),
        }
    }

    /// The raw engine operator code.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Eq => 2,
            Self::Gt => 4,
            Self::Le => 8,
            Self::Lt => 16,
            Self::Ge => 32,
            Self::Match => 64,
            Self::Like => 65,
            Self::Glob => 66,
            Self::Regexp => 67,
            Self::Ne => 68,
            Self::IsNot => 69,
            Self::IsNotNull => 70,
            Self::IsNull => 71,
            Self::Is => 72,
            Self::Limit => 73,
            Self::Offset => 74,
            Self::Function(code) | Self::Unknown(code) => code,
        }
    }
}

/// One candidate constraint from the WHERE clause.
///
/// `column`, `op` and `usable` are the engine's input. `filter_argument`
/// and `double_check` are written by the table during selection.
#[derive(Debug, Clone)]
pub struct IndexConstraint {
    column: i32,
    op: ConstraintOp,
    usable: bool,
    filter_argument: Option<usize>,
    double_check: bool,
}

impl IndexConstraint {
    #[must_use]
    pub const fn new(column: i32, op: ConstraintOp, usable: bool) -> Self {
        Self {
            column,
            op,
            usable,
            filter_argument: None,
            double_check: true,
        }
    }

    /// Column index (0-based; `-1` for the rowid).
    pub const fn column(&self) -> i32 {
        self.column
    }

    pub const fn op(&self) -> ConstraintOp {
        self.op
    }

    /// Whether the engine can supply a value for this constraint in this
    /// plan. Unusable constraints must not be consumed.
    pub const fn usable(&self) -> bool {
        self.usable
    }

    /// 0-based slot in the filter-argument array, if consumed.
    pub const fn filter_argument(&self) -> Option<usize> {
        self.filter_argument
    }

    /// Whether the engine should still test this constraint on returned rows.
    pub const fn double_check(&self) -> bool {
        self.double_check
    }

    /// Keep or waive the engine-side re-check without consuming a slot.
    pub fn set_double_check(&mut self, double_check: bool) {
        self.double_check = double_check;
    }
}

/// One ORDER BY term requested by the query. Input only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSortColumn {
    pub column: i32,
    pub descending: bool,
}

/// The table's own name for the strategy it selected.
///
/// Opaque to the bridge and the engine: it is echoed back unmodified to the
/// cursor's filter call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IndexIdentifier {
    pub code: i32,
    pub description: Option<String>,
}

impl IndexIdentifier {
    #[must_use]
    pub fn new(code: i32, description: Option<String>) -> Self {
        Self { code, description }
    }

    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        Self {
            code,
            description: None,
        }
    }
}

impl fmt::Display for IndexIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}:{desc}", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Per-constraint output record in the engine's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintUsage {
    /// 1-based filter argument position; 0 when not consumed.
    pub argv_index: i32,
    /// Engine may skip its own re-check.
    pub omit: bool,
}

/// A best-index request and the table's answer to it.
#[derive(Debug, Clone)]
pub struct IndexSelection {
    constraints: Vec<IndexConstraint>,
    sort_columns: Vec<IndexSortColumn>,
    next_slot: usize,
    /// Strategy chosen by the table.
    pub identifier: IndexIdentifier,
    /// Relative, non-negative planner cost. Lower is cheaper.
    pub estimated_cost: f64,
    /// Row-count estimate forwarded to the engine when set.
    pub estimated_rows: Option<i64>,
    /// `false` only if rows are guaranteed to arrive in the requested order.
    pub sort_required: bool,
}

impl IndexSelection {
    #[must_use]
    pub fn new(constraints: Vec<IndexConstraint>, sort_columns: Vec<IndexSortColumn>) -> Self {
        Self {
            constraints,
            sort_columns,
            next_slot: 0,
            identifier: IndexIdentifier::default(),
            estimated_cost: DEFAULT_ESTIMATED_COST,
            estimated_rows: None,
            sort_required: true,
        }
    }

    pub fn constraints(&self) -> &[IndexConstraint] {
        &self.constraints
    }

    /// Mutable access to the output fields of one constraint.
    pub fn constraint_mut(&mut self, index: usize) -> Option<&mut IndexConstraint> {
        self.constraints.get_mut(index)
    }

    pub fn sort_columns(&self) -> &[IndexSortColumn] {
        &self.sort_columns
    }

    /// Iterate over usable constraints with their positions.
    pub fn usable_constraints(&self) -> impl Iterator<Item = (usize, &IndexConstraint)> {
        self.constraints.iter().enumerate().filter(|(_, c)| c.usable)
    }

    /// Consume constraint `index`, giving it the next free filter slot.
    ///
    /// Returns the 0-based slot at which the constraint's value will be
    /// delivered to the cursor's filter call.
    pub fn consume(&mut self, index: usize, double_check: bool) -> Result<usize> {
        let slot = self.next_slot;
        self.assign(index, slot, double_check)?;
        self.next_slot = slot + 1;
        Ok(slot)
    }

    /// Consume constraint `index` at an explicit slot.
    ///
    /// Slots are checked for density and uniqueness when the selection is
    /// serialized, not here.
    pub fn assign(&mut self, index: usize, slot: usize, double_check: bool) -> Result<()> {
        let count = self.constraints.len();
        let constraint = self.constraints.get_mut(index).ok_or_else(|| {
            BridgeError::invalid_index_plan(format!(
                "constraint {index} out of range ({count} constraints)"
            ))
        })?;
        if !constraint.usable {
            return Err(BridgeError::invalid_index_plan(format!(
                "constraint {index} is not usable"
            )));
        }
        constraint.filter_argument = Some(slot);
        constraint.double_check = double_check;
        self.next_slot = self.next_slot.max(slot + 1);
        Ok(())
    }

    /// Number of filter arguments the chosen plan will receive.
    pub fn filter_argument_count(&self) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.filter_argument.is_some())
            .count()
    }

    /// Check the plan is one the engine can execute.
    ///
    /// Consumed slots must be unique and dense from 0, consumed constraints
    /// must be usable, and the cost must be a non-negative number.
    pub fn validate(&self) -> Result<()> {
        if self.estimated_cost.is_nan() || self.estimated_cost < 0.0 {
            return Err(BridgeError::invalid_index_plan(format!(
                "estimated cost must be non-negative, got {}",
                self.estimated_cost
            )));
        }
        if let Some(rows) = self.estimated_rows {
            if rows < 0 {
                return Err(BridgeError::invalid_index_plan(format!(
                    "estimated rows must be non-negative, got {rows}"
                )));
            }
        }

        let mut seen = vec![false; self.constraints.len()];
        for (index, constraint) in self.constraints.iter().enumerate() {
            let Some(slot) = constraint.filter_argument else {
                continue;
            };
            if !constraint.usable {
                return Err(BridgeError::invalid_index_plan(format!(
                    "constraint {index} is not usable"
                )));
            }
            match seen.get_mut(slot) {
                Some(taken) if *taken => {
                    return Err(BridgeError::invalid_index_plan(format!(
                        "filter slot {slot} assigned twice"
                    )));
                }
                Some(taken) => *taken = true,
                None => {
                    return Err(BridgeError::invalid_index_plan(format!(
                        "filter slot {slot} leaves a gap"
                    )));
                }
            }
        }
        let used = self.filter_argument_count();
        if let Some(gap) = seen.iter().take(used).position(|taken| !taken) {
            return Err(BridgeError::invalid_index_plan(format!(
                "filter slot {gap} leaves a gap"
            )));
        }
        Ok(())
    }

    /// Validate, then produce one usage record per input constraint, in
    /// input order.
    pub fn constraint_usage(&self) -> Result<Vec<ConstraintUsage>> {
        self.validate()?;
        let usage: Vec<ConstraintUsage> = self
            .constraints
            .iter()
            .map(|c| ConstraintUsage {
                argv_index: c
                    .filter_argument
                    .map_or(0, |slot| i32::try_from(slot + 1).unwrap_or(i32::MAX)),
                omit: c.filter_argument.is_some() && !c.double_check,
            })
            .collect();
        debug!(
            target: "vtbridge.index",
            constraints = usage.len(),
            consumed = self.filter_argument_count(),
            identifier = %self.identifier,
            cost = self.estimated_cost,
            sort_required = self.sort_required,
            "index selection serialized"
        );
        Ok(usage)
    }
}
