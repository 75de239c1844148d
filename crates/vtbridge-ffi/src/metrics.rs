//! Callback counters.
//!
//! Counters are process-wide and monotonic until reset; gauges are read
//! from their owners at snapshot time.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::handle::HANDLES;
use crate::result::pinned_blob_count;

/// Native callbacks the bridge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Callback {
    Create,
    Connect,
    BestIndex,
    Disconnect,
    Destroy,
    Open,
    Close,
    Filter,
    Next,
    Eof,
    Column,
    Rowid,
    Update,
    Begin,
    Sync,
    Commit,
    Rollback,
    FindFunction,
    Overload,
}

impl Callback {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Create => "xCreate",
            Self::Connect => "xConnect",
            Self::BestIndex => "xBestIndex",
            Self::Disconnect => "xDisconnect",
            Self::Destroy => "xDestroy",
            Self::Open => "xOpen",
            Self::Close => "xClose",
            Self::Filter => "xFilter",
            Self::Next => "xNext",
            Self::Eof => "xEof",
            Self::Column => "xColumn",
            Self::Rowid => "xRowid",
            Self::Update => "xUpdate",
            Self::Begin => "xBegin",
            Self::Sync => "xSync",
            Self::Commit => "xCommit",
            Self::Rollback => "xRollback",
            Self::FindFunction => "xFindFunction",
            Self::Overload => "overload",
        }
    }
}

const CALLBACKS: usize = 19;

static CALLS: [AtomicU64; CALLBACKS] = [const { AtomicU64::new(0) }; CALLBACKS];
static FAILURES: AtomicU64 = AtomicU64::new(0);
static PINS: AtomicU64 = AtomicU64::new(0);
static UNPINS: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_call(callback: Callback) {
    CALLS[callback as usize].fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_failure() {
    FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_pin() {
    PINS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_unpin() {
    UNPINS.fetch_add(1, Ordering::Relaxed);
}

fn calls(callback: Callback) -> u64 {
    CALLS[callback as usize].load(Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct BridgeMetricsSnapshot {
    pub create: u64,
    pub connect: u64,
    pub best_index: u64,
    pub disconnect: u64,
    pub destroy: u64,
    pub open: u64,
    pub close: u64,
    pub filter: u64,
    pub next: u64,
    pub eof: u64,
    pub column: u64,
    pub rowid: u64,
    pub update: u64,
    pub begin: u64,
    pub sync: u64,
    pub commit: u64,
    pub rollback: u64,
    pub find_function: u64,
    pub overload_calls: u64,
    /// Callbacks that reported a failure status.
    pub failures: u64,
    pub blobs_pinned: u64,
    pub blobs_released: u64,
    /// Gauge: strong handles currently issued.
    pub live_handles: usize,
    /// Gauge: weak handles currently issued.
    pub live_weak_handles: usize,
    /// Gauge: blobs the engine has not yet released.
    pub pinned_blobs: usize,
}

impl BridgeMetricsSnapshot {
    /// Total callback invocations.
    pub fn total(&self) -> u64 {
        self.create
            + self.connect
            + self.best_index
            + self.disconnect
            + self.destroy
            + self.open
            + self.close
            + self.filter
            + self.next
            + self.eof
            + self.column
            + self.rowid
            + self.update
            + self.begin
            + self.sync
            + self.commit
            + self.rollback
            + self.find_function
            + self.overload_calls
    }
}

pub fn bridge_metrics_snapshot() -> BridgeMetricsSnapshot {
    BridgeMetricsSnapshot {
        create: calls(Callback::Create),
        connect: calls(Callback::Connect),
        best_index: calls(Callback::BestIndex),
        disconnect: calls(Callback::Disconnect),
        destroy: calls(Callback::Destroy),
        open: calls(Callback::Open),
        close: calls(Callback::Close),
        filter: calls(Callback::Filter),
        next: calls(Callback::Next),
        eof: calls(Callback::Eof),
        column: calls(Callback::Column),
        rowid: calls(Callback::Rowid),
        update: calls(Callback::Update),
        begin: calls(Callback::Begin),
        sync: calls(Callback::Sync),
        commit: calls(Callback::Commit),
        rollback: calls(Callback::Rollback),
        find_function: calls(Callback::FindFunction),
        overload_calls: calls(Callback::Overload),
        failures: FAILURES.load(Ordering::Relaxed),
        blobs_pinned: PINS.load(Ordering::Relaxed),
        blobs_released: UNPINS.load(Ordering::Relaxed),
        live_handles: HANDLES.live(),
        live_weak_handles: HANDLES.live_weak(),
        pinned_blobs: pinned_blob_count(),
    }
}

/// Zero the counters. Gauges are unaffected.
pub fn reset_bridge_metrics() {
    for counter in &CALLS {
        counter.store(0, Ordering::Relaxed);
    }
    FAILURES.store(0, Ordering::Relaxed);
    PINS.store(0, Ordering::Relaxed);
    UNPINS.store(0, Ordering::Relaxed);
}
