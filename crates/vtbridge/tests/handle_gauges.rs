//! Handle and pinned-blob gauges return to their baseline.
//!
//! The gauges are process-wide, so everything lives in one test to keep
//! other tests in this binary from moving them.

mod common;

use common::{Behavior, Shared};
use rusqlite::Connection;
use vtbridge::{ConnectionExt, HANDLES, bridge_metrics_snapshot, pinned_blob_count};

fn payloads(conn: &Connection) -> Vec<Vec<u8>> {
    let mut stmt = conn.prepare("SELECT payload FROM t ORDER BY id").unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<Vec<u8>>>>()
        .unwrap()
}

#[test]
fn handles_and_blobs_are_released() {
    let live = HANDLES.live();
    let live_weak = HANDLES.live_weak();
    let pinned = pinned_blob_count();

    // failed construction leaves nothing behind
    let conn = Connection::open_in_memory().unwrap();
    let broken = Shared::with_behavior(Behavior {
        fail_schema: true,
        ..Behavior::default()
    });
    conn.register_virtual_table_module("broken", broken.factory())
        .unwrap();
    assert!(
        conn.execute_batch("CREATE VIRTUAL TABLE bad USING broken()")
            .is_err()
    );
    assert_eq!(HANDLES.live(), live);
    assert_eq!(HANDLES.live_weak(), live_weak);

    // a connected table holds exactly one strong handle
    let shared = Shared::default();
    conn.register_virtual_table_module("memory", shared.factory())
        .unwrap();
    conn.execute_batch(
        "CREATE VIRTUAL TABLE t USING memory();
         INSERT INTO t(id, payload) VALUES (1, X'0102');
         INSERT INTO t(id, payload) VALUES (2, X'030405');",
    )
    .unwrap();
    assert_eq!(HANDLES.live(), live + 1);

    // owned blobs are pinned until the engine lets go of them
    let before = bridge_metrics_snapshot();
    assert_eq!(payloads(&conn), vec![vec![1, 2], vec![3, 4, 5]]);
    assert_eq!(pinned_blob_count(), pinned);
    let after = bridge_metrics_snapshot();
    assert!(after.blobs_pinned >= before.blobs_pinned + 2);
    assert!(after.blobs_released >= before.blobs_released + 2);

    // cursor handles are gone once the statement is finalized
    assert_eq!(HANDLES.live(), live + 1);

    // an overload binding keeps one weak token per entry
    let upper: String = conn
        .query_row("SELECT upper(name) FROM t WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(upper, "<>");
    assert_eq!(HANDLES.live_weak(), live_weak + 1);
    let _: String = conn
        .query_row("SELECT upper(name) FROM t WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(HANDLES.live_weak(), live_weak + 1);

    drop(conn);
    assert_eq!(HANDLES.live(), live);
    assert_eq!(HANDLES.live_weak(), live_weak);
    assert_eq!(pinned_blob_count(), pinned);
}
