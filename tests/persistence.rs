// SPDX-License-Identifier: MIT

//! End-to-end flow over the public API: scan a drawing into an on-disk
//! snapshot, query it, drop everything, and re-attach by drawing id.

use cadscope::host::{DrawingHost, ScriptedHost};
use cadscope::model::{DrawingId, PatternQuery, QueryMode};
use cadscope::query::{evaluate, PatternMatches};
use cadscope::scan::scan;
use cadscope::store::{EntityFilter, SnapshotStore};

const CAP: usize = 10_000;

fn drawing() -> DrawingId {
    DrawingId::new("demo.dwg").expect("drawing id")
}

#[test]
fn snapshot_survives_restart_and_host_loss() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("cadscope.db");
    let id = drawing();

    {
        let host = ScriptedHost::demo(&id);
        let store = SnapshotStore::open(&db_path).expect("open store");
        let session = scan(&host, &store, &id, CAP).expect("scan");
        assert_eq!(session.sequence, 1);
        assert_eq!(session.entity_count, 5);
    }

    // Process restarted, host gone: the snapshot still answers queries.
    let store = SnapshotStore::open(&db_path).expect("reopen store");
    let result = evaluate(
        &store,
        &PatternQuery {
            drawing_id: id.clone(),
            pattern: "PMC-3M".to_owned(),
            layer: None,
            mode: QueryMode::Count,
        },
    )
    .expect("count after reopen");
    assert_eq!(result, PatternMatches::Count(2));

    let records = store.get_active(&id, &EntityFilter::default()).expect("records");
    assert_eq!(records.len(), 5);
    assert_eq!(store.latest_sequence(&id).expect("sequence"), 1);
}

#[test]
fn reconciliation_continues_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("cadscope.db");
    let id = drawing();
    let host = ScriptedHost::demo(&id);

    {
        let store = SnapshotStore::open(&db_path).expect("open store");
        scan(&host, &store, &id, CAP).expect("first scan");
    }

    // The drawing shrinks while no store is attached.
    let victim = host
        .enumerate_entities(&id)
        .expect("enumerate")
        .filter_map(Result::ok)
        .find(|entity| entity.object_name == "AcDbCircle")
        .expect("circle entity");
    assert!(host.remove_entity(&id, &victim.handle));

    let store = SnapshotStore::open(&db_path).expect("reopen store");
    let session = scan(&host, &store, &id, CAP).expect("second scan");
    assert_eq!(session.sequence, 2);
    assert_eq!(session.entity_count, 4);

    let active = store.get_active(&id, &EntityFilter::default()).expect("active");
    assert!(active.iter().all(|record| record.handle != victim.handle));

    let everything = store
        .get_active(
            &id,
            &EntityFilter {
                include_retired: true,
                ..EntityFilter::default()
            },
        )
        .expect("everything");
    assert_eq!(everything.len(), 5);
}
