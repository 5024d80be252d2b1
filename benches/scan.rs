// SPDX-License-Identifier: MIT

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use cadscope::host::{DrawingHost, ScriptedHost};
use cadscope::model::{DrawingId, PatternQuery, QueryMode};
use cadscope::query::{evaluate, PatternMatches};
use cadscope::scan::scan;
use cadscope::store::SnapshotStore;

mod profiler;

// Benchmark identity (keep stable):
// - Group names in this file: `scan.apply`, `pattern.match`
// - Case IDs (the string after the `/`) must remain stable across refactors
//   so results stay comparable over time (e.g. `small`, `medium`, `glob`).
// - If implementations move/deduplicate, update the wiring but do not rename
//   group or case IDs.

fn drawing() -> DrawingId {
    DrawingId::new("bench.dwg").expect("drawing id")
}

fn seeded_host(entities: usize) -> ScriptedHost {
    let id = drawing();
    let host = ScriptedHost::new();
    host.create_drawing(&id).expect("create drawing");
    for index in 0..entities {
        match index % 3 {
            0 => {
                host.insert_entity(
                    &id,
                    "AcDbLine",
                    Some("WIRES"),
                    serde_json::json!({
                        "start_point": [index as f64, 0.0, 0.0],
                        "end_point": [index as f64, 10.0, 0.0],
                    }),
                );
            }
            1 => {
                host.insert_entity(
                    &id,
                    "AcDbCircle",
                    Some("DEVICES"),
                    serde_json::json!({
                        "center": [index as f64, 20.0, 0.0],
                        "radius": 2.5,
                    }),
                );
            }
            _ => {
                host.insert_entity(
                    &id,
                    "AcDbText",
                    Some("NOTES"),
                    serde_json::json!({
                        "text": format!("PMC-3M-{index:05}"),
                        "position": [index as f64, 30.0, 0.0],
                        "height": 2.5,
                    }),
                );
            }
        }
    }
    host
}

fn checksum_matches(result: &PatternMatches) -> u64 {
    match result {
        PatternMatches::Count(count) => *count,
        PatternMatches::Records(records) => records
            .iter()
            .fold(0u64, |acc, record| {
                acc.wrapping_mul(131).wrapping_add(record.handle.len() as u64)
            }),
        PatternMatches::Handles(handles) => handles
            .iter()
            .fold(0u64, |acc, handle| acc.wrapping_mul(131).wrapping_add(handle.len() as u64)),
    }
}

fn benches_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan.apply");

    for (case_id, entities) in [("small", 100usize), ("medium", 2_000usize)] {
        let host = seeded_host(entities);
        group.throughput(Throughput::Elements(entities as u64));
        group.bench_function(case_id, |b| {
            b.iter_batched(
                || SnapshotStore::open_in_memory().expect("open store"),
                |store| {
                    let session =
                        scan(black_box(&host), &store, &drawing(), usize::MAX).expect("scan");
                    black_box(session.entity_count)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benches_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern.match");

    let host = seeded_host(3_000);
    let store = SnapshotStore::open_in_memory().expect("open store");
    scan(&host, &store, &drawing(), usize::MAX).expect("seed snapshot");

    let cases = [
        ("literal_count", "PMC-3M", QueryMode::Count),
        ("glob_list", "PMC-3M-0*", QueryMode::List),
        ("highlight", "PMC-3M-00???", QueryMode::Highlight),
    ];
    for (case_id, pattern, mode) in cases {
        group.bench_function(case_id, |b| {
            let query = PatternQuery {
                drawing_id: drawing(),
                pattern: pattern.to_owned(),
                layer: None,
                mode,
            };
            b.iter(|| {
                let result = evaluate(black_box(&store), black_box(&query)).expect("evaluate");
                black_box(checksum_matches(&result))
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = profiler::criterion();
    targets = benches_scan, benches_pattern
}
criterion_main!(benches);
