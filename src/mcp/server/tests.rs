// SPDX-License-Identifier: MIT

use super::*;
use crate::host::ScriptedHost;

fn drawing() -> DrawingId {
    DrawingId::new("demo.dwg").expect("drawing id")
}

fn demo_server() -> CadScopeMcp {
    let host = Arc::new(ScriptedHost::demo(&drawing()));
    let store = SnapshotStore::open_in_memory().expect("open store");
    CadScopeMcp::new(host, store)
}

fn demo_server_with_host() -> (CadScopeMcp, Arc<ScriptedHost>) {
    let host = Arc::new(ScriptedHost::demo(&drawing()));
    let store = SnapshotStore::open_in_memory().expect("open store");
    (CadScopeMcp::new(host.clone(), store), host)
}

async fn scan(server: &CadScopeMcp) -> DrawingScanResponse {
    server
        .drawing_scan(Parameters(DrawingScanParams {
            drawing_id: drawing().into_string(),
        }))
        .await
        .expect("scan")
        .0
}

fn pattern_params(pattern: &str) -> Parameters<PatternParams> {
    Parameters(PatternParams {
        drawing_id: drawing().into_string(),
        pattern: pattern.to_owned(),
        layer: None,
    })
}

#[tokio::test]
async fn drawing_list_reflects_created_drawings() {
    let server = demo_server();
    let listed = server.drawing_list().await.expect("list").0;
    assert_eq!(listed.drawing_ids, vec!["demo.dwg"]);

    server
        .drawing_create(Parameters(DrawingCreateParams {
            drawing_id: "new.dwg".to_owned(),
        }))
        .await
        .expect("create");
    let listed = server.drawing_list().await.expect("list").0;
    assert_eq!(listed.drawing_ids, vec!["demo.dwg", "new.dwg"]);
}

#[tokio::test]
async fn template_list_names_requirements() {
    let server = demo_server();
    let response = server.template_list().await.expect("list").0;
    assert_eq!(response.templates.len(), 2);
    let pmc = response
        .templates
        .iter()
        .find(|template| template.name == "pmc_control")
        .expect("pmc template");
    assert_eq!(pmc.version, 1);
    assert_eq!(pmc.required, ["devices"]);
}

#[tokio::test]
async fn scan_reports_counts_per_kind() {
    let server = demo_server();
    let response = scan(&server).await;

    assert_eq!(response.sequence, 1);
    assert_eq!(response.entity_count, 5);
    assert!(!response.truncated);
    assert_eq!(response.kind_counts.get("line"), Some(&1));
    assert_eq!(response.kind_counts.get("circle"), Some(&1));
    assert_eq!(response.kind_counts.get("text"), Some(&3));
}

#[tokio::test]
async fn pattern_count_matches_documented_example_and_records_stats() {
    let server = demo_server();
    scan(&server).await;

    let response = server
        .pattern_count(pattern_params("PMC-3M"))
        .await
        .expect("count")
        .0;
    assert_eq!(response.count, 2);

    let stats = server
        .pattern_stats(Parameters(PatternStatsParams {
            drawing_id: drawing().into_string(),
        }))
        .await
        .expect("stats")
        .0;
    assert_eq!(stats.stats.len(), 1);
    assert_eq!(stats.stats[0].pattern, "PMC-3M");
    assert_eq!(stats.stats[0].count, 2);
}

#[tokio::test]
async fn pattern_queries_on_unscanned_drawing_return_zero_not_error() {
    let server = demo_server();

    let count = server
        .pattern_count(pattern_params("PMC-3M"))
        .await
        .expect("count")
        .0;
    assert_eq!(count.count, 0);

    let found = server
        .pattern_find(pattern_params("PMC-3M"))
        .await
        .expect("find")
        .0;
    assert!(found.matches.is_empty());
}

#[tokio::test]
async fn highlight_flow_returns_handles_then_recolors_them() {
    let (server, host) = demo_server_with_host();
    scan(&server).await;

    let highlight = server
        .pattern_highlight(pattern_params("PMC-3M"))
        .await
        .expect("highlight")
        .0;
    assert_eq!(highlight.handles.len(), 2);
    // No host interaction yet: highlight only reads the snapshot.
    assert_eq!(host.entity_count(&drawing()), 5);

    let recolored = server
        .entity_highlight(Parameters(EntityHighlightParams {
            drawing_id: drawing().into_string(),
            handles: highlight.handles,
            color: Some(2),
        }))
        .await
        .expect("recolor")
        .0;
    assert_eq!(recolored.highlighted, 2);
}

#[tokio::test]
async fn entity_highlight_skips_stale_handles() {
    let server = demo_server();
    scan(&server).await;

    let recolored = server
        .entity_highlight(Parameters(EntityHighlightParams {
            drawing_id: drawing().into_string(),
            handles: vec!["FFFF".to_owned()],
            color: None,
        }))
        .await
        .expect("recolor")
        .0;
    assert_eq!(recolored.highlighted, 0);
}

#[tokio::test]
async fn entity_query_filters_by_kind_and_layer() {
    let server = demo_server();
    scan(&server).await;

    let texts = server
        .entity_query(Parameters(EntityQueryParams {
            drawing_id: drawing().into_string(),
            layer: Some("PMC".to_owned()),
            kind: Some("text".to_owned()),
            text_contains: None,
            include_retired: None,
        }))
        .await
        .expect("query")
        .0;
    assert_eq!(texts.records.len(), 2);
    assert!(texts
        .records
        .iter()
        .all(|record| record.kind == "text" && record.layer == "PMC"));
}

#[tokio::test]
async fn entity_query_rejects_unknown_kind() {
    let server = demo_server();
    let err = server
        .entity_query(Parameters(EntityQueryParams {
            drawing_id: drawing().into_string(),
            layer: None,
            kind: Some("AcDbLine".to_owned()),
            text_contains: None,
            include_retired: None,
        }))
        .await
        .err().expect("bad kind");
    assert!(err.message.contains("invalid kind"));
}

#[tokio::test]
async fn draws_do_not_appear_until_the_next_scan() {
    let server = demo_server();
    scan(&server).await;

    let drawn = server
        .draw_text(Parameters(DrawTextParams {
            drawing_id: drawing().into_string(),
            x: 5.0,
            y: 5.0,
            content: "PMC-3M-C".to_owned(),
            height: None,
            layer: Some("PMC".to_owned()),
        }))
        .await
        .expect("draw text")
        .0;
    assert!(drawn.handle.is_some());
    assert!(drawn.rescan_required);

    let before = server
        .pattern_count(pattern_params("PMC-3M"))
        .await
        .expect("count")
        .0;
    assert_eq!(before.count, 2);

    scan(&server).await;
    let after = server
        .pattern_count(pattern_params("PMC-3M"))
        .await
        .expect("count")
        .0;
    assert_eq!(after.count, 3);
}

#[tokio::test]
async fn missing_template_parameter_issues_zero_host_operations() {
    let (server, host) = demo_server_with_host();
    let before = host.entity_count(&drawing());

    let err = server
        .diagram_generate(Parameters(DiagramGenerateParams {
            drawing_id: drawing().into_string(),
            template: "pmc_control".to_owned(),
            parameters: None,
        }))
        .await
        .err().expect("missing parameter");
    let data = err.data.as_ref().expect("structured data");
    assert_eq!(data["kind"], "missing_parameter");
    assert_eq!(host.entity_count(&drawing()), before);
}

#[tokio::test]
async fn unknown_template_is_a_structured_error() {
    let server = demo_server();
    let err = server
        .diagram_generate(Parameters(DiagramGenerateParams {
            drawing_id: drawing().into_string(),
            template: "nameplate".to_owned(),
            parameters: None,
        }))
        .await
        .err().expect("unknown template");
    assert_eq!(err.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);
    let data = err.data.as_ref().expect("structured data");
    assert_eq!(data["kind"], "unknown_template");
}

#[tokio::test]
async fn generate_then_scan_then_connect_devices() {
    let server = demo_server();

    let generated = server
        .diagram_generate(Parameters(DiagramGenerateParams {
            drawing_id: drawing().into_string(),
            template: "pmc_control".to_owned(),
            parameters: Some(serde_json::json!({ "devices": 2, "labels": ["P14", "P02"] })),
        }))
        .await
        .expect("generate")
        .0;
    assert_eq!(generated.operations_submitted, 8);

    scan(&server).await;

    let connected = server
        .diagram_generate(Parameters(DiagramGenerateParams {
            drawing_id: drawing().into_string(),
            template: "device_connection".to_owned(),
            parameters: Some(serde_json::json!({ "from": "P14", "to": "P02" })),
        }))
        .await
        .expect("connect")
        .0;
    assert_eq!(connected.operations_submitted, 3);
}

#[tokio::test]
async fn host_loss_surfaces_as_structured_host_unavailable() {
    let (server, host) = demo_server_with_host();
    host.set_offline(true);

    let err = server
        .drawing_scan(Parameters(DrawingScanParams {
            drawing_id: drawing().into_string(),
        }))
        .await
        .err().expect("host down");
    let data = err.data.as_ref().expect("structured data");
    assert_eq!(data["kind"], "host_unavailable");
}

#[tokio::test]
async fn mid_scan_host_loss_keeps_prior_snapshot() {
    let (server, host) = demo_server_with_host();
    scan(&server).await;

    host.fail_enumeration_after(2);
    let err = server
        .drawing_scan(Parameters(DrawingScanParams {
            drawing_id: drawing().into_string(),
        }))
        .await
        .err().expect("aborted scan");
    let data = err.data.as_ref().expect("structured data");
    assert_eq!(data["kind"], "scan_aborted");
    assert_eq!(data["scanned"], 2);

    host.clear_enumeration_failure();
    let count = server
        .pattern_count(pattern_params("PMC-3M"))
        .await
        .expect("count")
        .0;
    assert_eq!(count.count, 2);
}

#[tokio::test]
async fn invalid_drawing_id_is_rejected_up_front() {
    let server = demo_server();
    let err = server
        .drawing_scan(Parameters(DrawingScanParams {
            drawing_id: String::new(),
        }))
        .await
        .err().expect("empty drawing id");
    assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    assert!(err.message.contains("invalid drawing_id"));
}

#[tokio::test]
async fn truncated_scan_is_flagged_in_the_response() {
    let host = Arc::new(ScriptedHost::demo(&drawing()));
    let store = SnapshotStore::open_in_memory().expect("open store");
    let server = CadScopeMcp::new(host, store).with_scan_cap(3);

    let response = scan(&server).await;
    assert!(response.truncated);
    assert_eq!(response.entity_count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_scans_on_one_drawing_serialize() {
    let server = demo_server();

    let first = {
        let server = server.clone();
        tokio::spawn(async move { scan(&server).await })
    };
    let second = {
        let server = server.clone();
        tokio::spawn(async move { scan(&server).await })
    };

    let first = first.await.expect("first scan task");
    let second = second.await.expect("second scan task");

    let mut sequences = vec![first.sequence, second.sequence];
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(first.entity_count, 5);
    assert_eq!(second.entity_count, 5);
}
