// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use tokio::sync::Mutex;

use crate::host::{DrawOp, DrawingHost, ExportFormat, HostError};
use crate::model::{DrawingId, EntityKind, EntityRecord, PatternQuery, QueryMode};
use crate::query::{evaluate, PatternMatches, QueryError};
use crate::scan::{now_millis, scan, ScanError};
use crate::store::{EntityFilter, SnapshotStore, StoreError};
use crate::template::{
    available_templates, generate, TemplateError, TemplateParams,
};

use super::types::*;

const DEFAULT_SCAN_CAP: usize = 100_000;
const DEFAULT_HIGHLIGHT_COLOR: u16 = 1;
const DEFAULT_TEXT_HEIGHT: f64 = 2.5;

/// MCP front end over one drawing host and one snapshot store.
///
/// The host automation surface is non-reentrant, so every host-touching tool
/// serializes through a per-drawing lock; snapshot queries bypass the lock
/// and read committed store state only.
#[derive(Clone)]
pub struct CadScopeMcp {
    host: Arc<dyn DrawingHost>,
    store: SnapshotStore,
    scan_cap: usize,
    drawing_locks: Arc<Mutex<BTreeMap<DrawingId, Arc<Mutex<()>>>>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CadScopeMcp {
    pub fn new(host: Arc<dyn DrawingHost>, store: SnapshotStore) -> Self {
        Self {
            host,
            store,
            scan_cap: DEFAULT_SCAN_CAP,
            drawing_locks: Arc::new(Mutex::new(BTreeMap::new())),
            tool_router: Self::tool_router(),
        }
    }

    /// Caps how many entities a single scan may ingest; a capped scan commits
    /// what it reached and reports itself truncated.
    pub fn with_scan_cap(mut self, scan_cap: usize) -> Self {
        self.scan_cap = scan_cap.max(1);
        self
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    async fn drawing_lock(&self, drawing_id: &DrawingId) -> Arc<Mutex<()>> {
        let mut locks = self.drawing_locks.lock().await;
        locks
            .entry(drawing_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// List drawings currently open on the host; start here, then
    /// `drawing.scan` the one you need before querying it.
    #[tool(name = "drawing.list")]
    async fn drawing_list(&self) -> Result<Json<DrawingListResponse>, ErrorData> {
        let drawings = self.host.list_drawings().map_err(host_error)?;
        Ok(Json(DrawingListResponse {
            drawing_ids: drawings
                .into_iter()
                .map(DrawingId::into_string)
                .collect(),
        }))
    }

    /// Open a new, empty drawing on the host; follow with `draw.*` or
    /// `diagram.generate`, then `drawing.scan` to index it.
    #[tool(name = "drawing.create")]
    async fn drawing_create(
        &self,
        params: Parameters<DrawingCreateParams>,
    ) -> Result<Json<DrawingCreateResponse>, ErrorData> {
        let drawing_id = parse_drawing_id(&params.0.drawing_id)?;

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        self.host.create_drawing(&drawing_id).map_err(host_error)?;

        Ok(Json(DrawingCreateResponse {
            drawing_id: drawing_id.into_string(),
        }))
    }

    /// Reconcile the snapshot with everything currently in the drawing;
    /// run this before `pattern.*` or `entity.query` when the drawing may
    /// have changed.
    #[tool(name = "drawing.scan")]
    async fn drawing_scan(
        &self,
        params: Parameters<DrawingScanParams>,
    ) -> Result<Json<DrawingScanResponse>, ErrorData> {
        let drawing_id = parse_drawing_id(&params.0.drawing_id)?;

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        let session =
            scan(self.host.as_ref(), &self.store, &drawing_id, self.scan_cap).map_err(scan_error)?;

        let mut kind_counts: BTreeMap<String, u64> = BTreeMap::new();
        let active = self
            .store
            .get_active(&drawing_id, &EntityFilter::default())
            .map_err(store_error)?;
        for record in &active {
            *kind_counts.entry(record.kind.as_str().to_owned()).or_insert(0) += 1;
        }

        Ok(Json(DrawingScanResponse {
            drawing_id: drawing_id.into_string(),
            sequence: session.sequence,
            entity_count: session.entity_count,
            kind_counts,
            truncated: session.truncated,
            started_at_ms: session.started_at_ms,
            completed_at_ms: session.completed_at_ms,
        }))
    }

    /// Export the drawing through the host (DWG default, DXF or PDF).
    #[tool(name = "drawing.export")]
    async fn drawing_export(
        &self,
        params: Parameters<DrawingExportParams>,
    ) -> Result<Json<DrawingExportResponse>, ErrorData> {
        let DrawingExportParams {
            drawing_id,
            path,
            format,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        let format_label = format.as_deref().unwrap_or("DWG");
        let format = ExportFormat::parse(format_label).ok_or_else(|| {
            ErrorData::invalid_params(
                "invalid format (expected DWG|DXF|PDF)",
                Some(serde_json::json!({ "format": format_label })),
            )
        })?;

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        self.host
            .export_drawing(&drawing_id, &PathBuf::from(&path), format)
            .map_err(host_error)?;

        Ok(Json(DrawingExportResponse {
            drawing_id: drawing_id.into_string(),
            path,
            format: format.as_str().to_owned(),
        }))
    }

    /// Create (or recolor) a layer; idempotent on the host side.
    #[tool(name = "layer.create")]
    async fn layer_create(
        &self,
        params: Parameters<LayerCreateParams>,
    ) -> Result<Json<LayerCreateResponse>, ErrorData> {
        let LayerCreateParams {
            drawing_id,
            name,
            color,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        if name.is_empty() {
            return Err(ErrorData::invalid_params("layer name must not be empty", None));
        }

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        self.host
            .submit_operation(
                &drawing_id,
                &DrawOp::CreateLayer {
                    name: name.clone(),
                    color,
                },
            )
            .map_err(host_error)?;

        Ok(Json(LayerCreateResponse {
            drawing_id: drawing_id.into_string(),
            name,
        }))
    }

    /// List the drawing's layers as the host reports them.
    #[tool(name = "layer.list")]
    async fn layer_list(
        &self,
        params: Parameters<LayerListParams>,
    ) -> Result<Json<LayerListResponse>, ErrorData> {
        let drawing_id = parse_drawing_id(&params.0.drawing_id)?;

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        let layers = self.host.list_layers(&drawing_id).map_err(host_error)?;

        Ok(Json(LayerListResponse {
            drawing_id: drawing_id.into_string(),
            layers: layers
                .into_iter()
                .map(|layer| LayerSummary {
                    name: layer.name,
                    color: layer.color,
                    is_on: layer.is_on,
                    is_frozen: layer.is_frozen,
                    is_locked: layer.is_locked,
                })
                .collect(),
        }))
    }

    /// Draw a straight line; the snapshot does not change until the next
    /// `drawing.scan`.
    #[tool(name = "draw.line")]
    async fn draw_line(
        &self,
        params: Parameters<DrawLineParams>,
    ) -> Result<Json<DrawResponse>, ErrorData> {
        let DrawLineParams {
            drawing_id,
            start_x,
            start_y,
            end_x,
            end_y,
            layer,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;

        let op = DrawOp::Line {
            start: crate::model::Point3::xy(start_x, start_y),
            end: crate::model::Point3::xy(end_x, end_y),
            layer,
        };
        self.submit_one(&drawing_id, &op).await
    }

    /// Draw a circle; the snapshot does not change until the next
    /// `drawing.scan`.
    #[tool(name = "draw.circle")]
    async fn draw_circle(
        &self,
        params: Parameters<DrawCircleParams>,
    ) -> Result<Json<DrawResponse>, ErrorData> {
        let DrawCircleParams {
            drawing_id,
            center_x,
            center_y,
            radius,
            layer,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ErrorData::invalid_params(
                "radius must be a positive number",
                Some(serde_json::json!({ "radius": radius })),
            ));
        }

        let op = DrawOp::Circle {
            center: crate::model::Point3::xy(center_x, center_y),
            radius,
            layer,
        };
        self.submit_one(&drawing_id, &op).await
    }

    /// Place a text entity; the snapshot does not change until the next
    /// `drawing.scan`.
    #[tool(name = "draw.text")]
    async fn draw_text(
        &self,
        params: Parameters<DrawTextParams>,
    ) -> Result<Json<DrawResponse>, ErrorData> {
        let DrawTextParams {
            drawing_id,
            x,
            y,
            content,
            height,
            layer,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        if content.is_empty() {
            return Err(ErrorData::invalid_params("content must not be empty", None));
        }

        let op = DrawOp::Text {
            position: crate::model::Point3::xy(x, y),
            height: height.unwrap_or(DEFAULT_TEXT_HEIGHT),
            content,
            layer,
        };
        self.submit_one(&drawing_id, &op).await
    }

    /// Query snapshot records with typed filters; reads the last committed
    /// scan, never the live host.
    #[tool(name = "entity.query")]
    async fn entity_query(
        &self,
        params: Parameters<EntityQueryParams>,
    ) -> Result<Json<EntityQueryResponse>, ErrorData> {
        let EntityQueryParams {
            drawing_id,
            layer,
            kind,
            text_contains,
            include_retired,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        let kind = kind
            .as_deref()
            .map(|raw| {
                EntityKind::parse(raw).ok_or_else(|| {
                    ErrorData::invalid_params(
                        "invalid kind (expected line|circle|text|polyline|other)",
                        Some(serde_json::json!({ "kind": raw })),
                    )
                })
            })
            .transpose()?;

        let filter = EntityFilter {
            layer,
            kind,
            text_contains,
            include_retired: include_retired.unwrap_or(false),
        };
        let records = self
            .store
            .get_active(&drawing_id, &filter)
            .map_err(store_error)?;

        Ok(Json(EntityQueryResponse {
            drawing_id: drawing_id.into_string(),
            records: records.into_iter().map(record_view).collect(),
        }))
    }

    /// Recolor entities on the host by handle, typically with handles from
    /// `pattern.highlight`.
    #[tool(name = "entity.highlight")]
    async fn entity_highlight(
        &self,
        params: Parameters<EntityHighlightParams>,
    ) -> Result<Json<EntityHighlightResponse>, ErrorData> {
        let EntityHighlightParams {
            drawing_id,
            handles,
            color,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        let color = color.unwrap_or(DEFAULT_HIGHLIGHT_COLOR);

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;

        let mut highlighted = 0u64;
        for handle in &handles {
            match self.host.submit_operation(
                &drawing_id,
                &DrawOp::SetColor {
                    handle: handle.clone(),
                    color,
                },
            ) {
                Ok(_) => highlighted += 1,
                // Stale handles are expected between scans; skip them.
                Err(HostError::Rejected { .. }) => {}
                Err(err) => return Err(host_error(err)),
            }
        }

        Ok(Json(EntityHighlightResponse {
            drawing_id: drawing_id.into_string(),
            highlighted,
        }))
    }

    /// Count snapshot text entities matching a pattern (substring, or
    /// `*`/`?` glob over the whole text); records the count in
    /// `pattern.stats`.
    #[tool(name = "pattern.count")]
    async fn pattern_count(
        &self,
        params: Parameters<PatternParams>,
    ) -> Result<Json<PatternCountResponse>, ErrorData> {
        let query = pattern_query(params.0, QueryMode::Count)?;
        let result = evaluate(&self.store, &query).map_err(query_error)?;
        let PatternMatches::Count(count) = result else {
            return Err(ErrorData::internal_error("count mode returned non-count", None));
        };

        self.store
            .record_pattern_count(&query.drawing_id, &query.pattern, count, now_millis())
            .map_err(store_error)?;

        Ok(Json(PatternCountResponse {
            drawing_id: query.drawing_id.into_string(),
            pattern: query.pattern,
            count,
        }))
    }

    /// List full matching records, ascending by handle.
    #[tool(name = "pattern.find")]
    async fn pattern_find(
        &self,
        params: Parameters<PatternParams>,
    ) -> Result<Json<PatternFindResponse>, ErrorData> {
        let query = pattern_query(params.0, QueryMode::List)?;
        let result = evaluate(&self.store, &query).map_err(query_error)?;
        let PatternMatches::Records(records) = result else {
            return Err(ErrorData::internal_error("list mode returned non-records", None));
        };

        Ok(Json(PatternFindResponse {
            drawing_id: query.drawing_id.into_string(),
            pattern: query.pattern,
            matches: records.into_iter().map(record_view).collect(),
        }))
    }

    /// Return handles of matching entities for visual marking; pair with
    /// `entity.highlight` to recolor them on the host.
    #[tool(name = "pattern.highlight")]
    async fn pattern_highlight(
        &self,
        params: Parameters<PatternParams>,
    ) -> Result<Json<PatternHighlightResponse>, ErrorData> {
        let query = pattern_query(params.0, QueryMode::Highlight)?;
        let result = evaluate(&self.store, &query).map_err(query_error)?;
        let PatternMatches::Handles(handles) = result else {
            return Err(ErrorData::internal_error(
                "highlight mode returned non-handles",
                None,
            ));
        };

        Ok(Json(PatternHighlightResponse {
            drawing_id: query.drawing_id.into_string(),
            pattern: query.pattern,
            handles,
        }))
    }

    /// Latest recorded count per pattern for a drawing.
    #[tool(name = "pattern.stats")]
    async fn pattern_stats(
        &self,
        params: Parameters<PatternStatsParams>,
    ) -> Result<Json<PatternStatsResponse>, ErrorData> {
        let drawing_id = parse_drawing_id(&params.0.drawing_id)?;
        let stats = self.store.pattern_stats(&drawing_id).map_err(store_error)?;

        Ok(Json(PatternStatsResponse {
            drawing_id: drawing_id.into_string(),
            stats: stats
                .into_iter()
                .map(|stat| PatternStatView {
                    pattern: stat.pattern,
                    count: stat.count,
                    recorded_at_ms: stat.recorded_at_ms,
                })
                .collect(),
        }))
    }

    /// List the available diagram templates and their required parameters.
    #[tool(name = "template.list")]
    async fn template_list(&self) -> Result<Json<TemplateListResponse>, ErrorData> {
        Ok(Json(TemplateListResponse {
            templates: available_templates()
                .iter()
                .map(|template| TemplateSummary {
                    name: template.name.to_owned(),
                    version: template.version,
                    required: template.required.iter().map(|name| (*name).to_owned()).collect(),
                    summary: template.summary.to_owned(),
                })
                .collect(),
        }))
    }

    /// Generate a templated diagram from declarative parameters; plan errors
    /// cost zero host operations, and partial host failures report exact
    /// progress.
    #[tool(name = "diagram.generate")]
    async fn diagram_generate(
        &self,
        params: Parameters<DiagramGenerateParams>,
    ) -> Result<Json<DiagramGenerateResponse>, ErrorData> {
        let DiagramGenerateParams {
            drawing_id,
            template,
            parameters,
        } = params.0;
        let drawing_id = parse_drawing_id(&drawing_id)?;
        let template_params =
            TemplateParams::from_value(&template, parameters.unwrap_or(serde_json::Value::Null))
                .map_err(template_error)?;

        let lock = self.drawing_lock(&drawing_id).await;
        let _guard = lock.lock().await;
        let report = generate(
            self.host.as_ref(),
            &self.store,
            &drawing_id,
            &template,
            &template_params,
        )
        .map_err(template_error)?;

        Ok(Json(DiagramGenerateResponse {
            drawing_id: drawing_id.into_string(),
            template: report.template,
            operations_submitted: report.operations_submitted as u64,
        }))
    }

    async fn submit_one(
        &self,
        drawing_id: &DrawingId,
        op: &DrawOp,
    ) -> Result<Json<DrawResponse>, ErrorData> {
        let lock = self.drawing_lock(drawing_id).await;
        let _guard = lock.lock().await;
        let receipt = self
            .host
            .submit_operation(drawing_id, op)
            .map_err(host_error)?;

        Ok(Json(DrawResponse {
            drawing_id: drawing_id.as_str().to_owned(),
            handle: receipt.handle,
            rescan_required: true,
        }))
    }
}

fn parse_drawing_id(raw: &str) -> Result<DrawingId, ErrorData> {
    DrawingId::new(raw).map_err(|err| {
        ErrorData::invalid_params(
            format!("invalid drawing_id: {err}"),
            Some(serde_json::json!({ "drawing_id": raw })),
        )
    })
}

fn pattern_query(params: PatternParams, mode: QueryMode) -> Result<PatternQuery, ErrorData> {
    let drawing_id = parse_drawing_id(&params.drawing_id)?;
    Ok(PatternQuery {
        drawing_id,
        pattern: params.pattern,
        layer: params.layer,
        mode,
    })
}

fn record_view(record: EntityRecord) -> EntityRecordView {
    let geometry = record
        .geometry
        .as_ref()
        .and_then(|geometry| serde_json::to_value(geometry).ok());
    EntityRecordView {
        handle: record.handle,
        kind: record.kind.as_str().to_owned(),
        layer: record.layer_name,
        text_content: record.text_content,
        geometry,
        last_seen_scan: record.last_seen_scan,
        status: record.status.as_str().to_owned(),
    }
}

fn host_error(err: HostError) -> ErrorData {
    let message = format!("{err}");
    host_error_by_ref(&err, message)
}

fn store_error(err: StoreError) -> ErrorData {
    ErrorData::internal_error(
        format!("{err}"),
        Some(serde_json::json!({ "kind": err.kind() })),
    )
}

fn scan_error(err: ScanError) -> ErrorData {
    match &err {
        ScanError::Host(host) => host_error_by_ref(host, format!("{err}")),
        ScanError::Aborted { scanned, .. } => ErrorData::internal_error(
            format!("{err}"),
            Some(serde_json::json!({ "kind": err.kind(), "scanned": *scanned as u64 })),
        ),
        ScanError::Store(_) => ErrorData::internal_error(
            format!("{err}"),
            Some(serde_json::json!({ "kind": err.kind() })),
        ),
    }
}

fn host_error_by_ref(err: &HostError, message: String) -> ErrorData {
    let data = Some(serde_json::json!({ "kind": err.kind() }));
    match err {
        HostError::DrawingNotFound { drawing_id } => ErrorData::resource_not_found(
            message,
            Some(serde_json::json!({ "kind": err.kind(), "drawing_id": drawing_id })),
        ),
        HostError::Rejected { .. } => ErrorData::invalid_request(message, data),
        HostError::Unavailable { .. } => ErrorData::internal_error(message, data),
    }
}

fn query_error(err: QueryError) -> ErrorData {
    match &err {
        QueryError::Pattern(_) => ErrorData::invalid_params(
            format!("{err}"),
            Some(serde_json::json!({ "kind": err.kind() })),
        ),
        QueryError::Store(_) => ErrorData::internal_error(
            format!("{err}"),
            Some(serde_json::json!({ "kind": err.kind() })),
        ),
    }
}

fn template_error(err: TemplateError) -> ErrorData {
    let kind = err.kind();
    match &err {
        TemplateError::UnknownTemplate { name } => ErrorData::resource_not_found(
            format!("{err}"),
            Some(serde_json::json!({ "kind": kind, "template": name })),
        ),
        TemplateError::MissingParameter { name, .. } => ErrorData::invalid_params(
            format!("{err}"),
            Some(serde_json::json!({ "kind": kind, "parameter": name })),
        ),
        TemplateError::InvalidParameter { name, .. } => ErrorData::invalid_params(
            format!("{err}"),
            Some(serde_json::json!({ "kind": kind, "parameter": name })),
        ),
        TemplateError::UnknownDevice { label } => ErrorData::invalid_params(
            format!("{err}"),
            Some(serde_json::json!({ "kind": kind, "label": label })),
        ),
        TemplateError::Store(_) => ErrorData::internal_error(
            format!("{err}"),
            Some(serde_json::json!({ "kind": kind })),
        ),
        TemplateError::Partial {
            submitted, total, ..
        } => ErrorData::internal_error(
            format!("{err}"),
            Some(serde_json::json!({
                "kind": kind,
                "submitted": *submitted as u64,
                "total": *total as u64,
            })),
        ),
    }
}

#[tool_handler]
impl ServerHandler for CadScopeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "CadScope drawing bridge server (tools: drawing.list, drawing.create, drawing.scan, drawing.export, layer.create, layer.list, draw.line, draw.circle, draw.text, entity.query, entity.highlight, pattern.count, pattern.find, pattern.highlight, pattern.stats, template.list, diagram.generate). Scan a drawing before querying it; pattern queries read the persisted snapshot, not the live host."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests;
