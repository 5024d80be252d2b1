// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DrawingListResponse {
    pub drawing_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawingCreateParams {
    pub drawing_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DrawingCreateResponse {
    pub drawing_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawingScanParams {
    pub drawing_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DrawingScanResponse {
    pub drawing_id: String,
    pub sequence: u64,
    pub entity_count: u64,
    /// Active entities per kind after the scan, mirroring the host's type
    /// summary.
    pub kind_counts: BTreeMap<String, u64>,
    pub truncated: bool,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawingExportParams {
    pub drawing_id: String,
    pub path: String,
    /// DWG (default), DXF, or PDF.
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DrawingExportResponse {
    pub drawing_id: String,
    pub path: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LayerCreateParams {
    pub drawing_id: String,
    pub name: String,
    pub color: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerCreateResponse {
    pub drawing_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LayerListParams {
    pub drawing_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerSummary {
    pub name: String,
    pub color: u16,
    pub is_on: bool,
    pub is_frozen: bool,
    pub is_locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerListResponse {
    pub drawing_id: String,
    pub layers: Vec<LayerSummary>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawLineParams {
    pub drawing_id: String,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawCircleParams {
    pub drawing_id: String,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DrawTextParams {
    pub drawing_id: String,
    pub x: f64,
    pub y: f64,
    pub content: String,
    /// Text height in drawing units; defaults to 2.5.
    pub height: Option<f64>,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DrawResponse {
    pub drawing_id: String,
    /// Host-assigned handle of the created entity, when the host reports one.
    pub handle: Option<String>,
    /// The snapshot only changes on scans; set after any draw worth querying.
    pub rescan_required: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EntityQueryParams {
    pub drawing_id: String,
    pub layer: Option<String>,
    /// One of line|circle|text|polyline|other.
    pub kind: Option<String>,
    pub text_contains: Option<String>,
    pub include_retired: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityRecordView {
    pub handle: String,
    pub kind: String,
    pub layer: String,
    pub text_content: Option<String>,
    pub geometry: Option<serde_json::Value>,
    pub last_seen_scan: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityQueryResponse {
    pub drawing_id: String,
    pub records: Vec<EntityRecordView>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EntityHighlightParams {
    pub drawing_id: String,
    pub handles: Vec<String>,
    /// Host color code (1=red ... 6=magenta); defaults to 1.
    pub color: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityHighlightResponse {
    pub drawing_id: String,
    pub highlighted: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PatternParams {
    pub drawing_id: String,
    pub pattern: String,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternCountResponse {
    pub drawing_id: String,
    pub pattern: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternFindResponse {
    pub drawing_id: String,
    pub pattern: String,
    pub matches: Vec<EntityRecordView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternHighlightResponse {
    pub drawing_id: String,
    pub pattern: String,
    /// Handles for the host layer to mark; no host call happens here.
    pub handles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PatternStatsParams {
    pub drawing_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternStatView {
    pub pattern: String,
    pub count: u64,
    pub recorded_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternStatsResponse {
    pub drawing_id: String,
    pub stats: Vec<PatternStatView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateSummary {
    pub name: String,
    pub version: u32,
    pub required: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateSummary>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramGenerateParams {
    pub drawing_id: String,
    pub template: String,
    /// Template-specific parameter object.
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramGenerateResponse {
    pub drawing_id: String,
    pub template: String,
    pub operations_submitted: u64,
}
