// SPDX-License-Identifier: MIT

//! Entity normalization and the scan (reconciliation) pass.
//!
//! A scan buffers the host's full enumeration (bounded by the caller's cap)
//! before touching the store, then applies everything inside one short
//! transaction: upsert observed entities, retire the unobserved, record the
//! session. A host failure mid-enumeration therefore aborts with nothing
//! written and the scan sequence untouched.
//!
//! Coordinate policy: geometry is stored exactly as the host reports it, in
//! the drawing's native world coordinate system; 2-element points are
//! completed with `z = 0`. The crate never converts units.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::host::{DrawingHost, HostEntity, HostError};
use crate::model::{DrawingId, EntityDraft, EntityKind, GeometrySummary, Point3, ScanSession};
use crate::store::{SnapshotStore, StoreError};

/// Host layer every entity falls back to when the host reports none.
pub const DEFAULT_LAYER: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The host reported a type name outside the recognized set. The scanner
    /// downgrades these to `other` instead of dropping them.
    UnsupportedKind { object_name: String },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedKind { object_name } => {
                write!(f, "unsupported entity kind: {object_name}")
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

#[derive(Debug)]
pub enum ScanError {
    /// Enumeration could not start at all.
    Host(HostError),
    /// The host session failed mid-enumeration; nothing was written.
    Aborted {
        drawing_id: DrawingId,
        scanned: usize,
        source: HostError,
    },
    Store(StoreError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(source) => write!(f, "cannot scan: {source}"),
            Self::Aborted {
                drawing_id,
                scanned,
                source,
            } => write!(
                f,
                "scan of {drawing_id} aborted after {scanned} entities: {source}"
            ),
            Self::Store(source) => write!(f, "scan failed in store: {source}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl ScanError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Host(source) => source.kind(),
            Self::Aborted { .. } => "scan_aborted",
            Self::Store(_) => "store_unavailable",
        }
    }
}

/// Maps a host type name onto the closed kind set.
///
/// The names are the ones an AutoCAD-style automation surface reports;
/// growing the mapping means extending this match, never inspecting host
/// objects at runtime.
pub fn kind_for_object_name(object_name: &str) -> Option<EntityKind> {
    match object_name {
        "AcDbLine" => Some(EntityKind::Line),
        "AcDbCircle" => Some(EntityKind::Circle),
        "AcDbText" | "AcDbMText" => Some(EntityKind::Text),
        "AcDbPolyline" | "AcDb2dPolyline" => Some(EntityKind::Polyline),
        _ => None,
    }
}

/// Pure transform from one raw host entity to a canonical draft.
///
/// Fails only for unrecognized type names; the scanner catches that and
/// records the entity through [`normalize_other`] so no entity is ever lost
/// from the count.
pub fn normalize(entity: &HostEntity) -> Result<EntityDraft, NormalizeError> {
    let kind = kind_for_object_name(&entity.object_name).ok_or_else(|| {
        NormalizeError::UnsupportedKind {
            object_name: entity.object_name.clone(),
        }
    })?;

    let geometry = match kind {
        EntityKind::Line => {
            match (
                point_attr(&entity.attributes, "start_point"),
                point_attr(&entity.attributes, "end_point"),
            ) {
                (Some(start), Some(end)) => Some(GeometrySummary::Line { start, end }),
                _ => None,
            }
        }
        EntityKind::Circle => {
            match (
                point_attr(&entity.attributes, "center"),
                number_attr(&entity.attributes, "radius"),
            ) {
                (Some(center), Some(radius)) => Some(GeometrySummary::Circle { center, radius }),
                _ => None,
            }
        }
        EntityKind::Text => point_attr(&entity.attributes, "position").map(|position| {
            GeometrySummary::Text {
                position,
                height: number_attr(&entity.attributes, "height"),
            }
        }),
        EntityKind::Polyline => entity
            .attributes
            .get("vertices")
            .and_then(serde_json::Value::as_array)
            .map(|raw| GeometrySummary::Polyline {
                vertices: raw.iter().filter_map(point_value).collect(),
            }),
        EntityKind::Other => None,
    };

    Ok(EntityDraft {
        handle: entity.handle.clone(),
        kind,
        layer_name: layer_or_default(entity),
        geometry,
        text_content: text_attr(entity),
    })
}

/// Degraded normalization for kinds outside the recognized set: keep the raw
/// attribute payload and whatever text is extractable.
pub fn normalize_other(entity: &HostEntity) -> EntityDraft {
    EntityDraft {
        handle: entity.handle.clone(),
        kind: EntityKind::Other,
        layer_name: layer_or_default(entity),
        geometry: Some(GeometrySummary::Raw {
            attributes: entity.attributes.clone(),
        }),
        text_content: text_attr(entity),
    }
}

/// One reconciliation pass: enumerate, normalize, and atomically bring the
/// snapshot in line with what the host reported.
pub fn scan(
    host: &dyn DrawingHost,
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    cap: usize,
) -> Result<ScanSession, ScanError> {
    let started_at_ms = now_millis();

    let entities = host.enumerate_entities(drawing_id).map_err(ScanError::Host)?;

    let mut drafts: Vec<EntityDraft> = Vec::new();
    let mut truncated = false;
    for item in entities {
        let raw = item.map_err(|source| ScanError::Aborted {
            drawing_id: drawing_id.clone(),
            scanned: drafts.len(),
            source,
        })?;
        if drafts.len() >= cap {
            warn!("scan of {drawing_id} hit the entity cap at {cap}, truncating");
            truncated = true;
            break;
        }
        let draft = match normalize(&raw) {
            Ok(draft) => draft,
            Err(NormalizeError::UnsupportedKind { object_name }) => {
                warn!(
                    "entity {} has unrecognized kind {object_name}, recording as other",
                    raw.handle
                );
                normalize_other(&raw)
            }
        };
        drafts.push(draft);
    }

    let mut txn = store.begin_scan(drawing_id).map_err(ScanError::Store)?;
    for draft in &drafts {
        txn.upsert(draft).map_err(ScanError::Store)?;
    }
    let session = txn
        .commit(started_at_ms, now_millis(), truncated)
        .map_err(ScanError::Store)?;

    info!(
        "scanned {drawing_id}: {} observed, {} active after scan {}",
        drafts.len(),
        session.entity_count,
        session.sequence
    );
    Ok(session)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn layer_or_default(entity: &HostEntity) -> String {
    match entity.layer.as_deref() {
        Some(layer) if !layer.is_empty() => layer.to_owned(),
        _ => DEFAULT_LAYER.to_owned(),
    }
}

/// Text is extracted from any entity that carries it, not only `text` kinds;
/// attribute definitions and dimension overrides also expose text on
/// AutoCAD-style hosts.
fn text_attr(entity: &HostEntity) -> Option<String> {
    entity
        .attributes
        .get("text")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

fn point_attr(attributes: &serde_json::Value, key: &str) -> Option<Point3> {
    attributes.get(key).and_then(point_value)
}

fn point_value(value: &serde_json::Value) -> Option<Point3> {
    let parts = value.as_array()?;
    match parts.as_slice() {
        [x, y] => Some(Point3::xy(x.as_f64()?, y.as_f64()?)),
        [x, y, z] => Some(Point3::new(x.as_f64()?, y.as_f64()?, z.as_f64()?)),
        _ => None,
    }
}

fn number_attr(attributes: &serde_json::Value, key: &str) -> Option<f64> {
    attributes.get(key).and_then(serde_json::Value::as_f64)
}
