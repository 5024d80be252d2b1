// SPDX-License-Identifier: MIT

//! Canonical entity records as persisted by the snapshot store.
//!
//! The drawing host exposes an open-ended, host-defined set of entity types;
//! the model closes it into [`EntityKind`] plus an explicit `Other` escape
//! hatch that keeps the raw host attributes, so nothing the host reports is
//! ever dropped from a scan.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::DrawingId;

/// Closed set of entity kinds the normalizer recognizes.
///
/// New kinds are added by extending this enum, never by runtime type
/// inspection; everything else lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Line,
    Circle,
    Text,
    Polyline,
    Other,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Circle => "circle",
            Self::Text => "text",
            Self::Polyline => "polyline",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "line" => Some(Self::Line),
            "circle" => Some(Self::Circle),
            "text" => Some(Self::Text),
            "polyline" => Some(Self::Polyline),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Active,
    Retired,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

/// A point in the drawing's native world coordinate system.
///
/// Coordinates are stored exactly as the host reports them; hosts that report
/// 2D points get `z = 0`. No unit conversion happens anywhere in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Kind-dependent geometry payload, persisted as JSON alongside the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometrySummary {
    Line {
        start: Point3,
        end: Point3,
    },
    Circle {
        center: Point3,
        radius: f64,
    },
    Text {
        position: Point3,
        height: Option<f64>,
    },
    Polyline {
        vertices: Vec<Point3>,
    },
    /// Whatever the host reported for a kind the normalizer does not model.
    Raw {
        attributes: serde_json::Value,
    },
}

impl GeometrySummary {
    /// Axis-aligned extent of the geometry as `(min_x, min_y, max_x, max_y)`,
    /// when the summary carries enough shape to have one.
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            Self::Line { start, end } => Some((
                start.x.min(end.x),
                start.y.min(end.y),
                start.x.max(end.x),
                start.y.max(end.y),
            )),
            Self::Circle { center, radius } => Some((
                center.x - radius,
                center.y - radius,
                center.x + radius,
                center.y + radius,
            )),
            Self::Text { position, .. } => Some((position.x, position.y, position.x, position.y)),
            Self::Polyline { vertices } => {
                let first = vertices.first()?;
                let mut extent = (first.x, first.y, first.x, first.y);
                for vertex in &vertices[1..] {
                    extent.0 = extent.0.min(vertex.x);
                    extent.1 = extent.1.min(vertex.y);
                    extent.2 = extent.2.max(vertex.x);
                    extent.3 = extent.3.max(vertex.y);
                }
                Some(extent)
            }
            Self::Raw { .. } => None,
        }
    }
}

/// Normalizer output: one entity as observed during a scan, before the
/// scanner stamps status and scan sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub handle: String,
    pub kind: EntityKind,
    pub layer_name: String,
    pub geometry: Option<GeometrySummary>,
    pub text_content: Option<String>,
}

/// One row of the persisted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub drawing_id: DrawingId,
    pub handle: String,
    pub kind: EntityKind,
    pub layer_name: String,
    pub geometry: Option<GeometrySummary>,
    pub text_content: Option<String>,
    pub last_seen_scan: u64,
    pub status: EntityStatus,
}

#[cfg(test)]
mod tests {
    use super::{EntityKind, EntityStatus, GeometrySummary, Point3};

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            EntityKind::Line,
            EntityKind::Circle,
            EntityKind::Text,
            EntityKind::Polyline,
            EntityKind::Other,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("AcDbLine"), None);
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!(EntityStatus::parse("active"), Some(EntityStatus::Active));
        assert_eq!(EntityStatus::parse("retired"), Some(EntityStatus::Retired));
        assert_eq!(EntityStatus::parse("deleted"), None);
    }

    #[test]
    fn circle_extent_spans_the_diameter() {
        let geometry = GeometrySummary::Circle {
            center: Point3::xy(10.0, -2.0),
            radius: 3.0,
        };
        assert_eq!(geometry.extent(), Some((7.0, -5.0, 13.0, 1.0)));
    }

    #[test]
    fn raw_geometry_has_no_extent() {
        let geometry = GeometrySummary::Raw {
            attributes: serde_json::json!({ "flags": 7 }),
        };
        assert_eq!(geometry.extent(), None);
    }

    #[test]
    fn geometry_json_is_kind_tagged() {
        let geometry = GeometrySummary::Line {
            start: Point3::xy(0.0, 0.0),
            end: Point3::xy(1.0, 1.0),
        };
        let json = serde_json::to_value(&geometry).expect("serialize geometry");
        assert_eq!(json["kind"], "line");
        let back: GeometrySummary = serde_json::from_value(json).expect("deserialize geometry");
        assert_eq!(back, geometry);
    }
}
