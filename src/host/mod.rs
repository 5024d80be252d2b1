// SPDX-License-Identifier: MIT

//! The drawing-host boundary.
//!
//! The CAD application owns all rendering and durable drawing state; CadScope
//! only ever reaches it through this trait. The connection is session-based
//! and may be lost at any point, which surfaces as [`HostError::Unavailable`]
//! to every caller. The host handle is passed explicitly to every operation;
//! connect/disconnect lifecycle belongs to whoever constructs the server.

pub mod scripted;

use std::fmt;
use std::path::Path;

use crate::model::{DrawingId, Point3};

pub use scripted::ScriptedHost;

/// One entity exactly as the host reports it, before normalization.
///
/// `object_name` is the host's own type name (for AutoCAD-style hosts,
/// `AcDbLine`, `AcDbCircle`, ...). `attributes` carries the raw attribute map
/// so unrecognized kinds lose nothing on the way into the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntity {
    pub handle: String,
    pub object_name: String,
    pub layer: Option<String>,
    pub attributes: serde_json::Value,
}

/// Host layer metadata, as returned by `list_layers`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub color: u16,
    pub is_on: bool,
    pub is_frozen: bool,
    pub is_locked: bool,
}

/// A primitive drawing operation submitted to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    CreateLayer {
        name: String,
        color: Option<u16>,
    },
    Line {
        start: Point3,
        end: Point3,
        layer: Option<String>,
    },
    Circle {
        center: Point3,
        radius: f64,
        layer: Option<String>,
    },
    Text {
        position: Point3,
        height: f64,
        content: String,
        layer: Option<String>,
    },
    /// Change the display color of an existing entity, by host handle.
    SetColor {
        handle: String,
        color: u16,
    },
}

impl DrawOp {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CreateLayer { .. } => "create_layer",
            Self::Line { .. } => "line",
            Self::Circle { .. } => "circle",
            Self::Text { .. } => "text",
            Self::SetColor { .. } => "set_color",
        }
    }
}

/// What the host handed back for a submitted operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Host-assigned handle of the created entity, when the operation
    /// created one (layer creation and color changes return none).
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Dwg,
    Dxf,
    Pdf,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DWG" => Some(Self::Dwg),
            "DXF" => Some(Self::Dxf),
            "PDF" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dwg => "DWG",
            Self::Dxf => "DXF",
            Self::Pdf => "PDF",
        }
    }
}

#[derive(Debug)]
pub enum HostError {
    /// The host session is gone (application closed, automation link down).
    Unavailable { detail: String },
    /// The drawing id is not open on the host.
    DrawingNotFound { drawing_id: String },
    /// The host accepted the connection but refused the operation.
    Rejected { detail: String },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { detail } => write!(f, "drawing host unavailable: {detail}"),
            Self::DrawingNotFound { drawing_id } => {
                write!(f, "drawing not open on host: {drawing_id}")
            }
            Self::Rejected { detail } => write!(f, "host rejected operation: {detail}"),
        }
    }
}

impl std::error::Error for HostError {}

impl HostError {
    /// Stable machine-readable kind, used in structured tool errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "host_unavailable",
            Self::DrawingNotFound { .. } => "drawing_not_found",
            Self::Rejected { .. } => "host_rejected",
        }
    }
}

/// Automation surface of the drawing host.
///
/// Enumeration order is host-defined; nothing in the crate relies on it.
pub trait DrawingHost: Send + Sync {
    fn list_drawings(&self) -> Result<Vec<DrawingId>, HostError>;

    fn create_drawing(&self, drawing_id: &DrawingId) -> Result<(), HostError>;

    /// Iterate every entity currently present in the drawing. The iterator
    /// itself is fallible: the session can drop mid-enumeration.
    fn enumerate_entities<'a>(
        &'a self,
        drawing_id: &DrawingId,
    ) -> Result<Box<dyn Iterator<Item = Result<HostEntity, HostError>> + 'a>, HostError>;

    fn list_layers(&self, drawing_id: &DrawingId) -> Result<Vec<LayerInfo>, HostError>;

    fn submit_operation(
        &self,
        drawing_id: &DrawingId,
        op: &DrawOp,
    ) -> Result<SubmitReceipt, HostError>;

    fn export_drawing(
        &self,
        drawing_id: &DrawingId,
        path: &Path,
        format: ExportFormat,
    ) -> Result<(), HostError>;
}
