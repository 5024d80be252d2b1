// SPDX-License-Identifier: MIT

//! Core data model: typed ids, canonical entity records, scan sessions, and
//! pattern queries.

pub mod entity;
pub mod ids;
pub mod pattern;
pub mod scan;

pub use entity::{EntityDraft, EntityKind, EntityRecord, EntityStatus, GeometrySummary, Point3};
pub use ids::{DrawingId, Id, IdError};
pub use pattern::{PatternQuery, QueryMode};
pub use scan::ScanSession;
