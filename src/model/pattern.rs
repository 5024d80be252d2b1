// SPDX-License-Identifier: MIT

use super::ids::DrawingId;

/// How a pattern query reports its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Number of active matching records.
    Count,
    /// Full records, ascending by handle.
    List,
    /// Handles only, for the host layer to mark visually.
    Highlight,
}

/// A transient text-matching request against the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    pub drawing_id: DrawingId,
    pub pattern: String,
    pub layer: Option<String>,
    pub mode: QueryMode,
}
