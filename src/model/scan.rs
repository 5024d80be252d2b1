// SPDX-License-Identifier: MIT

use super::ids::DrawingId;

/// Summary of one completed reconciliation pass over a drawing.
///
/// `sequence` is monotonic per drawing and only ever advanced by a committed
/// scan; an aborted scan leaves it untouched. `truncated` marks a pass that
/// hit the configured entity cap and therefore skipped retirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    pub drawing_id: DrawingId,
    pub sequence: u64,
    pub entity_count: u64,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub truncated: bool,
}
