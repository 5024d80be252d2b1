// SPDX-License-Identifier: MIT

//! Durable snapshot persistence.
//!
//! The snapshot store is the only durable state in the crate. It survives
//! process restart and re-attaches by drawing id, independent of whether the
//! drawing is still open on the host.

pub mod snapshot;

pub use snapshot::{EntityFilter, PatternStat, ScanTxn, SnapshotStore, StoreError};
