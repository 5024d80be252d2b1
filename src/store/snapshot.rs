// SPDX-License-Identifier: MIT

//! SQLite-backed snapshot of drawing contents.
//!
//! One row per `(drawing_id, handle)` in `entities`, one row per committed
//! scan in `scans`, and a small `pattern_stats` table recording the latest
//! count per pattern. Retirement is a soft-delete: rows flip to `retired`
//! and default queries exclude them, but the row stays for audit.
//!
//! A scan's writes happen inside one SQLite transaction held by [`ScanTxn`];
//! readers on the shared connection either run before `BEGIN` or after
//! `COMMIT`/`ROLLBACK`, so a half-applied scan is never observable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::model::{
    DrawingId, EntityDraft, EntityKind, EntityRecord, EntityStatus, GeometrySummary, ScanSession,
};

#[derive(Debug)]
pub enum StoreError {
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    Sqlite {
        context: &'static str,
        source: rusqlite::Error,
    },
    /// A persisted row no longer maps onto the model (unknown kind/status,
    /// unreadable geometry payload).
    Corrupt {
        context: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "cannot open snapshot store at {path:?}: {source}")
            }
            Self::Sqlite { context, source } => write!(f, "store failure ({context}): {source}"),
            Self::Corrupt { context } => write!(f, "corrupt snapshot row: {context}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Stable machine-readable kind for structured tool errors. Storage
    /// failures are never silently swallowed; they all surface as this.
    pub fn kind(&self) -> &'static str {
        "store_unavailable"
    }
}

/// Filters applied by [`SnapshotStore::get_active`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub layer: Option<String>,
    pub kind: Option<EntityKind>,
    /// Plain substring filter pushed down to SQL `LIKE`; wildcard-aware
    /// matching lives in the query module on top of this.
    pub text_contains: Option<String>,
    pub include_retired: bool,
}

/// Latest recorded count for one pattern in one drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternStat {
    pub pattern: String,
    pub count: u64,
    pub recorded_at_ms: u64,
}

#[derive(Clone)]
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!("snapshot store ready at {}", path.display());
        Ok(store)
    }

    /// Opens an in-memory store (tests, benches).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                drawing_id TEXT NOT NULL,
                handle TEXT NOT NULL,
                kind TEXT NOT NULL,
                layer TEXT NOT NULL,
                geometry TEXT,
                text_content TEXT,
                last_seen_scan INTEGER NOT NULL,
                status TEXT NOT NULL,
                UNIQUE(drawing_id, handle)
            );

            CREATE INDEX IF NOT EXISTS idx_entities_drawing_status
                ON entities (drawing_id, status);

            CREATE TABLE IF NOT EXISTS scans (
                drawing_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                entity_count INTEGER NOT NULL,
                started_at INTEGER NOT NULL,
                completed_at INTEGER NOT NULL,
                truncated INTEGER NOT NULL DEFAULT 0,
                UNIQUE(drawing_id, sequence)
            );

            CREATE TABLE IF NOT EXISTS pattern_stats (
                drawing_id TEXT NOT NULL,
                pattern TEXT NOT NULL,
                count INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                UNIQUE(drawing_id, pattern)
            );
            ",
        )
        .map_err(|source| StoreError::Sqlite {
            context: "init schema",
            source,
        })?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("snapshot store lock poisoned")
    }

    /// Sequence of the most recent committed scan, 0 if never scanned.
    pub fn latest_sequence(&self, drawing_id: &DrawingId) -> Result<u64, StoreError> {
        let conn = self.lock();
        query_latest_sequence(&conn, drawing_id)
    }

    /// Starts the transactional boundary of one scan.
    ///
    /// The returned guard holds the connection for its whole lifetime; keep
    /// it short — enumerate and normalize before beginning, then upsert and
    /// commit. Dropping the guard without committing rolls everything back
    /// and leaves the scan sequence untouched.
    pub fn begin_scan(&self, drawing_id: &DrawingId) -> Result<ScanTxn<'_>, StoreError> {
        let guard = self.lock();
        guard
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|source| StoreError::Sqlite {
                context: "begin scan transaction",
                source,
            })?;
        let sequence = match query_latest_sequence(&guard, drawing_id) {
            Ok(previous) => previous + 1,
            Err(err) => {
                let _ = guard.execute_batch("ROLLBACK");
                return Err(err);
            }
        };
        debug!("scan {sequence} begun for {drawing_id}");
        Ok(ScanTxn {
            guard,
            drawing_id: drawing_id.clone(),
            sequence,
            finished: false,
        })
    }

    /// Active records for a drawing, ascending by handle (bytewise) so
    /// repeated queries over an unchanged snapshot return the same order.
    pub fn get_active(
        &self,
        drawing_id: &DrawingId,
        filter: &EntityFilter,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT handle, kind, layer, geometry, text_content, last_seen_scan, status \
             FROM entities WHERE drawing_id = ?",
        );
        let mut args: Vec<String> = vec![drawing_id.as_str().to_owned()];

        if !filter.include_retired {
            sql.push_str(" AND status = 'active'");
        }
        if let Some(layer) = &filter.layer {
            sql.push_str(" AND layer = ?");
            args.push(layer.clone());
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(kind.as_str().to_owned());
        }
        if let Some(needle) = &filter.text_contains {
            sql.push_str(" AND text_content LIKE ? ESCAPE '\\'");
            args.push(format!("%{}%", escape_like(needle)));
        }
        sql.push_str(" ORDER BY handle ASC");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).map_err(|source| StoreError::Sqlite {
            context: "prepare entity query",
            source,
        })?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Ok(RawEntityRow {
                    handle: row.get(0)?,
                    kind: row.get(1)?,
                    layer: row.get(2)?,
                    geometry: row.get(3)?,
                    text_content: row.get(4)?,
                    last_seen_scan: row.get(5)?,
                    status: row.get(6)?,
                })
            })
            .map_err(|source| StoreError::Sqlite {
                context: "query entities",
                source,
            })?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|source| StoreError::Sqlite {
                context: "read entity row",
                source,
            })?;
            records.push(raw.into_record(drawing_id)?);
        }
        Ok(records)
    }

    /// Committed scan sessions for a drawing, most recent first.
    pub fn scan_history(
        &self,
        drawing_id: &DrawingId,
        limit: usize,
    ) -> Result<Vec<ScanSession>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT sequence, entity_count, started_at, completed_at, truncated \
                 FROM scans WHERE drawing_id = ? ORDER BY sequence DESC LIMIT ?",
            )
            .map_err(|source| StoreError::Sqlite {
                context: "prepare scan history",
                source,
            })?;
        let rows = stmt
            .query_map(params![drawing_id.as_str(), limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })
            .map_err(|source| StoreError::Sqlite {
                context: "query scan history",
                source,
            })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (sequence, entity_count, started_at, completed_at, truncated) =
                row.map_err(|source| StoreError::Sqlite {
                    context: "read scan row",
                    source,
                })?;
            sessions.push(ScanSession {
                drawing_id: drawing_id.clone(),
                sequence: sequence as u64,
                entity_count: entity_count as u64,
                started_at_ms: started_at as u64,
                completed_at_ms: completed_at as u64,
                truncated,
            });
        }
        Ok(sessions)
    }

    /// Records the latest count for a pattern (last writer wins per pattern).
    pub fn record_pattern_count(
        &self,
        drawing_id: &DrawingId,
        pattern: &str,
        count: u64,
        recorded_at_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO pattern_stats (drawing_id, pattern, count, recorded_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                drawing_id.as_str(),
                pattern,
                count as i64,
                recorded_at_ms as i64
            ],
        )
        .map_err(|source| StoreError::Sqlite {
            context: "record pattern count",
            source,
        })?;
        Ok(())
    }

    pub fn pattern_stats(&self, drawing_id: &DrawingId) -> Result<Vec<PatternStat>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT pattern, count, recorded_at FROM pattern_stats \
                 WHERE drawing_id = ? ORDER BY pattern ASC",
            )
            .map_err(|source| StoreError::Sqlite {
                context: "prepare pattern stats",
                source,
            })?;
        let rows = stmt
            .query_map(params![drawing_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|source| StoreError::Sqlite {
                context: "query pattern stats",
                source,
            })?;

        let mut stats = Vec::new();
        for row in rows {
            let (pattern, count, recorded_at) = row.map_err(|source| StoreError::Sqlite {
                context: "read pattern stat row",
                source,
            })?;
            stats.push(PatternStat {
                pattern,
                count: count as u64,
                recorded_at_ms: recorded_at as u64,
            });
        }
        Ok(stats)
    }
}

/// In-flight scan transaction. Drop without [`ScanTxn::commit`] = rollback.
pub struct ScanTxn<'a> {
    guard: MutexGuard<'a, Connection>,
    drawing_id: DrawingId,
    sequence: u64,
    finished: bool,
}

impl ScanTxn<'_> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Inserts or refreshes one `(drawing_id, handle)` row as active, stamped
    /// with this scan's sequence. Refreshing an existing row overwrites every
    /// mutable field, so a handle the host reused after deletion carries the
    /// new entity's content, never the stale record's.
    pub fn upsert(&mut self, draft: &EntityDraft) -> Result<(), StoreError> {
        let geometry = draft
            .geometry
            .as_ref()
            .map(|geometry| {
                serde_json::to_string(geometry).map_err(|err| StoreError::Corrupt {
                    context: format!("cannot serialize geometry for {}: {err}", draft.handle),
                })
            })
            .transpose()?;

        self.guard
            .execute(
                "INSERT OR REPLACE INTO entities \
                 (drawing_id, handle, kind, layer, geometry, text_content, last_seen_scan, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active')",
                params![
                    self.drawing_id.as_str(),
                    draft.handle,
                    draft.kind.as_str(),
                    draft.layer_name,
                    geometry,
                    draft.text_content,
                    self.sequence as i64,
                ],
            )
            .map_err(|source| StoreError::Sqlite {
                context: "upsert entity",
                source,
            })?;
        Ok(())
    }

    /// Retires unseen records (unless truncated), records the scan row, and
    /// commits. Returns the finalized session summary.
    pub fn commit(
        mut self,
        started_at_ms: u64,
        completed_at_ms: u64,
        truncated: bool,
    ) -> Result<ScanSession, StoreError> {
        if !truncated {
            self.guard
                .execute(
                    "UPDATE entities SET status = 'retired' \
                     WHERE drawing_id = ?1 AND status = 'active' AND last_seen_scan < ?2",
                    params![self.drawing_id.as_str(), self.sequence as i64],
                )
                .map_err(|source| StoreError::Sqlite {
                    context: "retire unseen entities",
                    source,
                })?;
        }

        let entity_count: i64 = self
            .guard
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE drawing_id = ?1 AND status = 'active'",
                params![self.drawing_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|source| StoreError::Sqlite {
                context: "count active entities",
                source,
            })?;

        self.guard
            .execute(
                "INSERT INTO scans (drawing_id, sequence, entity_count, started_at, completed_at, truncated) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    self.drawing_id.as_str(),
                    self.sequence as i64,
                    entity_count,
                    started_at_ms as i64,
                    completed_at_ms as i64,
                    truncated,
                ],
            )
            .map_err(|source| StoreError::Sqlite {
                context: "record scan session",
                source,
            })?;

        self.guard
            .execute_batch("COMMIT")
            .map_err(|source| StoreError::Sqlite {
                context: "commit scan transaction",
                source,
            })?;
        self.finished = true;
        debug!(
            "scan {} committed for {} ({entity_count} active, truncated={truncated})",
            self.sequence, self.drawing_id
        );

        Ok(ScanSession {
            drawing_id: self.drawing_id.clone(),
            sequence: self.sequence,
            entity_count: entity_count as u64,
            started_at_ms,
            completed_at_ms,
            truncated,
        })
    }

    /// Explicit rollback; equivalent to dropping the guard.
    pub fn rollback(mut self) {
        self.rollback_inner();
    }

    fn rollback_inner(&mut self) {
        if !self.finished {
            let _ = self.guard.execute_batch("ROLLBACK");
            self.finished = true;
            debug!("scan {} rolled back for {}", self.sequence, self.drawing_id);
        }
    }
}

impl Drop for ScanTxn<'_> {
    fn drop(&mut self) {
        self.rollback_inner();
    }
}

struct RawEntityRow {
    handle: String,
    kind: String,
    layer: String,
    geometry: Option<String>,
    text_content: Option<String>,
    last_seen_scan: i64,
    status: String,
}

impl RawEntityRow {
    fn into_record(self, drawing_id: &DrawingId) -> Result<EntityRecord, StoreError> {
        let kind = EntityKind::parse(&self.kind).ok_or_else(|| StoreError::Corrupt {
            context: format!("unknown kind {:?} on handle {}", self.kind, self.handle),
        })?;
        let status = EntityStatus::parse(&self.status).ok_or_else(|| StoreError::Corrupt {
            context: format!("unknown status {:?} on handle {}", self.status, self.handle),
        })?;
        let geometry = self
            .geometry
            .as_deref()
            .map(|raw| {
                serde_json::from_str::<GeometrySummary>(raw).map_err(|err| StoreError::Corrupt {
                    context: format!("unreadable geometry on handle {}: {err}", self.handle),
                })
            })
            .transpose()?;
        Ok(EntityRecord {
            drawing_id: drawing_id.clone(),
            handle: self.handle,
            kind,
            layer_name: self.layer,
            geometry,
            text_content: self.text_content,
            last_seen_scan: self.last_seen_scan as u64,
            status,
        })
    }
}

fn query_latest_sequence(conn: &Connection, drawing_id: &DrawingId) -> Result<u64, StoreError> {
    let latest: Option<i64> = conn
        .query_row(
            "SELECT MAX(sequence) FROM scans WHERE drawing_id = ?1",
            params![drawing_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|source| StoreError::Sqlite {
            context: "query latest scan sequence",
            source,
        })?;
    Ok(latest.unwrap_or(0) as u64)
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
