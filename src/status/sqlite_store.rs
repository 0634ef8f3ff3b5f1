//! SQLite-backed build status store.

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::types::{IndexBuildStatus, IndexState, IndexType};
use crate::utils::tools::lock;

use super::store::IndexBuildStatusStore;

/// WAL tuning pragmas. Use after PRAGMA journal_mode = WAL.
const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        "#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS index_build_status (
    index_type TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    total_records INTEGER NOT NULL,
    processed_records INTEGER NOT NULL,
    started_at_ms INTEGER NOT NULL,
    last_build_date_ms INTEGER
);
"#;

const UPSERT_STATUS_SQL: &str = "INSERT OR REPLACE INTO index_build_status \
     (index_type, state, total_records, processed_records, started_at_ms, last_build_date_ms) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT_STATUS_SQL: &str = "SELECT index_type, state, total_records, processed_records, \
     started_at_ms, last_build_date_ms FROM index_build_status WHERE index_type = ?1";

/// One connection behind a mutex; the updater is the only steady writer.
pub struct SqliteBuildStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteBuildStatusStore {
    /// Open or create the status DB at `path` with WAL and schema applied (idempotent).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("open status database")?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .context("enable WAL")?;
        conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
        conn.execute_batch(SCHEMA).context("create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory DB with the same schema (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory status database")?;
        conn.execute_batch(SCHEMA).context("create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

type StatusRow = (String, String, i64, i64, i64, Option<i64>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<StatusRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn status_from_row(row: StatusRow) -> Result<IndexBuildStatus> {
    let (index_type, state, total, processed, started_at_ms, last_build_date_ms) = row;
    let index_type: IndexType = index_type.parse().map_err(|e: String| anyhow!(e))?;
    let state =
        IndexState::parse(&state).ok_or_else(|| anyhow!("unknown index state: {state}"))?;
    Ok(IndexBuildStatus {
        index_type,
        state,
        total_records: total.max(0) as u64,
        processed_records: processed.max(0) as u64,
        started_at_ms,
        last_build_date_ms,
    })
}

impl IndexBuildStatusStore for SqliteBuildStatusStore {
    fn get(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>> {
        let conn = lock(&self.conn);
        let row = conn
            .query_row(SELECT_STATUS_SQL, [index_type.name()], read_row)
            .optional()
            .context("select build status")?;
        row.map(status_from_row).transpose()
    }

    fn save_or_update(&self, status: &IndexBuildStatus) -> Result<IndexBuildStatus> {
        let conn = lock(&self.conn);
        conn.execute(
            UPSERT_STATUS_SQL,
            (
                status.index_type.name(),
                status.state.as_str(),
                status.total_records as i64,
                status.processed_records as i64,
                status.started_at_ms,
                status.last_build_date_ms,
            ),
        )
        .context("upsert build status")?;
        Ok(status.clone())
    }
}
