//! SQLite persistence for nudge-daemon.
//!
//! One append-only `events` table mirrors the in-memory event log so metrics
//! survive restarts. The table is pruned to the log capacity after each write.

use nudge_core::{Event, EVENT_LOG_CAPACITY};
use rusqlite::{params, Connection, OpenFlags};
use std::path::PathBuf;

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn insert_events(&self, events: &[Event]) -> Result<(), String> {
        if events.is_empty() {
            return Ok(());
        }

        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| format!("Failed to begin transaction: {}", err))?;

            for event in events {
                let payload = serde_json::to_string(event)
                    .map_err(|err| format!("Failed to serialize event payload: {}", err))?;
                tx.execute(
                    "INSERT INTO events (recorded_at, kind, task_name, payload) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        event.recorded_at.to_rfc3339(),
                        event.kind(),
                        event.task_name,
                        payload
                    ],
                )
                .map_err(|err| format!("Failed to insert event: {}", err))?;
            }

            prune(&tx, EVENT_LOG_CAPACITY)?;

            tx.commit()
                .map_err(|err| format!("Failed to commit events: {}", err))
        })
    }

    /// Stored events, oldest first.
    pub fn list_events(&self) -> Result<Vec<Event>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT payload FROM events ORDER BY id ASC")
                .map_err(|err| format!("Failed to prepare events query: {}", err))?;

            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read event rows: {}", err))?;

            let mut events = Vec::new();
            for row in rows {
                let payload = row.map_err(|err| format!("Failed to decode event row: {}", err))?;
                match serde_json::from_str::<Event>(&payload) {
                    Ok(event) => events.push(event),
                    Err(err) => {
                        tracing::warn!(error = %err, "Skipping unreadable event payload");
                    }
                }
            }

            Ok(events)
        })
    }

    pub fn count_events(&self) -> Result<usize, String> {
        let count = self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM events", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|err| format!("Failed to count events: {}", err))
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn clear_events(&self) -> Result<usize, String> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM events", [])
                .map_err(|err| format!("Failed to clear events: {}", err))
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recorded_at TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    task_name TEXT,
                    payload TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create daemon data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

fn prune(conn: &Connection, keep: usize) -> Result<(), String> {
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    conn.execute(
        "DELETE FROM events WHERE id NOT IN \
         (SELECT id FROM events ORDER BY id DESC LIMIT ?1)",
        params![keep],
    )
    .map_err(|err| format!("Failed to prune events: {}", err))?;
    Ok(())
}
