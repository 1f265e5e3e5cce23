// Bot state persistence
// SQLite-backed store for the polling offset, the last scheduled alert date
// and an audit trail of every message the bot pushed.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::bot::{AlertKind, BotState};

// =============================================================================
// Data Models
// =============================================================================

/// One row of the alert audit log
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: i64,
    pub sent_at: String,
    pub chat_id: i64,
    pub kind: String,
    pub summary: String,
}

// =============================================================================
// State Store Implementation
// =============================================================================

pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn)?;
        info!("Bot state store at {}", db_path.display());
        Ok(store)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("state store mutex poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                update_offset INTEGER NOT NULL DEFAULT 0,
                last_alert_date TEXT,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sent_at TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                summary TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_sent_at ON alerts(sent_at)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    pub fn save_state(&self, state: &BotState) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO bot_state (id, update_offset, last_alert_date, updated_at)
             VALUES (1, ?1, ?2, CURRENT_TIMESTAMP)",
            params![
                state.update_offset,
                state.last_alert_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        debug!(
            "State saved: offset={} last_alert={:?}",
            state.update_offset, state.last_alert_date
        );
        Ok(())
    }

    /// Stored state, or the default state on first run
    pub fn load_state(&self) -> Result<BotState> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT update_offset, last_alert_date FROM bot_state WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        let Some((update_offset, last_alert)) = row else {
            return Ok(BotState::default());
        };

        let last_alert_date = last_alert
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .context("Corrupt last_alert_date in bot_state")?;

        Ok(BotState {
            update_offset,
            last_alert_date,
        })
    }

    pub fn record_alert(&self, chat_id: i64, kind: AlertKind, summary: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO alerts (sent_at, chat_id, kind, summary) VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), chat_id, kind.as_str(), summary],
        )?;
        Ok(())
    }

    /// Most recent alerts first
    pub fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, sent_at, chat_id, kind, summary FROM alerts ORDER BY id DESC LIMIT ?1",
        )?;
        let alerts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AlertRecord {
                    id: row.get(0)?,
                    sent_at: row.get(1)?,
                    chat_id: row.get(2)?,
                    kind: row.get(3)?,
                    summary: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }
}
