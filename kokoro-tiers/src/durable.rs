//! Durable tier — the authoritative, append-only SQLite message log.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS messages (
//!     seq        INTEGER PRIMARY KEY AUTOINCREMENT,
//!     id         TEXT NOT NULL UNIQUE,
//!     user_id    TEXT NOT NULL,
//!     session_id TEXT NOT NULL,
//!     role       TEXT NOT NULL,
//!     content    TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - Rows are only ever inserted; re-appending an id is a no-op, so callers
//!   may retry an append safely.
//! - With `checksum_enabled`, a CRC-32 of the row's fields is stored and
//!   verified on every read. Rows that fail verification are skipped with a
//!   warning rather than returned.
//! - SQLite calls run on the blocking pool; the connection sits behind a
//!   mutex shared with those tasks.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Row, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use kokoro_core::config::DurableConfig;
use kokoro_core::{MessageId, SessionId, UserId};

use crate::error::TierError;
use crate::message::{ChatMessage, MessageRole};
use crate::tier::{Tier, TierHealth, TierHit, TierKind, TierQuery};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        id         TEXT NOT NULL UNIQUE,
        user_id    TEXT NOT NULL,
        session_id TEXT NOT NULL,
        role       TEXT NOT NULL,
        content    TEXT NOT NULL,
        created_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, seq);
    CREATE INDEX IF NOT EXISTS idx_messages_user ON messages (user_id, seq);
";

const SELECT_COLUMNS: &str = "id, user_id, session_id, role, content, created_at, checksum";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309 / ITU-T V.42) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    format!("{:08x}", !crc)
}

fn row_checksum(fields: &RawRow) -> String {
    let joined = [
        fields.id.as_str(),
        fields.user_id.as_str(),
        fields.session_id.as_str(),
        fields.role.as_str(),
        fields.content.as_str(),
        fields.created_at.as_str(),
    ]
    .join("\u{1f}");
    crc32_hex(joined.as_bytes())
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RawRow {
    id: String,
    user_id: String,
    session_id: String,
    role: String,
    content: String,
    created_at: String,
    checksum: Option<String>,
}

impl RawRow {
    fn from_message(message: &ChatMessage) -> Self {
        Self {
            id: message.id.0.to_string(),
            user_id: message.user_id.0.to_string(),
            session_id: message.session_id.0.to_string(),
            role: message.role.to_string(),
            content: message.content.clone(),
            created_at: message.timestamp.to_rfc3339(),
            checksum: None,
        }
    }

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            created_at: row.get(5)?,
            checksum: row.get(6)?,
        })
    }

    fn into_message(self, verify: bool) -> Result<ChatMessage, TierError> {
        if verify
            && let Some(stored) = &self.checksum
            && *stored != row_checksum(&self)
        {
            return Err(TierError::Corrupt(format!("checksum mismatch for message {}", self.id)));
        }
        let uuid = |s: &str| Uuid::parse_str(s).map_err(|e| TierError::Corrupt(format!("bad id '{s}': {e}")));
        Ok(ChatMessage {
            id: MessageId(uuid(&self.id)?),
            user_id: UserId(uuid(&self.user_id)?),
            session_id: SessionId(uuid(&self.session_id)?),
            role: MessageRole::from_str(&self.role).map_err(TierError::Corrupt)?,
            timestamp: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| TierError::Corrupt(format!("bad timestamp '{}': {e}", self.created_at)))?
                .with_timezone(&Utc),
            content: self.content,
        })
    }
}

// ---------------------------------------------------------------------------
// DurableTier
// ---------------------------------------------------------------------------

/// Handle to the SQLite message log.
pub struct DurableTier {
    conn: Arc<Mutex<Connection>>,
    config: DurableConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for DurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTier")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DurableTier {
    /// Open (or create) the log at `path`.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &DurableConfig) -> Result<Self, TierError> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "durable tier opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory log (useful for tests).
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &DurableConfig) -> Result<Self, TierError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, TierError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, TierError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock())).await?
    }

    /// Append a message, returning its id.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] if the insert fails.
    pub async fn append_message(&self, message: &ChatMessage) -> Result<MessageId, TierError> {
        let start = Instant::now();
        let mut raw = RawRow::from_message(message);
        if self.config.checksum_enabled {
            raw.checksum = Some(row_checksum(&raw));
        }
        let id = message.id;
        let inserted = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO messages (id, user_id, session_id, role, content, created_at, checksum)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![raw.id, raw.user_id, raw.session_id, raw.role, raw.content, raw.created_at, raw.checksum],
                )?)
            })
            .await?;
        debug!(
            message_id = %id,
            duplicate = inserted == 0,
            elapsed_us = start.elapsed().as_micros(),
            "message appended"
        );
        Ok(id)
    }

    /// All messages of a session in append order.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub async fn fetch_messages(&self, session_id: SessionId) -> Result<Vec<ChatMessage>, TierError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM messages WHERE session_id = ?1 ORDER BY seq");
        self.query_rows(sql, vec![session_id.0.to_string()]).await
    }

    /// Messages of a user whose content contains `text`, newest first.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub async fn search_messages(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TierError> {
        let pattern = format!("%{}%", escape_like(text));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, args) = match session_id {
            Some(session) => (
                format!(
                    "SELECT {SELECT_COLUMNS} FROM messages
                     WHERE user_id = ?1 AND session_id = ?2 AND content LIKE ?3 ESCAPE '\\'
                     ORDER BY seq DESC LIMIT {limit}"
                ),
                vec![user_id.0.to_string(), session.0.to_string(), pattern],
            ),
            None => (
                format!(
                    "SELECT {SELECT_COLUMNS} FROM messages
                     WHERE user_id = ?1 AND content LIKE ?2 ESCAPE '\\'
                     ORDER BY seq DESC LIMIT {limit}"
                ),
                vec![user_id.0.to_string(), pattern],
            ),
        };
        self.query_rows(sql, args).await
    }

    /// Every message of a user in append order.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub async fn fetch_user_messages(&self, user_id: UserId) -> Result<Vec<ChatMessage>, TierError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM messages WHERE user_id = ?1 ORDER BY seq");
        self.query_rows(sql, vec![user_id.0.to_string()]).await
    }

    /// Total number of stored messages.
    ///
    /// # Errors
    /// Returns [`TierError::Database`] on SQLite failures.
    pub async fn count(&self) -> Result<usize, TierError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
    }

    async fn query_rows(&self, sql: String, args: Vec<String>) -> Result<Vec<ChatMessage>, TierError> {
        let verify = self.config.checksum_enabled;
        let raw_rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), RawRow::read)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut messages = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let id = raw.id.clone();
            match raw.into_message(verify) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(message_id = %id, error = %e, "skipping unreadable row"),
            }
        }
        Ok(messages)
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Tier for DurableTier {
    fn kind(&self) -> TierKind {
        TierKind::Durable
    }

    async fn write(&self, message: &ChatMessage) -> Result<(), TierError> {
        self.append_message(message).await.map(|_| ())
    }

    async fn search(&self, query: &TierQuery) -> Result<Vec<TierHit>, TierError> {
        let messages = self
            .search_messages(query.user_id, query.session_id, query.text.trim(), query.max_results)
            .await?;
        Ok(messages.into_iter().map(TierHit::unscored).collect())
    }

    async fn messages(&self, user_id: UserId) -> Result<Vec<ChatMessage>, TierError> {
        self.fetch_user_messages(user_id).await
    }

    async fn health(&self) -> TierHealth {
        match self.count().await {
            Ok(n) => TierHealth::up(TierKind::Durable, n),
            Err(e) => TierHealth::down(TierKind::Durable, e.to_string()),
        }
    }

    async fn cleanup(&self, user_id: UserId) -> Result<usize, TierError> {
        let user = user_id.0.to_string();
        let removed = self
            .with_conn(move |conn| Ok(conn.execute("DELETE FROM messages WHERE user_id = ?1", params![user])?))
            .await?;
        info!(%user_id, removed, "durable tier purged user");
        Ok(removed)
    }
}
