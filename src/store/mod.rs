//! SQLite-based persistent storage for conversations and workbench settings
//!
//! Conversations are saved as whole records (atomic `INSERT OR REPLACE`),
//! keyed by conversation id. A small key/value settings table carries the
//! completion sound and per-panel voice preferences. Autosaves are
//! debounced to coalesce rapid updates; callers flush at stream-complete
//! boundaries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CoChatError, Result};
use crate::orchestrator::Mode;
use crate::tts::{PanelId, VoiceSettings};
use crate::types::Message;

/// Titles are truncated to this many characters
const TITLE_MAX_CHARS: usize = 50;

/// Trailing-edge delay for coalescing autosaves
const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(150);

/// Panel configuration captured in a conversation snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    pub title: String,
    pub model: Option<String>,
    pub role: String,
    pub posture: String,
}

/// A message with its panel of origin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub panel_index: usize,
    #[serde(flatten)]
    pub message: Message,
}

/// A persisted conversation snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub mode: Mode,
    pub panel_layout: Vec<PanelConfig>,
    pub messages: Vec<StoredMessage>,
}

/// Listing entry for stored conversations
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub mode: Mode,
    pub created_at: DateTime<Utc>,
}

/// Derive a conversation title from the first user message: verbatim up to
/// 50 characters, truncated with an ellipsis beyond that.
pub fn derive_title(first_user_message: &str) -> String {
    let chars: Vec<char> = first_user_message.chars().collect();
    if chars.len() > TITLE_MAX_CHARS {
        let mut title: String = chars[..TITLE_MAX_CHARS].iter().collect();
        title.push('…');
        title
    } else {
        first_user_message.to_string()
    }
}

/// SQLite-backed conversation store
#[derive(Clone)]
pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
    pending: Arc<std::sync::Mutex<Option<ConversationRecord>>>,
    generation: Arc<AtomicU64>,
}

impl ConversationStore {
    /// Open (or create) the store at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoChatError::Store(e.to_string()))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            pending: Arc::new(std::sync::Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// In-memory store for tests and ephemeral sessions
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            pending: Arc::new(std::sync::Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                mode TEXT NOT NULL,
                panel_layout TEXT NOT NULL,
                messages TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_created
                ON conversations(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// Write a conversation record immediately (atomic whole-record replace)
    pub async fn save(&self, record: &ConversationRecord) -> Result<()> {
        let layout_json = serde_json::to_string(&record.panel_layout)
            .map_err(|e| CoChatError::Store(e.to_string()))?;
        let messages_json = serde_json::to_string(&record.messages)
            .map_err(|e| CoChatError::Store(e.to_string()))?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO conversations
               (id, title, mode, panel_layout, messages, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                record.id,
                record.title,
                record.mode.to_string(),
                layout_json,
                messages_json,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!("Saved conversation {} ({} messages)", record.id, record.messages.len());
        Ok(())
    }

    /// Queue a debounced save. Rapid successive autosaves coalesce into one
    /// write; [`ConversationStore::flush`] forces the pending write out.
    pub async fn autosave(&self, record: ConversationRecord) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.pending.lock().expect("pending lock poisoned") = Some(record);

        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(AUTOSAVE_DEBOUNCE).await;
            if store.generation.load(Ordering::SeqCst) == generation {
                if let Err(e) = store.flush().await {
                    debug!("Deferred autosave failed: {}", e);
                }
            }
        });
        Ok(())
    }

    /// Write the pending autosave immediately, if any
    pub async fn flush(&self) -> Result<()> {
        let record = self.pending.lock().expect("pending lock poisoned").take();
        if let Some(record) = record {
            self.save(&record).await?;
        }
        Ok(())
    }

    /// Load a conversation snapshot
    pub async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, title, mode, panel_layout, messages, created_at
                 FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, mode, layout_json, messages_json, created_at)) = row else {
            return Ok(None);
        };

        // Only the canonical mode names are accepted; legacy keys in old
        // records surface as a store error instead of silently aliasing.
        let mode = Mode::from_str(&mode).map_err(CoChatError::Store)?;
        let panel_layout: Vec<PanelConfig> = serde_json::from_str(&layout_json)
            .map_err(|e| CoChatError::Store(e.to_string()))?;
        let messages: Vec<StoredMessage> = serde_json::from_str(&messages_json)
            .map_err(|e| CoChatError::Store(e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| CoChatError::Store(e.to_string()))?
            .with_timezone(&Utc);

        Ok(Some(ConversationRecord {
            id,
            title,
            created_at,
            mode,
            panel_layout,
            messages,
        }))
    }

    /// Delete a conversation permanently
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// List stored conversations, newest first
    pub async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, mode, created_at FROM conversations ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, title, mode, created_at) = row?;
            let mode = Mode::from_str(&mode).map_err(CoChatError::Store)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| CoChatError::Store(e.to_string()))?
                .with_timezone(&Utc);
            summaries.push(ConversationSummary { id, title, mode, created_at });
        }
        Ok(summaries)
    }

    /// Read a raw setting value
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a raw setting value; `None` removes the key
    pub async fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        match value {
            Some(value) => {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            None => {
                conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            }
        }
        Ok(())
    }

    /// The configured turn-complete sound, if any
    pub async fn completion_sound_url(&self) -> Result<Option<String>> {
        self.get_setting("completion_sound_url").await
    }

    pub async fn set_completion_sound_url(&self, url: Option<&str>) -> Result<()> {
        self.set_setting("completion_sound_url", url).await
    }

    /// Stored voice preference for a panel
    pub async fn voice_settings(&self, panel_id: PanelId) -> Result<Option<VoiceSettings>> {
        let key = format!("voice-settings/{panel_id}");
        match self.get_setting(&key).await? {
            Some(json) => {
                let settings = serde_json::from_str(&json)
                    .map_err(|e| CoChatError::Store(e.to_string()))?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    pub async fn set_voice_settings(
        &self,
        panel_id: PanelId,
        settings: &VoiceSettings,
    ) -> Result<()> {
        let key = format!("voice-settings/{panel_id}");
        let json =
            serde_json::to_string(settings).map_err(|e| CoChatError::Store(e.to_string()))?;
        self.set_setting(&key, Some(&json)).await
    }
}
