use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chief_core::{Intent, InteractionRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

/// Longest message or response text kept in the interaction log.
pub const MAX_STORED_TEXT_CHARS: usize = 2000;

pub type UserMemory = BTreeMap<String, Value>;

pub trait InteractionRepository: Send + Sync {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<()>;
    async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionRecord>>;
}

pub trait UserMemoryRepository: Send + Sync {
    async fn load_user_memory(&self, user_id: &str) -> Result<UserMemory>;
    async fn save_user_memory(&self, user_id: &str, memory: &UserMemory) -> Result<()>;
    async fn clear_user_memory(&self, user_id: &str) -> Result<bool>;
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn stored_copy(record: &InteractionRecord) -> InteractionRecord {
    InteractionRecord {
        message: truncate_chars(&record.message, MAX_STORED_TEXT_CHARS),
        response: truncate_chars(&record.response, MAX_STORED_TEXT_CHARS),
        ..record.clone()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    interactions: Arc<RwLock<Vec<InteractionRecord>>>,
    user_memory: Arc<RwLock<HashMap<String, UserMemory>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InteractionRepository for MemoryStore {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<()> {
        self.interactions.write().push(stored_copy(record));
        Ok(())
    }

    async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        Ok(self
            .interactions
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

impl UserMemoryRepository for MemoryStore {
    async fn load_user_memory(&self, user_id: &str) -> Result<UserMemory> {
        Ok(self
            .user_memory
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_user_memory(&self, user_id: &str, memory: &UserMemory) -> Result<()> {
        self.user_memory
            .write()
            .insert(user_id.to_string(), memory.clone());
        Ok(())
    }

    async fn clear_user_memory(&self, user_id: &str) -> Result<bool> {
        Ok(self.user_memory.write().remove(user_id).is_some())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              ts INTEGER NOT NULL,
              user_id TEXT NOT NULL,
              message TEXT NOT NULL,
              intent TEXT,
              confidence REAL NOT NULL,
              response TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_memory (
              user_id TEXT PRIMARY KEY,
              memory_json TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl InteractionRepository for SqliteStore {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<()> {
        let record = stored_copy(record);

        sqlx::query(
            r#"
            INSERT INTO interactions (ts, user_id, message, intent, confidence, response)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(record.ts.timestamp())
        .bind(&record.user_id)
        .bind(&record.message)
        .bind(record.intent.map(Intent::as_label))
        .bind(record.confidence as f64)
        .bind(&record.response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ts, user_id, message, intent, confidence, response
            FROM interactions
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(|row| InteractionRecord {
                ts: DateTime::from_timestamp(row.get::<i64, _>("ts"), 0).unwrap_or_else(Utc::now),
                user_id: row.get("user_id"),
                message: row.get("message"),
                intent: row
                    .get::<Option<String>, _>("intent")
                    .as_deref()
                    .and_then(Intent::parse),
                confidence: row.get::<f64, _>("confidence") as f32,
                response: row.get("response"),
            })
            .collect();

        Ok(records)
    }
}

impl UserMemoryRepository for SqliteStore {
    async fn load_user_memory(&self, user_id: &str) -> Result<UserMemory> {
        let row = sqlx::query("SELECT memory_json FROM user_memory WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(UserMemory::new());
        };

        let memory_json: String = row.get("memory_json");
        Ok(serde_json::from_str(&memory_json).unwrap_or_default())
    }

    async fn save_user_memory(&self, user_id: &str, memory: &UserMemory) -> Result<()> {
        let memory_json = serde_json::to_string(memory)?;

        sqlx::query(
            r#"
            INSERT INTO user_memory (user_id, memory_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
              memory_json=excluded.memory_json,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(memory_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_user_memory(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_memory WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub async fn from_url(database_url: Option<&str>) -> Result<Self> {
        match database_url {
            Some(url) => Self::sqlite(url).await,
            None => Ok(Self::memory()),
        }
    }
}

impl InteractionRepository for Store {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.record_interaction(record).await,
            Store::Sqlite(store) => store.record_interaction(record).await,
        }
    }

    async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        match self {
            Store::Memory(store) => store.recent_interactions(limit).await,
            Store::Sqlite(store) => store.recent_interactions(limit).await,
        }
    }
}

impl UserMemoryRepository for Store {
    async fn load_user_memory(&self, user_id: &str) -> Result<UserMemory> {
        match self {
            Store::Memory(store) => store.load_user_memory(user_id).await,
            Store::Sqlite(store) => store.load_user_memory(user_id).await,
        }
    }

    async fn save_user_memory(&self, user_id: &str, memory: &UserMemory) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_user_memory(user_id, memory).await,
            Store::Sqlite(store) => store.save_user_memory(user_id, memory).await,
        }
    }

    async fn clear_user_memory(&self, user_id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.clear_user_memory(user_id).await,
            Store::Sqlite(store) => store.clear_user_memory(user_id).await,
        }
    }
}
