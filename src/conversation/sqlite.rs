use super::{schema_sql, is_valid_table_name, ConversationStore, MessageRole, RunRecord, StoredMessage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::FromRow;
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(FromRow)]
struct RunRow {
    run_id: String,
    user_id: String,
    run_name: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        Self {
            run_id: row.run_id,
            user_id: row.user_id,
            run_name: row.run_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    role: String,
    content: String,
    created_at: i64,
}

/// SQLite-backed conversation store
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    table: String,
}

impl SqliteStorage {
    /// Connect to the database at `url` and make sure the schema exists
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(Error::Config(format!("Invalid table name: {:?}", table)));
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        debug!("Connecting to SQLite database at {}", url);

        // Every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        let storage = Self {
            pool,
            table: table.to_string(),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!(table = %self.table, "Initializing conversation schema");
        sqlx::query(&schema_sql(&self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (run_id, user_id, run_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&run.run_id)
            .bind(&run.user_id)
            .bind(&run.run_name)
            .bind(run.created_at)
            .bind(run.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStorage {
    async fn get_all_run_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT run_id FROM {} WHERE user_id = ? ORDER BY created_at DESC, seq DESC",
            self.table
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn create_run(&self, user_id: &str) -> Result<RunRecord> {
        let now = Utc::now().timestamp_micros();
        let run = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            run_name: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_run(&run).await?;
        info!(run_id = %run.run_id, user_id = %user_id, "Created run");
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let sql = format!(
            "SELECT run_id, user_id, run_name, created_at, updated_at FROM {} WHERE run_id = ?",
            self.table
        );
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RunRecord::from))
    }

    async fn append_messages(&self, run_id: &str, messages: &[StoredMessage]) -> Result<()> {
        let Some(last) = messages.last() else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;

        let touch = format!("UPDATE {} SET updated_at = ? WHERE run_id = ?", self.table);
        let updated = sqlx::query(&touch)
            .bind(last.created_at)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::RunNotFound(run_id.to_string()));
        }

        let insert = format!(
            "INSERT INTO {}_messages (run_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            self.table
        );
        for message in messages {
            sqlx::query(&insert)
                .bind(run_id)
                .bind(message.role.to_string())
                .bind(&message.content)
                .bind(message.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, run_id: &str) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT role, content, created_at FROM {}_messages WHERE run_id = ? ORDER BY id",
            self.table
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredMessage {
                    role: row.role.parse::<MessageRole>()?,
                    content: row.content,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

/// Conversation store that opens its database on first use
pub struct LazySqliteStorage {
    url: String,
    table: String,
    storage: OnceCell<SqliteStorage>,
}

impl LazySqliteStorage {
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table: table.into(),
            storage: OnceCell::new(),
        }
    }

    async fn storage(&self) -> Result<&SqliteStorage> {
        self.storage
            .get_or_try_init(|| SqliteStorage::connect(&self.url, &self.table))
            .await
    }
}

#[async_trait]
impl ConversationStore for LazySqliteStorage {
    async fn get_all_run_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.storage().await?.get_all_run_ids(user_id).await
    }

    async fn create_run(&self, user_id: &str) -> Result<RunRecord> {
        self.storage().await?.create_run(user_id).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        self.storage().await?.get_run(run_id).await
    }

    async fn append_messages(&self, run_id: &str, messages: &[StoredMessage]) -> Result<()> {
        self.storage().await?.append_messages(run_id, messages).await
    }

    async fn list_messages(&self, run_id: &str) -> Result<Vec<StoredMessage>> {
        self.storage().await?.list_messages(run_id).await
    }
}
