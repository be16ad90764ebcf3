use crate::models::{Message, MessageType, Role};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool};
use std::path::Path;
use uuid::Uuid;

// Define the database schema using CREATE TABLE IF NOT EXISTS statements.
// `seq` is an insertion sequence used only as a tie-break when two messages
// carry the same timestamp.
const MIGRATIONS_SQL: &str = "
-- Messages Table
CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE, -- UUID
    role TEXT NOT NULL, -- 'user' or 'assistant'
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL, -- RFC 3339
    image_url TEXT, -- Optional inline base64 image payload
    message_type TEXT NOT NULL -- 'text', 'image' or 'image-to-image'
);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
";

/// Ordered persistence for the conversation log. Append-only: there is no
/// update or delete path.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<(), anyhow::Error>;

    /// All messages, ordered by timestamp ascending (insertion order on ties).
    async fn select_all(&self) -> Result<Vec<Message>, anyhow::Error>;
}

#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `path` and runs migrations.
    pub async fn connect(path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        // Create the database file if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        // Connect to the database
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        // Run migrations
        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies the database schema migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        log::info!("Database migrations completed.");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn insert(&self, message: &Message) -> Result<(), anyhow::Error> {
        log::debug!("Saving message ID: {}", message.id);

        let id_text = message.id.to_string();
        // RFC 3339 text keeps full sub-second precision through a round-trip.
        let timestamp_text = message.timestamp.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO messages (id, role, content, timestamp, image_url, message_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id_text)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(timestamp_text)
        .bind(&message.image_url)
        .bind(message.message_type.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert message into database")?;

        log::debug!("Successfully saved message ID: {}", message.id);
        Ok(())
    }

    async fn select_all(&self) -> Result<Vec<Message>, anyhow::Error> {
        log::debug!("Fetching all messages from database");

        let rows = sqlx::query(
            r#"
            SELECT id, role, content, timestamp, image_url, message_type
            FROM messages
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages from database")?;

        // Manually map rows to Message structs
        let messages = rows
            .into_iter()
            .map(|row| {
                let id: String = row.try_get("id").context("Missing message id column")?;
                let role: String = row.try_get("role").context("Missing role column")?;
                let content: String = row.try_get("content").context("Missing content column")?;
                let timestamp: String = row
                    .try_get("timestamp")
                    .context("Missing timestamp column")?;
                let image_url: Option<String> = row
                    .try_get("image_url")
                    .context("Missing image_url column")?;
                let message_type: String = row
                    .try_get("message_type")
                    .context("Missing message_type column")?;

                Ok(Message {
                    id: Uuid::parse_str(&id).context("Failed to parse message ID")?,
                    role: Role::parse(&role)
                        .with_context(|| format!("Unknown role in database: {}", role))?,
                    content,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .context("Invalid message timestamp")?
                        .with_timezone(&Utc),
                    image_url,
                    message_type: MessageType::parse(&message_type).with_context(|| {
                        format!("Unknown message type in database: {}", message_type)
                    })?,
                })
            })
            .collect::<Result<Vec<Message>, anyhow::Error>>()?;

        log::info!("Fetched {} messages", messages.len());
        Ok(messages)
    }
}
