use crate::{
    bus::{Event, EventBus},
    chat::{Message, NewMessage},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteRow, ConnectOptions, Row, SqlitePool};
use std::{
    collections::HashSet,
    path::Path,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration as StdDuration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

/// The document store the client talks to: a live, ordered message collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably append a message; the store assigns `id` and `created_at`.
    async fn append(&self, draft: NewMessage) -> Result<Message>;

    /// The most recent `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<Message>>;

    /// Change notifications for every successful append.
    fn changes(&self) -> broadcast::Receiver<Event>;

    async fn close(&self);
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    bus: Arc<EventBus>,
    last_created_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    external: Arc<ExternalWrites>,
}

/// Bookkeeping for picking up rows written by other connections to the file.
#[derive(Default)]
struct ExternalWrites {
    watching: AtomicBool,
    // Highest rowid already announced, plus our own rows the watcher has yet
    // to pass. Held across our inserts so the watcher never sees a half-recorded one.
    cursor: tokio::sync::Mutex<WriteCursor>,
}

#[derive(Default)]
struct WriteCursor {
    last_rowid: i64,
    own_rowids: HashSet<i64>,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>, bus: Arc<EventBus>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self::with_pool(pool, bus))
    }

    /// A private database living as long as the store.
    #[cfg(test)]
    pub async fn new_in_memory(bus: Arc<EventBus>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(tracing::log::LevelFilter::Trace);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let store = Self::with_pool(pool, bus);
        store.init().await?;
        Ok(store)
    }

    fn with_pool(pool: SqlitePool, bus: Arc<EventBus>) -> Self {
        Self {
            pool,
            bus,
            last_created_at: Arc::new(Mutex::new(None)),
            external: Arc::new(ExternalWrites::default()),
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_avatar_url TEXT,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        // Resume the clock from what is already stored
        let newest = sqlx::query("SELECT created_at FROM messages ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read newest message timestamp")?;

        if let Some(row) = newest {
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            *self.clock() = Some(created_at);
        }

        let last_rowid: i64 =
            sqlx::query("SELECT COALESCE(MAX(rowid), 0) AS last_rowid FROM messages")
                .fetch_one(&self.pool)
                .await
                .context("Failed to read last message rowid")?
                .try_get("last_rowid")?;
        self.external.cursor.lock().await.last_rowid = last_rowid;

        Ok(())
    }

    /// Poll the database for rows appended by other connections (another
    /// client process on the same file) and announce them on the bus.
    /// The task ends once the pool is closed.
    pub fn watch_external_writes(&self, interval: StdDuration) -> JoinHandle<()> {
        self.external.watching.store(true, Ordering::SeqCst);
        let store = self.clone();

        tokio::spawn(async move {
            info!("Watching for external writes every {:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if store.pool.is_closed() {
                    break;
                }
                if let Err(e) = store.announce_external_writes().await {
                    error!("Failed to poll for new messages: {:#}", e);
                }
            }
            debug!("External write watcher stopped");
        })
    }

    async fn announce_external_writes(&self) -> Result<()> {
        let mut cursor = self.external.cursor.lock().await;

        let rows = sqlx::query(
            r#"
            SELECT rowid AS row_id, id, text, author_id, author_avatar_url, created_at
            FROM messages
            WHERE rowid > ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(cursor.last_rowid)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch new messages")?;

        for row in rows {
            let rowid: i64 = row.try_get("row_id")?;
            cursor.last_rowid = cursor.last_rowid.max(rowid);

            // Our own appends were announced when they were written
            if cursor.own_rowids.remove(&rowid) {
                continue;
            }

            let msg = message_from_row(&row)?;
            debug!("Picked up external message {}", msg.id);
            self.bus.publish(Event::MessageAppended(msg));
        }

        Ok(())
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_created_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Server-side creation time, strictly increasing across appends.
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self.clock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// Save a new message and notify subscribers.
    pub async fn save_message(&self, draft: NewMessage) -> Result<Message> {
        let msg = Message {
            id: Uuid::new_v4().to_string(),
            text: draft.text,
            author_id: draft.author_id,
            author_avatar_url: draft.author_avatar_url,
            created_at: self.next_created_at(),
        };

        let mut cursor = self.external.cursor.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, text, author_id, author_avatar_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.text)
        .bind(&msg.author_id)
        .bind(&msg.author_avatar_url)
        .bind(msg.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save message")?;

        if self.external.watching.load(Ordering::SeqCst) {
            cursor.own_rowids.insert(result.last_insert_rowid());
        }
        drop(cursor);

        self.bus.publish(Event::MessageAppended(msg.clone()));

        Ok(msg)
    }

    /// Retrieve the latest messages.
    /// Returns messages ordered by creation time ascending (oldest to newest).
    pub async fn get_recent_messages(&self, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, text, author_id, author_avatar_url, created_at
            FROM messages
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent messages")?;

        let mut messages = Vec::with_capacity(rows.len());

        for row in rows {
            messages.push(message_from_row(&row)?);
        }

        // Return in chronological order (oldest -> newest)
        messages.reverse();

        Ok(messages)
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        author_id: row.try_get("author_id")?,
        author_avatar_url: row.try_get("author_avatar_url")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl DocumentStore for Store {
    async fn append(&self, draft: NewMessage) -> Result<Message> {
        self.save_message(draft).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        let limit = i64::try_from(limit).context("Feed limit out of range")?;
        self.get_recent_messages(limit).await
    }

    fn changes(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(text: &str, author: &str) -> NewMessage {
        NewMessage {
            text: text.to_string(),
            author_id: author.to_string(),
            author_avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_id_and_increasing_timestamps() {
        let store = Store::new_in_memory(Arc::new(EventBus::new())).await.unwrap();

        let first = store.append(draft("one", "alice")).await.unwrap();
        let second = store.append(draft("two", "alice")).await.unwrap();

        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id);
        assert!(second.created_at > first.created_at);
    }

    #[tokio::test]
    async fn test_recent_is_bounded_and_oldest_first() {
        let store = Store::new_in_memory(Arc::new(EventBus::new())).await.unwrap();

        for i in 0..30 {
            store.append(draft(&format!("msg {i}"), "bob")).await.unwrap();
        }

        let recent = store.recent(25).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.clone()).collect();
        let expected: Vec<_> = (5..30).map(|i| format!("msg {i}")).collect();

        assert_eq!(texts, expected);
        assert!(recent.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_append_publishes_change() {
        let store = Store::new_in_memory(Arc::new(EventBus::new())).await.unwrap();
        let mut changes = store.changes();

        let saved = store.append(draft("ping", "carol")).await.unwrap();

        match changes.recv().await.unwrap() {
            Event::MessageAppended(msg) => assert_eq!(msg.id, saved.id),
        }
    }

    #[tokio::test]
    async fn test_avatar_round_trips() {
        let store = Store::new_in_memory(Arc::new(EventBus::new())).await.unwrap();

        let mut with_avatar = draft("hi", "dave");
        with_avatar.author_avatar_url = Some("https://img.example/dave.png".into());
        store.append(with_avatar).await.unwrap();
        store.append(draft("no avatar", "erin")).await.unwrap();

        let recent = store.recent(25).await.unwrap();
        assert_eq!(
            recent[0].author_avatar_url.as_deref(),
            Some("https://img.example/dave.png")
        );
        assert_eq!(recent[1].author_avatar_url, None);
    }

    async fn file_store(path: &Path) -> Store {
        let store = Store::new(path, Arc::new(EventBus::new())).await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_writes_from_another_connection_reach_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let local = file_store(&path).await;
        local.watch_external_writes(StdDuration::from_millis(20));
        let mut changes = local.changes();

        let remote = file_store(&path).await;
        let sent = remote.append(draft("from elsewhere", "bob")).await.unwrap();

        let event = tokio::time::timeout(StdDuration::from_secs(5), changes.recv())
            .await
            .expect("external write was never announced")
            .unwrap();
        match event {
            Event::MessageAppended(msg) => {
                assert_eq!(msg.id, sent.id);
                assert_eq!(msg.text, "from elsewhere");
            }
        }

        let recent = local.recent(25).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_watcher_does_not_repeat_own_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let store = file_store(&path).await;
        store.watch_external_writes(StdDuration::from_millis(10));
        let mut changes = store.changes();

        store.append(draft("mine", "alice")).await.unwrap();
        // Give the watcher several passes over the new row
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert!(changes.try_recv().is_ok());
        assert!(matches!(
            changes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_watcher_starts_after_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let writer = file_store(&path).await;
        writer.append(draft("old", "bob")).await.unwrap();

        let store = file_store(&path).await;
        store.watch_external_writes(StdDuration::from_millis(10));
        let mut changes = store.changes();
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert!(matches!(
            changes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
