use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::Error;

/// Identifies one open surface (popup, options page) writing to a storage area.
pub type SurfaceId = Uuid;

const CHANGE_FEED_CAPACITY: usize = 64;

/// Schema DDL run on open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// A key written in a storage area.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Surface that made the write, when known.
    pub writer: Option<SurfaceId>,
}

/// Returned by [`StorageArea::subscribe`] when the area can't notify, e.g. a
/// preview build running outside the extension.
#[derive(Debug, Clone, thiserror::Error)]
#[error("change feed unavailable: {reason}")]
pub struct ChangeFeedUnavailable {
    pub reason: String,
}

/// Receiving end of a storage area's change notifications.
pub struct ChangeFeed {
    rx: broadcast::Receiver<StorageChange>,
}

impl ChangeFeed {
    /// Next change, or `None` once the area is gone.
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Change feed lagged, skipped {} change(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-queued change, without waiting.
    pub fn try_recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    log::warn!("Change feed lagged, skipped {} change(s)", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

/// Durable key-value storage shared by every surface.
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Error>>;

    fn set(
        &self,
        key: &str,
        value: String,
        writer: Option<SurfaceId>,
    ) -> BoxFuture<'_, Result<(), Error>>;

    fn subscribe(&self) -> Result<ChangeFeed, ChangeFeedUnavailable>;
}

// ---------------------------------------------------------------------------
// Commands sent from async world → background thread
// ---------------------------------------------------------------------------

enum StoreCmd {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<String>, Error>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<Option<String>, Error>>,
    },
}

// ---------------------------------------------------------------------------
// SqliteStorage: Clone + Send + Sync async facade
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteStorage {
    tx: mpsc::UnboundedSender<StoreCmd>,
    changes: broadcast::Sender<StorageChange>,
}

impl SqliteStorage {
    /// Open (or create) the settings database and spawn the background thread.
    pub fn open(db_file: &Path) -> Result<Self, Error> {
        if let Some(parent) = db_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create data dir: {e}")))?;
        }
        let conn = Connection::open(db_file)?;
        Self::start(conn)
    }

    /// Private in-memory database, lost when the last handle drops.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::start(Connection::open_in_memory()?)
    }

    fn start(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        std::thread::Builder::new()
            .name("deeboo-storage".into())
            .spawn(move || Self::run_loop(conn, rx))
            .map_err(|e| Error::Storage(format!("Failed to spawn storage thread: {e}")))?;

        Ok(SqliteStorage { tx, changes })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, Error>>) -> StoreCmd,
    ) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::Storage("Storage unavailable".into()))?;
        rx.await
            .map_err(|_| Error::Storage("Storage unavailable".into()))?
    }

    // -- background thread ---------------------------------------------------

    fn run_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<StoreCmd>) {
        while let Some(cmd) = rx.blocking_recv() {
            match cmd {
                StoreCmd::Get { key, reply } => {
                    let _ = reply.send(Self::do_get(&conn, &key));
                }
                StoreCmd::Set { key, value, reply } => {
                    let _ = reply.send(Self::do_set(&conn, &key, &value));
                }
            }
        }
        log::debug!("Storage thread exiting");
    }

    // -- synchronous DB operations -------------------------------------------

    fn do_get(conn: &Connection, key: &str) -> Result<Option<String>, Error> {
        Ok(conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    }

    /// Upsert `key`, returning the previous value.
    fn do_set(conn: &Connection, key: &str, value: &str) -> Result<Option<String>, Error> {
        let tx = conn.unchecked_transaction()?;
        let old = Self::do_get(&tx, key)?;
        tx.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        tx.commit()?;
        Ok(old)
    }
}

impl StorageArea for SqliteStorage {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Error>> {
        let key = key.to_string();
        async move { self.request(|reply| StoreCmd::Get { key, reply }).await }.boxed()
    }

    fn set(
        &self,
        key: &str,
        value: String,
        writer: Option<SurfaceId>,
    ) -> BoxFuture<'_, Result<(), Error>> {
        let key = key.to_string();
        async move {
            let new_value = value.clone();
            let old_value = self
                .request(|reply| StoreCmd::Set {
                    key: key.clone(),
                    value,
                    reply,
                })
                .await?;
            if old_value.as_deref() != Some(new_value.as_str()) {
                // No receivers is fine: nobody is listening yet.
                let _ = self.changes.send(StorageChange {
                    key,
                    old_value,
                    new_value: Some(new_value),
                    writer,
                });
            }
            Ok(())
        }
        .boxed()
    }

    fn subscribe(&self) -> Result<ChangeFeed, ChangeFeedUnavailable> {
        Ok(ChangeFeed {
            rx: self.changes.subscribe(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Volatile storage area. Built without a change feed it behaves like a page
/// running outside the extension: reads and writes work, subscribing fails.
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    changes: Option<broadcast::Sender<StorageChange>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryStorage {
            values: Mutex::new(HashMap::new()),
            changes: Some(changes),
        }
    }

    pub fn without_change_feed() -> Self {
        MemoryStorage {
            values: Mutex::new(HashMap::new()),
            changes: None,
        }
    }

    fn put(&self, key: &str, value: String) -> Result<Option<String>, Error> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Storage("memory storage poisoned".into()))?;
        Ok(values.insert(key.to_string(), value))
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Error>> {
        let key = key.to_string();
        async move {
            let values = self
                .values
                .lock()
                .map_err(|_| Error::Storage("memory storage poisoned".into()))?;
            Ok(values.get(&key).cloned())
        }
        .boxed()
    }

    fn set(
        &self,
        key: &str,
        value: String,
        writer: Option<SurfaceId>,
    ) -> BoxFuture<'_, Result<(), Error>> {
        let key = key.to_string();
        async move {
            let old_value = self.put(&key, value.clone())?;
            if let Some(changes) = &self.changes {
                if old_value.as_deref() != Some(value.as_str()) {
                    let _ = changes.send(StorageChange {
                        key,
                        old_value,
                        new_value: Some(value),
                        writer,
                    });
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn subscribe(&self) -> Result<ChangeFeed, ChangeFeedUnavailable> {
        match &self.changes {
            Some(changes) => Ok(ChangeFeed {
                rx: changes.subscribe(),
            }),
            None => Err(ChangeFeedUnavailable {
                reason: "memory storage was created without a change feed".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_get_missing_is_none() {
        let store = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_set_then_get_and_notify() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let mut feed = store.subscribe().unwrap();
        let writer = Uuid::new_v4();

        store.set("k", "v1".into(), Some(writer)).await.unwrap();
        store.set("k", "v2".into(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        let first = feed.recv().await.unwrap();
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value.as_deref(), Some("v1"));
        assert_eq!(first.writer, Some(writer));

        let second = feed.recv().await.unwrap();
        assert_eq!(second.old_value.as_deref(), Some("v1"));
        assert_eq!(second.writer, None);
    }

    #[tokio::test]
    async fn sqlite_same_value_does_not_notify() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.set("k", "same".into(), None).await.unwrap();
        let mut feed = store.subscribe().unwrap();
        store.set("k", "same".into(), None).await.unwrap();
        store.set("other", "x".into(), None).await.unwrap();
        assert_eq!(feed.recv().await.unwrap().key, "other");
    }

    #[tokio::test]
    async fn sqlite_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("deeboo-test-{}", Uuid::new_v4()));
        let db_file = dir.join("settings.db");
        {
            let store = SqliteStorage::open(&db_file).unwrap();
            store.set("k", "kept".into(), None).await.unwrap();
        }
        let reopened = SqliteStorage::open(&db_file).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("kept"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn memory_without_feed_cannot_subscribe() {
        let store = MemoryStorage::without_change_feed();
        assert!(store.subscribe().is_err());
        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
