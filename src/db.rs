use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Acquire, Sqlite, Transaction};

use crate::error::StoreError;
use crate::models::FeedRef;

/// How long to wait on a lock held by another process before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Presence marker stored alongside each seen item id.
const SEEN_MARKER: &str = "1";

/// Per-feed view of the seen-item store.
///
/// Implemented by [`SeenTransaction`] and [`FeedScope`], so detection works
/// against either the run-wide transaction or a single feed's savepoint.
#[allow(async_fn_in_trait)]
pub trait SeenItems {
    /// Create the feed's partition if it does not exist yet.
    async fn ensure_partition(&mut self, feed: &FeedRef) -> Result<(), StoreError>;

    /// Whether `item_id` has already been recorded for `feed`.
    async fn contains(&mut self, feed: &FeedRef, item_id: &str) -> Result<bool, StoreError>;

    /// Record `item_id` as delivered for `feed`.
    async fn mark_seen(&mut self, feed: &FeedRef, item_id: &str) -> Result<(), StoreError>;
}

/// Durable record of which item ids have been delivered, per feed.
pub struct SeenStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SeenStore {
    /// Open the store at `path`, creating the file and its parent directory
    /// (owner-only permissions) when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(path, BUSY_TIMEOUT).await
    }

    /// Like [`SeenStore::open`], waiting at most `busy_timeout` on a lock
    /// held by another process.
    pub async fn open_with(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        prepare_path(&path).await?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(busy_timeout);

        // One connection: a run is a single writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool, path };
        store.init().await?;
        debug!("opened seen-item store at {}", store.path().display());
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                feed_ref TEXT PRIMARY KEY,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_items (
                feed_ref TEXT NOT NULL,
                item_id TEXT NOT NULL,
                marker TEXT NOT NULL,
                seen_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (feed_ref, item_id),
                FOREIGN KEY (feed_ref) REFERENCES feeds(feed_ref)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start the unit of work for a run. Nothing becomes visible until
    /// [`SeenTransaction::commit`]; dropping the handle rolls it all back.
    pub async fn begin(&self) -> Result<SeenTransaction, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(SeenTransaction { tx })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Run-wide transaction over the seen-item store.
pub struct SeenTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl SeenTransaction {
    /// Open a savepoint for one feed's work. Dropping the scope without
    /// [`FeedScope::commit`] discards only what was done through it.
    pub async fn feed_scope(&mut self) -> Result<FeedScope<'_>, StoreError> {
        let tx = Acquire::begin(&mut self.tx).await?;
        Ok(FeedScope { tx })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl SeenItems for SeenTransaction {
    async fn ensure_partition(&mut self, feed: &FeedRef) -> Result<(), StoreError> {
        ensure_partition(&mut self.tx, feed).await
    }

    async fn contains(&mut self, feed: &FeedRef, item_id: &str) -> Result<bool, StoreError> {
        contains(&mut self.tx, feed, item_id).await
    }

    async fn mark_seen(&mut self, feed: &FeedRef, item_id: &str) -> Result<(), StoreError> {
        mark_seen(&mut self.tx, feed, item_id).await
    }
}

/// Savepoint covering a single feed inside a [`SeenTransaction`].
pub struct FeedScope<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl FeedScope<'_> {
    /// Release the savepoint into the enclosing transaction.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl SeenItems for FeedScope<'_> {
    async fn ensure_partition(&mut self, feed: &FeedRef) -> Result<(), StoreError> {
        ensure_partition(&mut self.tx, feed).await
    }

    async fn contains(&mut self, feed: &FeedRef, item_id: &str) -> Result<bool, StoreError> {
        contains(&mut self.tx, feed, item_id).await
    }

    async fn mark_seen(&mut self, feed: &FeedRef, item_id: &str) -> Result<(), StoreError> {
        mark_seen(&mut self.tx, feed, item_id).await
    }
}

async fn ensure_partition(conn: &mut SqliteConnection, feed: &FeedRef) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO feeds (feed_ref)
        VALUES (?)
        "#,
    )
    .bind(feed.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn contains(
    conn: &mut SqliteConnection,
    feed: &FeedRef,
    item_id: &str,
) -> Result<bool, StoreError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM seen_items
        WHERE feed_ref = ? AND item_id = ?
        "#,
    )
    .bind(feed.as_str())
    .bind(item_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

async fn mark_seen(
    conn: &mut SqliteConnection,
    feed: &FeedRef,
    item_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO seen_items (feed_ref, item_id, marker)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(feed.as_str())
    .bind(item_id)
    .bind(SEEN_MARKER)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Create the parent directory (0700) and an empty database file (0600).
async fn prepare_path(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder
            .create(parent)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    options.mode(0o600);
    options
        .open(path)
        .await
        .map_err(|source| StoreError::CreateFile {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(())
}
