//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// The boolean filter index on the sync queue; older stores may predate it.
const QUEUE_PROCESSED_INDEX: &str = "idx_sync_queue_processed";

/// Database wrapper for libSQL connections
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
    queue_index_support: bool,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically. Any failure to initialize the
    /// persistence layer surfaces as [`Error::StorageUnavailable`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str)
            .build()
            .await
            .map_err(storage_unavailable)?;
        Self::init(db).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(storage_unavailable)?;
        Self::init(db).await
    }

    async fn init(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect().map_err(storage_unavailable)?;

        configure(&conn).await?;
        migrations::run(&conn)
            .await
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;

        let queue_index_support = has_index(&conn, QUEUE_PROCESSED_INDEX).await?;
        if !queue_index_support {
            tracing::warn!(
                "Index {QUEUE_PROCESSED_INDEX} is missing; queue queries fall back to full scans"
            );
        }

        Ok(Self {
            _db: db,
            conn,
            queue_index_support,
        })
    }

    /// Whether the store can serve boolean-filtered queue queries from an
    /// index. When false, the queue repository scans and filters instead;
    /// results are identical either way.
    pub const fn supports_queue_index(&self) -> bool {
        self.queue_index_support
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Configure `SQLite` for optimal performance
async fn configure(conn: &Connection) -> Result<()> {
    // WAL and cache pragmas are best-effort; foreign keys are not
    conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
    conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
    conn.execute("PRAGMA foreign_keys = ON;", ())
        .await
        .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
    conn.execute("PRAGMA cache_size = 10000;", ()).await.ok();
    Ok(())
}

/// Check `sqlite_master` for a named index.
async fn has_index(conn: &Connection, name: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?)",
            [name],
        )
        .await?;

    let exists = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    Ok(exists)
}

fn storage_unavailable(error: libsql::Error) -> Error {
    Error::StorageUnavailable(error.to_string())
}
