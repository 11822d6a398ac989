//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: entity tables and the sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // Using a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Time entries
        "CREATE TABLE IF NOT EXISTS time_entries (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER,
            synced INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            synced_at TEXT,
            conflict INTEGER NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time TEXT,
            project_id INTEGER,
            note TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_time_entries_timestamp ON time_entries(timestamp DESC)",
        // Tasks
        "CREATE TABLE IF NOT EXISTS tasks (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER,
            synced INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            synced_at TEXT,
            conflict INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            due_date TEXT,
            project_id INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_tasks_timestamp ON tasks(timestamp DESC)",
        // Projects
        "CREATE TABLE IF NOT EXISTS projects (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER,
            synced INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            synced_at TEXT,
            conflict INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            billable INTEGER NOT NULL DEFAULT 0,
            hourly_rate REAL,
            client TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_projects_timestamp ON projects(timestamp DESC)",
        // Append-only mutation queue
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            action TEXT NOT NULL,
            local_id TEXT NOT NULL,
            data TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            retries INTEGER NOT NULL DEFAULT 0
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: boolean filter indices for pending lookups
async fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_processed ON sync_queue(processed)",
        "CREATE INDEX IF NOT EXISTS idx_time_entries_synced ON time_entries(synced)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_synced ON tasks(synced)",
        "CREATE INDEX IF NOT EXISTS idx_projects_synced ON projects(synced)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v1_creates_queue_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'sync_queue'
                )",
                (),
            )
            .await
            .unwrap();

        let exists = rows
            .next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

        assert!(exists);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v2_creates_processed_index() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'index' AND name = 'idx_sync_queue_processed'
                )",
                (),
            )
            .await
            .unwrap();

        let exists = rows
            .next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

        assert!(exists);
    }
}
