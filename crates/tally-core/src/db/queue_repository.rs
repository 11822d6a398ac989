//! Sync queue repository implementation
//!
//! The queue is append-only. Rows are inserted by the entity repository's
//! combined transactions; this repository only reads them and flips their
//! `processed`/`retries` bookkeeping.
//!
//! Boolean-filtered lookups use `idx_sync_queue_processed` when the store
//! has it; otherwise the same queries are served by a full-table scan with
//! filtering done here. Callers cannot tell which path ran.

#![allow(clippy::cast_possible_wrap)] // queue length fits i64

use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{EntityKind, SyncJob};

const JOB_COLUMNS: &str = "id, kind, action, local_id, data, timestamp, processed, retries";

/// Trait for sync queue operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Count jobs not yet applied remotely
    async fn pending_count(&self) -> Result<i64>;

    /// Pending jobs of one kind, FIFO by enqueue order
    async fn pending_for(&self, kind: EntityKind) -> Result<Vec<SyncJob>>;

    /// Mark a job applied; re-marking a processed job is a no-op
    async fn mark_processed(&self, id: i64) -> Result<()>;

    /// Count one failed attempt against a job
    async fn record_failure(&self, id: i64) -> Result<()>;

    /// Get a job by id
    async fn get(&self, id: i64) -> Result<Option<SyncJob>>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
    indexed: bool,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository; `indexed` comes from the store's capability
    /// probe (`Database::supports_queue_index`).
    pub const fn new(conn: &'a Connection, indexed: bool) -> Self {
        Self { conn, indexed }
    }

    async fn scan_jobs(&self) -> Result<Vec<SyncJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM sync_queue ORDER BY id ASC");
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(parse_job(&row)?);
        }

        Ok(jobs)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn pending_count(&self) -> Result<i64> {
        if self.indexed {
            let mut rows = self
                .conn
                .query("SELECT COUNT(*) FROM sync_queue WHERE processed = 0", ())
                .await?;

            let count: i64 = match rows.next().await? {
                Some(row) => row.get(0)?,
                None => 0,
            };
            return Ok(count);
        }

        let pending = self
            .scan_jobs()
            .await?
            .into_iter()
            .filter(|job| !job.processed)
            .count();
        Ok(pending as i64)
    }

    async fn pending_for(&self, kind: EntityKind) -> Result<Vec<SyncJob>> {
        if self.indexed {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM sync_queue
                 WHERE kind = ? AND processed = 0
                 ORDER BY id ASC"
            );
            let mut rows = self.conn.query(&sql, [kind.as_str()]).await?;

            let mut jobs = Vec::new();
            while let Some(row) = rows.next().await? {
                jobs.push(parse_job(&row)?);
            }
            return Ok(jobs);
        }

        Ok(self
            .scan_jobs()
            .await?
            .into_iter()
            .filter(|job| job.kind == kind && !job.processed)
            .collect())
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET processed = 1 WHERE id = ? AND processed = 0",
                params![id],
            )
            .await?;
        Ok(())
    }

    async fn record_failure(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET retries = retries + 1 WHERE id = ?",
                params![id],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<SyncJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM sync_queue WHERE id = ?");
        let mut rows = self.conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_job(&row)?)),
            None => Ok(None),
        }
    }
}

fn parse_job(row: &Row) -> Result<SyncJob> {
    let kind: String = row.get(1)?;
    let action: String = row.get(2)?;
    let local_id: String = row.get(3)?;
    let data: String = row.get(4)?;

    Ok(SyncJob {
        id: row.get(0)?,
        kind: kind.parse()?,
        action: action.parse()?,
        local_id: local_id
            .parse()
            .map_err(|_| crate::Error::InvalidInput(format!("invalid local id: {local_id}")))?,
        data: serde_json::from_str(&data)?,
        timestamp: row.get(5)?,
        processed: row.get::<i32>(6)? != 0,
        retries: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Database, EntityRepository, LibSqlEntityRepository};
    use crate::models::{Entity, NewSyncJob, SyncAction, TaskDraft, TimeEntry, TimeEntryDraft};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn enqueue_entry(db: &Database, note: &str) -> Entity {
        let repo = LibSqlEntityRepository::new(db.connection());
        let entity = Entity::TimeEntry(TimeEntry::from_draft(TimeEntryDraft {
            note: Some(note.to_string()),
            ..TimeEntryDraft::default()
        }));
        let job = NewSyncJob::for_entity(&entity, SyncAction::Create);
        repo.create_with_job(&entity, &job).await.unwrap();
        entity
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_count_tracks_enqueued_jobs() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());

        assert_eq!(queue.pending_count().await.unwrap(), 0);
        enqueue_entry(&db, "one").await;
        enqueue_entry(&db, "two").await;
        assert_eq!(queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_for_is_fifo_within_kind() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());

        let first = enqueue_entry(&db, "first").await;
        let second = enqueue_entry(&db, "second").await;

        let jobs = queue.pending_for(EntityKind::TimeEntry).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].id < jobs[1].id);
        assert_eq!(jobs[0].local_id, first.local_id());
        assert_eq!(jobs[1].local_id, second.local_id());

        assert!(queue
            .pending_for(EntityKind::Task)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_processed_is_idempotent() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());

        enqueue_entry(&db, "job").await;
        let job = queue.pending_for(EntityKind::TimeEntry).await.unwrap()[0].clone();

        queue.mark_processed(job.id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);

        // Second call is a no-op, not an error
        queue.mark_processed(job.id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_failure_increments_retries() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());

        enqueue_entry(&db, "flaky").await;
        let job = queue.pending_for(EntityKind::TimeEntry).await.unwrap()[0].clone();
        assert_eq!(job.retries, 0);

        queue.record_failure(job.id).await.unwrap();
        queue.record_failure(job.id).await.unwrap();

        let reloaded = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.retries, 2);
        assert!(!reloaded.processed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scan_fallback_matches_indexed_results() {
        let db = setup().await;

        enqueue_entry(&db, "a").await;
        enqueue_entry(&db, "b").await;
        let task = Entity::Task(
            crate::models::Task::from_draft(TaskDraft {
                name: "queue me".to_string(),
                ..TaskDraft::default()
            })
            .unwrap(),
        );
        let repo = LibSqlEntityRepository::new(db.connection());
        let job = NewSyncJob::for_entity(&task, SyncAction::Create);
        repo.create_with_job(&task, &job).await.unwrap();

        let indexed = LibSqlQueueRepository::new(db.connection(), true);
        let scanning = LibSqlQueueRepository::new(db.connection(), false);

        // Process one job so both paths have to filter
        let first = indexed.pending_for(EntityKind::TimeEntry).await.unwrap()[0].id;
        indexed.mark_processed(first).await.unwrap();

        assert_eq!(
            indexed.pending_count().await.unwrap(),
            scanning.pending_count().await.unwrap()
        );
        for kind in EntityKind::ALL {
            assert_eq!(
                indexed.pending_for(kind).await.unwrap(),
                scanning.pending_for(kind).await.unwrap()
            );
        }
    }
}
