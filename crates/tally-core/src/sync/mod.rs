//! The sync orchestrator.
//!
//! [`SyncEngine`] owns the durable store, drains the mutation queue against
//! a [`RemoteApi`], and publishes aggregate status. It is an explicitly
//! constructed object with an `open`/`close` lifecycle, passed by reference
//! into collaborators.
//!
//! One pass runs at a time: every trigger (connectivity regained, periodic
//! recheck, forced) goes through the same `Idle`/`Syncing` guard, and a
//! trigger while a pass is in flight is ignored. A pass always returns the
//! machine to `Idle`, success or failure.

mod connectivity;

pub use connectivity::ConnectivityMonitor;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::db::{
    Database, EntityRepository, LibSqlEntityRepository, LibSqlQueueRepository, QueueRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    Entity, EntityKind, LocalId, NewSyncJob, Project, ProjectDraft, SyncAction, SyncJob, Task,
    TaskDraft, TimeEntry, TimeEntryDraft,
};
use crate::remote::RemoteApi;
use crate::status::{StatusPublisher, SyncStatus};
use crate::util::canonical_now;

/// Summary of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// False when the trigger was ignored because a pass was in flight
    pub ran: bool,
    /// Jobs applied remotely this pass
    pub synced: usize,
    /// Jobs that failed and stay pending
    pub failed: usize,
    /// Authoritative pending count after the pass
    pub pending: i64,
}

impl SyncReport {
    const fn skipped(pending: i64) -> Self {
        Self {
            ran: false,
            synced: 0,
            failed: 0,
            pending,
        }
    }
}

struct EngineInner<R> {
    db: Mutex<Database>,
    remote: Option<R>,
    online: AtomicBool,
    syncing: AtomicBool,
    /// Incrementally maintained approximation; reconciled from the queue
    /// at the end of every pass
    pending: AtomicI64,
    status: StatusPublisher,
}

/// The offline-first sync engine.
pub struct SyncEngine<R: RemoteApi> {
    inner: Arc<EngineInner<R>>,
}

impl<R: RemoteApi> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteApi> SyncEngine<R> {
    /// Open the engine at the given store path.
    ///
    /// Without a remote the engine runs local-only: captures queue up
    /// until an endpoint is configured.
    pub async fn open(path: impl AsRef<Path>, remote: Option<R>) -> Result<Self> {
        let db = Database::open(path).await?;
        Self::init(db, remote).await
    }

    /// Open an engine backed by an in-memory store (primarily for tests).
    pub async fn open_in_memory(remote: Option<R>) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Self::init(db, remote).await
    }

    async fn init(db: Database, remote: Option<R>) -> Result<Self> {
        let pending = {
            let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());
            queue.pending_count().await?
        };

        let engine = Self {
            inner: Arc::new(EngineInner {
                db: Mutex::new(db),
                remote,
                online: AtomicBool::new(false),
                syncing: AtomicBool::new(false),
                pending: AtomicI64::new(pending),
                status: StatusPublisher::new(),
            }),
        };

        engine.publish();
        if pending > 0 {
            tracing::info!("Opened with {pending} pending mutations");
        }

        Ok(engine)
    }

    /// Shut the engine down: goes offline and broadcasts the final status.
    ///
    /// All state is already durable, so this is bookkeeping only; stop any
    /// spawned monitor loop before calling it.
    pub async fn close(self) {
        self.inner.online.store(false, Ordering::SeqCst);
        self.publish();
        tracing::info!("Engine closed");
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Capture a time entry, online-first with silent offline fallback.
    pub async fn create_time_entry(&self, draft: TimeEntryDraft) -> Result<TimeEntry> {
        let entity = Entity::TimeEntry(TimeEntry::from_draft(draft));
        match self.create_entity(entity).await? {
            Entity::TimeEntry(entry) => Ok(entry),
            _ => unreachable!("time entry create returned a different kind"),
        }
    }

    /// Capture a task, online-first with silent offline fallback.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let entity = Entity::Task(Task::from_draft(draft)?);
        match self.create_entity(entity).await? {
            Entity::Task(task) => Ok(task),
            _ => unreachable!("task create returned a different kind"),
        }
    }

    /// Capture a project, online-first with silent offline fallback.
    pub async fn create_project(&self, draft: ProjectDraft) -> Result<Project> {
        let entity = Entity::Project(Project::from_draft(draft)?);
        match self.create_entity(entity).await? {
            Entity::Project(project) => Ok(project),
            _ => unreachable!("project create returned a different kind"),
        }
    }

    /// Try the remote first; any remote failure degrades to the offline
    /// path without surfacing to the caller.
    async fn create_entity(&self, entity: Entity) -> Result<Entity> {
        if self.is_online() {
            if let Some(remote) = &self.inner.remote {
                match remote.create(entity.kind(), &entity.payload()).await {
                    Ok(record) => {
                        let mut confirmed = entity;
                        let meta = confirmed.meta_mut();
                        meta.server_id = Some(record.id);
                        meta.synced = true;
                        meta.synced_at = Some(canonical_now());
                        tracing::debug!(
                            "Remote accepted {} create immediately (id {})",
                            confirmed.kind(),
                            record.id
                        );
                        return Ok(confirmed);
                    }
                    Err(error) if error.is_remote() => {
                        tracing::warn!(
                            "Online-first {} create failed, saving offline: {error}",
                            entity.kind()
                        );
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        self.create_offline(entity).await
    }

    async fn create_offline(&self, entity: Entity) -> Result<Entity> {
        let job = NewSyncJob::for_entity(&entity, SyncAction::Create);
        {
            let db = self.inner.db.lock().await;
            let repo = LibSqlEntityRepository::new(db.connection());
            repo.create_with_job(&entity, &job).await?;
        }

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.publish();
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    /// Edit a time entry; resets its synced flag and queues the upload.
    pub async fn update_time_entry(
        &self,
        id: LocalId,
        draft: TimeEntryDraft,
    ) -> Result<TimeEntry> {
        let entity = self.get_entity(EntityKind::TimeEntry, id).await?;
        let Entity::TimeEntry(mut entry) = entity else {
            return Err(Error::NotFound(id.to_string()));
        };
        entry.apply_draft(draft);
        match self.update_entity(Entity::TimeEntry(entry)).await? {
            Entity::TimeEntry(entry) => Ok(entry),
            _ => unreachable!("time entry update returned a different kind"),
        }
    }

    /// Edit a task; resets its synced flag and queues the upload.
    pub async fn update_task(&self, id: LocalId, draft: TaskDraft) -> Result<Task> {
        let entity = self.get_entity(EntityKind::Task, id).await?;
        let Entity::Task(mut task) = entity else {
            return Err(Error::NotFound(id.to_string()));
        };
        task.apply_draft(draft)?;
        match self.update_entity(Entity::Task(task)).await? {
            Entity::Task(task) => Ok(task),
            _ => unreachable!("task update returned a different kind"),
        }
    }

    /// Edit a project; resets its synced flag and queues the upload.
    pub async fn update_project(&self, id: LocalId, draft: ProjectDraft) -> Result<Project> {
        let entity = self.get_entity(EntityKind::Project, id).await?;
        let Entity::Project(mut project) = entity else {
            return Err(Error::NotFound(id.to_string()));
        };
        project.apply_draft(draft)?;
        match self.update_entity(Entity::Project(project)).await? {
            Entity::Project(project) => Ok(project),
            _ => unreachable!("project update returned a different kind"),
        }
    }

    async fn update_entity(&self, entity: Entity) -> Result<Entity> {
        let job = NewSyncJob::for_entity(&entity, SyncAction::Update);
        {
            let db = self.inner.db.lock().await;
            let repo = LibSqlEntityRepository::new(db.connection());
            repo.update_with_job(&entity, &job).await?;
        }

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.publish();
        Ok(entity)
    }

    async fn get_entity(&self, kind: EntityKind, id: LocalId) -> Result<Entity> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        repo.get(kind, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All locally held records of one kind, regardless of sync state.
    pub async fn list_offline(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let db = self.inner.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        repo.list(kind).await
    }

    /// Authoritative pending count, derived from the queue.
    pub async fn pending_count(&self) -> Result<i64> {
        let db = self.inner.db.lock().await;
        let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());
        queue.pending_count().await
    }

    /// Current aggregate status (the pending field here is the
    /// eventually-consistent incremental counter).
    pub fn status(&self) -> SyncStatus {
        self.inner.status.current()
    }

    /// Observe every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    // ------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------

    /// Whether the engine currently believes the remote is reachable.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Feed an observed connectivity state into the engine.
    ///
    /// The offline→online transition triggers exactly one guarded sync
    /// attempt; its report is returned. Every other call only updates the
    /// published status.
    pub async fn set_online(&self, online: bool) -> Result<Option<SyncReport>> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        self.publish();

        if online && !was_online {
            tracing::info!("Connectivity regained");
            if self.inner.remote.is_some() {
                return self.force_sync().await.map(Some);
            }
        } else if !online && was_online {
            tracing::info!("Connectivity lost");
        }

        Ok(None)
    }

    /// Probe the remote; used by the connectivity monitor.
    pub async fn probe_remote(&self) -> bool {
        match &self.inner.remote {
            Some(remote) => remote.ping().await.is_ok(),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Sync pass
    // ------------------------------------------------------------------

    /// Run one sync pass now, regardless of connectivity events.
    ///
    /// Subject to the same guard as every other trigger: if a pass is in
    /// flight the report comes back with `ran == false`.
    pub async fn force_sync(&self) -> Result<SyncReport> {
        if self.inner.remote.is_none() {
            return Err(Error::RemoteNotConfigured);
        }

        if self
            .inner
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync already in progress; trigger ignored");
            return Ok(SyncReport::skipped(
                self.inner.pending.load(Ordering::SeqCst),
            ));
        }

        self.publish();
        let outcome = self.run_pass().await;

        // A pass never leaves the machine stuck in Syncing
        self.inner.syncing.store(false, Ordering::SeqCst);
        self.publish();

        outcome
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let remote = self
            .inner
            .remote
            .as_ref()
            .ok_or(Error::RemoteNotConfigured)?;

        let mut synced = 0usize;
        let mut failed = 0usize;

        for kind in EntityKind::ALL {
            let jobs = {
                let db = self.inner.db.lock().await;
                let queue =
                    LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());
                queue.pending_for(kind).await?
            };

            for job in jobs {
                match self.apply_job(remote, &job).await {
                    Ok(true) => synced += 1,
                    Ok(false) => {}
                    Err(error) if error.is_remote() => {
                        failed += 1;
                        tracing::warn!(
                            "Sync of {} job {} failed, will retry next pass: {error}",
                            job.kind,
                            job.id
                        );
                        let db = self.inner.db.lock().await;
                        let queue = LibSqlQueueRepository::new(
                            db.connection(),
                            db.supports_queue_index(),
                        );
                        queue.record_failure(job.id).await?;
                    }
                    // A storage fault aborts the remaining pass
                    Err(error) => return Err(error),
                }
            }
        }

        // Re-derive the authoritative count to correct incremental drift
        let pending = self.pending_count().await?;
        self.inner.pending.store(pending, Ordering::SeqCst);

        tracing::debug!("Pass complete: {synced} synced, {failed} failed, {pending} pending");
        Ok(SyncReport {
            ran: true,
            synced,
            failed,
            pending,
        })
    }

    /// Apply one queue job. `Ok(true)` means a mutation was accepted
    /// remotely; `Ok(false)` means the job needed no remote call.
    async fn apply_job(&self, remote: &R, job: &SyncJob) -> Result<bool> {
        let entity = {
            let db = self.inner.db.lock().await;
            let repo = LibSqlEntityRepository::new(db.connection());
            repo.get(job.kind, job.local_id).await?
        };

        let Some(entity) = entity else {
            // Should be unreachable given the combined transactions; a
            // missing record would otherwise wedge the queue forever
            tracing::warn!(
                "Queue job {} references missing {} record {}; marking processed",
                job.id,
                job.kind,
                job.local_id
            );
            self.finish_job(job.id).await?;
            return Ok(false);
        };

        if entity.meta().synced {
            // Stale duplicate: an earlier job already uploaded this state
            self.finish_job(job.id).await?;
            return Ok(false);
        }

        let record = match entity.meta().server_id {
            Some(server_id) => remote.update(job.kind, server_id, &entity.payload()).await?,
            None => remote.create(job.kind, &entity.payload()).await?,
        };

        {
            let db = self.inner.db.lock().await;
            let repo = LibSqlEntityRepository::new(db.connection());
            repo.mark_synced(job.kind, job.local_id, record.id, &canonical_now())
                .await?;
            let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());
            queue.mark_processed(job.id).await?;
        }

        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        self.publish();
        Ok(true)
    }

    async fn finish_job(&self, job_id: i64) -> Result<()> {
        {
            let db = self.inner.db.lock().await;
            let queue = LibSqlQueueRepository::new(db.connection(), db.supports_queue_index());
            queue.mark_processed(job_id).await?;
        }
        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.inner.status.publish(SyncStatus {
            online: self.inner.online.load(Ordering::SeqCst),
            pending: self.inner.pending.load(Ordering::SeqCst).max(0),
            syncing: self.inner.syncing.load(Ordering::SeqCst),
        });
    }
}
