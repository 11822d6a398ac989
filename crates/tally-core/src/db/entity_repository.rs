//! Entity repository implementation
//!
//! Every offline mutation persists the entity row and its queue job in one
//! statement transaction; readers never observe one without the other.

use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    Entity, EntityKind, LocalId, NewSyncJob, Project, SyncMeta, Task, TimeEntry,
};

const META_COLUMNS: &str = "local_id, server_id, synced, timestamp, synced_at, conflict";

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Persist a new entity and enqueue its job atomically; returns the job id
    async fn create_with_job(&self, entity: &Entity, job: &NewSyncJob) -> Result<i64>;

    /// Rewrite an edited entity and enqueue its job atomically; returns the job id
    async fn update_with_job(&self, entity: &Entity, job: &NewSyncJob) -> Result<i64>;

    /// Get an entity by local id
    async fn get(&self, kind: EntityKind, id: LocalId) -> Result<Option<Entity>>;

    /// List all locally held entities of one kind, newest first
    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>>;

    /// Record remote acceptance of the entity's current state
    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: LocalId,
        server_id: i64,
        synced_at: &str,
    ) -> Result<()>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run the entity write and the job insert inside one transaction.
    async fn persist_with_job(
        &self,
        entity: &Entity,
        job: &NewSyncJob,
        replace: bool,
    ) -> Result<i64> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        let written = async {
            insert_entity(self.conn, entity, replace).await?;
            insert_job(self.conn, job).await?;
            Ok::<i64, Error>(self.conn.last_insert_rowid())
        }
        .await;

        match written {
            Ok(job_id) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(job_id)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn create_with_job(&self, entity: &Entity, job: &NewSyncJob) -> Result<i64> {
        self.persist_with_job(entity, job, false).await
    }

    async fn update_with_job(&self, entity: &Entity, job: &NewSyncJob) -> Result<i64> {
        self.persist_with_job(entity, job, true).await
    }

    async fn get(&self, kind: EntityKind, id: LocalId) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {META_COLUMNS}, {} FROM {} WHERE local_id = ?",
            domain_columns(kind),
            kind.table()
        );
        let mut rows = self.conn.query(&sql, [id.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_entity(kind, &row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT {META_COLUMNS}, {} FROM {} ORDER BY timestamp DESC",
            domain_columns(kind),
            kind.table()
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(parse_entity(kind, &row)?);
        }

        Ok(entities)
    }

    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: LocalId,
        server_id: i64,
        synced_at: &str,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET server_id = ?, synced = 1, synced_at = ? WHERE local_id = ?",
            kind.table()
        );
        let rows = self
            .conn
            .execute(&sql, params![server_id, synced_at, id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }
}

const fn domain_columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::TimeEntry => "start_time, end_time, project_id, note",
        EntityKind::Task => "name, status, priority, due_date, project_id",
        EntityKind::Project => "name, billable, hourly_rate, client",
    }
}

async fn insert_entity(conn: &Connection, entity: &Entity, replace: bool) -> Result<()> {
    let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };

    match entity {
        Entity::TimeEntry(entry) => {
            let sql = format!(
                "{verb} INTO time_entries ({META_COLUMNS}, start_time, end_time, project_id, note)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            );
            conn.execute(
                &sql,
                params![
                    entry.meta.local_id.as_str(),
                    entry.meta.server_id,
                    i64::from(entry.meta.synced),
                    entry.meta.timestamp.clone(),
                    entry.meta.synced_at.clone(),
                    i64::from(entry.meta.conflict),
                    entry.start_time.clone(),
                    entry.end_time.clone(),
                    entry.project_id,
                    entry.note.clone()
                ],
            )
            .await?;
        }
        Entity::Task(task) => {
            let sql = format!(
                "{verb} INTO tasks ({META_COLUMNS}, name, status, priority, due_date, project_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            );
            conn.execute(
                &sql,
                params![
                    task.meta.local_id.as_str(),
                    task.meta.server_id,
                    i64::from(task.meta.synced),
                    task.meta.timestamp.clone(),
                    task.meta.synced_at.clone(),
                    i64::from(task.meta.conflict),
                    task.name.clone(),
                    task.status.clone(),
                    task.priority.clone(),
                    task.due_date.clone(),
                    task.project_id
                ],
            )
            .await?;
        }
        Entity::Project(project) => {
            let sql = format!(
                "{verb} INTO projects ({META_COLUMNS}, name, billable, hourly_rate, client)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            );
            conn.execute(
                &sql,
                params![
                    project.meta.local_id.as_str(),
                    project.meta.server_id,
                    i64::from(project.meta.synced),
                    project.meta.timestamp.clone(),
                    project.meta.synced_at.clone(),
                    i64::from(project.meta.conflict),
                    project.name.clone(),
                    i64::from(project.billable),
                    project.hourly_rate,
                    project.client.clone()
                ],
            )
            .await?;
        }
    }

    Ok(())
}

async fn insert_job(conn: &Connection, job: &NewSyncJob) -> Result<()> {
    let data = serde_json::to_string(&job.data)?;
    conn.execute(
        "INSERT INTO sync_queue (kind, action, local_id, data, timestamp, processed, retries)
         VALUES (?, ?, ?, ?, ?, 0, 0)",
        params![
            job.kind.as_str(),
            job.action.as_str(),
            job.local_id.as_str(),
            data,
            job.timestamp.clone()
        ],
    )
    .await?;
    Ok(())
}

fn parse_meta(row: &Row) -> Result<SyncMeta> {
    let local_id: String = row.get(0)?;
    Ok(SyncMeta {
        local_id: local_id
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid local id: {local_id}")))?,
        server_id: row.get(1)?,
        synced: row.get::<i32>(2)? != 0,
        timestamp: row.get(3)?,
        synced_at: row.get(4)?,
        conflict: row.get::<i32>(5)? != 0,
    })
}

fn parse_entity(kind: EntityKind, row: &Row) -> Result<Entity> {
    let meta = parse_meta(row)?;

    let entity = match kind {
        EntityKind::TimeEntry => Entity::TimeEntry(TimeEntry {
            meta,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            project_id: row.get(8)?,
            note: row.get(9)?,
        }),
        EntityKind::Task => Entity::Task(Task {
            meta,
            name: row.get(6)?,
            status: row.get(7)?,
            priority: row.get(8)?,
            due_date: row.get(9)?,
            project_id: row.get(10)?,
        }),
        EntityKind::Project => Entity::Project(Project {
            meta,
            name: row.get(6)?,
            billable: row.get::<i32>(7)? != 0,
            hourly_rate: row.get(8)?,
            client: row.get(9)?,
        }),
    };

    Ok(entity)
}
