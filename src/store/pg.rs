//! Postgres-backed `Store`, built on `diesel-async` + `bb8` pooling, the same
//! stack `sui-indexer` uses for its relational persistence layer.

use async_trait::async_trait;
use bb8::Pool;
use chrono::Utc;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Double;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::{CoreError, CoreResult};
use crate::models::{Batch, Stats, Worker};
use crate::schema::{batches, channels, playlists, user_channels, user_playlists, user_videos, videos, workers};

use super::{StagingTable, Store, WorkerCommitAction};

/// Carries either a genuine database error (left for `conn.transaction` to
/// retry/bubble) or a protocol-level abort decided while holding the worker
/// row's lock — e.g. the worker turned out to be disabled or already bound
/// to a different batch than the caller expected.
enum WorkerGateAbort {
    Db(diesel::result::Error),
    Protocol(CoreError),
}

impl From<diesel::result::Error> for WorkerGateAbort {
    fn from(err: diesel::result::Error) -> Self {
        WorkerGateAbort::Db(err)
    }
}

fn resolve_gate<T>(result: Result<T, WorkerGateAbort>) -> CoreResult<T> {
    result.map_err(|err| match err {
        WorkerGateAbort::Db(err) => internal(err),
        WorkerGateAbort::Protocol(core_err) => core_err,
    })
}

type PgPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub struct PgStore {
    pool: PgPool,
}

#[derive(Queryable)]
struct WorkerRow {
    id: String,
    ip: String,
    reputation: i64,
    disabled: bool,
    current_batch: Option<String>,
    last_committed: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
}

impl From<WorkerRow> for Worker {
    fn from(row: WorkerRow) -> Self {
        Worker {
            id: row.id,
            ip: row.ip,
            reputation: row.reputation,
            disabled: row.disabled,
            current_batch: row.current_batch,
            last_committed: row.last_committed,
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = workers)]
struct NewWorker<'a> {
    id: &'a str,
    ip: &'a str,
}

#[derive(Queryable)]
struct BatchRow {
    id: String,
    start_ctid: String,
    end_ctid: String,
    finished: bool,
    content_size: Option<i64>,
    videos: Vec<String>,
    version: i64,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            start_ctid: row.start_ctid,
            end_ctid: row.end_ctid,
            finished: row.finished,
            content_size: row.content_size,
            videos: row.videos,
            version: row.version,
        }
    }
}

fn internal<E: std::error::Error + Send + Sync + 'static>(err: E) -> CoreError {
    CoreError::Internal(anyhow::anyhow!(err))
}

impl PgStore {
    pub async fn connect(database_url: &str, max_size: u32) -> anyhow::Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder().max_size(max_size).build(manager).await?;
        Ok(PgStore { pool })
    }

    async fn conn(
        &self,
    ) -> CoreResult<bb8::PooledConnection<'_, AsyncDieselConnectionManager<AsyncPgConnection>>>
    {
        self.pool.get().await.map_err(internal)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_worker(&self, id: &str) -> CoreResult<Option<Worker>> {
        let mut conn = self.conn().await?;
        let row = workers::table
            .find(id)
            .first::<WorkerRow>(&mut conn)
            .await
            .optional()
            .map_err(internal)?;
        Ok(row.map(Worker::from))
    }

    async fn enroll_worker(&self, id: &str, ip: &str) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(workers::table)
            .values(NewWorker { id, ip })
            .execute(&mut conn)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn count_workers_by_ip(&self, ip_addr: &str) -> CoreResult<i64> {
        let mut conn = self.conn().await?;
        workers::table
            .filter(workers::ip.eq(ip_addr))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(internal)
    }

    async fn workers_for_ip(&self, ip_addr: &str) -> CoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        workers::table
            .filter(workers::ip.eq(ip_addr))
            .select(workers::id)
            .load::<String>(&mut conn)
            .await
            .map_err(internal)
    }

    async fn get_batch(&self, id: &str) -> CoreResult<Option<Batch>> {
        let mut conn = self.conn().await?;
        let row = batches::table
            .find(id)
            .first::<BatchRow>(&mut conn)
            .await
            .optional()
            .map_err(internal)?;
        Ok(row.map(Batch::from))
    }

    async fn pick_random_batch(&self, finished_flag: bool) -> CoreResult<Option<Batch>> {
        let mut conn = self.conn().await?;
        let row = batches::table
            .filter(batches::finished.eq(finished_flag))
            .order(sql::<Double>("RANDOM()"))
            .first::<BatchRow>(&mut conn)
            .await
            .optional()
            .map_err(internal)?;
        Ok(row.map(Batch::from))
    }

    async fn count_finished_batches(&self) -> CoreResult<i64> {
        let mut conn = self.conn().await?;
        batches::table
            .filter(batches::finished.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(internal)
    }

    async fn count_unfinished_batches(&self) -> CoreResult<i64> {
        let mut conn = self.conn().await?;
        batches::table
            .filter(batches::finished.eq(false))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(internal)
    }

    async fn bind_worker_to_batch(&self, worker_id: &str, batch_id: &str) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let worker_id = worker_id.to_owned();
        let batch_id = batch_id.to_owned();
        let result = conn
            .transaction::<_, WorkerGateAbort, _>(|conn| {
                let worker_id = worker_id.clone();
                let batch_id = batch_id.clone();
                async move {
                    let row: Option<(bool, Option<String>)> = workers::table
                        .find(&worker_id)
                        .select((workers::disabled, workers::current_batch))
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    let (disabled, current_batch) =
                        row.ok_or(WorkerGateAbort::Protocol(CoreError::UnknownWorker))?;
                    if disabled {
                        return Err(WorkerGateAbort::Protocol(CoreError::WorkerDisabled));
                    }
                    if let Some(current) = current_batch {
                        return Err(WorkerGateAbort::Protocol(CoreError::MustCommitCurrent {
                            batch_id: current,
                        }));
                    }
                    diesel::update(workers::table.find(&worker_id))
                        .set(workers::current_batch.eq(&batch_id))
                        .execute(conn)
                        .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await;
        resolve_gate(result)
    }

    async fn gate_worker_on_batch(
        &self,
        worker_id: &str,
        expected_batch_id: &str,
        action: WorkerCommitAction,
    ) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let worker_id = worker_id.to_owned();
        let expected_batch_id = expected_batch_id.to_owned();
        let result = conn
            .transaction::<_, WorkerGateAbort, _>(|conn| {
                let worker_id = worker_id.clone();
                let expected_batch_id = expected_batch_id.clone();
                async move {
                    let row: Option<(bool, Option<String>, i64)> = workers::table
                        .find(&worker_id)
                        .select((workers::disabled, workers::current_batch, workers::reputation))
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    let (disabled, current_batch, reputation) =
                        row.ok_or(WorkerGateAbort::Protocol(CoreError::UnknownWorker))?;
                    if disabled {
                        return Err(WorkerGateAbort::Protocol(CoreError::WorkerDisabled));
                    }
                    match current_batch {
                        Some(ref current) if *current == expected_batch_id => {}
                        Some(current) => {
                            return Err(WorkerGateAbort::Protocol(CoreError::MustCommitCurrent {
                                batch_id: current,
                            }))
                        }
                        None => return Err(WorkerGateAbort::Protocol(CoreError::ForbiddenBatch)),
                    }

                    match action {
                        WorkerCommitAction::None => {}
                        WorkerCommitAction::Release => {
                            let now = Utc::now();
                            diesel::update(workers::table.find(&worker_id))
                                .set((
                                    workers::current_batch.eq(None::<String>),
                                    workers::reputation.eq(workers::reputation + 1),
                                    workers::last_committed.eq(now),
                                ))
                                .execute(conn)
                                .await?;
                        }
                        WorkerCommitAction::Penalise(delta) => {
                            let new_reputation = reputation - delta;
                            diesel::update(workers::table.find(&worker_id))
                                .set((
                                    workers::reputation.eq(new_reputation),
                                    workers::disabled.eq(new_reputation < 0),
                                ))
                                .execute(conn)
                                .await?;
                        }
                    }
                    Ok(())
                }
                .scope_boxed()
            })
            .await;
        resolve_gate(result)
    }

    async fn record_versioned_overwrite(&self, batch_id: &str, new_size: i64) -> CoreResult<i64> {
        let mut conn = self.conn().await?;
        let pre_increment_version = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let batch_id = batch_id.to_owned();
                async move {
                    let current_version: i64 = batches::table
                        .find(&batch_id)
                        .select(batches::version)
                        .for_update()
                        .first(conn)
                        .await?;
                    diesel::update(batches::table.find(&batch_id))
                        .set((
                            batches::content_size.eq(new_size),
                            batches::version.eq(current_version + 1),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(current_version)
                }
                .scope_boxed()
            })
            .await
            .map_err(internal)?;
        Ok(pre_increment_version)
    }

    async fn record_finalization(&self, batch_id: &str, size: i64) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let did_finalize = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let batch_id = batch_id.to_owned();
                async move {
                    let already_finished: bool = batches::table
                        .find(&batch_id)
                        .select(batches::finished)
                        .for_update()
                        .first(conn)
                        .await?;
                    if already_finished {
                        return Ok(false);
                    }
                    diesel::update(batches::table.find(&batch_id))
                        .set((
                            batches::content_size.eq(size),
                            batches::finished.eq(true),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await
            .map_err(internal)?;
        Ok(did_finalize)
    }

    async fn stats(&self) -> CoreResult<Stats> {
        let mut conn = self.conn().await?;
        let batch_count: i64 = batches::table.count().get_result(&mut conn).await.map_err(internal)?;
        let batch_finished: i64 = batches::table
            .filter(batches::finished.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(internal)?;
        let content_size: Option<i64> = batches::table
            .filter(batches::finished.eq(true))
            .select(diesel::dsl::sum(batches::content_size))
            .first(&mut conn)
            .await
            .map_err(internal)?;
        let worker_count: i64 = workers::table.count().get_result(&mut conn).await.map_err(internal)?;
        let active_cutoff = Utc::now() - chrono::Duration::hours(1);
        let worker_active: i64 = workers::table
            .filter(workers::last_committed.gt(active_cutoff))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(internal)?;

        Ok(Stats {
            batch_count,
            batch_finished,
            content_size: content_size.unwrap_or(0),
            worker_count,
            worker_active,
        })
    }

    async fn stage_submissions(
        &self,
        table: StagingTable,
        ids: &[String],
    ) -> CoreResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;

        let existing_authoritative: Vec<String> = match table {
            StagingTable::Videos => videos::table
                .filter(videos::id.eq_any(ids))
                .select(videos::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
            StagingTable::Playlists => playlists::table
                .filter(playlists::id.eq_any(ids))
                .select(playlists::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
            StagingTable::Channels => channels::table
                .filter(channels::id.eq_any(ids))
                .select(channels::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
        };

        let existing_staging: Vec<String> = match table {
            StagingTable::Videos => user_videos::table
                .filter(user_videos::id.eq_any(ids))
                .select(user_videos::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
            StagingTable::Playlists => user_playlists::table
                .filter(user_playlists::id.eq_any(ids))
                .select(user_playlists::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
            StagingTable::Channels => user_channels::table
                .filter(user_channels::id.eq_any(ids))
                .select(user_channels::id)
                .load(&mut conn)
                .await
                .map_err(internal)?,
        };

        let already_known: std::collections::HashSet<&str> = existing_authoritative
            .iter()
            .chain(existing_staging.iter())
            .map(String::as_str)
            .collect();

        let to_insert: Vec<String> = ids
            .iter()
            .filter(|id| !already_known.contains(id.as_str()))
            .cloned()
            .collect();

        if to_insert.is_empty() {
            return Ok(to_insert);
        }

        match table {
            StagingTable::Videos => {
                let rows: Vec<_> = to_insert
                    .iter()
                    .map(|id| (user_videos::id.eq(id)))
                    .collect();
                diesel::insert_into(user_videos::table)
                    .values(rows)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await
                    .map_err(internal)?;
            }
            StagingTable::Playlists => {
                let rows: Vec<_> = to_insert
                    .iter()
                    .map(|id| (user_playlists::id.eq(id)))
                    .collect();
                diesel::insert_into(user_playlists::table)
                    .values(rows)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await
                    .map_err(internal)?;
            }
            StagingTable::Channels => {
                let rows: Vec<_> = to_insert
                    .iter()
                    .map(|id| (user_channels::id.eq(id)))
                    .collect();
                diesel::insert_into(user_channels::table)
                    .values(rows)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await
                    .map_err(internal)?;
            }
        }

        Ok(to_insert)
    }
}
