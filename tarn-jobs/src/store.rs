use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tarn_common::{fingerprint::backoff_millis, AppError, SurrealDbClient, SystemContext, TenantContext};

use crate::model::{EnqueueOutcome, Job, JobPayload, JobStatus};

/// Row shape actually written to SurrealDB: `Job<P>` plus the
/// `active_fingerprint` column used to enforce idempotent enqueue via a
/// unique index that only considers open (pending/processing) rows. This
/// generalizes the teacher's retry-on-conflict pattern
/// (`store_graph_entities`'s `is_retryable_conflict`) from insert contention
/// to claim/enqueue contention.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRow<P> {
    #[serde(flatten)]
    job: Job<P>,
    active_fingerprint: Option<String>,
}

fn open_fingerprint(fingerprint: &str, status: JobStatus) -> Option<String> {
    match status {
        JobStatus::Pending | JobStatus::Processing => Some(fingerprint.to_string()),
        JobStatus::Completed | JobStatus::Failed | JobStatus::Dead => None,
    }
}

/// Job Store (C3): persistent, tenant-scoped queue table operations for one
/// queue. `queue` names the SurrealDB table backing this instance, one
/// `JobStore` per pipeline stage.
pub struct JobStore<P> {
    pub(crate) db: Arc<SurrealDbClient>,
    queue: &'static str,
    default_max_attempts: u32,
    _marker: PhantomData<P>,
}

impl<P: JobPayload> JobStore<P> {
    pub fn new(db: Arc<SurrealDbClient>, queue: &'static str, default_max_attempts: u32) -> Self {
        Self {
            db,
            queue,
            default_max_attempts,
            _marker: PhantomData,
        }
    }

    pub fn queue_name(&self) -> &'static str {
        self.queue
    }

    /// `Enqueue`: idempotent on `(project_id, fingerprint)` among
    /// open rows.
    pub async fn enqueue(
        &self,
        ctx: &TenantContext,
        payload: P,
    ) -> Result<EnqueueOutcome, AppError> {
        let fingerprint = tarn_common::fingerprint::fingerprint(
            &ctx.project_id,
            &payload.fingerprint_source(),
        );

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let row = JobRow {
            job: Job {
                id: id.clone(),
                project_id: ctx.project_id.clone(),
                payload,
                fingerprint: fingerprint.clone(),
                status: JobStatus::Pending,
                attempt_count: 0,
                max_attempts: self.default_max_attempts,
                last_error: None,
                enqueued_at: now,
                started_at: None,
                completed_at: None,
                heartbeat_at: None,
                visible_after: now,
                lease_token: None,
                lease_expires_at: None,
            },
            active_fingerprint: Some(fingerprint.clone()),
        };

        let created: Result<Option<JobRow<P>>, surrealdb::Error> = self
            .db
            .client
            .create((self.queue, id.as_str()))
            .content(row)
            .await;

        match created {
            Ok(_) => {
                debug!(queue = self.queue, project_id = %ctx.project_id, job_id = %id, "job enqueued");
                Ok(EnqueueOutcome::Created(id))
            }
            Err(err) if is_unique_violation(&err) => {
                let existing = self.find_open_by_fingerprint(ctx, &fingerprint).await?;
                match existing {
                    Some(existing_id) => {
                        debug!(queue = self.queue, project_id = %ctx.project_id, job_id = %existing_id, "idempotent enqueue collision");
                        Ok(EnqueueOutcome::ExistsFingerprint(existing_id))
                    }
                    None => Err(AppError::Conflict(
                        "fingerprint collision but no open row found; retry enqueue".into(),
                    )),
                }
            }
            Err(err) => Err(AppError::Database(err)),
        }
    }

    async fn find_open_by_fingerprint(
        &self,
        ctx: &TenantContext,
        fingerprint: &str,
    ) -> Result<Option<String>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
        }
        let mut resp = self
            .db
            .query(
                "SELECT id FROM type::table($table) \
                 WHERE project_id = $project_id AND fingerprint = $fingerprint \
                 AND status IN ['pending', 'processing'] LIMIT 1",
            )
            .bind(("table", self.queue))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("fingerprint", fingerprint.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<Row> = resp.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next().map(|r| r.id.key().to_string()))
    }

    /// `ClaimBatch`: atomically moves up to `n` pending, visible rows
    /// to `processing`, returning them in enqueue order. Implemented as a
    /// select-then-conditional-update pair so a second worker racing on the
    /// same ids simply claims fewer rows than requested instead of
    /// retrying, SurrealDB's equivalent of `FOR UPDATE SKIP LOCKED`.
    pub async fn claim_batch(
        &self,
        worker_id: &str,
        n: usize,
        lease_ttl: StdDuration,
    ) -> Result<Vec<Job<P>>, AppError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let lease_expires_at = now + ChronoDuration::from_std(lease_ttl).unwrap_or(ChronoDuration::seconds(300));
        let lease_token = Uuid::new_v4().to_string();

        let mut resp = self
            .db
            .query(
                "LET $ids = (SELECT VALUE id FROM type::table($table) \
                    WHERE status = 'pending' AND visible_after <= $now \
                    ORDER BY enqueued_at ASC, id ASC LIMIT $n); \
                 UPDATE $ids SET \
                    status = 'processing', \
                    started_at = $now, \
                    heartbeat_at = $now, \
                    lease_token = $lease_token, \
                    lease_expires_at = $lease_expires_at, \
                    active_fingerprint = fingerprint \
                 WHERE status = 'pending' \
                 RETURN AFTER;",
            )
            .bind(("table", self.queue))
            .bind(("now", now))
            .bind(("n", n as i64))
            .bind(("lease_token", lease_token))
            .bind(("lease_expires_at", lease_expires_at))
            .await
            .map_err(AppError::Database)?;

        let claimed: Vec<JobRow<P>> = resp.take(1).map_err(AppError::Database)?;
        if !claimed.is_empty() {
            debug!(queue = self.queue, %worker_id, claimed = claimed.len(), "claimed batch");
        }
        Ok(claimed.into_iter().map(|r| r.job).collect())
    }

    /// `Heartbeat`: extends the lease by `extension`; rejects on
    /// token mismatch.
    pub async fn heartbeat(
        &self,
        job_id: &str,
        lease_token: &str,
        extension: StdDuration,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let new_expiry = now + ChronoDuration::from_std(extension).unwrap_or(ChronoDuration::seconds(300));
        let updated: Option<JobRow<P>> = self
            .db
            .client
            .query(
                "UPDATE type::thing($table, $id) SET \
                    heartbeat_at = $now, \
                    lease_expires_at = $new_expiry \
                 WHERE lease_token = $lease_token RETURN AFTER;",
            )
            .bind(("table", self.queue))
            .bind(("id", job_id.to_string()))
            .bind(("now", now))
            .bind(("new_expiry", new_expiry))
            .bind(("lease_token", lease_token.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        match updated {
            Some(_) => Ok(()),
            None => Err(AppError::LeaseLost(format!(
                "job {job_id} lease token mismatch or job not processing"
            ))),
        }
    }

    /// `Complete`: must be called only after handler side effects
    /// are durable.
    pub async fn complete(&self, job_id: &str, lease_token: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let updated: Option<JobRow<P>> = self
            .db
            .client
            .query(
                "UPDATE type::thing($table, $id) SET \
                    status = 'completed', completed_at = $now, lease_token = NONE, \
                    lease_expires_at = NONE, active_fingerprint = NONE \
                 WHERE lease_token = $lease_token RETURN AFTER;",
            )
            .bind(("table", self.queue))
            .bind(("id", job_id.to_string()))
            .bind(("now", now))
            .bind(("lease_token", lease_token.to_string()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;

        match updated {
            Some(_) => Ok(()),
            None => Err(AppError::LeaseLost(format!(
                "job {job_id} lease token mismatch on complete"
            ))),
        }
    }

    /// `Fail`: resolves directly to `pending` (with backoff) or
    /// `dead` (dead-letter after `max_attempts`).
    pub async fn fail(
        &self,
        job_id: &str,
        lease_token: &str,
        err: &str,
        retryable: bool,
    ) -> Result<(), AppError> {
        let current: Option<JobRow<P>> = self
            .db
            .client
            .select((self.queue, job_id))
            .await
            .map_err(AppError::Database)?;
        let Some(row) = current else {
            return Err(AppError::NotFound(format!("job {job_id} not found")));
        };
        if row.job.lease_token.as_deref() != Some(lease_token) {
            return Err(AppError::LeaseLost(format!(
                "job {job_id} lease token mismatch on fail"
            )));
        }

        let next_attempt = row.job.attempt_count.saturating_add(1);
        self.apply_failure(
            job_id,
            &row.job.fingerprint,
            next_attempt,
            row.job.max_attempts,
            err,
            retryable,
        )
        .await
    }

    async fn apply_failure(
        &self,
        job_id: &str,
        fingerprint: &str,
        next_attempt: u32,
        max_attempts: u32,
        err: &str,
        retryable: bool,
    ) -> Result<(), AppError> {
        if retryable && next_attempt < max_attempts {
            let now = Utc::now();
            let delay = ChronoDuration::milliseconds(backoff_millis(next_attempt - 1) as i64);
            let visible_after = now + delay;
            let active_fingerprint = open_fingerprint(fingerprint, JobStatus::Pending);
            let _: Option<JobRow<P>> = self
                .db
                .client
                .query(
                    "UPDATE type::thing($table, $id) SET \
                        status = 'pending', attempt_count = $attempt, last_error = $err, \
                        visible_after = $visible_after, lease_token = NONE, lease_expires_at = NONE, \
                        active_fingerprint = $active_fingerprint;",
                )
                .bind(("table", self.queue))
                .bind(("id", job_id.to_string()))
                .bind(("attempt", next_attempt))
                .bind(("err", err.to_string()))
                .bind(("visible_after", visible_after))
                .bind(("active_fingerprint", active_fingerprint))
                .await
                .map_err(AppError::Database)?
                .take(0)
                .map_err(AppError::Database)?;
            warn!(queue = self.queue, %job_id, attempt = next_attempt, %err, "job failed, retrying with backoff");
        } else {
            let active_fingerprint = open_fingerprint(fingerprint, JobStatus::Dead);
            let _: Option<JobRow<P>> = self
                .db
                .client
                .query(
                    "UPDATE type::thing($table, $id) SET \
                        status = 'dead', attempt_count = $attempt, last_error = $err, \
                        lease_token = NONE, lease_expires_at = NONE, active_fingerprint = $active_fingerprint;",
                )
                .bind(("table", self.queue))
                .bind(("id", job_id.to_string()))
                .bind(("attempt", next_attempt))
                .bind(("err", err.to_string()))
                .bind(("active_fingerprint", active_fingerprint))
                .await
                .map_err(AppError::Database)?
                .take(0)
                .map_err(AppError::Database)?;
            warn!(queue = self.queue, %job_id, attempt = next_attempt, %err, "job dead-lettered");
        }
        Ok(())
    }

    /// `RecoverStale`: only callable with a
    /// [`SystemContext`], since it must scan across every tenant's rows.
    pub async fn recover_stale(&self, _sys: &SystemContext) -> Result<usize, AppError> {
        let now = Utc::now();
        #[derive(Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
        }
        let mut resp = self
            .db
            .query(
                "SELECT id FROM type::table($table) \
                 WHERE status = 'processing' AND lease_expires_at < $now",
            )
            .bind(("table", self.queue))
            .bind(("now", now))
            .await
            .map_err(AppError::Database)?;
        let stale: Vec<Row> = resp.take(0).map_err(AppError::Database)?;

        let mut recovered = 0usize;
        for row in stale {
            let job_id = row.id.key().to_string();
            let current: Option<JobRow<P>> = self
                .db
                .client
                .select((self.queue, job_id.as_str()))
                .await
                .map_err(AppError::Database)?;
            let Some(job_row) = current else { continue };
            // Re-check under read: another recovery sweep or heartbeat may
            // have already moved this job on.
            if job_row.job.status != JobStatus::Processing {
                continue;
            }
            if job_row
                .job
                .lease_expires_at
                .map(|exp| exp >= now)
                .unwrap_or(true)
            {
                continue;
            }
            let next_attempt = job_row.job.attempt_count.saturating_add(1);
            self.apply_failure(
                &job_id,
                &job_row.job.fingerprint,
                next_attempt,
                job_row.job.max_attempts,
                "lease_expired",
                true,
            )
            .await?;
            recovered = recovered.saturating_add(1);
        }

        if recovered > 0 {
            info!(queue = self.queue, recovered, "recovered stale leases");
        }
        Ok(recovered)
    }

    /// `Purge`: removes `completed` rows older than `completed_ttl`.
    pub async fn purge(
        &self,
        _sys: &SystemContext,
        completed_ttl: StdDuration,
    ) -> Result<usize, AppError> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(completed_ttl).unwrap_or(ChronoDuration::zero());
        let deleted: Vec<JobRow<P>> = self
            .db
            .client
            .query(
                "DELETE FROM type::table($table) \
                 WHERE status = 'completed' AND completed_at < $cutoff RETURN BEFORE;",
            )
            .bind(("table", self.queue))
            .bind(("cutoff", cutoff))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(deleted.len())
    }

    /// Defines this queue's indices: a
    /// `(status, visible_after, id)` index for claim scans, and the
    /// `(project_id, active_fingerprint)` unique index idempotent enqueue
    /// relies on. Safe to call repeatedly at startup.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.db
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_{queue}_claim ON TABLE {queue} \
                    FIELDS status, visible_after, id;
                 DEFINE INDEX IF NOT EXISTS idx_{queue}_open_fp ON TABLE {queue} \
                    FIELDS project_id, active_fingerprint UNIQUE;",
                queue = self.queue
            ))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Tenant-scoped read. Returns `Ok(None)` both when the job does not
    /// exist and when it belongs to a different tenant: the caller
    /// cannot distinguish "not found" from "not yours."
    pub async fn get(&self, ctx: &TenantContext, job_id: &str) -> Result<Option<Job<P>>, AppError> {
        let row: Option<JobRow<P>> = self
            .db
            .client
            .select((self.queue, job_id))
            .await
            .map_err(AppError::Database)?;
        Ok(row
            .filter(|r| r.job.project_id == ctx.project_id)
            .map(|r| r.job))
    }
}

/// SurrealDB reports unique-index violations as a generic query error; we
/// match on its message the same way the teacher's
/// `ingestion-pipeline::pipeline::stages::is_retryable_conflict` matches on
/// transaction-conflict text, since the client does not expose a typed
/// variant for this.
fn is_unique_violation(err: &surrealdb::Error) -> bool {
    let text = err.to_string();
    text.contains("already contains") || text.contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize as De, Serialize as Se};

    #[derive(Debug, Clone, Se, De)]
    struct DemoPayload {
        doc_id: String,
    }

    impl JobPayload for DemoPayload {
        fn fingerprint_source(&self) -> String {
            self.doc_id.clone()
        }
    }

    async fn store() -> JobStore<DemoPayload> {
        let db = SurrealDbClient::memory("test", "test").await.unwrap();
        let store = JobStore::new(Arc::new(db), "demo_jobs", 3);
        store.ensure_schema().await.unwrap();
        store
    }

    fn ctx(project: &str) -> TenantContext {
        TenantContext::new(project)
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_fingerprint() {
        let store = store().await;
        let c = ctx("p1");
        let a = store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let b = store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        assert_eq!(a.job_id(), b.job_id());
        assert!(matches!(a, EnqueueOutcome::Created(_)));
        assert!(matches!(b, EnqueueOutcome::ExistsFingerprint(_)));
    }

    #[tokio::test]
    async fn enqueue_does_not_collide_across_tenants() {
        let store = store().await;
        let a = store
            .enqueue(&ctx("p1"), DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let b = store
            .enqueue(&ctx("p2"), DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        assert_ne!(a.job_id(), b.job_id());
    }

    #[tokio::test]
    async fn claim_heartbeat_complete_roundtrip() {
        let store = store().await;
        let c = ctx("p1");
        let outcome = store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();

        let claimed = store
            .claim_batch("worker-1", 5, StdDuration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        let job = &claimed[0];
        assert_eq!(job.id, outcome.job_id());
        let lease_token = job.lease_token.clone().unwrap();

        // Claiming again returns nothing: the row is no longer pending.
        let second = store
            .claim_batch("worker-2", 5, StdDuration::from_secs(60))
            .await
            .unwrap();
        assert!(second.is_empty());

        store
            .heartbeat(&job.id, &lease_token, StdDuration::from_secs(60))
            .await
            .unwrap();
        store.complete(&job.id, &lease_token).await.unwrap();

        let fetched = store.get(&c, &job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn heartbeat_rejects_stale_lease_token() {
        let store = store().await;
        let c = ctx("p1");
        store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let claimed = store
            .claim_batch("worker-1", 1, StdDuration::from_secs(60))
            .await
            .unwrap();
        let job = &claimed[0];

        let result = store
            .heartbeat(&job.id, "not-the-real-token", StdDuration::from_secs(60))
            .await;
        assert!(matches!(result, Err(AppError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn fail_retries_until_max_attempts_then_dead_letters() {
        let store = store().await;
        let c = ctx("p1");
        store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();

        for _ in 0..3 {
            let claimed = store
                .claim_batch("worker-1", 1, StdDuration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(claimed.len(), 1);
            let job = &claimed[0];
            let lease_token = job.lease_token.clone().unwrap();
            store
                .fail(&job.id, &lease_token, "boom", true)
                .await
                .unwrap();

            // Make the retried row immediately visible for the next claim.
            store
                .db
                .query("UPDATE type::table($table) SET visible_after = time::now() - 1h")
                .bind(("table", store.queue))
                .await
                .unwrap();
        }

        let job_id = outcome_id(&store, &c).await;
        let final_job = store.get(&c, &job_id).await.unwrap().unwrap();
        assert_eq!(final_job.status, JobStatus::Dead);
        assert_eq!(final_job.attempt_count, 3);
    }

    async fn outcome_id(store: &JobStore<DemoPayload>, ctx: &TenantContext) -> String {
        #[derive(Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
        }
        let mut resp = store
            .db
            .query("SELECT id FROM type::table($table) WHERE project_id = $p")
            .bind(("table", store.queue))
            .bind(("p", ctx.project_id.clone()))
            .await
            .unwrap();
        let rows: Vec<Row> = resp.take(0).unwrap();
        rows[0].id.key().to_string()
    }

    #[tokio::test]
    async fn recover_stale_requeues_expired_leases_with_backoff() {
        let store = store().await;
        let c = ctx("p1");
        store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let claimed = store
            .claim_batch("worker-1", 1, StdDuration::from_secs(60))
            .await
            .unwrap();
        let job_id = claimed[0].id.clone();

        // Force the lease into the past so the sweep treats it as stale.
        store
            .db
            .query("UPDATE type::table($table) SET lease_expires_at = time::now() - 1h")
            .bind(("table", store.queue))
            .await
            .unwrap();

        let sys = SystemContext::sweeper();
        let recovered = store.recover_stale(&sys).await.unwrap();
        assert_eq!(recovered, 1);

        let job = store.get(&c, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt_count, 1);
        assert!(job.lease_token.is_none());
    }

    #[tokio::test]
    async fn get_hides_rows_belonging_to_other_tenants() {
        let store = store().await;
        let outcome = store
            .enqueue(&ctx("p1"), DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let found = store.get(&ctx("p2"), outcome.job_id()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_old_completed_rows() {
        let store = store().await;
        let c = ctx("p1");
        let outcome = store
            .enqueue(&c, DemoPayload { doc_id: "doc-1".into() })
            .await
            .unwrap();
        let claimed = store
            .claim_batch("worker-1", 1, StdDuration::from_secs(60))
            .await
            .unwrap();
        let lease_token = claimed[0].lease_token.clone().unwrap();
        store.complete(&claimed[0].id, &lease_token).await.unwrap();

        let sys = SystemContext::sweeper();
        // completed_at is "now"; a long ttl should not purge it yet.
        let purged = store
            .purge(&sys, StdDuration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(purged, 0);
        assert!(store.get(&c, outcome.job_id()).await.unwrap().is_some());

        // Backdate completed_at, then a zero ttl purges it.
        store
            .db
            .query("UPDATE type::table($table) SET completed_at = time::now() - 1h")
            .bind(("table", store.queue))
            .await
            .unwrap();
        let purged = store.purge(&sys, StdDuration::from_secs(0)).await.unwrap();
        assert_eq!(purged, 1);
    }
}
