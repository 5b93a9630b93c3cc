use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A payload a queue carries. `fingerprint_source` must return a canonical
/// string over the non-volatile fields of the payload: two payloads that
/// should be treated as "the same logical job" must return the same string.
pub trait JobPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn fingerprint_source(&self) -> String;
}

/// Status column values. `Failed` is never persisted: the `Fail`
/// operation always resolves directly to `Pending` (with backoff) or `Dead`
/// in the same write. The variant is kept so API consumers reasoning about
/// the full status domain have something to match on, and so `Job::status`
/// round-trips through deserialization of older exports that may still
/// carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

/// Generic job row shape, parameterized over its stage-specific
/// payload type. One table exists per queue; `JobStore` is told the table
/// name at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<P> {
    pub id: String,
    pub project_id: String,
    pub payload: P,
    pub fingerprint: String,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub visible_after: DateTime<Utc>,
    pub lease_token: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Outcome of `Enqueue`: either a fresh row was created, or an
/// existing pending/processing row with the same fingerprint was found and
/// its id returned instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Created(String),
    ExistsFingerprint(String),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueOutcome::Created(id) | EnqueueOutcome::ExistsFingerprint(id) => id,
        }
    }
}

/// What a job handler reports back to the worker pool. The pool
/// is the single place that turns this into a Job Store transition.
#[derive(Debug)]
pub enum HandlerOutcome {
    Done,
    RetryableErr(String),
    FatalErr(String),
}
