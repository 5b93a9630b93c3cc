//! Job queue substrate (C3/C4): at-least-once delivery with claim/lease,
//! retry with backoff, stale-claim recovery, and dead-lettering, plus the
//! adaptive worker pool that drives it. One `JobStore`/`WorkerPool` pair
//! exists per pipeline stage queue.

pub mod model;
pub mod pool;
pub mod state;
pub mod store;
pub mod sweeper;

pub use model::{EnqueueOutcome, HandlerOutcome, Job, JobPayload, JobStatus};
pub use pool::{JobHandler, WorkerPool};
pub use store::JobStore;
pub use sweeper::Sweeper;
