use thiserror::Error;

/// Abstract error kinds from the pipeline's error-handling design: each maps
/// to exactly one `Classified` outcome the worker pool understands, so a
/// handler never has to reason about retry policy itself.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("Lease lost: {0}")]
    LeaseLost(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

/// Classification a job handler returns to the worker pool. The pool is the
/// single place that turns this into a Job Store transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    /// Retryable: DB-transient, upstream rate limit, lease race.
    Retryable,
    /// Not retryable: validation, tenant isolation, missing schema.
    Fatal,
}

impl AppError {
    /// Classify this error as retryable or fatal. Handlers are expected to
    /// construct one of the typed variants above rather than relying on this
    /// for anything outside worker-pool glue, but the mapping lives in one
    /// place so it can't drift between call sites.
    pub fn classify(&self) -> Classified {
        match self {
            AppError::Database(_)
            | AppError::TransientUpstream(_)
            | AppError::OpenAI(_)
            | AppError::LeaseLost(_)
            | AppError::Conflict(_) => Classified::Retryable,
            AppError::NotFound(_)
            | AppError::Validation(_)
            | AppError::TenantIsolation(_)
            | AppError::LLMParsing(_)
            | AppError::Join(_)
            | AppError::Config(_)
            | AppError::Anyhow(_)
            | AppError::InternalError(_) => Classified::Fatal,
        }
    }
}
