use std::fmt;

/// Carries project/org identity through every core operation (C10). Every
/// write path in `tarn-jobs`/`tarn-graph`/`tarn-schema` requires one; read
/// paths filter by `project_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    pub project_id: String,
    pub user_id: Option<String>,
    pub api_token_id: Option<String>,
}

impl TenantContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: None,
            api_token_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_api_token(mut self, api_token_id: impl Into<String>) -> Self {
        self.api_token_id = Some(api_token_id.into());
        self
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project={}", self.project_id)
    }
}

/// Marker used by sweepers (stale-claim recovery, TTL purge) that must cross
/// tenant boundaries to do their job. `tarn-jobs`'s sweeper module is the
/// only intended caller of [`SystemContext::sweeper`]; every other
/// tenant-scoped API in `tarn-jobs`/`tarn-graph`/`tarn-schema` takes a
/// [`TenantContext`] instead, so a `SystemContext` can only ever reach the
/// narrow recover/purge entry points that accept it. It may iterate across
/// tenants but must never mutate data beyond claim/recovery metadata.
#[derive(Debug, Clone, Copy)]
pub struct SystemContext(());

impl SystemContext {
    /// Construct the system-wide context used by sweepers.
    pub fn sweeper() -> Self {
        Self(())
    }
}
