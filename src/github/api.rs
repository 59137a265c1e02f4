// Transport interface for the repository metadata API.
// The orchestrator talks to this trait; the reqwest client implements it,
// and tests substitute an in-process mock.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ReadmePayload, RepoPayload};

/// Outcome of a conditional request: a fresh payload with its new
/// validator, or confirmation that the cached copy is still current.
#[derive(Debug, Clone)]
pub enum Conditional<T> {
    Fresh { data: T, etag: Option<String> },
    NotModified,
}

/// The three logical GitHub calls the orchestrator issues. Each accepts an
/// optional validator to attach as an If-None-Match header; failures are
/// typed errors, never panics.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Fetch one repository by owner and name.
    async fn fetch_repo(
        &self,
        owner: &str,
        repo: &str,
        etag: Option<&str>,
    ) -> Result<Conditional<RepoPayload>>;

    /// Fetch one page of a user's public repositories.
    async fn fetch_user_repos_page(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
        etag: Option<&str>,
    ) -> Result<Conditional<Vec<RepoPayload>>>;

    /// Fetch a repository's README in its transport encoding.
    async fn fetch_readme(
        &self,
        owner: &str,
        repo: &str,
        etag: Option<&str>,
    ) -> Result<Conditional<ReadmePayload>>;
}
