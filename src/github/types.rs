// GitHub API payload types.
// Wire structs for deserializing REST responses, and the normalized
// repository record handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository payload as returned by the REST API. Only the fields the
/// normalized record needs are declared; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPayload {
    pub name: String,
    pub owner: OwnerPayload,
    pub description: Option<String>,
    pub html_url: String,
    pub homepage: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub fork: bool,
    pub license: Option<LicensePayload>,
}

/// Repository owner payload.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
}

/// License payload; spdx_id is null for custom licenses.
#[derive(Debug, Clone, Deserialize)]
pub struct LicensePayload {
    pub spdx_id: Option<String>,
}

/// README payload: content arrives base64-encoded with embedded newlines.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadmePayload {
    pub content: String,
    pub encoding: String,
}

/// Normalized repository metadata. Immutable once constructed; a refresh
/// replaces the record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub homepage: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub fork: bool,
    pub license: Option<String>,
}

impl From<RepoPayload> for RepositoryRecord {
    fn from(payload: RepoPayload) -> Self {
        Self {
            owner: payload.owner.login,
            name: payload.name,
            description: payload.description,
            url: payload.html_url,
            homepage: payload.homepage,
            stars: payload.stargazers_count,
            forks: payload.forks_count,
            language: payload.language,
            topics: payload.topics,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            pushed_at: payload.pushed_at,
            archived: payload.archived,
            fork: payload.fork,
            license: payload.license.and_then(|license| license.spdx_id),
        }
    }
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
