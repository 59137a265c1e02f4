// Configuration for the GitHub client and the cache store.
// Token and defaults mirror the GITHUB_TOKEN convention and XDG cache dirs.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Page size used when listing a user's repositories.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Settings for the GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Optional bearer token. Anonymous requests are valid but rate-limited
    /// more aggressively by GitHub.
    pub token: Option<String>,
    /// API base URL, overridable for testing against a local server.
    pub api_base: String,
    /// User-Agent header value (required by the GitHub API).
    pub user_agent: String,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
    /// Repositories fetched per page when listing a user's repositories.
    pub page_size: u32,
}

impl GitHubConfig {
    /// Build a config reading the token from the GITHUB_TOKEN environment
    /// variable. A missing token is not an error.
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("GITHUB_TOKEN").ok(),
            ..Self::default()
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: GITHUB_API_BASE.to_string(),
            user_agent: "gitfolio".to_string(),
            request_timeout: Duration::from_secs(10),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Settings for the two-tier cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the durable tier, one file per key.
    pub dir: PathBuf,
    /// Maximum age before a cached entry is treated as stale.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl: default_ttl(),
        }
    }
}

/// Base cache directory (~/.cache/gitfolio on Linux), falling back to a
/// project-relative directory when no home directory is available.
pub fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "gitfolio")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cache/gitfolio"))
}

/// Default TTL: 5 minutes in debug builds for quick iteration, 10 minutes
/// in release builds.
pub fn default_ttl() -> Duration {
    if cfg!(debug_assertions) {
        Duration::from_secs(5 * 60)
    } else {
        Duration::from_secs(10 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_defaults() {
        let config = GitHubConfig::default();
        assert_eq!(config.api_base, GITHUB_API_BASE);
        assert_eq!(config.page_size, 100);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert!(config.dir.ends_with("gitfolio"));
        assert!(config.ttl >= Duration::from_secs(5 * 60));
    }
}
