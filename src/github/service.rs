// Cached fetch orchestration for repository metadata.
// Checks the cache store, joins in-flight requests, and revalidates with
// conditional requests before paying for a network round trip.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{CacheStore, keys};
use crate::config::{CacheConfig, GitHubConfig};
use crate::error::Result;

use super::api::{Conditional, GitHubApi};
use super::client::GitHubClient;
use super::flight::FlightMap;
use super::types::{ReadmePayload, RepositoryRecord};

/// Cached, deduplicated access to GitHub repository metadata.
///
/// Every operation follows the same path: a fresh cache hit returns
/// immediately; a concurrent identical request is joined rather than
/// repeated; otherwise one conditional network call runs and its result is
/// written back to both cache tiers. Failures collapse to None or an empty
/// list at this boundary, never to an error.
pub struct GitHubService {
    api: Arc<dyn GitHubApi>,
    cache: Arc<CacheStore>,
    page_size: u32,
    repo_flights: FlightMap<Option<RepositoryRecord>>,
    list_flights: FlightMap<Vec<RepositoryRecord>>,
    readme_flights: FlightMap<Option<String>>,
}

impl GitHubService {
    /// Build a service over the live GitHub API.
    pub fn new(github: GitHubConfig, cache: CacheConfig) -> Result<Self> {
        let page_size = github.page_size;
        let client = GitHubClient::new(&github)?;
        Ok(Self::with_api(Arc::new(client), cache, page_size))
    }

    /// Build a service over any transport, e.g. a test double.
    pub fn with_api(api: Arc<dyn GitHubApi>, cache: CacheConfig, page_size: u32) -> Self {
        Self {
            api,
            cache: Arc::new(CacheStore::new(cache)),
            page_size,
            repo_flights: FlightMap::new(),
            list_flights: FlightMap::new(),
            readme_flights: FlightMap::new(),
        }
    }

    /// The cache store backing this service.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetch one repository's metadata, or None when it cannot be fetched.
    pub async fn repo(&self, owner: &str, repo: &str) -> Option<RepositoryRecord> {
        let key = keys::repo(owner, repo);
        if let Some(record) = self.cache.get::<RepositoryRecord>(&key) {
            debug!(%key, "cache hit");
            return Some(record);
        }

        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let flight_key = key.clone();
        let owner = owner.to_string();
        let repo = repo.to_string();
        self.repo_flights
            .run(&key, async move {
                fetch_repo(api, cache, flight_key, owner, repo).await
            })
            .await
    }

    /// Fetch all public repositories of a user, in the API's update order.
    /// Returns an empty list on total failure.
    pub async fn user_repos(&self, username: &str) -> Vec<RepositoryRecord> {
        let key = keys::user_repos(username);
        if let Some(records) = self.cache.get::<Vec<RepositoryRecord>>(&key) {
            debug!(%key, "cache hit");
            return records;
        }

        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let flight_key = key.clone();
        let username = username.to_string();
        let page_size = self.page_size;
        self.list_flights
            .run(&key, async move {
                fetch_user_repos(api, cache, flight_key, username, page_size).await
            })
            .await
    }

    /// Fetch a repository's README as decoded UTF-8, or None when it cannot
    /// be fetched.
    pub async fn readme(&self, owner: &str, repo: &str) -> Option<String> {
        let key = keys::readme(owner, repo);
        if let Some(content) = self.cache.get::<String>(&key) {
            debug!(%key, "cache hit");
            return Some(content);
        }

        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let flight_key = key.clone();
        let owner = owner.to_string();
        let repo = repo.to_string();
        self.readme_flights
            .run(&key, async move {
                fetch_readme(api, cache, flight_key, owner, repo).await
            })
            .await
    }
}

async fn fetch_repo(
    api: Arc<dyn GitHubApi>,
    cache: Arc<CacheStore>,
    key: String,
    owner: String,
    repo: String,
) -> Option<RepositoryRecord> {
    let etag = cache.etag(&key);
    match api.fetch_repo(&owner, &repo, etag.as_deref()).await {
        Ok(Conditional::NotModified) => resolve_not_modified(&cache, &key),
        Ok(Conditional::Fresh { data, etag }) => {
            let record = RepositoryRecord::from(data);
            cache.set(&key, &record, etag);
            debug!(%key, "cached repository");
            Some(record)
        }
        Err(err) => {
            warn!(%key, error = %err, "repository fetch failed");
            None
        }
    }
}

async fn fetch_user_repos(
    api: Arc<dyn GitHubApi>,
    cache: Arc<CacheStore>,
    key: String,
    username: String,
    page_size: u32,
) -> Vec<RepositoryRecord> {
    let mut repos: Vec<RepositoryRecord> = Vec::new();
    let mut page = 1u32;

    loop {
        let page_key = keys::user_repos_page(&username, page);
        let etag = cache.etag(&page_key);
        match api
            .fetch_user_repos_page(&username, page, page_size, etag.as_deref())
            .await
        {
            Ok(Conditional::NotModified) => {
                match cache.peek::<Vec<RepositoryRecord>>(&page_key) {
                    Some(cached_page) => {
                        debug!(key = %page_key, "not modified, replaying cached page");
                        if cached_page.is_empty() {
                            break;
                        }
                        repos.extend(cached_page);
                        page += 1;
                    }
                    None => {
                        warn!(key = %page_key, "not modified response without a cached page");
                        break;
                    }
                }
            }
            Ok(Conditional::Fresh { data, etag }) => {
                let records: Vec<RepositoryRecord> =
                    data.into_iter().map(RepositoryRecord::from).collect();
                cache.set(&page_key, &records, etag);
                if records.is_empty() {
                    break;
                }
                repos.extend(records);
                page += 1;
            }
            Err(err) => {
                warn!(key = %page_key, error = %err, "repository listing page failed");
                if repos.is_empty() {
                    // Nothing usable; leave the cache untouched.
                    return Vec::new();
                }
                break;
            }
        }
    }

    cache.set(&key, &repos, None);
    debug!(%key, count = repos.len(), "cached user repositories");
    repos
}

async fn fetch_readme(
    api: Arc<dyn GitHubApi>,
    cache: Arc<CacheStore>,
    key: String,
    owner: String,
    repo: String,
) -> Option<String> {
    let etag = cache.etag(&key);
    match api.fetch_readme(&owner, &repo, etag.as_deref()).await {
        Ok(Conditional::NotModified) => resolve_not_modified(&cache, &key),
        Ok(Conditional::Fresh { data, etag }) => match decode_readme(data) {
            Ok(content) => {
                cache.set(&key, &content, etag);
                debug!(%key, "cached readme");
                Some(content)
            }
            Err(err) => {
                warn!(%key, error = %err, "readme payload decoding failed");
                None
            }
        },
        Err(err) => {
            warn!(%key, error = %err, "readme fetch failed");
            None
        }
    }
}

/// Serve a "not modified" response from the cached copy, whatever its age.
/// The entry's timestamp is left untouched.
fn resolve_not_modified<T: DeserializeOwned>(cache: &CacheStore, key: &str) -> Option<T> {
    match cache.peek::<T>(key) {
        Some(value) => {
            debug!(key, "not modified, serving cached value");
            Some(value)
        }
        None => {
            warn!(key, "not modified response without a cached copy");
            None
        }
    }
}

/// Decode a readme payload. Base64 transport content embeds newlines that
/// must be stripped before decoding, or the payload is corrupted.
fn decode_readme(payload: ReadmePayload) -> Result<String> {
    if payload.encoding == "base64" {
        let compact = payload.content.replace('\n', "");
        let bytes = STANDARD.decode(compact)?;
        Ok(String::from_utf8(bytes)?)
    } else {
        Ok(payload.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    use crate::error::GitfolioError;
    use crate::github::types::{LicensePayload, OwnerPayload, RepoPayload};

    const TTL: Duration = Duration::from_secs(600);

    fn timestamp(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn payload(owner: &str, name: &str) -> RepoPayload {
        RepoPayload {
            name: name.to_string(),
            owner: OwnerPayload {
                login: owner.to_string(),
            },
            description: Some("demo".to_string()),
            html_url: format!("https://github.com/{owner}/{name}"),
            homepage: None,
            stargazers_count: 5,
            forks_count: 1,
            language: Some("Rust".to_string()),
            topics: vec!["site".to_string()],
            created_at: timestamp("2020-01-01T00:00:00Z"),
            updated_at: timestamp("2024-01-01T00:00:00Z"),
            pushed_at: None,
            archived: false,
            fork: false,
            license: Some(LicensePayload {
                spdx_id: Some("MIT".to_string()),
            }),
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Fresh,
        NotModified,
        Fail,
    }

    struct MockApi {
        mode: Mutex<Mode>,
        etag: Option<String>,
        delay: Duration,
        pages: Vec<Vec<RepoPayload>>,
        fail_after_page: Option<u32>,
        readme_content: String,
        calls: AtomicUsize,
        seen_etags: Mutex<Vec<Option<String>>>,
    }

    impl Default for MockApi {
        fn default() -> Self {
            Self {
                mode: Mutex::new(Mode::Fresh),
                etag: None,
                delay: Duration::ZERO,
                pages: Vec::new(),
                fail_after_page: None,
                readme_content: String::new(),
                calls: AtomicUsize::new(0),
                seen_etags: Mutex::new(Vec::new()),
            }
        }
    }

    impl MockApi {
        fn mode(&self) -> Mode {
            *self.mode.lock().unwrap()
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn record_call(&self, etag: Option<&str>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_etags
                .lock()
                .unwrap()
                .push(etag.map(str::to_string));
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
        }
    }

    #[async_trait]
    impl GitHubApi for MockApi {
        async fn fetch_repo(
            &self,
            owner: &str,
            repo: &str,
            etag: Option<&str>,
        ) -> crate::error::Result<Conditional<RepoPayload>> {
            self.record_call(etag).await;
            match self.mode() {
                Mode::Fresh => Ok(Conditional::Fresh {
                    data: payload(owner, repo),
                    etag: self.etag.clone(),
                }),
                Mode::NotModified => Ok(Conditional::NotModified),
                Mode::Fail => Err(GitfolioError::NotFound(format!("{owner}/{repo}"))),
            }
        }

        async fn fetch_user_repos_page(
            &self,
            _username: &str,
            page: u32,
            _per_page: u32,
            etag: Option<&str>,
        ) -> crate::error::Result<Conditional<Vec<RepoPayload>>> {
            self.record_call(etag).await;
            if self.mode() == Mode::Fail {
                return Err(GitfolioError::Other("listing unavailable".to_string()));
            }
            if let Some(limit) = self.fail_after_page {
                if page > limit {
                    return Err(GitfolioError::Other("listing unavailable".to_string()));
                }
            }
            let data = self
                .pages
                .get((page - 1) as usize)
                .cloned()
                .unwrap_or_default();
            Ok(Conditional::Fresh { data, etag: None })
        }

        async fn fetch_readme(
            &self,
            owner: &str,
            repo: &str,
            etag: Option<&str>,
        ) -> crate::error::Result<Conditional<ReadmePayload>> {
            self.record_call(etag).await;
            match self.mode() {
                Mode::Fresh => Ok(Conditional::Fresh {
                    data: ReadmePayload {
                        content: self.readme_content.clone(),
                        encoding: "base64".to_string(),
                    },
                    etag: self.etag.clone(),
                }),
                Mode::NotModified => Ok(Conditional::NotModified),
                Mode::Fail => Err(GitfolioError::NotFound(format!("{owner}/{repo}/readme"))),
            }
        }
    }

    fn service_over(dir: &TempDir, api: Arc<MockApi>) -> GitHubService {
        GitHubService::with_api(
            api,
            CacheConfig {
                dir: dir.path().to_path_buf(),
                ttl: TTL,
            },
            100,
        )
    }

    #[tokio::test]
    async fn test_miss_then_populate() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi::default());
        let service = service_over(&dir, api.clone());

        let record = service.repo("octocat", "hello").await.unwrap();
        assert_eq!(record.owner, "octocat");
        assert_eq!(api.calls(), 1);

        // A fresh service over the same directory reads the durable tier
        // without going to the network.
        let failing = Arc::new(MockApi {
            mode: Mutex::new(Mode::Fail),
            ..MockApi::default()
        });
        let reopened = service_over(&dir, failing.clone());
        let replayed = reopened.repo("octocat", "hello").await.unwrap();
        assert_eq!(replayed, record);
        assert_eq!(failing.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi::default());
        let service = service_over(&dir, api.clone());

        let first = service.repo("octocat", "hello").await;
        let second = service.repo("octocat", "hello").await;
        assert_eq!(first, second);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_deduplicated() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi {
            delay: Duration::from_millis(10),
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        let (a, b, c) = tokio::join!(
            service.repo("octocat", "hello"),
            service.repo("octocat", "hello"),
            service.repo("octocat", "hello"),
        );

        assert_eq!(api.calls(), 1);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test]
    async fn test_failure_collapses_to_none() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi {
            mode: Mutex::new(Mode::Fail),
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        assert_eq!(service.repo("octocat", "gone").await, None);
        // Failures are not cached; the next call tries again.
        assert_eq!(service.repo("octocat", "gone").await, None);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_not_modified_serves_cached_value() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi {
            etag: Some("etagX".to_string()),
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        let original = service.repo("octocat", "hello").await.unwrap();

        // Let the entry go stale, then have the API confirm it is current.
        let key = keys::repo("octocat", "hello");
        service.cache().backdate(&key, 2 * TTL);
        api.set_mode(Mode::NotModified);

        let revalidated = service.repo("octocat", "hello").await.unwrap();
        assert_eq!(revalidated, original);
        assert_eq!(api.calls(), 2);

        // The revalidation carried the stored validator.
        let seen = api.seen_etags.lock().unwrap().clone();
        assert_eq!(seen[1], Some("etagX".to_string()));
    }

    #[tokio::test]
    async fn test_pagination_accumulates_all_pages() {
        let dir = TempDir::new().unwrap();
        let pages = vec![
            (0..100).map(|i| payload("octocat", &format!("r{i}"))).collect(),
            (100..200).map(|i| payload("octocat", &format!("r{i}"))).collect(),
            (200..237).map(|i| payload("octocat", &format!("r{i}"))).collect(),
        ];
        let api = Arc::new(MockApi {
            pages,
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        let repos = service.user_repos("octocat").await;
        assert_eq!(repos.len(), 237);
        for (i, record) in repos.iter().enumerate() {
            assert_eq!(record.name, format!("r{i}"));
        }
        // Three data pages plus the empty terminator.
        assert_eq!(api.calls(), 4);

        // The aggregate is cached; a second listing costs nothing.
        let again = service.user_repos("octocat").await;
        assert_eq!(again.len(), 237);
        assert_eq!(api.calls(), 4);
    }

    #[tokio::test]
    async fn test_first_page_failure_yields_empty_uncached() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi {
            mode: Mutex::new(Mode::Fail),
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        assert!(service.user_repos("octocat").await.is_empty());
        let aggregate_key = keys::user_repos("octocat");
        assert_eq!(
            service.cache().peek::<Vec<RepositoryRecord>>(&aggregate_key),
            None
        );
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_prefix() {
        let dir = TempDir::new().unwrap();
        let pages = vec![(0..100).map(|i| payload("octocat", &format!("r{i}"))).collect()];
        let api = Arc::new(MockApi {
            pages,
            fail_after_page: Some(1),
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        let repos = service.user_repos("octocat").await;
        assert_eq!(repos.len(), 100);

        // The partial result is cached under the aggregate key.
        let aggregate_key = keys::user_repos("octocat");
        let cached = service
            .cache()
            .peek::<Vec<RepositoryRecord>>(&aggregate_key)
            .unwrap();
        assert_eq!(cached.len(), 100);
    }

    #[tokio::test]
    async fn test_readme_decodes_base64_with_newlines() {
        let text = "# Héllo 世界\n\nPortfolio site.\n";
        let mut encoded = STANDARD.encode(text);
        // GitHub wraps base64 content across lines.
        encoded.insert(10, '\n');
        encoded.insert(25, '\n');
        encoded.push('\n');

        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockApi {
            readme_content: encoded,
            ..MockApi::default()
        });
        let service = service_over(&dir, api.clone());

        let readme = service.readme("octocat", "hello").await.unwrap();
        assert_eq!(readme, text);

        // Served from cache on repeat.
        let again = service.readme("octocat", "hello").await.unwrap();
        assert_eq!(again, text);
        assert_eq!(api.calls(), 1);
    }

    #[test]
    fn test_decode_readme_passthrough_encoding() {
        let payload = ReadmePayload {
            content: "plain text".to_string(),
            encoding: "utf-8".to_string(),
        };
        assert_eq!(decode_readme(payload).unwrap(), "plain text");
    }

    #[test]
    fn test_decode_readme_rejects_bad_base64() {
        let payload = ReadmePayload {
            content: "!!!not base64!!!".to_string(),
            encoding: "base64".to_string(),
        };
        assert!(decode_readme(payload).is_err());
    }
}
