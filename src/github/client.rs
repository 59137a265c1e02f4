// GitHub API HTTP client.
// Handles authentication, conditional requests, rate limit tracking, and
// response status mapping.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH, USER_AGENT},
};

use crate::config::GitHubConfig;
use crate::error::{GitfolioError, Result};

use super::api::{Conditional, GitHubApi};
use super::types::{RateLimit, ReadmePayload, RepoPayload};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client with optional authentication and rate limit tracking.
pub struct GitHubClient {
    http: Client,
    api_base: String,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a client from the given configuration. Absence of a token is
    /// valid; requests then run under GitHub's anonymous rate limits.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| GitfolioError::Other(e.to_string()))?,
            );
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| GitfolioError::Other(e.to_string()))?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(GitfolioError::Api)?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Create a client reading the token from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(&GitHubConfig::from_env())
    }

    /// Snapshot of the most recently observed rate limit headers.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make a conditional GET request. Ok(None) signals a 304 Not Modified
    /// response; any other non-success status maps to a typed error.
    async fn request(
        &self,
        endpoint: &str,
        query: Option<&[(&str, String)]>,
        etag: Option<&str>,
    ) -> Result<Option<Response>> {
        let url = format!("{}{}", self.api_base, endpoint);
        let mut request = self.http.get(&url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(etag) = etag {
            request = request.header(
                IF_NONE_MATCH,
                HeaderValue::from_str(etag).map_err(|e| GitfolioError::Other(e.to_string()))?,
            );
        }

        let response = request.send().await.map_err(GitfolioError::Api)?;
        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let mut rate_limit = self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = header_number(response, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_number(response, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_number(response, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Option<Response>> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(Some(response)),
            StatusCode::NOT_MODIFIED => Ok(None),
            StatusCode::UNAUTHORIZED => Err(GitfolioError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(GitfolioError::NotFound(url))
            }
            StatusCode::FORBIDDEN => {
                // Check if rate limited
                let rate_limit = self.rate_limit();
                if rate_limit.remaining == 0 {
                    let reset_at = chrono::DateTime::from_timestamp(rate_limit.reset as i64, 0)
                        .map(|dt| dt.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    Err(GitfolioError::RateLimited { reset_at })
                } else {
                    Err(GitfolioError::Other(format!(
                        "Forbidden: {}",
                        response.text().await.unwrap_or_default()
                    )))
                }
            }
            status => Err(GitfolioError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn fetch_repo(
        &self,
        owner: &str,
        repo: &str,
        etag: Option<&str>,
    ) -> Result<Conditional<RepoPayload>> {
        let endpoint = format!("/repos/{owner}/{repo}");
        let Some(response) = self.request(&endpoint, None, etag).await? else {
            return Ok(Conditional::NotModified);
        };
        let etag = response_etag(&response);
        let data: RepoPayload = response.json().await?;
        Ok(Conditional::Fresh { data, etag })
    }

    async fn fetch_user_repos_page(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
        etag: Option<&str>,
    ) -> Result<Conditional<Vec<RepoPayload>>> {
        let query = [
            ("sort", "updated".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        let endpoint = format!("/users/{username}/repos");
        let Some(response) = self.request(&endpoint, Some(&query), etag).await? else {
            return Ok(Conditional::NotModified);
        };
        let etag = response_etag(&response);
        let data: Vec<RepoPayload> = response.json().await?;
        Ok(Conditional::Fresh { data, etag })
    }

    async fn fetch_readme(
        &self,
        owner: &str,
        repo: &str,
        etag: Option<&str>,
    ) -> Result<Conditional<ReadmePayload>> {
        let endpoint = format!("/repos/{owner}/{repo}/readme");
        let Some(response) = self.request(&endpoint, None, etag).await? else {
            return Ok(Conditional::NotModified);
        };
        let etag = response_etag(&response);
        let data: ReadmePayload = response.json().await?;
        Ok(Conditional::Fresh { data, etag })
    }
}

fn response_etag(response: &Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn header_number(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
