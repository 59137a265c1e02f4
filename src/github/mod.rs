// GitHub API integration.
// HTTP client, typed payloads, and the cached fetch service.

pub mod api;
pub mod client;
pub mod flight;
pub mod service;
pub mod types;

pub use api::{Conditional, GitHubApi};
pub use client::GitHubClient;
pub use service::GitHubService;
pub use types::{RateLimit, RepositoryRecord};
