//! Remote repository metadata provider
//!
//! [`MetadataProvider`] is the interface the sync pass consumes: a full
//! listing of the user's repositories, where `Ok(vec![])` means the provider
//! genuinely reported zero repositories and `Err` means the fetch failed.
//! Change detection must never run on an error-empty list, so the two cases
//! are kept distinct at the type level.
//!
//! The bundled implementation talks to the GitHub REST API with pagination
//! and can additionally fetch a repository's README for indexing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use repolens_core::RepositorySnapshot;

use crate::error::{Result, SearchError};

/// Page size for repository listings
const PER_PAGE: usize = 100;

/// Remote metadata provider trait
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the full repository listing.
    ///
    /// `Ok(vec![])` is success-with-zero-results; any failure is `Err` and
    /// must abort the sync pass before classification.
    async fn fetch_all(&self) -> Result<Vec<RepositorySnapshot>>;

    /// Fetch README content for one repository, if it has one.
    async fn fetch_readme(&self, repo_id: &str) -> Result<Option<String>>;
}

/// Configuration for the GitHub provider
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API base URL (overridable for tests and GitHub Enterprise)
    pub base_url: String,
    /// Personal access token
    pub token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GithubConfig {
    /// Create a config for api.github.com with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: token.into(),
            timeout_secs: 30,
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Repository record as returned by the GitHub API
#[derive(Debug, Deserialize)]
struct GithubRepo {
    full_name: String,
    name: String,
    description: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    pushed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    clone_url: String,
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
}

impl GithubRepo {
    fn into_snapshot(self) -> RepositorySnapshot {
        // pushed_at can be null for repos that never received a push
        let pushed_at = self
            .pushed_at
            .or(self.updated_at)
            .unwrap_or(self.created_at);

        RepositorySnapshot {
            id: self.full_name,
            name: self.name,
            description: self.description,
            topics: self.topics,
            pushed_at,
            html_url: self.html_url,
            clone_url: self.clone_url,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            private: self.private,
            local_path: None,
            fingerprint: String::new(),
        }
    }
}

/// GitHub REST metadata provider
pub struct GithubProvider {
    client: Client,
    config: GithubConfig,
}

impl GithubProvider {
    /// Create a new provider from configuration.
    pub fn new(config: GithubConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("repolens")
            .build()
            .map_err(|e| SearchError::Fetch(format!("HTTP client error: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<GithubRepo>> {
        let url = self.url("/user/repos");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("sort", "pushed".to_string()),
                ("direction", "desc".to_string()),
            ])
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| SearchError::Fetch(format!("GitHub request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                let repos: Vec<GithubRepo> = response
                    .json()
                    .await
                    .map_err(|e| SearchError::Fetch(format!("Invalid GitHub response: {}", e)))?;
                Ok(repos)
            }
            StatusCode::UNAUTHORIZED => Err(SearchError::Auth("GitHub token rejected".into())),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(SearchError::RateLimited { retry_after })
            }
            status => Err(SearchError::Fetch(format!(
                "GitHub returned status {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl MetadataProvider for GithubProvider {
    async fn fetch_all(&self) -> Result<Vec<RepositorySnapshot>> {
        let mut snapshots = Vec::new();
        let mut page = 1;

        loop {
            let repos = self.fetch_page(page).await?;
            let page_len = repos.len();

            snapshots.extend(repos.into_iter().map(GithubRepo::into_snapshot));
            debug!("Fetched page {} ({} repositories)", page, page_len);

            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        info!("Fetched {} repositories from GitHub", snapshots.len());
        Ok(snapshots)
    }

    async fn fetch_readme(&self, repo_id: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/repos/{}/readme", repo_id));

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.raw+json")
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| SearchError::Fetch(format!("README request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                let content = response
                    .text()
                    .await
                    .map_err(|e| SearchError::Fetch(format!("Invalid README response: {}", e)))?;
                Ok(Some(content))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => Err(SearchError::Auth("GitHub token rejected".into())),
            status => Err(SearchError::Fetch(format!(
                "GitHub returned status {}",
                status
            ))),
        }
    }
}
