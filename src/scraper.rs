use crate::args::Args;
use crate::content::{ContentFetcher, FetchedContent};
use crate::error::{Result, ScrapeError};
use crate::paths::{OutputMode, PathResolver};
use crate::rate_limit::{RateGovernor, RequestClass};
use crate::search::{SearchPager, SearchResult};
use chrono::{TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const GITHUB_API: &str = "https://api.github.com";

/// Terminal state of one search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Succeeded,
    /// Not a downloadable file (e.g. the path is a directory).
    Skipped(String),
    Failed(String),
}

/// What happened to one search result, kept in memory for the run summary.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub status: DownloadStatus,
}

/// Final counts for a run. `succeeded + skipped + failed == attempted`,
/// and `attempted` never exceeds the configured maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, status: &DownloadStatus) {
        self.attempted += 1;
        match status {
            DownloadStatus::Succeeded => self.succeeded += 1,
            DownloadStatus::Skipped(_) => self.skipped += 1,
            DownloadStatus::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitOverview {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitBucket,
    search: RateLimitBucket,
}

#[derive(Debug, Deserialize)]
struct RateLimitBucket {
    limit: u32,
    remaining: u32,
    reset: i64,
}

/// The orchestrating loop: searches GitHub for matching YAML manifests and
/// downloads each match sequentially, one item fully resolved before the
/// next begins. A single item's failure is never fatal to the run.
pub struct YamlScraper {
    client: Client,
    token: String,
    api_base: String,
    query: String,
    output_dir: PathBuf,
    max_files: usize,
    mode: OutputMode,
}

impl YamlScraper {
    /// Build a scraper from CLI arguments. The token comes from `--token`
    /// or the `GITHUB_TOKEN` environment variable; missing credentials are
    /// the fatal startup error.
    pub fn new(args: &Args) -> Result<Self> {
        let token = match &args.token {
            Some(t) if !t.trim().is_empty() => t.clone(),
            _ => match env::var("GITHUB_TOKEN") {
                Ok(token) if !token.trim().is_empty() => token,
                _ => {
                    error!("GitHub token not provided or found in environment");
                    return Err(ScrapeError::Auth(
                        "GitHub token is required (use --token or set GITHUB_TOKEN)".to_string(),
                    ));
                }
            },
        };

        let client = Client::builder()
            .user_agent("k8s-yaml-scraper (reqwest)")
            .build()?;

        let mode = if args.flat {
            OutputMode::Flat
        } else {
            OutputMode::Structured
        };

        Ok(YamlScraper {
            client,
            token,
            api_base: GITHUB_API.to_string(),
            query: args.query.clone(),
            output_dir: args.output_dir.clone(),
            max_files: args.max_files,
            mode,
        })
    }

    /// Point the scraper at a different API host. Used by tests.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Run the full pipeline: verify credentials, paginate the search, and
    /// download every match up to the configured maximum.
    pub async fn run(&self) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        info!("Search query: '{}'", self.query);
        info!("Output directory: {}", self.output_dir.display());
        info!("Maximum files to download: {}", self.max_files);
        match self.mode {
            OutputMode::Flat => info!("Using flat directory layout"),
            OutputMode::Structured => info!("Using repository/path directory layout"),
        }

        let mut governor = RateGovernor::new();
        self.verify_credentials().await?;
        self.probe_rate_limits(&mut governor).await;

        let mut pager = SearchPager::new(
            self.client.clone(),
            &self.api_base,
            &self.token,
            &self.query,
            self.max_files,
        );
        let fetcher = ContentFetcher::new(self.client.clone(), &self.token);
        let mut resolver = PathResolver::new(&self.output_dir, self.mode);
        let mut summary = RunSummary::default();

        let progress = ProgressBar::new(self.max_files as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {wide_msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        loop {
            let item = match pager.next(&mut governor).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    // Retry budget for the search itself is spent; keep
                    // what we have and report.
                    error!("Search pagination aborted: {}", e);
                    break;
                }
            };

            progress.set_message(format!(
                "{} ({} downloaded)",
                item.repository_full_name, summary.succeeded
            ));

            let outcome = self
                .process_item(&item, &fetcher, &mut resolver, &mut governor)
                .await;
            summary.record(&outcome.status);
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            "Finished: attempted {}, succeeded {}, skipped {}, failed {}",
            summary.attempted, summary.succeeded, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Pending -> Fetching -> Writing -> {Succeeded | Skipped | Failed}.
    async fn process_item(
        &self,
        item: &SearchResult,
        fetcher: &ContentFetcher,
        resolver: &mut PathResolver,
        governor: &mut RateGovernor,
    ) -> DownloadOutcome {
        let path = resolver.resolve(item);
        debug!(
            "Fetching {}/{}",
            item.repository_full_name, item.file_path
        );

        let status = match fetcher.fetch(&item.content_url, governor).await {
            Ok(FetchedContent::File(bytes)) => match write_file(&path, &bytes).await {
                Ok(()) => {
                    info!("Saved {}", path.display());
                    DownloadStatus::Succeeded
                }
                Err(e) => {
                    error!("Failed to write {}: {}", path.display(), e);
                    DownloadStatus::Failed(e.to_string())
                }
            },
            Ok(FetchedContent::Directory) => {
                warn!(
                    "{}/{} is a directory, not a file. Skipping.",
                    item.repository_full_name, item.file_path
                );
                DownloadStatus::Skipped("path is a directory".to_string())
            }
            Err(e) => {
                error!(
                    "Failed to fetch {}/{}: {}",
                    item.repository_full_name, item.file_path, e
                );
                DownloadStatus::Failed(e.to_string())
            }
        };

        DownloadOutcome { path, status }
    }

    /// Eagerly authenticate so a bad token fails the run before any search
    /// request goes out.
    async fn verify_credentials(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/user", self.api_base))
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Auth(format!(
                "GitHub rejected the token: HTTP {}",
                status
            )));
        }

        let user: AuthenticatedUser =
            response
                .json()
                .await
                .map_err(|e| ScrapeError::MalformedResponse {
                    context: format!("/user response: {}", e),
                })?;
        info!("Authenticated as GitHub user: {}", user.login);
        Ok(())
    }

    /// Log both quota buckets and seed the governor with them. Best effort;
    /// the governor self-corrects from response headers either way.
    async fn probe_rate_limits(&self, governor: &mut RateGovernor) {
        let response = self
            .client
            .get(format!("{}/rate_limit", self.api_base))
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await;

        let overview: RateLimitOverview = match response {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(overview) => overview,
                Err(e) => {
                    warn!("Could not parse rate limit overview: {}", e);
                    return;
                }
            },
            Ok(r) => {
                warn!("Rate limit probe returned HTTP {}", r.status());
                return;
            }
            Err(e) => {
                warn!("Rate limit probe failed: {}", e);
                return;
            }
        };

        let core = &overview.resources.core;
        let search = &overview.resources.search;
        info!(
            "Initial rate limit: core {}/{}, search {}/{}",
            core.remaining, core.limit, search.remaining, search.limit
        );
        if core.remaining < 50 || search.remaining < 5 {
            warn!("Rate limit low. Consider waiting before running.");
        }

        for (kind, bucket) in [
            (RequestClass::Core, core),
            (RequestClass::Search, search),
        ] {
            if let Some(reset) = Utc.timestamp_opt(bucket.reset, 0).single() {
                governor.prime(kind, bucket.remaining, reset);
            }
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
