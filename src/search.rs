use crate::error::{Result, ScrapeError};
use crate::rate_limit::{RateGovernor, RequestClass};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results per search page, the API maximum.
pub const PER_PAGE: usize = 100;

/// GitHub stops serving code search results past the first 1000 items no
/// matter what `total_count` claims.
pub const SEARCH_RESULT_CAP: usize = 1000;

const PAGE_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// One code search match, as handed to the download driver. The
/// `content_url` is the API's `url` field for the item, treated as an
/// opaque fetch handle.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub repository_full_name: String,
    pub file_path: String,
    pub content_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    path: String,
    url: String,
    repository: RepoRef,
}

#[derive(Debug, Deserialize)]
struct RepoRef {
    full_name: String,
}

/// Lazily paginates `/search/code` results for one query.
///
/// Pages are fetched on demand as the buffered items drain; the sequence
/// ends at `min(max_results, total_count, SEARCH_RESULT_CAP)`, on a short
/// page, or on HTTP 422 (the API's end-of-search-window signal).
pub struct SearchPager {
    client: Client,
    api_base: String,
    token: String,
    query: String,
    limit: usize,
    yielded: usize,
    next_page: u32,
    done: bool,
    buffer: VecDeque<SearchResult>,
}

impl SearchPager {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
        query: impl Into<String>,
        max_results: usize,
    ) -> Self {
        SearchPager {
            client,
            api_base: api_base.into(),
            token: token.into(),
            query: query.into(),
            limit: max_results.min(SEARCH_RESULT_CAP),
            yielded: 0,
            next_page: 1,
            done: false,
            buffer: VecDeque::new(),
        }
    }

    /// Next result, fetching a page when the buffer is empty. `Ok(None)`
    /// means the sequence is exhausted.
    pub async fn next(&mut self, governor: &mut RateGovernor) -> Result<Option<SearchResult>> {
        // A zero maximum never touches the network.
        if self.limit == 0 {
            return Ok(None);
        }
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_next_page(governor).await?;
        }
    }

    async fn fetch_next_page(&mut self, governor: &mut RateGovernor) -> Result<()> {
        let page = self.next_page;
        debug!("Requesting search page {} for '{}'", page, self.query);

        let mut retried = false;
        loop {
            governor.await_capacity(RequestClass::Search).await;

            match self.request(page).await {
                Ok(response) => {
                    governor.observe(RequestClass::Search, response.headers());
                    let status = response.status();

                    if status == StatusCode::UNPROCESSABLE_ENTITY {
                        // Search window exhausted; not an error.
                        warn!("Reached search limit at page {}", page);
                        self.done = true;
                        return Ok(());
                    }

                    if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
                        && governor
                            .wait_duration(RequestClass::Search, chrono::Utc::now())
                            .is_some()
                    {
                        // Quota exhausted; the governor blocks at the top of
                        // the loop. Does not consume the page's retry.
                        continue;
                    }

                    if status.is_success() {
                        let body = response.text().await?;
                        self.absorb_page(page, &body)?;
                        return Ok(());
                    }

                    warn!("HTTP {} on search page {}", status, page);
                }
                Err(e) => warn!("Network error on search page {}: {}", page, e),
            }

            if retried {
                return Err(ScrapeError::SearchExhausted { page });
            }
            retried = true;
            tokio::time::sleep(PAGE_RETRY_BACKOFF).await;
        }
    }

    async fn request(&self, page: u32) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let page = page.to_string();
        let per_page = PER_PAGE.to_string();
        self.client
            .get(format!("{}/search/code", self.api_base))
            .query(&[
                ("q", self.query.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ])
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
    }

    fn absorb_page(&mut self, page: u32, body: &str) -> Result<()> {
        let parsed: SearchPage =
            serde_json::from_str(body).map_err(|e| ScrapeError::MalformedResponse {
                context: format!("search page {}: {}", page, e),
            })?;

        if page == 1 {
            let reachable = (parsed.total_count as usize).min(SEARCH_RESULT_CAP);
            info!(
                "Found {} potential results ({} reachable through pagination)",
                parsed.total_count, reachable
            );
            self.limit = self.limit.min(reachable);
        }

        let short_page = parsed.items.len() < PER_PAGE;
        for item in parsed.items {
            if self.yielded >= self.limit {
                break;
            }
            self.yielded += 1;
            self.buffer.push_back(SearchResult {
                repository_full_name: item.repository.full_name,
                file_path: item.path,
                content_url: item.url,
            });
        }

        self.next_page = page + 1;
        if short_page || self.yielded >= self.limit {
            self.done = true;
        }
        Ok(())
    }
}
