//! # k8s-yaml-scraper
//!
//! Searches GitHub code for Kubernetes YAML manifests and downloads every
//! match to local storage, pacing requests against the API's search and
//! core rate limits.
//!
//! ## Main Components
//!
//! - [`YamlScraper`]: the sequential download driver
//! - [`SearchPager`]: lazy pagination over `/search/code` results
//! - [`ContentFetcher`]: raw file retrieval, inline base64 or `download_url`
//! - [`RateGovernor`]: per-class quota tracking and reset waits
//! - [`PathResolver`]: structured/flat destination path computation
//! - [`Args`]: command line argument structure
//!
//! ## Example
//!
//! ```no_run
//! use k8s_yaml_scraper::{Args, YamlScraper};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let args = Args::parse();
//!     let scraper = YamlScraper::new(&args)?;
//!     let summary = scraper.run().await?;
//!     println!("downloaded {} files", summary.succeeded);
//!     Ok(())
//! }
//! ```

mod args;
mod content;
mod error;
mod logging;
mod paths;
mod rate_limit;
mod scraper;
mod search;

pub use crate::args::Args;
pub use crate::content::{ContentFetcher, FetchedContent};
pub use crate::error::{Result, ScrapeError};
pub use crate::logging::init_logging;
pub use crate::paths::{sanitize_part, OutputMode, PathResolver};
pub use crate::rate_limit::{RateGovernor, RateLimitState, RequestClass};
pub use crate::scraper::{DownloadOutcome, DownloadStatus, RunSummary, YamlScraper};
pub use crate::search::{SearchPager, SearchResult, PER_PAGE, SEARCH_RESULT_CAP};
