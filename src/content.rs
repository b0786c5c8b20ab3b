use crate::error::{Result, ScrapeError};
use crate::rate_limit::{RateGovernor, RequestClass};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const FETCH_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// What fetching a search result's content produced.
#[derive(Debug)]
pub enum FetchedContent {
    /// Raw file bytes, ready to write.
    File(Vec<u8>),
    /// The path resolved to a directory listing, not a file.
    Directory,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    encoding: Option<String>,
    download_url: Option<String>,
    #[serde(default)]
    size: u64,
}

/// How a content response says its bytes should be obtained.
#[derive(Debug)]
enum ContentBody {
    Inline(Vec<u8>),
    /// Above the inline-encoding size limit; bytes live behind this URL.
    External(String),
    Directory,
}

/// Retrieves raw file bytes for a search result via the contents API,
/// decoding inline base64 or following `download_url` for files above the
/// API's inline size limit (~1 MiB, served with `encoding: "none"`).
pub struct ContentFetcher {
    client: Client,
    token: String,
}

impl ContentFetcher {
    pub fn new(client: Client, token: impl Into<String>) -> Self {
        ContentFetcher {
            client,
            token: token.into(),
        }
    }

    /// Fetch the bytes behind a search result's content handle. Each
    /// outbound request is paced and observed by the governor; transient
    /// failures are retried once.
    pub async fn fetch(&self, url: &str, governor: &mut RateGovernor) -> Result<FetchedContent> {
        let response = self.get_with_retry(url, governor).await?;
        let body = response.bytes().await?;

        match parse_content_body(&body, url)? {
            ContentBody::Inline(bytes) => Ok(FetchedContent::File(bytes)),
            ContentBody::Directory => Ok(FetchedContent::Directory),
            ContentBody::External(download_url) => {
                debug!("Inline content unavailable for {}, following download_url", url);
                let raw = self.get_with_retry(&download_url, governor).await?;
                Ok(FetchedContent::File(raw.bytes().await?.to_vec()))
            }
        }
    }

    async fn get_with_retry(
        &self,
        url: &str,
        governor: &mut RateGovernor,
    ) -> Result<reqwest::Response> {
        let mut retried = false;
        loop {
            governor.await_capacity(RequestClass::Core).await;

            match self
                .client
                .get(url)
                .header("Accept", "application/vnd.github+json")
                .header("Authorization", format!("Bearer {}", self.token))
                .header("X-GitHub-Api-Version", "2022-11-28")
                .send()
                .await
            {
                Ok(response) => {
                    governor.observe(RequestClass::Core, response.headers());
                    let status = response.status();

                    if (status == StatusCode::FORBIDDEN
                        || status == StatusCode::TOO_MANY_REQUESTS)
                        && governor
                            .wait_duration(RequestClass::Core, chrono::Utc::now())
                            .is_some()
                    {
                        // Quota exhausted; wait it out and try again without
                        // consuming the retry.
                        continue;
                    }

                    if status.is_success() {
                        return Ok(response);
                    }

                    warn!("HTTP {} fetching {}", status, url);
                    if retried {
                        return Err(ScrapeError::Fetch {
                            status,
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => {
                    warn!("Network error fetching {}: {}", url, e);
                    if retried {
                        return Err(ScrapeError::Network(e));
                    }
                }
            }

            retried = true;
            tokio::time::sleep(FETCH_RETRY_BACKOFF).await;
        }
    }
}

fn parse_content_body(body: &[u8], url: &str) -> Result<ContentBody> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ScrapeError::MalformedResponse {
            context: format!("content response for {}: {}", url, e),
        })?;

    // The contents endpoint returns a JSON array when the path is a
    // directory rather than a file.
    if value.is_array() {
        return Ok(ContentBody::Directory);
    }

    let parsed: ContentResponse =
        serde_json::from_value(value).map_err(|e| ScrapeError::MalformedResponse {
            context: format!("content response for {}: {}", url, e),
        })?;

    match (parsed.encoding.as_deref(), parsed.content) {
        (Some("base64"), Some(content)) if !content.trim().is_empty() => {
            // The API wraps base64 payloads with newlines.
            let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            Ok(ContentBody::Inline(BASE64.decode(compact)?))
        }
        _ => match parsed.download_url {
            Some(download_url) => {
                debug!("{} bytes exceeds inline limit for {}", parsed.size, url);
                Ok(ContentBody::External(download_url))
            }
            None => Err(ScrapeError::MalformedResponse {
                context: format!("content response for {} has neither inline content nor a download_url", url),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_inline_base64_with_line_wrapping() {
        let body = br#"{"content":"YXBpVmVyc2lv\nbjogdjE=\n","encoding":"base64","size":14}"#;
        match parse_content_body(body, "u").unwrap() {
            ContentBody::Inline(bytes) => assert_eq!(bytes, b"apiVersion: v1"),
            other => panic!("expected inline content, got {:?}", other),
        }
    }

    #[test]
    fn oversized_files_fall_back_to_download_url() {
        let body = br#"{"content":"","encoding":"none","download_url":"https://raw.example/big.yaml","size":2097152}"#;
        match parse_content_body(body, "u").unwrap() {
            ContentBody::External(url) => assert_eq!(url, "https://raw.example/big.yaml"),
            other => panic!("expected external content, got {:?}", other),
        }
    }

    #[test]
    fn directory_listing_is_recognized() {
        let body = br#"[{"path":"manifests/a.yaml"},{"path":"manifests/b.yaml"}]"#;
        assert!(matches!(
            parse_content_body(body, "u").unwrap(),
            ContentBody::Directory
        ));
    }

    #[test]
    fn missing_content_and_download_url_is_malformed() {
        let body = br#"{"encoding":"none","size":10}"#;
        assert!(matches!(
            parse_content_body(body, "u").unwrap_err(),
            ScrapeError::MalformedResponse { .. }
        ));
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let body = br#"{"content":"not base64!!","encoding":"base64","size":5}"#;
        assert!(matches!(
            parse_content_body(body, "u").unwrap_err(),
            ScrapeError::Base64(_)
        ));
    }
}
