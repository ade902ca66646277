//! SAQ product page passthrough.
//!
//! The browser cannot fetch saq.com directly (CORS), so the server fetches
//! the page for it. Only https URLs on allowlisted hosts are fetched, and
//! redirects are followed only while they stay on the allowlist.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::{ApiError, ApiResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 5;
/// Pages larger than this are cut off.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    pub url: String,
    pub status: u16,
    pub title: Option<String>,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct Scraper {
    http: Client,
    allowed_hosts: Arc<Vec<String>>,
}

impl Scraper {
    pub fn new(allowed_hosts: Vec<String>) -> reqwest::Result<Self> {
        let allowed_hosts = Arc::new(allowed_hosts);
        let redirect_hosts = allowed_hosts.clone();
        let policy = Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if is_allowed(attempt.url(), &redirect_hosts) {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .redirect(policy)
            .user_agent(concat!("barback/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Scraper { http, allowed_hosts })
    }

    /// Parses `raw` and checks it against the allowlist.
    pub fn check_url(&self, raw: &str) -> ApiResult<Url> {
        let url = Url::parse(raw.trim()).map_err(|e| ApiError::validation(format!("Invalid url: {}", e)))?;
        if !is_allowed(&url, &self.allowed_hosts) {
            return Err(ApiError::validation(format!(
                "Only https URLs on {} may be fetched",
                self.allowed_hosts.join(", ")
            )));
        }
        Ok(url)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, raw: &str) -> ApiResult<ScrapedPage> {
        let url = self.check_url(raw)?;

        let mut res = self.http.get(url.clone()).send().await.map_err(|e| {
            warn!("Scrape request failed: {}", e);
            ApiError::upstream(format!("Could not fetch {}: {}", url, e))
        })?;

        let status = res.status().as_u16();
        let mut body = Vec::with_capacity(res.content_length().map_or(0, |n| n as usize).min(MAX_BODY_BYTES));
        let mut truncated = false;
        while let Some(chunk) = res
            .chunk()
            .await
            .map_err(|e| ApiError::upstream(format!("Could not read {}: {}", url, e)))?
        {
            if append_capped(&mut body, &chunk, MAX_BODY_BYTES) {
                truncated = true;
                break;
            }
        }
        let html = String::from_utf8_lossy(&body).into_owned();

        info!(status, bytes = body.len(), truncated, "Page fetched");
        Ok(ScrapedPage {
            url: url.to_string(),
            status,
            title: extract_title(&html),
            html,
        })
    }
}

/// Appends as much of `chunk` as fits under `cap`. Returns true once the
/// buffer is full and the rest of the body should be dropped.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= cap
}

fn is_allowed(url: &Url, allowed_hosts: &[String]) -> bool {
    url.scheme() == "https"
        && url.username().is_empty()
        && url.password().is_none()
        && url
            .host_str()
            .is_some_and(|host| allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
}

/// Text of the first `<title>` element, whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;

    let title = html[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> Scraper {
        Scraper::new(vec!["www.saq.com".to_string(), "saq.com".to_string()]).unwrap()
    }

    #[test]
    fn test_check_url_allowlist() {
        let s = scraper();
        assert!(s.check_url("https://www.saq.com/en/10327701").is_ok());
        assert!(s.check_url("https://SAQ.com/fr/produits").is_ok());

        assert!(s.check_url("http://www.saq.com/en/10327701").is_err());
        assert!(s.check_url("https://evil.example/www.saq.com").is_err());
        assert!(s.check_url("https://www.saq.com.evil.example/").is_err());
        assert!(s.check_url("https://user:pw@www.saq.com/").is_err());
        assert!(s.check_url("file:///etc/passwd").is_err());
        assert!(s.check_url("not a url").is_err());
    }

    #[test]
    fn test_append_capped_stops_at_limit() {
        let mut buf = Vec::new();
        assert!(!append_capped(&mut buf, b"<html>", 10));
        assert!(!append_capped(&mut buf, b"", 10));
        assert_eq!(buf, b"<html>");

        assert!(append_capped(&mut buf, b"<body>", 10));
        assert_eq!(buf, b"<html><bod");

        assert!(append_capped(&mut buf, b"more", 10));
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_append_capped_bounds_an_endless_body() {
        let chunk = vec![b'x'; 64 * 1024];
        let mut buf = Vec::new();
        let mut reads = 0;
        while !append_capped(&mut buf, &chunk, MAX_BODY_BYTES) {
            reads += 1;
            assert!(reads < 1_000);
        }
        assert_eq!(buf.len(), MAX_BODY_BYTES);
        assert_eq!(reads, MAX_BODY_BYTES / chunk.len() - 1);
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><TITLE lang=\"en\">\n  Bombay Sapphire  | SAQ.com\n</TITLE></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Bombay Sapphire | SAQ.com"));
        assert_eq!(extract_title("<title></title>"), None);
        assert_eq!(extract_title("<p>no title</p>"), None);
    }
}
