use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::models::{Guide, GuideKind};
use crate::services::rate_limiter::{RateLimiter, Service};

const USER_AGENT_STRING: &str = "game-engagement/0.1 (+guide parser)";

/// Plain text and section count extracted from one guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGuide {
    pub text: String,
    pub section_count: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("guide request failed: {0}")]
    Network(String),

    #[error("guide request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("guide content could not be parsed: {0}")]
    Unparsable(String),

    #[error("invalid guide URL '{0}'")]
    InvalidUrl(String),

    #[error("{kind} guide {guide_id} has nothing to parse")]
    MissingSource { guide_id: i64, kind: GuideKind },
}

/// Anything that can turn a stored guide into parsed text.
#[async_trait]
pub trait GuideSource: Send + Sync {
    async fn fetch(&self, guide: &Guide) -> Result<ParsedGuide, FetchError>;
}

pub struct GuideFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl GuideFetcher {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self { client, limiter }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        self.limiter.acquire(Service::GuideFetch).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Guide fetch failed");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

#[async_trait]
impl GuideSource for GuideFetcher {
    async fn fetch(&self, guide: &Guide) -> Result<ParsedGuide, FetchError> {
        let missing = || FetchError::MissingSource {
            guide_id: guide.id,
            kind: guide.kind,
        };

        match guide.kind {
            GuideKind::Link => {
                let url = guide.url.as_deref().filter(|u| !u.trim().is_empty());
                let url = url.ok_or_else(missing)?;
                let html = self.fetch_html(url).await?;
                let parsed = parse_html(&html)?;
                tracing::debug!(
                    guide_id = guide.id,
                    sections = parsed.section_count,
                    chars = parsed.text.len(),
                    "Parsed linked guide"
                );
                Ok(parsed)
            }
            GuideKind::Text => {
                let body = guide.body.as_deref().filter(|b| !b.trim().is_empty());
                parse_text(body.ok_or_else(missing)?)
            }
        }
    }
}

fn article_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").expect("valid regex"))
}

fn content_div_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<div\b[^>]*\bid\s*=\s*["']content["'][^>]*>"#).expect("valid regex")
    })
}

fn div_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(/?)div\b[^>]*>").expect("valid regex"))
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").expect("valid regex"))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<h[1-4](?:\s[^>]*)?>").expect("valid regex"))
}

/// Inner HTML of `<div id="content">`, up to its own closing tag.
fn content_div(html: &str) -> Option<&str> {
    let start = content_div_open_re().find(html)?.end();
    let mut depth = 1usize;
    for tag in div_tag_re().captures_iter(&html[start..]) {
        if &tag[1] == "/" {
            depth -= 1;
            if depth == 0 {
                let end = start + tag.get(0)?.start();
                return Some(&html[start..end]);
            }
        } else {
            depth += 1;
        }
    }
    // Unclosed: everything after the opening tag.
    Some(&html[start..])
}

fn first_capture<'a>(re: &Regex, html: &'a str) -> Option<&'a str> {
    re.captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Narrow a page to its main content: first `<article>`, then `#content`, then `<body>`.
fn main_region(html: &str) -> &str {
    first_capture(article_re(), html)
        .or_else(|| content_div(html))
        .or_else(|| first_capture(body_re(), html))
        .unwrap_or(html)
}

fn clean_lines(text: &str) -> String {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_html(html: &str) -> Result<ParsedGuide, FetchError> {
    let region = main_region(html);
    let section_count = heading_re().find_iter(region).count() as i64;

    let text = html2text::from_read(region.as_bytes(), 80)
        .map_err(|e| FetchError::Unparsable(e.to_string()))?;
    let text = clean_lines(&text);

    if text.is_empty() {
        return Err(FetchError::Unparsable("no readable text found".to_string()));
    }

    Ok(ParsedGuide {
        text,
        section_count,
    })
}

/// Raw text guides count Markdown-style `#` lines as sections. Bodies that are
/// really HTML go through the HTML path.
pub fn parse_text(body: &str) -> Result<ParsedGuide, FetchError> {
    if body.trim_start().starts_with('<') {
        return parse_html(body);
    }

    let section_count = body
        .lines()
        .filter(|l| l.trim_start().starts_with('#'))
        .count() as i64;
    let text = clean_lines(body);

    if text.is_empty() {
        return Err(FetchError::Unparsable("guide body is blank".to_string()));
    }

    Ok(ParsedGuide {
        text,
        section_count,
    })
}
