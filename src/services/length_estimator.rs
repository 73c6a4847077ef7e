use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::services::rate_limiter::{RateLimiter, Service};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const HLTB_REFERER: &str = "https://howlongtobeat.com/";

/// Below this title similarity a candidate is not considered the same game.
const MIN_TITLE_SIMILARITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct LengthEstimate {
    pub main_story_hours: f64,
    pub extras_hours: Option<f64>,
    pub completionist_hours: Option<f64>,
    pub matched_title: String,
    pub similarity: f64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no main-story time found for '{0}'")]
    NotFound(String),

    #[error("length lookup failed: {0}")]
    Request(String),

    #[error("length lookup returned an unreadable response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait LengthLookup: Send + Sync {
    async fn estimate(
        &self,
        title: &str,
        platform: Option<&str>,
    ) -> Result<LengthEstimate, LookupError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Candidate>,
}

/// One search hit. Times are in seconds.
#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    game_id: i64,
    game_name: String,
    #[serde(default)]
    comp_main: Option<f64>,
    #[serde(default)]
    comp_plus: Option<f64>,
    #[serde(default)]
    comp_100: Option<f64>,
    #[serde(default)]
    profile_platform: Option<String>,
}

pub struct LengthEstimator {
    client: Client,
    search_url: String,
    limiter: Arc<RateLimiter>,
}

impl LengthEstimator {
    pub fn new(search_url: String, limiter: Arc<RateLimiter>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(REFERER, HeaderValue::from_static(HLTB_REFERER));

        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            search_url,
            limiter,
        }
    }
}

#[async_trait]
impl LengthLookup for LengthEstimator {
    async fn estimate(
        &self,
        title: &str,
        platform: Option<&str>,
    ) -> Result<LengthEstimate, LookupError> {
        self.limiter.acquire(Service::LengthLookup).await;

        let terms: Vec<&str> = title.split_whitespace().collect();
        let request = json!({
            "searchType": "games",
            "searchTerms": terms,
            "searchPage": 1,
            "size": 20,
            "searchOptions": {
                "games": {
                    "userId": 0,
                    "platform": platform.unwrap_or(""),
                    "sortCategory": "popular",
                    "rangeCategory": "main",
                    "rangeTime": { "min": 0, "max": 0 },
                    "gameplay": { "perspective": "", "flow": "", "genre": "" },
                    "modifier": ""
                },
                "users": { "sortCategory": "postcount" },
                "filter": "",
                "sort": 0,
                "randomizer": 0
            }
        });

        let response = self
            .client
            .post(&self.search_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LookupError::Request(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| LookupError::Malformed(e.to_string()))?;

        tracing::debug!(title, candidates = parsed.data.len(), "Length lookup results");

        let estimate = best_estimate(&parsed.data, title, platform)
            .ok_or_else(|| LookupError::NotFound(title.to_string()))?;

        tracing::info!(
            title,
            matched = %estimate.matched_title,
            similarity = estimate.similarity,
            hours = estimate.main_story_hours,
            "Main-story time found"
        );
        Ok(estimate)
    }
}

fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn platform_matches(candidate: &Candidate, platform: Option<&str>) -> bool {
    match (platform, candidate.profile_platform.as_deref()) {
        (Some(wanted), Some(listed)) if !wanted.trim().is_empty() => listed
            .split(',')
            .any(|p| p.trim().eq_ignore_ascii_case(wanted.trim())),
        _ => false,
    }
}

fn seconds_to_hours(seconds: Option<f64>) -> Option<f64> {
    seconds.filter(|s| *s > 0.0).map(|s| s / 3600.0)
}

/// Pick the closest title deterministically: similarity, then platform match,
/// then lowest candidate id.
fn best_estimate(
    candidates: &[Candidate],
    title: &str,
    platform: Option<&str>,
) -> Option<LengthEstimate> {
    let wanted = normalize_title(title);

    let best = candidates
        .iter()
        .map(|c| {
            let similarity = strsim::normalized_levenshtein(&wanted, &normalize_title(&c.game_name));
            (c, similarity, platform_matches(c, platform))
        })
        .min_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.game_id.cmp(&b.0.game_id))
        })?;

    let (candidate, similarity, _) = best;
    if similarity < MIN_TITLE_SIMILARITY {
        tracing::debug!(title, closest = %candidate.game_name, similarity, "No close title match");
        return None;
    }

    Some(LengthEstimate {
        main_story_hours: seconds_to_hours(candidate.comp_main)?,
        extras_hours: seconds_to_hours(candidate.comp_plus),
        completionist_hours: seconds_to_hours(candidate.comp_100),
        matched_title: candidate.game_name.clone(),
        similarity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::canned_http::CannedServer;

    fn candidates(json: &str) -> Vec<Candidate> {
        serde_json::from_str::<SearchResponse>(json).unwrap().data
    }

    #[test]
    fn picks_closest_title_and_converts_to_hours() {
        let data = candidates(
            r#"{"data": [
                {"game_id": 2, "game_name": "Hollow Knight: Silksong", "comp_main": 90000},
                {"game_id": 1, "game_name": "Hollow Knight", "comp_main": 97200, "comp_plus": 144000, "comp_100": 0}
            ]}"#,
        );

        let estimate = best_estimate(&data, "Hollow Knight", None).unwrap();
        assert_eq!(estimate.matched_title, "Hollow Knight");
        assert_eq!(estimate.main_story_hours, 27.0);
        assert_eq!(estimate.extras_hours, Some(40.0));
        assert_eq!(estimate.completionist_hours, None);
        assert_eq!(estimate.similarity, 1.0);
    }

    #[test]
    fn ties_resolve_by_platform_then_id() {
        let data = candidates(
            r#"{"data": [
                {"game_id": 9, "game_name": "Doom", "comp_main": 36000, "profile_platform": "PC"},
                {"game_id": 3, "game_name": "DOOM", "comp_main": 18000, "profile_platform": "Nintendo 64"},
                {"game_id": 5, "game_name": "Doom", "comp_main": 28800, "profile_platform": "Xbox One"}
            ]}"#,
        );

        let on_pc = best_estimate(&data, "Doom", Some("pc")).unwrap();
        assert_eq!(on_pc.main_story_hours, 10.0);

        let any = best_estimate(&data, "Doom", None).unwrap();
        assert_eq!(any.main_story_hours, 5.0);

        let again = best_estimate(&data, "Doom", None).unwrap();
        assert_eq!(any, again);
    }

    #[test]
    fn distant_titles_are_not_found() {
        let data = candidates(r#"{"data": [{"game_id": 1, "game_name": "Stardew Valley", "comp_main": 190000}]}"#);
        assert!(best_estimate(&data, "Hades", None).is_none());
    }

    #[test]
    fn match_without_main_time_is_not_found() {
        let data = candidates(r#"{"data": [{"game_id": 1, "game_name": "Hades", "comp_main": 0}]}"#);
        assert!(best_estimate(&data, "Hades", None).is_none());
    }

    #[test]
    fn empty_results_are_not_found() {
        assert!(best_estimate(&candidates(r#"{"data": []}"#), "Hades", None).is_none());
        assert!(best_estimate(&candidates("{}"), "Hades", None).is_none());
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(normalize_title("  Celeste™:  Farewell!! "), "celeste farewell");
    }

    fn estimator(server: &CannedServer) -> LengthEstimator {
        LengthEstimator::new(
            format!("{}/api/search", server.url),
            Arc::new(RateLimiter::unlimited()),
        )
    }

    #[tokio::test]
    async fn search_response_becomes_an_estimate() {
        let server = CannedServer::start(vec![(
            200,
            r#"{"data": [{"game_id": 5, "game_name": "Celeste", "comp_main": 28800, "comp_100": 144000}]}"#,
        )])
        .await;

        let estimate = estimator(&server).estimate("Celeste", None).await.unwrap();
        assert_eq!(estimate.main_story_hours, 8.0);
        assert_eq!(estimate.completionist_hours, Some(40.0));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = CannedServer::start(vec![(200, "<html>blocked</html>")]).await;

        let err = estimator(&server).estimate("Celeste", None).await.unwrap_err();
        assert!(matches!(err, LookupError::Malformed(_)));
    }

    #[tokio::test]
    async fn error_status_is_a_request_failure() {
        let server = CannedServer::start(vec![(500, "{}")]).await;

        let err = estimator(&server).estimate("Celeste", None).await.unwrap_err();
        assert_eq!(err, LookupError::Request("HTTP 500 Internal Server Error".to_string()));
    }
}

