use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::services::rate_limiter::{RateLimiter, Service};

const STEAM_API_URL: &str = "https://api.steampowered.com";
const GUIDE_PAGE_URL: &str = "https://steamcommunity.com/sharedfiles/filedetails/?id=";

/// QueryFiles variants tried in order until one yields guides. Filetype 10 is
/// "all guides", 11 is "web guides"; some apps only answer one of them, and
/// some guides lack the Guide tag.
const GUIDE_QUERY_VARIANTS: [(&str, u32, bool); 4] = [
    ("all_guides_tagged", 10, true),
    ("all_guides_untagged", 10, false),
    ("web_guides_tagged", 11, true),
    ("web_guides_untagged", 11, false),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SteamError {
    #[error("Steam request failed: {0}")]
    Request(String),

    #[error("Steam {endpoint} request for app {app_id} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        app_id: i64,
        status: u16,
    },

    #[error("Steam returned an unreadable {endpoint} response for app {app_id}: {message}")]
    Malformed {
        endpoint: &'static str,
        app_id: i64,
        message: String,
    },

    #[error("missing game schema for app {0}")]
    NoSchema(i64),

    #[error("no achievements returned for app {0}")]
    NoAchievements(i64),

    #[error("no guides returned for app {0}")]
    NoGuides(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformAchievement {
    pub name: String,
    pub description: Option<String>,
    pub points: Option<i64>,
    pub completion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSchema {
    pub game_name: Option<String>,
    pub achievements: Vec<PlatformAchievement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformGuide {
    pub title: String,
    pub url: String,
    pub author: Option<String>,
}

/// Source of game metadata on the storefront platform.
#[async_trait]
pub trait PlatformCatalog: Send + Sync {
    async fn fetch_achievements(&self, app_id: i64) -> Result<PlatformSchema, SteamError>;
    async fn fetch_guides(&self, app_id: i64) -> Result<Vec<PlatformGuide>, SteamError>;
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    game: Option<SchemaGame>,
}

#[derive(Debug, Deserialize)]
struct SchemaGame {
    #[serde(rename = "gameName")]
    game_name: Option<String>,
    #[serde(rename = "availableGameStats", default)]
    available_game_stats: Option<GameStats>,
}

#[derive(Debug, Default, Deserialize)]
struct GameStats {
    #[serde(default)]
    achievements: Vec<SchemaAchievement>,
}

#[derive(Debug, Deserialize)]
struct SchemaAchievement {
    name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    description: Option<String>,
    #[serde(rename = "defaultvalue")]
    default_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PercentagesResponse {
    #[serde(rename = "achievementpercentages")]
    achievement_percentages: Option<PercentageList>,
}

#[derive(Debug, Deserialize)]
struct PercentageList {
    #[serde(default)]
    achievements: Vec<AchievementPercent>,
}

#[derive(Debug, Deserialize)]
struct AchievementPercent {
    name: Option<String>,
    /// Sent as a number or as a numeric string depending on the endpoint version.
    percent: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QueryFilesResponse {
    response: Option<QueryFilesBody>,
}

#[derive(Debug, Deserialize)]
struct QueryFilesBody {
    #[serde(default)]
    publishedfiledetails: Vec<PublishedFile>,
}

#[derive(Debug, Deserialize)]
struct PublishedFile {
    publishedfileid: Option<String>,
    title: Option<String>,
    creator: Option<String>,
}

pub struct SteamClient {
    client: Client,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl SteamClient {
    pub fn new(api_key: String, limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            limiter,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        app_id: i64,
        params: &[(&str, String)],
    ) -> Result<T, SteamError> {
        self.limiter.acquire(Service::Platform).await;

        let response = self
            .client
            .get(format!("{}/{}", STEAM_API_URL, endpoint))
            .query(params)
            .send()
            .await
            .map_err(|e| SteamError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SteamError::Status {
                endpoint,
                app_id,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| SteamError::Malformed {
            endpoint,
            app_id,
            message: e.to_string(),
        })
    }

    async fn fetch_global_percentages(&self, app_id: i64) -> Result<HashMap<String, f64>, SteamError> {
        let payload: PercentagesResponse = self
            .get_json(
                "ISteamUserStats/GetGlobalAchievementPercentagesForApp/v0002/",
                app_id,
                &[("gameid", app_id.to_string())],
            )
            .await?;
        Ok(percentages_from_payload(payload))
    }
}

#[async_trait]
impl PlatformCatalog for SteamClient {
    async fn fetch_achievements(&self, app_id: i64) -> Result<PlatformSchema, SteamError> {
        let payload: SchemaResponse = self
            .get_json(
                "ISteamUserStats/GetSchemaForGame/v2/",
                app_id,
                &[("key", self.api_key.clone()), ("appid", app_id.to_string())],
            )
            .await?;

        let percents = match self.fetch_global_percentages(app_id).await {
            Ok(percents) => percents,
            Err(e) => {
                tracing::warn!(app_id, error = %e, "Global achievement percentages unavailable");
                HashMap::new()
            }
        };

        schema_from_payload(app_id, payload, &percents)
    }

    async fn fetch_guides(&self, app_id: i64) -> Result<Vec<PlatformGuide>, SteamError> {
        for (label, filetype, tagged) in GUIDE_QUERY_VARIANTS {
            let mut params = vec![
                ("key", self.api_key.clone()),
                ("appid", app_id.to_string()),
                ("page", "1".to_string()),
                ("numperpage", "50".to_string()),
                ("return_short_description", "true".to_string()),
                ("return_vote_data", "true".to_string()),
                ("strip_description_bbcode", "true".to_string()),
                ("filetype", filetype.to_string()),
            ];
            if tagged {
                params.push(("requiredtags[0]", "Guide".to_string()));
            }

            let payload: QueryFilesResponse = self
                .get_json("IPublishedFileService/QueryFiles/v1/", app_id, &params)
                .await?;
            let guides = guides_from_payload(payload);

            tracing::info!(app_id, variant = label, guides = guides.len(), "Steam guides response received");

            if !guides.is_empty() {
                return Ok(guides);
            }
        }

        tracing::warn!(app_id, "No guides parsed from any Steam query variant");
        Err(SteamError::NoGuides(app_id))
    }
}

fn percent_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn percentages_from_payload(payload: PercentagesResponse) -> HashMap<String, f64> {
    payload
        .achievement_percentages
        .map(|list| list.achievements)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| Some((a.name?, percent_value(a.percent.as_ref()?)?)))
        .collect()
}

fn schema_from_payload(
    app_id: i64,
    payload: SchemaResponse,
    percents: &HashMap<String, f64>,
) -> Result<PlatformSchema, SteamError> {
    let game = payload.game.ok_or(SteamError::NoSchema(app_id))?;

    let achievements: Vec<PlatformAchievement> = game
        .available_game_stats
        .unwrap_or_default()
        .achievements
        .into_iter()
        .filter_map(|a| {
            let display = a
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .or_else(|| a.name.clone())?;
            Some(PlatformAchievement {
                name: display,
                description: a.description,
                points: a.default_value,
                completion_rate: a.name.as_ref().and_then(|n| percents.get(n).copied()),
            })
        })
        .collect();

    if achievements.is_empty() {
        return Err(SteamError::NoAchievements(app_id));
    }

    Ok(PlatformSchema {
        game_name: game.game_name.filter(|n| !n.trim().is_empty()),
        achievements,
    })
}

fn guides_from_payload(payload: QueryFilesResponse) -> Vec<PlatformGuide> {
    payload
        .response
        .map(|body| body.publishedfiledetails)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|file| {
            let id = file.publishedfileid.filter(|id| !id.is_empty())?;
            let title = file.title.filter(|t| !t.trim().is_empty())?;
            Some(PlatformGuide {
                title,
                url: format!("{}{}", GUIDE_PAGE_URL, id),
                author: file.creator,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_uses_display_names_and_percentages() {
        let payload: SchemaResponse = serde_json::from_str(
            r#"{"game": {"gameName": "Hades", "availableGameStats": {"achievements": [
                {"name": "ACH_ESCAPE", "displayName": "Is There No Escape?", "description": "Escape", "defaultvalue": 0},
                {"name": "ACH_HIDDEN", "displayName": "", "description": null},
                {"displayName": null}
            ]}}}"#,
        )
        .unwrap();
        let percents: PercentagesResponse = serde_json::from_str(
            r#"{"achievementpercentages": {"achievements": [
                {"name": "ACH_ESCAPE", "percent": "54.2"},
                {"name": "ACH_HIDDEN", "percent": 3.5}
            ]}}"#,
        )
        .unwrap();

        let schema = schema_from_payload(1145360, payload, &percentages_from_payload(percents)).unwrap();

        assert_eq!(schema.game_name.as_deref(), Some("Hades"));
        assert_eq!(schema.achievements.len(), 2);
        assert_eq!(schema.achievements[0].name, "Is There No Escape?");
        assert_eq!(schema.achievements[0].completion_rate, Some(54.2));
        assert_eq!(schema.achievements[0].points, Some(0));
        assert_eq!(schema.achievements[1].name, "ACH_HIDDEN");
        assert_eq!(schema.achievements[1].completion_rate, Some(3.5));
    }

    #[test]
    fn schema_without_game_or_achievements_is_an_error() {
        let empty: SchemaResponse = serde_json::from_str(r#"{"game": null}"#).unwrap();
        assert_eq!(
            schema_from_payload(5, empty, &HashMap::new()),
            Err(SteamError::NoSchema(5))
        );

        let no_stats: SchemaResponse = serde_json::from_str(r#"{"game": {"gameName": "X"}}"#).unwrap();
        assert_eq!(
            schema_from_payload(5, no_stats, &HashMap::new()),
            Err(SteamError::NoAchievements(5))
        );
    }

    #[test]
    fn guides_need_id_and_title() {
        let payload: QueryFilesResponse = serde_json::from_str(
            r#"{"response": {"resultcount": 3, "publishedfiledetails": [
                {"publishedfileid": "111", "title": "100% Guide", "creator": "7656"},
                {"publishedfileid": "222"},
                {"title": "No id"}
            ]}}"#,
        )
        .unwrap();

        let guides = guides_from_payload(payload);
        assert_eq!(
            guides,
            vec![PlatformGuide {
                title: "100% Guide".to_string(),
                url: "https://steamcommunity.com/sharedfiles/filedetails/?id=111".to_string(),
                author: Some("7656".to_string()),
            }]
        );
    }

    #[test]
    fn empty_guide_response_yields_nothing() {
        let payload: QueryFilesResponse = serde_json::from_str(r#"{"response": {}}"#).unwrap();
        assert!(guides_from_payload(payload).is_empty());
    }
}
