use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::services::Service;

const APP_DIR: &str = "game-engagement";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub anthropic_api_key: Option<String>,
    pub steam_api_key: Option<String>,

    #[serde(default = "default_anthropic_api_url")]
    pub anthropic_api_url: String,

    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_hltb_search_url")]
    pub hltb_search_url: String,

    #[serde(default = "default_analyze_concurrency")]
    pub analyze_concurrency: usize,

    #[serde(default)]
    pub rate_limits: RateLimits,
}

/// Minimum seconds between successive calls, per external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_guide_fetch_secs")]
    pub guide_fetch: f64,
    #[serde(default = "default_reasoning_secs")]
    pub reasoning: f64,
    #[serde(default = "default_length_lookup_secs")]
    pub length_lookup: f64,
    #[serde(default = "default_platform_secs")]
    pub platform: f64,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("games.db")
        .to_string_lossy()
        .to_string()
}

fn default_anthropic_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_reasoning_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_hltb_search_url() -> String {
    "https://howlongtobeat.com/api/search".to_string()
}

fn default_analyze_concurrency() -> usize {
    4
}

fn default_guide_fetch_secs() -> f64 {
    1.0
}

fn default_reasoning_secs() -> f64 {
    2.0
}

fn default_length_lookup_secs() -> f64 {
    1.2
}

fn default_platform_secs() -> f64 {
    0.35
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            guide_fetch: default_guide_fetch_secs(),
            reasoning: default_reasoning_secs(),
            length_lookup: default_length_lookup_secs(),
            platform: default_platform_secs(),
        }
    }
}

impl RateLimits {
    /// Interval for each service key. Negative or non-finite values collapse to
    /// zero; values too large for a `Duration` are rejected.
    pub fn intervals(&self) -> Result<Vec<(Service, Duration)>> {
        [
            (Service::GuideFetch, self.guide_fetch),
            (Service::Reasoning, self.reasoning),
            (Service::LengthLookup, self.length_lookup),
            (Service::Platform, self.platform),
        ]
        .into_iter()
        .map(|(service, secs)| {
            let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
            let interval = Duration::try_from_secs_f64(secs).map_err(|_| {
                AppError::Config(format!("rate_limits.{} = {} is out of range", service, secs))
            })?;
            Ok((service, interval))
        })
        .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            anthropic_api_key: None,
            steam_api_key: None,
            anthropic_api_url: default_anthropic_api_url(),
            reasoning_model: default_reasoning_model(),
            hltb_search_url: default_hltb_search_url(),
            analyze_concurrency: default_analyze_concurrency(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/x.db"
            steam_api_key = "abc"

            [rate_limits]
            reasoning = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.steam_api_key.as_deref(), Some("abc"));
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.analyze_concurrency, 4);
        assert_eq!(config.rate_limits.reasoning, 0.5);
        assert_eq!(config.rate_limits.guide_fetch, 1.0);
        assert_eq!(config.rate_limits.platform, 0.35);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.reasoning_model, default_reasoning_model());
        assert_eq!(config.anthropic_api_url, default_anthropic_api_url());

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.db_path, config.db_path);
        assert_eq!(reloaded.hltb_search_url, config.hltb_search_url);
    }

    #[test]
    fn invalid_intervals_collapse_to_zero() {
        let limits = RateLimits {
            guide_fetch: -3.0,
            reasoning: f64::NAN,
            length_lookup: 0.3,
            platform: 0.0,
        };
        let intervals = limits.intervals().unwrap();
        assert_eq!(intervals[0], (Service::GuideFetch, Duration::ZERO));
        assert_eq!(intervals[1], (Service::Reasoning, Duration::ZERO));
        assert_eq!(
            intervals[2],
            (Service::LengthLookup, Duration::from_secs_f64(0.3))
        );
    }

    #[test]
    fn oversized_interval_is_a_config_error() {
        let limits = RateLimits {
            guide_fetch: 1e30,
            ..RateLimits::default()
        };
        match limits.intervals() {
            Err(AppError::Config(message)) => assert!(message.contains("guide_fetch")),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
