use std::sync::Arc;

use serde::Serialize;

use crate::ai::{AchievementClassifier, Classifier};
use crate::analysis::{AnalysisReport, AnalyzeError, Pipeline};
use crate::config::Config;
use crate::db::{GameStore, Repository};
use crate::error::{AppError, Result};
use crate::models::{
    Achievement, AchievementUpdate, EngagementScore, Game, GameUpdate, Guide, GuideKind,
    GuideUpdate, HltbTime, HltbTimeUpdate, NewAchievement, NewGame, NewGuide,
};
use crate::services::{
    import_app, parse_app_ids, GuideFetcher, ImportOutcome, LengthEstimator, RateLimiter,
    SteamClient,
};

/// Everything stored about one game, for `show`.
#[derive(Debug, Serialize)]
pub struct GameDetails {
    pub game: Game,
    pub achievements: Vec<Achievement>,
    pub guides: Vec<Guide>,
    pub latest_hltb: Option<HltbTime>,
    pub latest_score: Option<EngagementScore>,
}

pub struct App {
    store: Arc<Repository>,
    pipeline: Pipeline,
    steam: Option<SteamClient>,
    analyze_concurrency: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let store = Arc::new(Repository::new(&config.db_path).await?);

        // One limiter shared by every client so intervals hold across runs.
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.intervals()?));

        let classifier = config.anthropic_api_key.as_ref().map(|key| {
            Arc::new(Classifier::new(
                config.anthropic_api_url.clone(),
                key.clone(),
                config.reasoning_model.clone(),
                limiter.clone(),
            )) as Arc<dyn AchievementClassifier>
        });
        if classifier.is_none() {
            tracing::warn!("anthropic_api_key not set; achievement classification disabled");
        }

        let steam = config
            .steam_api_key
            .as_ref()
            .map(|key| SteamClient::new(key.clone(), limiter.clone()));

        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(GuideFetcher::new(limiter.clone())),
            classifier,
            Arc::new(LengthEstimator::new(
                config.hltb_search_url.clone(),
                limiter,
            )),
        );

        Ok(Self {
            store,
            pipeline,
            steam,
            analyze_concurrency: config.analyze_concurrency,
        })
    }

    pub async fn add_game(&self, game: NewGame) -> Result<Game> {
        if game.title.trim().is_empty() {
            return Err(AppError::InvalidInput("game title must not be empty".to_string()));
        }
        self.store.create_game(game).await
    }

    pub async fn update_game(&self, id: i64, update: GameUpdate) -> Result<Game> {
        if update.is_empty() {
            return Err(AppError::InvalidInput("nothing to update".to_string()));
        }
        self.store.update_game(id, update).await
    }

    pub async fn remove_game(&self, id: i64) -> Result<()> {
        self.store.delete_game(id).await
    }

    pub async fn add_achievement(&self, achievement: NewAchievement) -> Result<Achievement> {
        check_completion_rate(achievement.completion_rate)?;
        self.store.get_game(achievement.game_id).await?;
        self.store.create_achievement(achievement).await
    }

    pub async fn update_achievement(
        &self,
        id: i64,
        update: AchievementUpdate,
    ) -> Result<Achievement> {
        if update.is_empty() {
            return Err(AppError::InvalidInput("nothing to update".to_string()));
        }
        check_completion_rate(update.completion_rate)?;
        let mut achievement = self.store.get_achievement(id).await?;
        update.apply_to(&mut achievement);
        self.store.update_achievement(achievement).await
    }

    pub async fn add_guide(&self, guide: NewGuide) -> Result<Guide> {
        check_guide_source(guide.kind, guide.url.as_deref(), guide.body.as_deref())?;
        self.store.get_game(guide.game_id).await?;
        self.store.create_guide(guide).await
    }

    pub async fn update_guide(&self, id: i64, update: GuideUpdate) -> Result<Guide> {
        if update.is_empty() {
            return Err(AppError::InvalidInput("nothing to update".to_string()));
        }
        let mut guide = self.store.get_guide(id).await?;
        update.apply_to(&mut guide);
        check_guide_source(guide.kind, guide.url.as_deref(), guide.body.as_deref())?;
        self.store.update_guide(guide).await
    }

    /// Correct a stored length lookup by hand.
    pub async fn update_hltb_time(&self, id: i64, update: HltbTimeUpdate) -> Result<HltbTime> {
        if update.is_empty() {
            return Err(AppError::InvalidInput("nothing to update".to_string()));
        }
        for hours in [
            update.main_story_hours,
            update.extras_hours,
            update.completionist_hours,
        ]
        .into_iter()
        .flatten()
        {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "{} is not a positive number of hours",
                    hours
                )));
            }
        }
        let mut time = self.store.get_hltb_time(id).await?;
        update.apply_to(&mut time);
        self.store.update_hltb_time(time).await
    }

    pub async fn list_games(&self) -> Result<Vec<Game>> {
        self.store.list_games().await
    }

    pub async fn game_details(&self, id: i64) -> Result<GameDetails> {
        let game = self.store.get_game(id).await?;
        let achievements = self.store.achievements_for_game(id).await?;
        let guides = self.store.guides_for_game(id).await?;
        let latest_hltb = self.store.latest_hltb_time(id).await?;
        let latest_score = self.store.engagement_scores_for_game(id).await?.pop();

        Ok(GameDetails {
            game,
            achievements,
            guides,
            latest_hltb,
            latest_score,
        })
    }

    /// All stored scores for a game, oldest first.
    pub async fn score_history(&self, id: i64) -> Result<Vec<EngagementScore>> {
        self.store.get_game(id).await?;
        self.store.engagement_scores_for_game(id).await
    }

    pub async fn engagement_score(&self, id: i64) -> Result<EngagementScore> {
        self.store.get_engagement_score(id).await
    }

    pub async fn import_steam(&self, app_ids_text: &str) -> Result<Vec<ImportOutcome>> {
        let Some(steam) = &self.steam else {
            return Err(AppError::Config("steam_api_key is not set".to_string()));
        };

        let app_ids = parse_app_ids(app_ids_text);
        if app_ids.is_empty() {
            return Err(AppError::InvalidInput("no valid Steam app ids given".to_string()));
        }

        let mut outcomes = Vec::with_capacity(app_ids.len());
        for app_id in app_ids {
            outcomes.push(import_app(self.store.as_ref(), steam, app_id).await?);
        }
        Ok(outcomes)
    }

    pub async fn analyze(
        &self,
        game_ids: Vec<i64>,
        concurrency: Option<usize>,
    ) -> Vec<(i64, std::result::Result<AnalysisReport, AnalyzeError>)> {
        let concurrency = concurrency.unwrap_or(self.analyze_concurrency);
        self.pipeline.analyze_many(game_ids, concurrency).await
    }
}

fn check_completion_rate(rate: Option<f64>) -> Result<()> {
    match rate {
        Some(rate) if !(0.0..=100.0).contains(&rate) => Err(AppError::InvalidInput(format!(
            "completion rate {} is outside 0-100",
            rate
        ))),
        _ => Ok(()),
    }
}

fn check_guide_source(kind: GuideKind, url: Option<&str>, body: Option<&str>) -> Result<()> {
    let blank = |value: Option<&str>| value.map_or(true, |v| v.trim().is_empty());
    match kind {
        GuideKind::Link if blank(url) => {
            Err(AppError::InvalidInput("link guides need a url".to_string()))
        }
        GuideKind::Text if blank(body) => {
            Err(AppError::InvalidInput("text guides need a body".to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimits;

    async fn app(dir: &tempfile::TempDir) -> App {
        let config = Config {
            db_path: dir.path().join("games.db").to_string_lossy().to_string(),
            anthropic_api_key: None,
            steam_api_key: None,
            anthropic_api_url: "http://127.0.0.1:9/v1/messages".to_string(),
            reasoning_model: "test-model".to_string(),
            hltb_search_url: "http://127.0.0.1:9/api/search".to_string(),
            analyze_concurrency: 2,
            rate_limits: RateLimits::default(),
        };
        App::new(&config).await.unwrap()
    }

    async fn game(app: &App) -> Game {
        app.add_game(NewGame {
            title: "Outer Wilds".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn guides_must_carry_their_content() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;

        let link = app
            .add_guide(NewGuide {
                game_id: game.id,
                title: "Walkthrough".to_string(),
                kind: GuideKind::Link,
                ..Default::default()
            })
            .await;
        assert!(matches!(link, Err(AppError::InvalidInput(_))));

        let text = app
            .add_guide(NewGuide {
                game_id: game.id,
                title: "Notes".to_string(),
                kind: GuideKind::Text,
                body: Some("  ".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(text, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn children_of_unknown_games_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let result = app
            .add_achievement(NewAchievement {
                game_id: 77,
                name: "Ghost".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::NotFound { entity: "game", id: 77 })));
    }

    #[tokio::test]
    async fn details_gather_everything_for_a_game() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;
        app.add_achievement(NewAchievement {
            game_id: game.id,
            name: "Archaeologist".to_string(),
            completion_rate: Some(18.0),
            ..Default::default()
        })
        .await
        .unwrap();

        let details = app.game_details(game.id).await.unwrap();
        assert_eq!(details.game.title, "Outer Wilds");
        assert_eq!(details.achievements.len(), 1);
        assert!(details.guides.is_empty());
        assert!(details.latest_score.is_none());
        assert!(app.score_history(game.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_completion_rate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;

        let result = app
            .add_achievement(NewAchievement {
                game_id: game.id,
                name: "Impossible".to_string(),
                completion_rate: Some(140.0),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn import_needs_a_steam_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let result = app.import_steam("620").await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;

        let result = app.update_game(game.id, GameUpdate::default()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn achievement_update_keeps_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;
        let achievement = app
            .add_achievement(NewAchievement {
                game_id: game.id,
                name: "Archaeologist".to_string(),
                description: Some("Explore".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = app
            .update_achievement(
                achievement.id,
                AchievementUpdate {
                    completion_rate: Some(18.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.completion_rate, Some(18.0));
        assert_eq!(updated.description.as_deref(), Some("Explore"));

        let bad = app
            .update_achievement(
                achievement.id,
                AchievementUpdate {
                    completion_rate: Some(-1.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad, Err(AppError::InvalidInput(_))));

        let missing = app
            .update_achievement(
                404,
                AchievementUpdate {
                    name: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::NotFound { entity: "achievement", .. })));
    }

    #[tokio::test]
    async fn guide_update_cannot_strip_its_source() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let game = game(&app).await;
        let guide = app
            .add_guide(NewGuide {
                game_id: game.id,
                title: "Walkthrough".to_string(),
                kind: GuideKind::Link,
                url: Some("https://guides.example/ow".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let renamed = app
            .update_guide(
                guide.id,
                GuideUpdate {
                    title: Some("Full walkthrough".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Full walkthrough");
        assert_eq!(renamed.url, guide.url);

        let blanked = app
            .update_guide(
                guide.id,
                GuideUpdate {
                    url: Some(" ".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(blanked, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn missing_hltb_time_and_score_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let time = app
            .update_hltb_time(
                5,
                HltbTimeUpdate {
                    main_story_hours: Some(12.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(time, Err(AppError::NotFound { entity: "hltb time", id: 5 })));

        let negative = app
            .update_hltb_time(
                5,
                HltbTimeUpdate {
                    extras_hours: Some(-2.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(negative, Err(AppError::InvalidInput(_))));

        let score = app.engagement_score(9).await;
        assert!(matches!(score, Err(AppError::NotFound { entity: "engagement score", id: 9 })));
    }
}
